//! The authenticated request pipeline.
//!
//! Every API call passes through `RequestPipeline::send`:
//!
//! 1. the middleware chain prepares the wire request (the bearer credential
//!    is read from the store at this point, on every attempt),
//! 2. the request is dispatched under a fixed timeout,
//! 3. a 401 on a first attempt triggers the single-flight refresh and one
//!    replay; a 401 on the replay is terminal (`AuthorizationDenied`),
//! 4. every other non-success status is normalized into `ApiError`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::RefreshCoordinator;

use super::middleware::MiddlewareChain;
use super::transport::send_with_timeout;
use super::{ApiError, HttpRequest, HttpResponse, Transport};

/// How many times a request may be replayed after a credential refresh.
pub const MAX_AUTH_REPLAYS: u8 = 1;

/// A request plus how many times it has already been replayed.
///
/// Immutable: replaying produces a new value, so two logically distinct
/// requests never share a retry flag.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    request: HttpRequest,
    attempt: u8,
}

impl PendingRequest {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            attempt: 0,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn attempt(&self) -> u8 {
        self.attempt
    }

    pub fn can_replay(&self) -> bool {
        self.attempt < MAX_AUTH_REPLAYS
    }

    pub fn replayed(&self) -> Self {
        Self {
            request: self.request.clone(),
            attempt: self.attempt + 1,
        }
    }
}

impl From<HttpRequest> for PendingRequest {
    fn from(request: HttpRequest) -> Self {
        Self::new(request)
    }
}

pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    chain: MiddlewareChain,
    coordinator: Arc<RefreshCoordinator>,
    timeout: Duration,
}

impl RequestPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        chain: MiddlewareChain,
        coordinator: Arc<RefreshCoordinator>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            chain,
            coordinator,
            timeout,
        }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub async fn send(&self, pending: impl Into<PendingRequest>) -> Result<HttpResponse, ApiError> {
        let mut pending = pending.into();

        loop {
            let wire = self.chain.apply(pending.request())?;
            let response = send_with_timeout(self.transport.as_ref(), &wire, self.timeout).await?;

            if response.status == StatusCode::UNAUTHORIZED {
                if !pending.can_replay() {
                    warn!(
                        method = %wire.method,
                        path = %wire.path,
                        attempt = pending.attempt(),
                        "Still unauthorized after refresh"
                    );
                    return Err(ApiError::AuthorizationDenied);
                }

                debug!(method = %wire.method, path = %wire.path, "Unauthorized, refreshing credentials");
                pending = pending.replayed();
                self.coordinator.ensure_refreshed().await?;
                continue;
            }

            if response.is_success() {
                return Ok(response);
            }

            debug!(
                method = %wire.method,
                path = %wire.path,
                status = response.status.as_u16(),
                "Request failed"
            );
            return Err(ApiError::from_status(response.status, &response.body));
        }
    }

    /// Send and decode a JSON response body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: impl Into<PendingRequest>,
    ) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<T, ApiError> {
        self.send_json(HttpRequest::get(path).with_query(query)).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(HttpRequest::post(path).with_body(body)?).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(HttpRequest::put(path).with_body(body)?).await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(HttpRequest::patch(path).with_body(body)?).await
    }

    /// DELETE with no body; a 204 decodes as `()`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(HttpRequest::delete(path)).await
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::auth::session::REFRESH_PATH;
    use crate::auth::{CredentialPair, CredentialStore, SessionController};
    use crate::testing::{json, MockTransport};

    const TASKS: &str = "tasks/";

    fn pipeline_with_timeout(
        transport: Arc<MockTransport>,
        timeout: Duration,
    ) -> (RequestPipeline, Arc<CredentialStore>) {
        let store = Arc::new(CredentialStore::in_memory());
        store.set(CredentialPair::new("A1", "R1"));
        let session = Arc::new(SessionController::new(transport.clone(), store.clone(), timeout));
        let coordinator = Arc::new(RefreshCoordinator::new(session));
        let pipeline = RequestPipeline::new(
            transport,
            MiddlewareChain::standard(store.clone()),
            coordinator,
            timeout,
        );
        (pipeline, store)
    }

    fn pipeline(transport: Arc<MockTransport>) -> (RequestPipeline, Arc<CredentialStore>) {
        pipeline_with_timeout(transport, Duration::from_secs(2))
    }

    /// Tasks endpoint that only accepts `valid` as the bearer token.
    fn tasks_accepting(transport: &MockTransport, valid: &'static str) {
        transport.on(Method::GET, TASKS, move |req| {
            if req.bearer() == Some(valid) {
                Ok(json(200, json!({"count": 0, "next": null, "previous": null, "results": []})))
            } else {
                Ok(json(401, json!({"detail": "Given token not valid for any token type"})))
            }
        });
    }

    #[test]
    fn test_pending_request_replay_is_a_new_value() {
        let original = PendingRequest::new(HttpRequest::get(TASKS));
        let replay = original.replayed();
        assert_eq!(original.attempt(), 0);
        assert!(original.can_replay());
        assert_eq!(replay.attempt(), 1);
        assert!(!replay.can_replay());
    }

    #[tokio::test]
    async fn test_attaches_bearer() {
        let transport = MockTransport::new();
        tasks_accepting(&transport, "A1");
        let (pipeline, _store) = pipeline(transport.clone());

        pipeline.send(HttpRequest::get(TASKS)).await.unwrap();
        assert_eq!(transport.bearers(Method::GET, TASKS), vec![Some("A1".to_string())]);
        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_refresh_then_replay_once() {
        let transport = MockTransport::new();
        tasks_accepting(&transport, "A2");
        transport.respond(Method::POST, REFRESH_PATH, 200, json!({"access": "A2"}));
        let (pipeline, store) = pipeline(transport.clone());

        let response = pipeline.send(HttpRequest::get(TASKS)).await.unwrap();
        assert!(response.is_success());
        assert_eq!(
            transport.bearers(Method::GET, TASKS),
            vec![Some("A1".to_string()), Some("A2".to_string())]
        );
        assert_eq!(store.get(), CredentialPair::new("A2", "R1"));
    }

    #[tokio::test]
    async fn test_second_401_is_terminal_and_keeps_credentials() {
        let transport = MockTransport::new();
        tasks_accepting(&transport, "never");
        transport.respond(Method::POST, REFRESH_PATH, 200, json!({"access": "A2"}));
        let (pipeline, store) = pipeline(transport.clone());

        let err = pipeline.send(HttpRequest::get(TASKS)).await.unwrap_err();
        assert_eq!(err, ApiError::AuthorizationDenied);
        assert_eq!(transport.calls(Method::GET, TASKS), 2);
        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 1);
        assert_eq!(store.get(), CredentialPair::new("A2", "R1"));
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces_session_expired() {
        let transport = MockTransport::new();
        tasks_accepting(&transport, "A2");
        transport.respond(Method::POST, REFRESH_PATH, 401, json!({"detail": "expired"}));
        let (pipeline, store) = pipeline(transport.clone());

        let err = pipeline.send(HttpRequest::get(TASKS)).await.unwrap_err();
        assert_eq!(err, ApiError::SessionExpired);
        assert!(store.get().is_empty());
        assert_eq!(transport.calls(Method::GET, TASKS), 1);
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let transport = MockTransport::new();
        tasks_accepting(&transport, "A2");
        transport.on_delayed(Method::POST, REFRESH_PATH, Duration::from_millis(50), |_| {
            Ok(json(200, json!({"access": "A2"})))
        });
        let (pipeline, _store) = pipeline(transport.clone());

        let (a, b, c) = tokio::join!(
            pipeline.send(HttpRequest::get(TASKS)),
            pipeline.send(HttpRequest::get(TASKS)),
            pipeline.send(HttpRequest::get(TASKS))
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 1);

        let bearers = transport.bearers(Method::GET, TASKS);
        let replays: Vec<_> = bearers.iter().filter(|b| b.as_deref() == Some("A2")).collect();
        assert_eq!(bearers.len(), 6);
        assert_eq!(replays.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_refresh_failure() {
        let transport = MockTransport::new();
        tasks_accepting(&transport, "A2");
        transport.on_delayed(Method::POST, REFRESH_PATH, Duration::from_millis(50), |_| {
            Ok(json(400, json!({"refresh": ["This field is required."]})))
        });
        let (pipeline, store) = pipeline(transport.clone());

        let (a, b) = tokio::join!(
            pipeline.send(HttpRequest::get(TASKS)),
            pipeline.send(HttpRequest::get(TASKS))
        );
        assert_eq!(a.unwrap_err(), ApiError::SessionExpired);
        assert_eq!(b.unwrap_err(), ApiError::SessionExpired);
        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 1);
        assert!(store.get().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_not_an_auth_failure() {
        let transport = MockTransport::new();
        transport.on_delayed(Method::GET, TASKS, Duration::from_millis(500), |_| {
            Ok(json(401, json!({})))
        });
        let (pipeline, store) = pipeline_with_timeout(transport.clone(), Duration::from_millis(50));

        let err = pipeline.send(HttpRequest::get(TASKS)).await.unwrap_err();
        assert_eq!(err, ApiError::Timeout);
        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 0);
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn test_network_failure_not_retried() {
        let transport = MockTransport::new();
        transport.on(Method::GET, TASKS, |_| {
            Err(ApiError::NetworkFailure("connection reset".to_string()))
        });
        let (pipeline, _store) = pipeline(transport.clone());

        let err = pipeline.send(HttpRequest::get(TASKS)).await.unwrap_err();
        assert!(matches!(err, ApiError::NetworkFailure(_)));
        assert_eq!(transport.calls(Method::GET, TASKS), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_passes_field_detail() {
        let transport = MockTransport::new();
        transport.respond(
            Method::POST,
            TASKS,
            400,
            json!({"title": ["This field may not be blank."]}),
        );
        let (pipeline, _store) = pipeline(transport.clone());

        let request = HttpRequest::post(TASKS).with_json(json!({"title": ""}));
        let err = pipeline.send(request).await.unwrap_err();
        let ApiError::ValidationFailure { status, detail } = err else {
            panic!("expected validation failure, got {:?}", err);
        };
        assert_eq!(status, 400);
        assert_eq!(
            detail.field("title"),
            Some(&["This field may not be blank.".to_string()][..])
        );
        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_401_expires_session() {
        let transport = MockTransport::new();
        tasks_accepting(&transport, "A1");
        let (pipeline, store) = pipeline(transport.clone());
        store.clear();

        let err = pipeline.send(HttpRequest::get(TASKS)).await.unwrap_err();
        assert_eq!(err, ApiError::SessionExpired);
        assert_eq!(transport.bearers(Method::GET, TASKS), vec![None]);
        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_typed_helpers_decode_json() {
        let transport = MockTransport::new();
        transport.respond(Method::POST, TASKS, 201, json!({"id": 7}));
        transport.on(Method::DELETE, "tasks/7/", |_| {
            Ok(HttpResponse::new(StatusCode::NO_CONTENT, ""))
        });
        let (pipeline, _store) = pipeline(transport.clone());

        let created: serde_json::Value = pipeline.post(TASKS, &json!({"title": "x"})).await.unwrap();
        assert_eq!(created["id"], 7);
        let _: () = pipeline.delete("tasks/7/").await.unwrap();
        assert_eq!(
            transport.bearers(Method::DELETE, "tasks/7/"),
            vec![Some("A1".to_string())]
        );
    }
}
