use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::transport::send_with_timeout;
use crate::api::{middleware, ApiError, ErrorDetail, HttpRequest, Transport};
use crate::models::{LoginData, LoginResponse, RefreshResponse, RegisterResponse, Registration, User};

use super::credentials::{CredentialPair, CredentialStore};

pub const LOGIN_PATH: &str = "auth/login/";
pub const REFRESH_PATH: &str = "auth/refresh/";
pub const LOGOUT_PATH: &str = "auth/logout/";
pub const REGISTER_PATH: &str = "auth/register/";

/// Buffer size for the session event channel.
/// Subscribers that fall this far behind only miss stale transitions.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Session lifecycle transitions, for the UI layer to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { username: String },
    LoggedOut,
    Refreshed,
    /// The session can no longer be renewed; the user must log in again.
    Expired,
}

/// Owns the credential lifecycle. The only component that mutates the
/// `CredentialStore`.
///
/// Auth endpoints are called on the raw transport, never through the
/// request pipeline, so a rejected login or refresh cannot itself trigger a
/// refresh.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    timeout: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<CredentialStore>, timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            store,
            timeout,
            events,
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        if self.events.send(event.clone()).is_err() {
            debug!(?event, "No session event subscribers");
        }
    }

    /// Exchange a username/password for a credential pair.
    pub async fn login(&self, data: &LoginData) -> Result<User, ApiError> {
        let request = HttpRequest::post(LOGIN_PATH).with_body(data)?;
        let response = send_with_timeout(self.transport.as_ref(), &request, self.timeout).await?;

        if response.status.is_client_error() {
            warn!(status = response.status.as_u16(), "Login rejected");
            return Err(ApiError::InvalidCredentials(ErrorDetail::parse(&response.body)));
        }
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }

        let login: LoginResponse = response.json()?;
        self.store.set(CredentialPair::new(login.access, login.refresh));
        info!(username = %login.user.username, "Login successful");
        self.emit(SessionEvent::LoggedIn {
            username: login.user.username.clone(),
        });
        Ok(login.user)
    }

    /// Revoke the refresh token server-side if possible, then forget both
    /// credentials. Always succeeds locally.
    pub async fn logout(&self) {
        let pair = self.store.get();
        if let Some(refresh) = pair.refresh {
            let mut request = HttpRequest::post(LOGOUT_PATH).with_json(json!({ "refresh": refresh }));
            if let Some(ref access) = pair.access {
                if let Err(e) = middleware::attach_bearer(&mut request, access) {
                    warn!(error = %e, "Could not attach credential to logout request");
                }
            }
            match send_with_timeout(self.transport.as_ref(), &request, self.timeout).await {
                Ok(response) if response.is_success() => debug!("Refresh token revoked"),
                Ok(response) => {
                    warn!(status = response.status.as_u16(), "Server-side logout rejected, ignoring")
                }
                Err(e) => warn!(error = %e, "Server-side logout failed, ignoring"),
            }
        }

        self.store.clear();
        info!("Logged out");
        self.emit(SessionEvent::LoggedOut);
    }

    /// Trade the refresh credential for a new access credential.
    ///
    /// Not safe to run concurrently with itself in a meaningful way; callers
    /// go through `RefreshCoordinator`.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let Some(refresh) = self.store.refresh_token() else {
            self.expire("no refresh token available");
            return Err(ApiError::SessionExpired);
        };

        let request = HttpRequest::post(REFRESH_PATH).with_json(json!({ "refresh": refresh }));
        let outcome = match send_with_timeout(self.transport.as_ref(), &request, self.timeout).await {
            Ok(response) if response.is_success() => response.json::<RefreshResponse>(),
            Ok(response) => Err(ApiError::from_status(response.status, &response.body)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(refreshed) => {
                self.store.set_access(refreshed.access.clone());
                info!("Access token refreshed");
                self.emit(SessionEvent::Refreshed);
                Ok(refreshed.access)
            }
            Err(e) => {
                self.expire(&e.to_string());
                Err(ApiError::SessionExpired)
            }
        }
    }

    fn expire(&self, reason: &str) {
        warn!(reason, "Session expired, clearing credentials");
        self.store.clear();
        self.emit(SessionEvent::Expired);
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, registration: &Registration) -> Result<User, ApiError> {
        let request = HttpRequest::post(REGISTER_PATH).with_body(registration)?;
        let response = send_with_timeout(self.transport.as_ref(), &request, self.timeout).await?;
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }
        let registered: RegisterResponse = response.json()?;
        let user = registered.into_user();
        info!(username = %user.username, "Account registered");
        Ok(user)
    }
}
