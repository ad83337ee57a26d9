//! Single-flight token refresh.
//!
//! At most one `SessionController::refresh()` runs at a time. Every caller
//! that asks for a refresh while one is running awaits the same shared
//! future and receives a clone of the same outcome.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::api::ApiError;

use super::SessionController;

type RefreshFuture = Shared<BoxFuture<'static, Result<String, ApiError>>>;

enum RefreshState {
    Idle,
    InFlight { generation: u64, future: RefreshFuture },
}

struct Inner {
    state: RefreshState,
    generations: u64,
}

pub struct RefreshCoordinator {
    session: Arc<SessionController>,
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl RefreshCoordinator {
    pub fn new(session: Arc<SessionController>) -> Self {
        Self {
            session,
            inner: Arc::new(Mutex::new(Inner {
                state: RefreshState::Idle,
                generations: 0,
            })),
        }
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(lock(&self.inner).state, RefreshState::InFlight { .. })
    }

    /// Start a refresh, or join the one already running.
    pub async fn ensure_refreshed(&self) -> Result<String, ApiError> {
        let future = {
            let mut inner = lock(&self.inner);
            let running = match &inner.state {
                RefreshState::InFlight { generation, future } => Some((*generation, future.clone())),
                RefreshState::Idle => None,
            };

            match running {
                Some((generation, future)) => {
                    debug!(generation, "Joining in-flight refresh");
                    future
                }
                None => {
                    inner.generations += 1;
                    let generation = inner.generations;
                    debug!(generation, "Starting refresh");

                    let future = self.refresh_cycle(generation);
                    inner.state = RefreshState::InFlight {
                        generation,
                        future: future.clone(),
                    };
                    future
                }
            }
        };

        future.await
    }

    /// One refresh attempt that returns the coordinator to `Idle` as soon as
    /// the attempt settles, before any waiter sees the outcome.
    fn refresh_cycle(&self, generation: u64) -> RefreshFuture {
        let session = Arc::clone(&self.session);
        let state = Arc::clone(&self.inner);

        async move {
            let outcome = session.refresh().await;

            let mut inner = lock(&state);
            if matches!(inner.state, RefreshState::InFlight { generation: g, .. } if g == generation)
            {
                inner.state = RefreshState::Idle;
            }
            debug!(generation, ok = outcome.is_ok(), "Refresh settled");
            outcome
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::auth::session::REFRESH_PATH;
    use crate::auth::{CredentialPair, CredentialStore};
    use crate::testing::{json, MockTransport};

    fn coordinator(transport: Arc<MockTransport>) -> (RefreshCoordinator, Arc<CredentialStore>) {
        let store = Arc::new(CredentialStore::in_memory());
        store.set(CredentialPair::new("A1", "R1"));
        let session = Arc::new(SessionController::new(
            transport,
            store.clone(),
            Duration::from_secs(2),
        ));
        (RefreshCoordinator::new(session), store)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let transport = MockTransport::new();
        transport.on_delayed(Method::POST, REFRESH_PATH, Duration::from_millis(50), |_| {
            Ok(json(200, json!({"access": "A2"})))
        });
        let (coordinator, store) = coordinator(transport.clone());

        let (a, b, c) = tokio::join!(
            coordinator.ensure_refreshed(),
            coordinator.ensure_refreshed(),
            coordinator.ensure_refreshed()
        );

        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 1);
        assert_eq!(a.unwrap(), "A2");
        assert_eq!(b.unwrap(), "A2");
        assert_eq!(c.unwrap(), "A2");
        assert_eq!(store.get(), CredentialPair::new("A2", "R1"));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let transport = MockTransport::new();
        transport.on_delayed(Method::POST, REFRESH_PATH, Duration::from_millis(50), |_| {
            Ok(json(401, json!({"detail": "Token is blacklisted"})))
        });
        let (coordinator, store) = coordinator(transport.clone());

        let (a, b) = tokio::join!(coordinator.ensure_refreshed(), coordinator.ensure_refreshed());

        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 1);
        assert_eq!(a.unwrap_err(), ApiError::SessionExpired);
        assert_eq!(b.unwrap_err(), ApiError::SessionExpired);
        assert!(store.get().is_empty());
    }

    #[tokio::test]
    async fn test_returns_to_idle_between_cycles() {
        let transport = MockTransport::new();
        transport.respond(Method::POST, REFRESH_PATH, 200, json!({"access": "A2"}));
        let (coordinator, _store) = coordinator(transport.clone());

        assert_eq!(coordinator.ensure_refreshed().await.unwrap(), "A2");
        assert!(!coordinator.is_refreshing());

        transport.respond(Method::POST, REFRESH_PATH, 200, json!({"access": "A3"}));
        assert_eq!(coordinator.ensure_refreshed().await.unwrap(), "A3");
        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_multi_thread_single_flight() {
        let transport = MockTransport::new();
        transport.on_delayed(Method::POST, REFRESH_PATH, Duration::from_millis(200), |_| {
            Ok(json(200, json!({"access": "A2"})))
        });
        let (coordinator, _store) = coordinator(transport.clone());
        let coordinator = Arc::new(coordinator);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move { coordinator.ensure_refreshed().await })
            })
            .collect();
        let results = futures::future::join_all(handles).await;

        assert_eq!(transport.calls(Method::POST, REFRESH_PATH), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap(), "A2");
        }
    }
}
