//! REST API client module for the task service.
//!
//! This module provides the authenticated request pipeline and the
//! `ApiClient` facade built on it:
//!
//! - `Transport`: the network boundary (`ReqwestTransport` in production)
//! - `MiddlewareChain`: ordered request preparation (JSON headers, bearer token)
//! - `RequestPipeline`: dispatch, 401 detection, single refresh + replay
//! - `ApiError`: the error taxonomy every failure is normalized into
//!
//! The API uses JWT bearer authentication; access tokens are renewed with
//! the refresh token through `auth::RefreshCoordinator`.

pub mod client;
pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod transport;

pub use client::ApiClient;
pub use error::{ApiError, ErrorDetail};
pub use middleware::{MiddlewareChain, RequestMiddleware};
pub use pipeline::{PendingRequest, RequestPipeline, MAX_AUTH_REPLAYS};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
