//! Ordered request transformers applied before every dispatch.

use std::sync::Arc;

use reqwest::header::{self, HeaderValue};

use crate::auth::CredentialStore;

use super::{ApiError, HttpRequest};

pub trait RequestMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    fn prepare(&self, request: &mut HttpRequest) -> Result<(), ApiError>;
}

/// Set `Authorization: Bearer <token>`, replacing any previous value.
pub fn attach_bearer(request: &mut HttpRequest, token: &str) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| ApiError::InvalidResponse(format!("Unusable access token: {}", e)))?;
    request.headers.insert(header::AUTHORIZATION, value);
    Ok(())
}

/// JSON content negotiation headers.
pub struct JsonHeaders;

impl RequestMiddleware for JsonHeaders {
    fn name(&self) -> &'static str {
        "json-headers"
    }

    fn prepare(&self, request: &mut HttpRequest) -> Result<(), ApiError> {
        request
            .headers
            .insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if request.body.is_some() {
            request
                .headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(())
    }
}

/// Attaches whatever access credential the store holds at prepare time.
pub struct BearerAuth {
    store: Arc<CredentialStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }
}

impl RequestMiddleware for BearerAuth {
    fn name(&self) -> &'static str {
        "bearer-auth"
    }

    fn prepare(&self, request: &mut HttpRequest) -> Result<(), ApiError> {
        match self.store.access_token() {
            Some(token) => attach_bearer(request, &token),
            None => {
                request.headers.remove(header::AUTHORIZATION);
                Ok(())
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn RequestMiddleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain: JSON headers, then the bearer credential.
    pub fn standard(store: Arc<CredentialStore>) -> Self {
        Self::new()
            .with(Arc::new(JsonHeaders))
            .with(Arc::new(BearerAuth::new(store)))
    }

    pub fn with(mut self, layer: Arc<dyn RequestMiddleware>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Produce the wire request for one attempt, leaving `request` untouched.
    pub fn apply(&self, request: &HttpRequest) -> Result<HttpRequest, ApiError> {
        let mut prepared = request.clone();
        for layer in &self.layers {
            layer.prepare(&mut prepared)?;
        }
        Ok(prepared)
    }
}
