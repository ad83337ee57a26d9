//! Scripted transport for exercising the pipeline without a server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::api::{ApiError, HttpRequest, HttpResponse, Transport};

type Handler = Arc<dyn Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync>;

struct Route {
    method: Method,
    path: String,
    delay: Duration,
    handler: Handler,
}

#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<HttpRequest>>,
}

pub(crate) fn json(status: u16, body: Value) -> HttpResponse {
    let status = StatusCode::from_u16(status).expect("valid status code");
    HttpResponse::new(status, body.to_string())
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Later registrations for the same route take precedence.
    pub fn on<F>(&self, method: Method, path: &str, handler: F)
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    {
        self.on_delayed(method, path, Duration::ZERO, handler);
    }

    pub fn on_delayed<F>(&self, method: Method, path: &str, delay: Duration, handler: F)
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    {
        self.routes.lock().unwrap().push(Route {
            method,
            path: path.to_string(),
            delay,
            handler: Arc::new(handler),
        });
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        self.on(method, path, move |_| Ok(json(status, body.clone())));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Bearer tokens sent to `path`, in dispatch order.
    pub fn bearers(&self, method: Method, path: &str) -> Vec<Option<String>> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .map(|r| r.bearer().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        self.log.lock().unwrap().push(request.clone());

        let route = {
            let routes = self.routes.lock().unwrap();
            routes
                .iter()
                .rev()
                .find(|r| r.method == request.method && r.path == request.path)
                .map(|r| (r.delay, Arc::clone(&r.handler)))
        };

        match route {
            Some((delay, handler)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                handler(request)
            }
            None => Ok(json(404, serde_json::json!({"detail": "Not found."}))),
        }
    }
}
