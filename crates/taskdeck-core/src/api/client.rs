//! API client for the task service.
//!
//! `ApiClient` wires the credential store, session controller, refresh
//! coordinator and request pipeline together and exposes the typed task and
//! profile operations. Reads go through the cache; mutations invalidate it
//! once the server has confirmed them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::debug;

use crate::auth::{CredentialStore, RefreshCoordinator, SessionController, SessionEvent};
use crate::cache::{CacheKey, CacheManager, InvalidationTag, Mutation, DEFAULT_STALE_MINUTES};
use crate::config::Config;
use crate::models::{
    BulkDeleteResult, BulkUpdateResult, LoginData, Paginated, PasswordChange, ProfileResponse,
    ProfileUpdate, Registration, Task, TaskDraft, TaskFilters, TaskId, TaskPatch, TaskStats,
    TaskStatus, User,
};

use super::middleware::MiddlewareChain;
use super::transport::ReqwestTransport;
use super::{ApiError, HttpRequest, RequestPipeline, Transport};

const PROFILE_PATH: &str = "auth/profile/";
const CHANGE_PASSWORD_PATH: &str = "auth/change-password/";
const TASKS_PATH: &str = "tasks/";
const TASK_STATS_PATH: &str = "tasks/stats/";
const BULK_UPDATE_STATUS_PATH: &str = "tasks/bulk_update_status/";
const BULK_DELETE_PATH: &str = "tasks/bulk_delete/";

fn task_path(id: TaskId) -> String {
    format!("tasks/{}/", id)
}

fn task_status_path(id: TaskId) -> String {
    format!("tasks/{}/update_status/", id)
}

/// Clone is cheap - all state is behind `Arc`.
#[derive(Clone)]
pub struct ApiClient {
    store: Arc<CredentialStore>,
    session: Arc<SessionController>,
    pipeline: Arc<RequestPipeline>,
    cache: Arc<CacheManager>,
}

impl ApiClient {
    /// Build a client from configuration: reqwest transport, configured
    /// credential backend.
    pub fn new(config: &Config) -> Result<Self> {
        let timeout = config.request_timeout();
        let transport = Arc::new(ReqwestTransport::new(&config.api_base_url, timeout)?);
        let store = Arc::new(CredentialStore::open(config.credential_backend()?));
        Ok(Self::with_transport(
            transport,
            store,
            timeout,
            config.cache_stale_minutes,
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        timeout: Duration,
        cache_stale_minutes: i64,
    ) -> Self {
        let session = Arc::new(SessionController::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            timeout,
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(Arc::clone(&session)));
        let pipeline = Arc::new(RequestPipeline::new(
            transport,
            MiddlewareChain::standard(Arc::clone(&store)),
            coordinator,
            timeout,
        ));

        Self {
            store,
            session,
            pipeline,
            cache: Arc::new(CacheManager::new(cache_stale_minutes)),
        }
    }

    /// In-memory credentials and default timings; for embedding and tests.
    pub fn ephemeral(transport: Arc<dyn Transport>) -> Self {
        Self::with_transport(
            transport,
            Arc::new(CredentialStore::in_memory()),
            Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            DEFAULT_STALE_MINUTES,
        )
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    /// Session transitions, including `SessionEvent::Expired` when the user
    /// has to log in again.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    // ===== Session =====

    pub async fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let user = self.session.login(&LoginData::new(username, password)).await?;
        self.cache.clear();
        Ok(user)
    }

    pub async fn logout(&self) {
        self.session.logout().await;
        self.cache.clear();
    }

    pub async fn register(&self, registration: &Registration) -> Result<User, ApiError> {
        self.session.register(registration).await
    }

    // ===== Plumbing =====

    /// Drop cached reads when the session turned out to be gone.
    fn observe<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(ApiError::SessionExpired) = result {
            self.cache.clear();
        }
        result
    }

    /// Serve `key` from cache when fresh, otherwise fetch and remember it.
    async fn read<T>(&self, key: CacheKey, request: HttpRequest) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
    {
        if let Some(cached) = self.cache.load::<T>(&key) {
            debug!(tag = %key.tag, variant = %key.variant, "Serving from cache");
            return Ok(cached);
        }

        let ticket = self.cache.begin_read(key);
        let value: T = self.observe(self.pipeline.send_json(request).await)?;
        self.cache.save(ticket, &value);
        Ok(value)
    }

    /// Run a mutation and invalidate its tags once the server confirmed it.
    ///
    /// Invalidation precedes decoding: a 2xx whose body does not parse still
    /// changed server state.
    async fn mutate<T>(&self, mutation: Mutation, request: HttpRequest) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let response = self.observe(self.pipeline.send(request).await)?;
        self.cache.invalidate(&mutation.invalidates());
        response.json()
    }

    // ===== Profile =====

    pub async fn get_profile(&self) -> Result<User, ApiError> {
        self.read(
            CacheKey::new(InvalidationTag::Profile),
            HttpRequest::get(PROFILE_PATH),
        )
        .await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let request = HttpRequest::put(PROFILE_PATH).with_body(update)?;
        let response: ProfileResponse = self.mutate(Mutation::UpdateProfile, request).await?;
        Ok(response.into_user())
    }

    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        let request = HttpRequest::put(CHANGE_PASSWORD_PATH).with_body(change)?;
        self.observe(self.pipeline.send(request).await)?;
        Ok(())
    }

    // ===== Tasks =====

    pub async fn list_tasks(&self, filters: &TaskFilters) -> Result<Paginated<Task>, ApiError> {
        let key = CacheKey::with_variant(InvalidationTag::TaskList, filters.cache_variant());
        let request = HttpRequest::get(TASKS_PATH).with_query(filters.to_query());
        self.read(key, request).await
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task, ApiError> {
        self.read(
            CacheKey::new(InvalidationTag::Task(id)),
            HttpRequest::get(task_path(id)),
        )
        .await
    }

    pub async fn task_stats(&self) -> Result<TaskStats, ApiError> {
        self.read(
            CacheKey::new(InvalidationTag::TaskStats),
            HttpRequest::get(TASK_STATS_PATH),
        )
        .await
    }

    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        let request = HttpRequest::post(TASKS_PATH).with_body(draft)?;
        self.mutate(Mutation::CreateTask, request).await
    }

    pub async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
        let request = HttpRequest::patch(task_path(id)).with_body(patch)?;
        self.mutate(Mutation::UpdateTask(id), request).await
    }

    pub async fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, ApiError> {
        let request = HttpRequest::patch(task_status_path(id)).with_json(json!({ "status": status }));
        self.mutate(Mutation::UpdateTaskStatus(id), request).await
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        self.mutate(Mutation::DeleteTask(id), HttpRequest::delete(task_path(id)))
            .await
    }

    pub async fn bulk_update_status(
        &self,
        ids: &[TaskId],
        status: TaskStatus,
    ) -> Result<BulkUpdateResult, ApiError> {
        let request = HttpRequest::post(BULK_UPDATE_STATUS_PATH)
            .with_json(json!({ "task_ids": ids, "status": status }));
        self.mutate(Mutation::BulkUpdateStatus(ids.to_vec()), request)
            .await
    }

    pub async fn bulk_delete(&self, ids: &[TaskId]) -> Result<BulkDeleteResult, ApiError> {
        let request = HttpRequest::delete(BULK_DELETE_PATH).with_json(json!({ "task_ids": ids }));
        self.mutate(Mutation::BulkDelete(ids.to_vec()), request).await
    }
}
