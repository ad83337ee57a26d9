//! Core library for taskdeck.
//!
//! An authenticated client for a task-management REST service. Every call
//! goes through one request pipeline that attaches the bearer credential,
//! refreshes it at most once at a time when the server rejects it, and
//! replays the rejected request once.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError};
pub use auth::SessionEvent;
pub use config::Config;
