//! Authentication module for managing credentials and the session lifecycle.
//!
//! This module provides:
//! - `CredentialStore`: the access/refresh token pair, persisted through a
//!   `CredentialBackend` (JSON file, OS keychain, or memory)
//! - `SessionController`: login, logout, registration and token refresh;
//!   the only writer of the credential store
//! - `RefreshCoordinator`: single-flight wrapper around token refresh

pub mod credentials;
pub mod refresh;
pub mod session;

pub use credentials::{
    CredentialBackend, CredentialPair, CredentialStore, FileBackend, KeyringBackend, MemoryBackend,
};
pub use refresh::RefreshCoordinator;
pub use session::{SessionController, SessionEvent};
