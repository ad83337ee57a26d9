//! Read-result freshness and mutation invalidation policy.
//!
//! Each mutation declares a fixed set of `InvalidationTag`s (see
//! `Mutation::invalidates`). After the mutation succeeds, the client marks
//! every cached read carrying one of those tags stale, so the next read
//! goes back to the server. Nothing is invalidated for a failed mutation.

pub mod manager;
pub mod tags;

pub use manager::{CacheKey, CacheManager, CachedData, ReadTicket, DEFAULT_STALE_MINUTES};
pub use tags::{InvalidationTag, Mutation};
