#![allow(clippy::type_complexity)]
pub mod cache;
pub mod provider;
pub mod resolver;
pub mod scoring;
pub mod sqlite_store;
pub mod tmdb;

use thiserror::Error;

pub use cache::{CacheStats, CacheStore, MemoryCacheStore, MetadataCache};
pub use provider::{Candidate, ExtendedRecord, MetadataProvider};
pub use resolver::{ResolveError, Resolver, ResolverConfig};
pub use scoring::{ScoredCandidate, ScoringWeights};
pub use sqlite_store::SqliteCacheStore;

/// Errors raised by a metadata provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),
    #[error("not found")]
    NotFound,
}

impl MetadataError {
    /// Errors no retry can fix and that affect every file in a batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}
