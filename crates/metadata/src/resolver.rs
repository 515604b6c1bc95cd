//! Resolve parsed identities to catalog entries.
//!
//! One catalog lookup happens per normalized title/year key: the cache is
//! consulted first, concurrent misses for the same key share a single
//! provider round trip, and only confident matches are cached. Provider
//! calls are bounded by a semaphore independent of any caller's own
//! concurrency.

use std::collections::HashMap;
use std::sync::Arc;

use mediasort_core::{ErrorKind, MediaType, ParsedIdentity, ResolvedMatch};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell, Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

use crate::MetadataError;
use crate::cache::{MetadataCache, normalize_key};
use crate::provider::{Candidate, ExtendedRecord, MetadataProvider, SeasonInfo};
use crate::scoring::{ScoredCandidate, ScoringWeights, rank};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// Transient; the file can be retried on a later run.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Affects every lookup (e.g. rejected credentials).
    #[error("provider failure: {0}")]
    Fatal(String),
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Self::Fatal(_) => ErrorKind::ProviderFatal,
        }
    }
}

impl From<MetadataError> for ResolveError {
    fn from(e: MetadataError) -> Self {
        if e.is_fatal() {
            Self::Fatal(e.to_string())
        } else {
            Self::ProviderUnavailable(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Matches scoring below this are rejected.
    pub min_confidence: f64,
    pub weights: ScoringWeights,
    /// Genre ids that earn the class bonus (16 = Animation on TMDB).
    pub expected_genres: Vec<u32>,
    /// Maximum simultaneous provider calls.
    pub provider_concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            weights: ScoringWeights::default(),
            expected_genres: vec![16],
            provider_concurrency: 4,
        }
    }
}

/// Series- or movie-level result, cached per title/year key and specialized
/// per file by [`CatalogRecord::to_match`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CatalogRecord {
    external_id: String,
    media_type: MediaType,
    display_title: String,
    release_year: Option<u16>,
    season_count: Option<u32>,
    seasons: Vec<SeasonInfo>,
    confidence: f64,
}

impl CatalogRecord {
    fn new(details: ExtendedRecord, best: &ScoredCandidate) -> Self {
        Self {
            external_id: details.external_id,
            media_type: details.media_type,
            display_title: details.title,
            release_year: details.year.or(best.candidate.year),
            season_count: details.season_count,
            seasons: details.seasons,
            confidence: best.score,
        }
    }

    fn episode_title(&self, season: u32, episode: u32) -> Option<String> {
        self.seasons
            .iter()
            .find(|s| s.season_number == season)?
            .episodes
            .iter()
            .find(|e| e.episode_number == episode)?
            .title
            .clone()
    }

    fn to_match(&self, identity: &ParsedIdentity) -> ResolvedMatch {
        let episode_title = match (self.media_type, identity.episode) {
            (MediaType::Tv, Some(ep)) => self.episode_title(identity.season, ep),
            _ => None,
        };
        ResolvedMatch {
            identity: identity.clone(),
            external_id: self.external_id.clone(),
            media_type: self.media_type,
            display_title: self.display_title.clone(),
            release_year: self.release_year,
            season_count: self.season_count,
            episode_title,
            confidence: self.confidence,
        }
    }
}

type Lookup = Result<Option<CatalogRecord>, ResolveError>;

pub struct Resolver {
    provider: Arc<dyn MetadataProvider>,
    cache: Arc<MetadataCache>,
    config: ResolverConfig,
    permits: Semaphore,
    inflight: Mutex<HashMap<String, Arc<OnceCell<Lookup>>>>,
}

impl Resolver {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        cache: Arc<MetadataCache>,
        config: ResolverConfig,
    ) -> Self {
        let permits = Semaphore::new(config.provider_concurrency.max(1));
        Self {
            provider,
            cache,
            config,
            permits,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Resolve one identity. `Ok(None)` means no candidate cleared the
    /// confidence threshold; negative results are not cached.
    pub async fn resolve(
        &self,
        identity: &ParsedIdentity,
    ) -> Result<Option<ResolvedMatch>, ResolveError> {
        let key = normalize_key(&identity.title, identity.year);
        if let Some(record) = self.cached(&key).await {
            return Ok(Some(record.to_match(identity)));
        }

        let slot = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(key.clone()).or_default().clone()
        };
        let outcome = slot.get_or_init(|| self.lookup(&key, identity)).await.clone();

        {
            let mut inflight = self.inflight.lock().await;
            if inflight.get(&key).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                inflight.remove(&key);
            }
        }

        Ok(outcome?.map(|record| record.to_match(identity)))
    }

    /// Top `limit` supported candidates for an identity, best first,
    /// regardless of the confidence threshold.
    pub async fn suggestions(
        &self,
        identity: &ParsedIdentity,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, ResolveError> {
        let mut ranked = self.ranked(identity).await?;
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn lookup(&self, key: &str, identity: &ParsedIdentity) -> Lookup {
        // A concurrent lookup may have finished between our miss and now.
        if let Some(record) = self.cached(key).await {
            return Ok(Some(record));
        }

        let ranked = self.ranked(identity).await?;
        let Some(best) = ranked.first() else {
            info!(title = %identity.title, year = ?identity.year, "no catalog candidates");
            return Ok(None);
        };
        if best.score < self.config.min_confidence {
            info!(
                title = %identity.title,
                best = %best.candidate.title,
                score = best.score,
                threshold = self.config.min_confidence,
                "no confident match"
            );
            return Ok(None);
        }

        let details = {
            let _permit = self.acquire().await?;
            self.provider
                .details(&best.candidate.external_id, best.media_type)
                .await
        };
        let details = match details {
            Ok(d) => d,
            Err(MetadataError::NotFound) => {
                warn!(id = %best.candidate.external_id, "search hit has no details");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let record = CatalogRecord::new(details, best);
        debug!(
            key,
            id = %record.external_id,
            media_type = %record.media_type,
            confidence = record.confidence,
            "resolved"
        );
        self.cache.put_by_key(key, &record).await;
        Ok(Some(record))
    }

    /// Cached record for `key`. A record stored by a resolver with a lower
    /// threshold counts as a miss here.
    async fn cached(&self, key: &str) -> Option<CatalogRecord> {
        let record = self.cache.get_by_key::<CatalogRecord>(key).await?;
        if record.confidence < self.config.min_confidence {
            debug!(
                key,
                confidence = record.confidence,
                threshold = self.config.min_confidence,
                "cached record below threshold"
            );
            return None;
        }
        Some(record)
    }

    async fn ranked(&self, identity: &ParsedIdentity) -> Result<Vec<ScoredCandidate>, ResolveError> {
        let candidates = self.search(&identity.title, identity.year).await?;
        let mut ranked = rank(
            identity,
            candidates,
            &self.config.weights,
            &self.config.expected_genres,
        );

        // A wrong year in the filename should not hide the title entirely.
        if ranked.is_empty() && identity.year.is_some() {
            debug!(title = %identity.title, "no results with year, retrying without");
            let candidates = self.search(&identity.title, None).await?;
            ranked = rank(
                identity,
                candidates,
                &self.config.weights,
                &self.config.expected_genres,
            );
        }
        Ok(ranked)
    }

    async fn search(&self, query: &str, year: Option<u16>) -> Result<Vec<Candidate>, ResolveError> {
        let _permit = self.acquire().await?;
        match self.provider.search(query, year).await {
            Ok(candidates) => Ok(candidates),
            Err(MetadataError::NotFound) => Ok(Vec::new()),
            Err(e) => {
                warn!(provider = self.provider.name(), query, error = %e, "search failed");
                Err(e.into())
            }
        }
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, ResolveError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| ResolveError::ProviderUnavailable("resolver closed".into()))
    }
}
