use mediasort_core::MediaType;
use serde::{Deserialize, Serialize};

use crate::MetadataError;

/// A catalog service that can be searched by title.
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Search the catalog. Results keep the provider's relevance order,
    /// which the resolver uses as its final tie-break.
    async fn search(
        &self,
        query: &str,
        year: Option<u16>,
    ) -> Result<Vec<Candidate>, MetadataError>;

    /// Fetch the extended record for a search hit.
    async fn details(
        &self,
        external_id: &str,
        media_type: MediaType,
    ) -> Result<ExtendedRecord, MetadataError>;
}

/// One search hit as returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub external_id: String,
    /// Raw provider type string (`"tv"`, `"movie"`, `"person"`, ...).
    pub media_type: String,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<u16>,
    pub genre_ids: Vec<u32>,
    pub popularity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub episode_number: u32,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonInfo {
    pub season_number: u32,
    pub episodes: Vec<EpisodeInfo>,
}

/// Details for a confirmed catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedRecord {
    pub external_id: String,
    pub media_type: MediaType,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<u16>,
    pub season_count: Option<u32>,
    pub seasons: Vec<SeasonInfo>,
}
