//! TMDB (The Movie Database) provider client.
//!
//! Uses TMDB API v3: https://developer.themoviedb.org/docs
//!
//! Transient failures (network errors, 429, 5xx) are retried a few times
//! with a linear backoff before surfacing as errors. A rejected API key
//! surfaces as [`MetadataError::Unauthorized`] and is never retried.

use std::time::Duration;

use mediasort_core::MediaType;
use tracing::{debug, warn};

use crate::MetadataError;
use crate::provider::{Candidate, EpisodeInfo, ExtendedRecord, MetadataProvider, SeasonInfo};

const BASE_URL: &str = "https://api.themoviedb.org/3";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RESULTS: usize = 20;

pub struct TmdbClient {
    api_key: String,
    language: String,
    base_url: String,
    client: reqwest::Client,
}

struct Failure {
    error: MetadataError,
    retryable: bool,
}

impl TmdbClient {
    pub fn new(api_key: String, language: String) -> Self {
        Self {
            api_key,
            language,
            base_url: BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at another host (a local mirror or a test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, MetadataError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request_once(path, params).await {
                Ok(value) => return Ok(value),
                Err(f) if f.retryable && attempt < MAX_ATTEMPTS => {
                    warn!(path, attempt, error = %f.error, "TMDB request failed, retrying");
                    tokio::time::sleep(RETRY_DELAY * attempt).await;
                }
                Err(f) => return Err(f.error),
            }
        }
    }

    async fn request_once(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, Failure> {
        let mut all_params = vec![
            ("api_key", self.api_key.as_str()),
            ("language", self.language.as_str()),
        ];
        all_params.extend_from_slice(params);

        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "TMDB request");

        let resp = self
            .client
            .get(&url)
            .query(&all_params)
            .send()
            .await
            .map_err(|e| Failure {
                error: MetadataError::Network(e.to_string()),
                retryable: true,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_failure(status));
        }

        resp.json().await.map_err(|e| Failure {
            error: MetadataError::Provider(format!("parse JSON: {e}")),
            retryable: false,
        })
    }

    async fn search_endpoint(
        &self,
        path: &str,
        query: &str,
        year_param: Option<(&str, &str)>,
        default_type: Option<&str>,
    ) -> Result<Vec<Candidate>, MetadataError> {
        let mut params = vec![("query", query), ("include_adult", "false")];
        if let Some(p) = year_param {
            params.push(p);
        }
        let data = self.get_json(path, &params).await?;
        Ok(parse_search_results(&data, default_type))
    }

    async fn season(&self, series_id: &str, season_number: u32) -> Result<SeasonInfo, MetadataError> {
        let data = self
            .get_json(&format!("/tv/{series_id}/season/{season_number}"), &[])
            .await?;
        Ok(parse_season(&data, season_number))
    }
}

fn status_failure(status: reqwest::StatusCode) -> Failure {
    use reqwest::StatusCode;
    match status {
        StatusCode::NOT_FOUND => Failure {
            error: MetadataError::NotFound,
            retryable: false,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Failure {
            error: MetadataError::Unauthorized(format!("TMDB returned {status}")),
            retryable: false,
        },
        s => Failure {
            error: MetadataError::Provider(format!("TMDB returned {s}")),
            retryable: s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error(),
        },
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbClient {
    fn name(&self) -> &str {
        "tmdb"
    }

    async fn search(
        &self,
        query: &str,
        year: Option<u16>,
    ) -> Result<Vec<Candidate>, MetadataError> {
        let Some(year) = year else {
            return self.search_endpoint("/search/multi", query, None, None).await;
        };

        // The multi endpoint ignores year filters, so query both typed
        // endpoints and keep TV hits ahead of movies.
        let year = year.to_string();
        let mut results = self
            .search_endpoint(
                "/search/tv",
                query,
                Some(("first_air_date_year", year.as_str())),
                Some("tv"),
            )
            .await?;
        results.extend(
            self.search_endpoint("/search/movie", query, Some(("year", year.as_str())), Some("movie"))
                .await?,
        );
        Ok(results)
    }

    async fn details(
        &self,
        external_id: &str,
        media_type: MediaType,
    ) -> Result<ExtendedRecord, MetadataError> {
        match media_type {
            MediaType::Movie => {
                let data = self.get_json(&format!("/movie/{external_id}"), &[]).await?;
                Ok(parse_movie_record(&data, external_id))
            }
            MediaType::Tv => {
                let data = self.get_json(&format!("/tv/{external_id}"), &[]).await?;
                let mut record = parse_series_record(&data, external_id);

                for number in season_numbers(&data) {
                    match self.season(external_id, number).await {
                        Ok(season) => record.seasons.push(season),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            warn!(id = external_id, season = number, error = %e, "season lookup failed");
                        }
                    }
                }
                Ok(record)
            }
        }
    }
}

fn parse_year(date: &serde_json::Value) -> Option<u16> {
    date.as_str()
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok())
}

fn string_field(r: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| r[*k].as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn parse_search_results(data: &serde_json::Value, default_type: Option<&str>) -> Vec<Candidate> {
    let results = data["results"].as_array().cloned().unwrap_or_default();

    results
        .iter()
        .filter_map(|r| parse_candidate(r, default_type))
        .take(MAX_RESULTS)
        .collect()
}

fn parse_candidate(r: &serde_json::Value, default_type: Option<&str>) -> Option<Candidate> {
    let id = r["id"].as_u64()?;
    let media_type = r["media_type"]
        .as_str()
        .or(default_type)
        .unwrap_or("unknown")
        .to_string();

    Some(Candidate {
        external_id: id.to_string(),
        media_type,
        title: string_field(r, &["title", "name"]).unwrap_or_else(|| "Unknown".to_string()),
        original_title: string_field(r, &["original_title", "original_name"]),
        year: parse_year(&r["release_date"]).or_else(|| parse_year(&r["first_air_date"])),
        genre_ids: r["genre_ids"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|g| g.as_u64().map(|g| g as u32))
                    .collect()
            })
            .unwrap_or_default(),
        popularity: r["popularity"].as_f64().unwrap_or(0.0),
    })
}

fn parse_movie_record(data: &serde_json::Value, external_id: &str) -> ExtendedRecord {
    ExtendedRecord {
        external_id: external_id.to_string(),
        media_type: MediaType::Movie,
        title: string_field(data, &["title"]).unwrap_or_else(|| "Unknown".to_string()),
        original_title: string_field(data, &["original_title"]),
        year: parse_year(&data["release_date"]),
        season_count: None,
        seasons: Vec::new(),
    }
}

fn parse_series_record(data: &serde_json::Value, external_id: &str) -> ExtendedRecord {
    ExtendedRecord {
        external_id: external_id.to_string(),
        media_type: MediaType::Tv,
        title: string_field(data, &["name"]).unwrap_or_else(|| "Unknown".to_string()),
        original_title: string_field(data, &["original_name"]),
        year: parse_year(&data["first_air_date"]),
        season_count: data["number_of_seasons"].as_u64().map(|n| n as u32),
        seasons: Vec::new(),
    }
}

fn season_numbers(data: &serde_json::Value) -> Vec<u32> {
    data["seasons"]
        .as_array()
        .map(|seasons| {
            seasons
                .iter()
                .filter_map(|s| s["season_number"].as_u64().map(|n| n as u32))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_season(data: &serde_json::Value, season_number: u32) -> SeasonInfo {
    let episodes = data["episodes"].as_array().cloned().unwrap_or_default();

    SeasonInfo {
        season_number,
        episodes: episodes
            .iter()
            .filter_map(|ep| {
                Some(EpisodeInfo {
                    episode_number: ep["episode_number"].as_u64()? as u32,
                    title: string_field(ep, &["name"]),
                })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_multi_search_keeps_order_and_raw_types() {
        let json = serde_json::json!({
            "results": [
                {
                    "id": 1429,
                    "media_type": "tv",
                    "name": "Attack on Titan",
                    "original_name": "進撃の巨人",
                    "first_air_date": "2013-04-07",
                    "genre_ids": [16, 10765],
                    "popularity": 150.2
                },
                { "id": 17, "media_type": "person", "name": "Someone" },
                {
                    "id": 399,
                    "media_type": "movie",
                    "title": "Attack on Titan",
                    "release_date": "2015-08-01"
                },
                { "media_type": "movie", "title": "No id" }
            ]
        });

        let results = parse_search_results(&json, None);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].external_id, "1429");
        assert_eq!(results[0].media_type, "tv");
        assert_eq!(results[0].original_title.as_deref(), Some("進撃の巨人"));
        assert_eq!(results[0].year, Some(2013));
        assert_eq!(results[0].genre_ids, vec![16, 10765]);
        assert_eq!(results[1].media_type, "person");
        assert_eq!(results[2].year, Some(2015));
        assert_eq!(results[2].popularity, 0.0);
    }

    #[test]
    fn typed_search_uses_default_media_type() {
        let json = serde_json::json!({
            "results": [{ "id": 372058, "title": "Your Name.", "release_date": "2016-08-26" }]
        });
        let results = parse_search_results(&json, Some("movie"));
        assert_eq!(results[0].media_type, "movie");
        assert_eq!(results[0].title, "Your Name.");
    }

    #[test]
    fn parse_series_and_seasons() {
        let series = serde_json::json!({
            "name": "Attack on Titan",
            "original_name": "進撃の巨人",
            "first_air_date": "2013-04-07",
            "number_of_seasons": 4,
            "seasons": [
                { "season_number": 0 },
                { "season_number": 1 }
            ]
        });
        let record = parse_series_record(&series, "1429");
        assert_eq!(record.media_type, MediaType::Tv);
        assert_eq!(record.season_count, Some(4));
        assert_eq!(season_numbers(&series), vec![0, 1]);

        let season = serde_json::json!({
            "episodes": [
                { "episode_number": 1, "name": "To You, in 2000 Years" },
                { "episode_number": 2, "name": "" }
            ]
        });
        let season = parse_season(&season, 1);
        assert_eq!(season.episodes.len(), 2);
        assert_eq!(season.episodes[0].title.as_deref(), Some("To You, in 2000 Years"));
        assert_eq!(season.episodes[1].title, None);
    }

    #[test]
    fn parse_movie_from_json() {
        let json = serde_json::json!({
            "title": "Your Name.",
            "original_title": "君の名は。",
            "release_date": "2016-08-26"
        });
        let record = parse_movie_record(&json, "372058");
        assert_eq!(record.title, "Your Name.");
        assert_eq!(record.year, Some(2016));
        assert!(record.seasons.is_empty());
    }

    #[test]
    fn status_mapping() {
        use reqwest::StatusCode;
        let f = status_failure(StatusCode::UNAUTHORIZED);
        assert!(f.error.is_fatal());
        assert!(!f.retryable);
        assert_eq!(status_failure(StatusCode::NOT_FOUND).error, MetadataError::NotFound);
        assert!(status_failure(StatusCode::TOO_MANY_REQUESTS).retryable);
        assert!(status_failure(StatusCode::BAD_GATEWAY).retryable);
        assert!(!status_failure(StatusCode::BAD_REQUEST).retryable);
    }
}
