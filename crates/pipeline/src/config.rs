//! The single configuration record for a pipeline run.

use std::path::PathBuf;
use std::time::Duration;

use mediasort_metadata::{ResolverConfig, ScoringWeights};
use mediasort_organizer::{ConflictMode, OrganizeOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory files are organized into.
    pub library_root: PathBuf,
    /// Directory template under the library root (`{title}`, `{year}`, `{type}`).
    pub path_template: String,
    /// Per-season directory for series; season 0 is always `Specials`.
    pub season_template: String,
    pub conflict_mode: ConflictMode,
    /// Rename files to canonical names; off keeps original names.
    pub rename_files: bool,
    /// Compute and report plans without touching the filesystem.
    pub dry_run: bool,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
    /// Simultaneous metadata provider calls.
    pub provider_concurrency: usize,
    /// Simultaneous filesystem moves.
    pub move_concurrency: usize,
    pub min_confidence: f64,
    pub weights: ScoringWeights,
    /// Genre ids that earn the class bonus. TMDB Animation is 16.
    pub expected_genres: Vec<u32>,
    pub subtitle_extensions: Vec<String>,
    pub max_name_len: usize,
    pub max_conflict_probe: u32,
    pub free_space_margin: u64,
    /// Cap on errors listed in a summary; the rest are only counted.
    pub max_reported_errors: usize,
    /// Remove source directories emptied by the run.
    pub cleanup_source_dirs: bool,
    pub tmdb_api_key: Option<String>,
    pub tmdb_language: String,
    /// SQLite file for the persistent cache; `None` keeps it in memory.
    pub db_path: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let organize = OrganizeOptions::default();
        let resolver = ResolverConfig::default();
        Self {
            library_root: organize.library_root,
            path_template: organize.path_template,
            season_template: organize.season_template,
            conflict_mode: organize.conflict_mode,
            rename_files: organize.rename_files,
            dry_run: organize.dry_run,
            cache_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            cache_capacity: 1000,
            provider_concurrency: resolver.provider_concurrency,
            move_concurrency: 2,
            min_confidence: resolver.min_confidence,
            weights: resolver.weights,
            expected_genres: resolver.expected_genres,
            subtitle_extensions: organize.subtitle_extensions,
            max_name_len: organize.max_name_len,
            max_conflict_probe: organize.max_conflict_probe,
            free_space_margin: organize.free_space_margin,
            max_reported_errors: 100,
            cleanup_source_dirs: true,
            tmdb_api_key: None,
            tmdb_language: "en-US".to_string(),
            db_path: None,
        }
    }
}

impl PipelineConfig {
    /// Check every field once, normalizing the extension list in place.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.library_root.as_os_str().is_empty() {
            return Err(invalid("library_root", "must not be empty"));
        }
        if self.path_template.trim().is_empty() {
            return Err(invalid("path_template", "must not be empty"));
        }
        if self.path_template.starts_with(['/', '\\']) {
            return Err(invalid("path_template", "must be relative to the library root"));
        }
        if self.provider_concurrency == 0 {
            return Err(invalid("provider_concurrency", "must be at least 1"));
        }
        if self.move_concurrency == 0 {
            return Err(invalid("move_concurrency", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid("min_confidence", "must be within [0, 1]"));
        }
        if self.cache_ttl.is_zero() {
            return Err(invalid("cache_ttl", "must be positive"));
        }
        if self.cache_capacity == 0 {
            return Err(invalid("cache_capacity", "must be at least 1"));
        }
        if !(16..=255).contains(&self.max_name_len) {
            return Err(invalid("max_name_len", "must be within 16..=255 bytes"));
        }
        if self.max_conflict_probe == 0 {
            return Err(invalid("max_conflict_probe", "must be at least 1"));
        }
        let w = &self.weights;
        let parts = [w.similarity, w.class_bonus, w.popularity_bonus, w.popularity_scale];
        if parts.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(invalid("weights", "must be finite and non-negative"));
        }

        let mut extensions = Vec::with_capacity(self.subtitle_extensions.len());
        for ext in &self.subtitle_extensions {
            let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
            if ext.is_empty() || ext.contains(['.', '/', '\\']) {
                return Err(invalid("subtitle_extensions", format!("bad extension '{ext}'")));
            }
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        self.subtitle_extensions = extensions;
        Ok(())
    }

    pub fn organize_options(&self) -> OrganizeOptions {
        OrganizeOptions {
            library_root: self.library_root.clone(),
            path_template: self.path_template.clone(),
            season_template: self.season_template.clone(),
            conflict_mode: self.conflict_mode,
            rename_files: self.rename_files,
            dry_run: self.dry_run,
            subtitle_extensions: self.subtitle_extensions.clone(),
            max_name_len: self.max_name_len,
            max_conflict_probe: self.max_conflict_probe,
            free_space_margin: self.free_space_margin,
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            min_confidence: self.min_confidence,
            weights: self.weights,
            expected_genres: self.expected_genres.clone(),
            provider_concurrency: self.provider_concurrency,
        }
    }
}
