use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ReportedError};

/// Catalog media type. Only these two are ever organized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Tv,
    Movie,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tv => "tv",
            Self::Movie => "movie",
        }
    }

    /// Parse a provider's raw media type string; unsupported types yield `None`.
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "tv" | "series" | "show" => Some(Self::Tv),
            "movie" | "film" => Some(Self::Movie),
            _ => None,
        }
    }

    /// Human label used by the `{type}` path template variable.
    pub fn label(self) -> &'static str {
        match self {
            Self::Tv => "TV Show",
            Self::Movie => "Movie",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity guess extracted from a raw filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIdentity {
    /// Never empty; falls back to the raw stem.
    pub title: String,
    /// Defaults to 1 when absent and not a movie.
    pub season: u32,
    pub episode: Option<u32>,
    pub year: Option<u16>,
    pub is_movie: bool,
    pub raw_filename: String,
    /// Set when the parser could not recover anything beyond a fallback title.
    pub low_confidence: bool,
}

impl ParsedIdentity {
    /// Worst-case identity for input the parser could not make sense of.
    pub fn fallback(raw_filename: &str, title: String) -> Self {
        Self {
            title,
            season: 1,
            episode: None,
            year: None,
            is_movie: false,
            raw_filename: raw_filename.to_string(),
            low_confidence: true,
        }
    }

    /// Media type the filename suggests, if any.
    pub fn expected_media_type(&self) -> Option<MediaType> {
        if self.is_movie {
            Some(MediaType::Movie)
        } else if self.episode.is_some() {
            Some(MediaType::Tv)
        } else {
            None
        }
    }
}

/// Coarse label for a resolver confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    None,
    Low,
    Medium,
    High,
}

impl MatchConfidence {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::High
        } else if score >= 0.7 {
            Self::Medium
        } else if score >= 0.5 {
            Self::Low
        } else {
            Self::None
        }
    }
}

/// Confirmed catalog identity for one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMatch {
    pub identity: ParsedIdentity,
    pub external_id: String,
    pub media_type: MediaType,
    pub display_title: String,
    pub release_year: Option<u16>,
    pub season_count: Option<u32>,
    pub episode_title: Option<String>,
    /// In `[0, 1]`.
    pub confidence: f64,
}

impl ResolvedMatch {
    pub fn confidence_label(&self) -> MatchConfidence {
        MatchConfidence::from_score(self.confidence)
    }
}

/// How a target name collision was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    None,
    Suffixed,
    Overwrite,
}

/// Source/target pair for a companion file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionPlan {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub conflict_resolution: ConflictResolution,
}

/// Computed relocation for one primary file and its companions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizePlan {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub companions: Vec<CompanionPlan>,
    pub conflict_resolution: ConflictResolution,
}

/// A completed relocation, recorded so it can be replayed in reverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Skipped,
    Failed,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal record for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub source_path: PathBuf,
    pub status: OperationStatus,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    pub target_path: Option<PathBuf>,
    pub moved_companions: usize,
    pub moves: Vec<MoveRecord>,
    /// Companions that could not be placed. The primary outcome stands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub companion_errors: Vec<ReportedError>,
}

impl OperationResult {
    pub fn success(source_path: PathBuf, target_path: PathBuf, moves: Vec<MoveRecord>) -> Self {
        let moved_companions = moves.len().saturating_sub(1);
        Self {
            source_path,
            status: OperationStatus::Success,
            error_kind: None,
            message: None,
            target_path: Some(target_path),
            moved_companions,
            moves,
            companion_errors: Vec::new(),
        }
    }

    pub fn skipped(source_path: PathBuf, kind: Option<ErrorKind>, message: impl Into<String>) -> Self {
        Self {
            source_path,
            status: OperationStatus::Skipped,
            error_kind: kind,
            message: Some(message.into()),
            target_path: None,
            moved_companions: 0,
            moves: Vec::new(),
            companion_errors: Vec::new(),
        }
    }

    pub fn failed(source_path: PathBuf, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            source_path,
            status: OperationStatus::Failed,
            error_kind: Some(kind),
            message: Some(message.into()),
            target_path: None,
            moved_companions: 0,
            moves: Vec::new(),
            companion_errors: Vec::new(),
        }
    }
}

/// Aggregated outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Files never started because the run was cancelled or aborted.
    pub cancelled: usize,
    pub companions_moved: usize,
    pub errors: Vec<ReportedError>,
    /// Errors beyond the reporting bound; counted, not listed.
    pub errors_truncated: usize,
    pub journal: Vec<MoveRecord>,
    /// A systemic provider failure stopped the batch early.
    pub aborted: bool,
}

impl BatchSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Fold one file's result into the summary. Failures are listed up to
    /// `max_errors`; skips carrying a kind other than an expected outcome
    /// are listed too so nothing is dropped silently.
    pub fn record(&mut self, result: &OperationResult, max_errors: usize) {
        match result.status {
            OperationStatus::Success => self.succeeded += 1,
            OperationStatus::Skipped => {
                if result.error_kind == Some(ErrorKind::Cancelled) {
                    self.cancelled += 1;
                } else {
                    self.skipped += 1;
                }
            }
            OperationStatus::Failed => self.failed += 1,
        }
        self.companions_moved += result.moved_companions;
        self.journal.extend(result.moves.iter().cloned());

        let reportable = match (result.status, result.error_kind) {
            (OperationStatus::Failed, Some(_)) => true,
            (OperationStatus::Skipped, Some(kind)) => !kind.is_expected_outcome(),
            _ => false,
        };
        if let (true, Some(kind)) = (reportable, result.error_kind) {
            self.report(
                ReportedError {
                    path: result.source_path.clone(),
                    kind,
                    message: result.message.clone().unwrap_or_default(),
                },
                max_errors,
            );
        }
        for error in &result.companion_errors {
            self.report(error.clone(), max_errors);
        }
    }

    fn report(&mut self, error: ReportedError, max_errors: usize) {
        if self.errors.len() < max_errors {
            self.errors.push(error);
        } else {
            self.errors_truncated += 1;
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_from_provider_filters_unsupported() {
        assert_eq!(MediaType::from_provider("tv"), Some(MediaType::Tv));
        assert_eq!(MediaType::from_provider("MOVIE"), Some(MediaType::Movie));
        assert_eq!(MediaType::from_provider("person"), None);
    }

    #[test]
    fn confidence_labels() {
        assert_eq!(MatchConfidence::from_score(0.95), MatchConfidence::High);
        assert_eq!(MatchConfidence::from_score(0.75), MatchConfidence::Medium);
        assert_eq!(MatchConfidence::from_score(0.55), MatchConfidence::Low);
        assert_eq!(MatchConfidence::from_score(0.1), MatchConfidence::None);
    }

    #[test]
    fn summary_counts_and_bounds_errors() {
        let mut summary = BatchSummary::new(4);
        let ok = OperationResult::success(
            "a.mkv".into(),
            "lib/a.mkv".into(),
            vec![
                MoveRecord { from: "a.mkv".into(), to: "lib/a.mkv".into() },
                MoveRecord { from: "a.en.srt".into(), to: "lib/a.en.srt".into() },
            ],
        );
        summary.record(&ok, 1);
        summary.record(
            &OperationResult::skipped("b.mkv".into(), Some(ErrorKind::NoConfidentMatch), "no match"),
            1,
        );
        summary.record(
            &OperationResult::failed("c.mkv".into(), ErrorKind::InsufficientSpace, "full"),
            1,
        );
        summary.record(
            &OperationResult::failed("d.mkv".into(), ErrorKind::PermissionDenied, "denied"),
            1,
        );

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.companions_moved, 1);
        assert_eq!(summary.journal.len(), 2);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].kind, ErrorKind::InsufficientSpace);
        assert_eq!(summary.errors_truncated, 1);
        assert_eq!(summary.processed(), 4);
    }

    #[test]
    fn companion_errors_are_listed_under_the_same_bound() {
        let mut ok = OperationResult::success(
            "a.mkv".into(),
            "lib/a.mkv".into(),
            vec![MoveRecord { from: "a.mkv".into(), to: "lib/a.mkv".into() }],
        );
        ok.companion_errors = vec![
            ReportedError {
                path: "a.en.srt".into(),
                kind: ErrorKind::TargetConflictExhausted,
                message: "no free name".into(),
            },
            ReportedError {
                path: "a.ko.srt".into(),
                kind: ErrorKind::PermissionDenied,
                message: "denied".into(),
            },
        ];

        let mut summary = BatchSummary::new(1);
        summary.record(&ok, 1);

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].path, PathBuf::from("a.en.srt"));
        assert_eq!(summary.errors[0].kind, ErrorKind::TargetConflictExhausted);
        assert_eq!(summary.errors_truncated, 1);
    }
}
