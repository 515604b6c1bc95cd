use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Reporting taxonomy for per-file outcomes.
///
/// Kinds are preserved from the component that raised them up to the batch
/// summary, so a shell can group failures without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseLowConfidence,
    ProviderUnavailable,
    ProviderFatal,
    NoConfidentMatch,
    TargetConflictExhausted,
    InsufficientSpace,
    PermissionDenied,
    CrossDeviceCopyVerificationFailed,
    SourceMissing,
    Io,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseLowConfidence => "parse_low_confidence",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::ProviderFatal => "provider_fatal",
            Self::NoConfidentMatch => "no_confident_match",
            Self::TargetConflictExhausted => "target_conflict_exhausted",
            Self::InsufficientSpace => "insufficient_space",
            Self::PermissionDenied => "permission_denied",
            Self::CrossDeviceCopyVerificationFailed => "cross_device_copy_verification_failed",
            Self::SourceMissing => "source_missing",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
        }
    }

    /// Kinds that end a file as `Skipped` rather than `Failed`.
    pub fn is_expected_outcome(self) -> bool {
        matches!(
            self,
            Self::ParseLowConfidence | Self::NoConfidentMatch | Self::Cancelled
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the batch summary's error list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedError {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}
