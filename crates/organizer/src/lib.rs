#![allow(clippy::collapsible_if)]
pub mod conflict;
pub mod fsops;
pub mod hygiene;
pub mod organizer;
pub mod template;

use std::io;
use std::path::PathBuf;

use mediasort_core::ErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hygiene::cleanup_empty_dirs;
pub use organizer::{Organizer, UndoReport};

/// What to do when a computed target path is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    /// Append `" (n)"` before the extension.
    #[default]
    Suffix,
    /// Replace the existing file.
    Overwrite,
}

impl ConflictMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Suffix => "suffix",
            Self::Overwrite => "overwrite",
        }
    }
}

impl std::str::FromStr for ConflictMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "suffix" => Ok(Self::Suffix),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("unknown conflict mode '{other}'")),
        }
    }
}

impl std::fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for path construction and moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizeOptions {
    pub library_root: PathBuf,
    /// `/`-separated; supports `{title}`, `{year}` and `{type}`.
    pub path_template: String,
    /// Per-season directory for series; supports `{season}`.
    pub season_template: String,
    pub conflict_mode: ConflictMode,
    /// Rename files to a canonical form instead of keeping original names.
    pub rename_files: bool,
    pub dry_run: bool,
    /// Lowercase, without the dot.
    pub subtitle_extensions: Vec<String>,
    /// Upper bound in bytes for any single path component.
    pub max_name_len: usize,
    pub max_conflict_probe: u32,
    /// Bytes that must remain free after a move.
    pub free_space_margin: u64,
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            library_root: PathBuf::from("library"),
            path_template: "{title} ({year})".to_string(),
            season_template: "Season {season}".to_string(),
            conflict_mode: ConflictMode::Suffix,
            rename_files: false,
            dry_run: false,
            subtitle_extensions: mediasort_scanner::parser::SUBTITLE_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            max_name_len: 200,
            max_conflict_probe: 100,
            free_space_margin: 10 * 1024 * 1024,
        }
    }
}

#[derive(Error, Debug)]
pub enum OrganizeError {
    #[error("no free name for {path} within {attempts} suffixes")]
    ConflictExhausted { path: PathBuf, attempts: u32 },
    #[error("insufficient space for {path}: need {needed} bytes, {available} available")]
    InsufficientSpace {
        path: PathBuf,
        needed: u64,
        available: u64,
    },
    #[error("disk full writing {path}: {source}")]
    DiskFull { path: PathBuf, source: io::Error },
    #[error("permission denied: {path}: {source}")]
    PermissionDenied { path: PathBuf, source: io::Error },
    #[error("copy {from} -> {to} failed verification: expected {expected} bytes, got {actual}")]
    VerificationFailed {
        from: PathBuf,
        to: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("source missing: {0}")]
    SourceMissing(PathBuf),
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl OrganizeError {
    /// Map an I/O error at `path` onto the reporting taxonomy.
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                Self::PermissionDenied { path, source }
            }
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => {
                Self::DiskFull { path, source }
            }
            _ => Self::Io { path, source },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConflictExhausted { .. } => ErrorKind::TargetConflictExhausted,
            Self::InsufficientSpace { .. } | Self::DiskFull { .. } => ErrorKind::InsufficientSpace,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::VerificationFailed { .. } => ErrorKind::CrossDeviceCopyVerificationFailed,
            Self::SourceMissing(_) => ErrorKind::SourceMissing,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_kinds() {
        let denied = OrganizeError::from_io("/x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.kind(), ErrorKind::PermissionDenied);
        let full = OrganizeError::from_io("/x", io::Error::from(io::ErrorKind::StorageFull));
        assert_eq!(full.kind(), ErrorKind::InsufficientSpace);
        let other = OrganizeError::from_io("/x", io::Error::other("boom"));
        assert_eq!(other.kind(), ErrorKind::Io);
    }

    #[test]
    fn conflict_mode_parses() {
        assert_eq!("Overwrite".parse::<ConflictMode>(), Ok(ConflictMode::Overwrite));
        assert_eq!("suffix".parse::<ConflictMode>(), Ok(ConflictMode::Suffix));
        assert!("replace".parse::<ConflictMode>().is_err());
    }
}
