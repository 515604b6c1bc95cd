//! Collision handling for target paths.
//!
//! A taken target gets `" (n)"` inserted before its extension, probing
//! `n = 1, 2, ...` up to a cap. Paths handed out by an in-flight plan are
//! reserved so two concurrent plans can never pick the same free name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use mediasort_core::ConflictResolution;

use crate::{ConflictMode, OrganizeError};

/// Outcome of probing for a target.
#[derive(Debug, PartialEq, Eq)]
pub enum Probe {
    Free(PathBuf, ConflictResolution),
    /// The source already occupies this slot.
    AlreadyThere(PathBuf),
}

/// `video.mkv` -> `video (3).mkv`
pub fn with_counter(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem} ({n}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({n})"),
    };
    path.with_file_name(name)
}

/// Exists on disk, counting dangling symlinks.
fn occupied(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

pub fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Target paths claimed by plans that have not finished moving yet.
#[derive(Debug, Clone, Default)]
pub struct Reservations {
    inner: Arc<Mutex<HashSet<PathBuf>>>,
}

/// Releases its paths when dropped.
#[derive(Debug)]
pub struct Claim {
    owner: Reservations,
    paths: Vec<PathBuf>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut set = self.owner.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for p in &self.paths {
            set.remove(p);
        }
    }
}

impl Claim {
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Reservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self) -> Claim {
        Claim {
            owner: self.clone(),
            paths: Vec::new(),
        }
    }

    pub fn is_reserved(&self, path: &Path) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    /// Find a target for `source` at `desired` and reserve it under `claim`.
    /// Probing and reservation happen under one lock.
    pub fn probe(
        &self,
        claim: &mut Claim,
        source: &Path,
        desired: &Path,
        mode: ConflictMode,
        max_probe: u32,
    ) -> Result<Probe, OrganizeError> {
        let mut set = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let taken = |p: &Path| set.contains(p) || occupied(p);

        if occupied(desired) && same_file(source, desired) {
            return Ok(Probe::AlreadyThere(desired.to_path_buf()));
        }

        let found = if !taken(desired) {
            Some((desired.to_path_buf(), ConflictResolution::None))
        } else if mode == ConflictMode::Overwrite && !set.contains(desired) {
            Some((desired.to_path_buf(), ConflictResolution::Overwrite))
        } else {
            let mut found = None;
            for n in 1..=max_probe {
                let candidate = with_counter(desired, n);
                if occupied(&candidate) && same_file(source, &candidate) {
                    return Ok(Probe::AlreadyThere(candidate));
                }
                if !taken(&candidate) {
                    found = Some((candidate, ConflictResolution::Suffixed));
                    break;
                }
            }
            found
        };

        let Some((path, resolution)) = found else {
            return Err(OrganizeError::ConflictExhausted {
                path: desired.to_path_buf(),
                attempts: max_probe,
            });
        };
        set.insert(path.clone());
        claim.paths.push(path.clone());
        Ok(Probe::Free(path, resolution))
    }
}
