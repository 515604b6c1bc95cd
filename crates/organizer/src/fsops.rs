//! Filesystem primitives: safe move, pre-flight checks, free space.
//!
//! A move is a single `rename` when source and target share a volume.
//! When rename reports a cross-device error the file is copied to a
//! temporary name beside the target, its size verified, renamed into place
//! and only then is the source removed. A copy that fails verification is
//! deleted and the source left untouched.

use std::io;
use std::path::{Path, PathBuf};

use sysinfo::Disks;
use tracing::{debug, warn};

use crate::OrganizeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMethod {
    Rename,
    CopyVerified,
}

pub fn is_cross_device(e: &io::Error) -> bool {
    // EXDEV is 18 on Linux and macOS.
    e.kind() == io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18)
}

fn partial_path(to: &Path) -> PathBuf {
    let mut name = to.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".mediasort-partial");
    to.with_file_name(name)
}

/// Move `from` to `to`, replacing `to` if it exists.
pub async fn move_file(from: &Path, to: &Path) -> Result<MoveMethod, OrganizeError> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(MoveMethod::Rename),
        Err(e) if is_cross_device(&e) => {
            debug!(from = %from.display(), to = %to.display(), "cross-device move, copying");
            copy_verify_delete(from, to).await?;
            Ok(MoveMethod::CopyVerified)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound && !from.exists() => {
            Err(OrganizeError::SourceMissing(from.to_path_buf()))
        }
        Err(e) => Err(OrganizeError::from_io(to, e)),
    }
}

/// Copy, verify the size, then delete the source. Single attempt.
pub async fn copy_verify_delete(from: &Path, to: &Path) -> Result<(), OrganizeError> {
    let expected = tokio::fs::metadata(from)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => OrganizeError::SourceMissing(from.to_path_buf()),
            _ => OrganizeError::from_io(from, e),
        })?
        .len();

    let partial = partial_path(to);
    if let Err(e) = tokio::fs::copy(from, &partial).await {
        discard(&partial).await;
        return Err(OrganizeError::from_io(to, e));
    }
    verify_copy(from, to, &partial, expected).await?;

    if let Err(e) = tokio::fs::rename(&partial, to).await {
        discard(&partial).await;
        return Err(OrganizeError::from_io(to, e));
    }

    if let Err(e) = tokio::fs::remove_file(from).await {
        // Leave the source as the only copy rather than end up with two.
        warn!(path = %from.display(), error = %e, "cannot remove source after copy, rolling back");
        discard(to).await;
        return Err(OrganizeError::from_io(from, e));
    }
    Ok(())
}

async fn verify_copy(from: &Path, to: &Path, partial: &Path, expected: u64) -> Result<(), OrganizeError> {
    let actual = match tokio::fs::metadata(partial).await {
        Ok(m) => m.len(),
        Err(_) => 0,
    };
    if actual == expected {
        return Ok(());
    }
    warn!(
        from = %from.display(),
        to = %to.display(),
        expected,
        actual,
        "copy failed size verification"
    );
    discard(partial).await;
    Err(OrganizeError::VerificationFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        expected,
        actual,
    })
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "cannot remove partial copy");
        }
    }
}

/// Nearest ancestor of `path` (itself included) that exists.
pub fn existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}

/// Free bytes on the volume holding `path`, if a mounted disk covers it.
pub fn available_space(path: &Path) -> Option<u64> {
    let anchor = std::fs::canonicalize(existing_ancestor(path)?).ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| anchor.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
}

/// Both paths (or their nearest existing ancestors) sit on one device.
#[cfg(unix)]
pub fn same_device(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    let dev = |p: &Path| {
        existing_ancestor(p)
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.dev())
    };
    matches!((dev(a), dev(b)), (Some(x), Some(y)) if x == y)
}

#[cfg(not(unix))]
pub fn same_device(_a: &Path, _b: &Path) -> bool {
    false
}

/// Create `dir` and prove it accepts new files.
pub async fn ensure_writable(dir: &Path) -> Result<(), OrganizeError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| OrganizeError::from_io(dir, e))?;

    let probe = dir.join(format!(".mediasort-probe-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&probe, b"")
        .await
        .map_err(|e| OrganizeError::from_io(dir, e))?;
    if let Err(e) = tokio::fs::remove_file(&probe).await {
        warn!(path = %probe.display(), error = %e, "cannot remove write probe");
    }
    Ok(())
}
