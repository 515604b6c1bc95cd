//! Removal of source directories emptied by a batch.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Remove empty directories among `dirs`, deepest first.
///
/// For a directory under one of the `stop_at` roots, its ancestors up to
/// (not including) that root are candidates too, so nested empty trees
/// collapse fully. Roots themselves are never removed. Failures are logged
/// and skipped. Returns the number of directories removed.
pub async fn cleanup_empty_dirs<I>(dirs: I, stop_at: &[PathBuf]) -> usize
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut candidates = BTreeSet::new();
    for dir in dirs {
        match stop_at.iter().find(|root| dir.starts_with(root)) {
            Some(root) => {
                for ancestor in dir.ancestors() {
                    if ancestor == root.as_path() {
                        break;
                    }
                    candidates.insert(ancestor.to_path_buf());
                }
            }
            None => {
                candidates.insert(dir);
            }
        }
    }

    let mut ordered: Vec<PathBuf> = candidates.into_iter().collect();
    ordered.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });

    let mut removed = 0;
    for dir in ordered {
        if stop_at.iter().any(|root| root == &dir) {
            continue;
        }
        if try_remove(&dir).await {
            removed += 1;
        }
    }
    if removed > 0 {
        info!(removed, "removed empty source directories");
    }
    removed
}

async fn try_remove(dir: &Path) -> bool {
    match is_empty_dir(dir).await {
        Ok(true) => {}
        Ok(false) => return false,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return false,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "cannot inspect directory");
            return false;
        }
    }
    match tokio::fs::remove_dir(dir).await {
        Ok(()) => {
            debug!(path = %dir.display(), "removed empty directory");
            true
        }
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "cannot remove directory");
            false
        }
    }
}

async fn is_empty_dir(dir: &Path) -> io::Result<bool> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    Ok(entries.next_entry().await?.is_none())
}
