use std::path::{Path, PathBuf};

use mediasort_core::ParsedIdentity;
use tracing::{debug, warn};

use crate::parser;

/// Video file discovered during a filesystem walk.
#[derive(Debug, Clone)]
pub struct MediaEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub mtime_ts: i64,
}

/// A discovered video file paired with its parsed identity.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub entry: MediaEntry,
    pub identity: ParsedIdentity,
}

const JUNK_DIRS: &[&str] = &["@eaDir", "#recycle", ".Trash", "$RECYCLE.BIN", "System Volume Information"];

/// Walk a directory recursively and collect video files, skipping ignored
/// patterns. Symlinked directories are not followed. Sorted by path.
pub fn walk_media_dir(root: &Path) -> Vec<MediaEntry> {
    let mut entries = Vec::new();
    walk_recursive(root, &mut entries);
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

/// Walk `root` and parse every video file's name.
pub fn scan_and_parse(root: &Path) -> Vec<ScannedFile> {
    walk_media_dir(root)
        .into_iter()
        .map(|entry| {
            let name = entry
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let identity = parser::parse(&name);
            ScannedFile { entry, identity }
        })
        .collect()
}

fn walk_recursive(dir: &Path, entries: &mut Vec<MediaEntry>) {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "cannot read directory");
            return;
        }
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        if name.starts_with('.') || parser::should_ignore(&name) {
            debug!(path = %path.display(), "skipping ignored entry");
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(_) => continue,
        };

        if file_type.is_dir() {
            if JUNK_DIRS.contains(&name.as_ref()) {
                continue;
            }
            walk_recursive(&path, entries);
        } else if file_type.is_file() && parser::is_video_file(&name) {
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot stat file");
                    continue;
                }
            };
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            entries.push(MediaEntry {
                path,
                size_bytes: metadata.len(),
                mtime_ts: mtime,
            });
        }
    }
}
