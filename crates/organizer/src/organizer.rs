use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mediasort_core::{
    CompanionPlan, MoveRecord, OperationResult, OrganizePlan, ReportedError, ResolvedMatch,
};
use mediasort_scanner::subtitles::{Companion, discover_companions};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::{Claim, Probe, Reservations};
use crate::fsops::{self, move_file};
use crate::template::{primary_file_name, render_dirs};
use crate::{OrganizeError, OrganizeOptions};

/// Reports free bytes for the volume holding a path; `None` when unknown.
pub type SpaceProbe = Arc<dyn Fn(&Path) -> Option<u64> + Send + Sync>;

/// Result of planning one file.
#[derive(Debug)]
pub enum Planned {
    /// The source already sits at its computed target.
    AlreadyOrganized(PathBuf),
    /// Targets are reserved until the claim is dropped. Companions that
    /// could not be given a target are listed in `left_behind`.
    Ready {
        plan: OrganizePlan,
        claim: Claim,
        left_behind: Vec<ReportedError>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UndoReport {
    pub restored: usize,
    pub failures: Vec<ReportedError>,
}

pub struct Organizer {
    options: OrganizeOptions,
    reservations: Reservations,
    space: SpaceProbe,
}

impl Organizer {
    pub fn new(options: OrganizeOptions) -> Self {
        Self {
            options,
            reservations: Reservations::new(),
            space: Arc::new(fsops::available_space),
        }
    }

    pub fn with_space_probe(mut self, probe: SpaceProbe) -> Self {
        self.space = probe;
        self
    }

    pub fn options(&self) -> &OrganizeOptions {
        &self.options
    }

    /// Directory a match is filed under.
    pub fn target_dir(&self, m: &ResolvedMatch) -> PathBuf {
        let dirs = render_dirs(
            &self.options.path_template,
            &self.options.season_template,
            m,
            self.options.max_name_len,
        );
        dirs.iter()
            .fold(self.options.library_root.clone(), |acc, d| acc.join(d))
    }

    /// Compute targets for `source` and its companions, reserving them.
    pub fn plan(&self, source: &Path, m: &ResolvedMatch) -> Result<Planned, OrganizeError> {
        let opts = &self.options;
        let dir = self.target_dir(m);
        let file_name = primary_file_name(source, m, opts.rename_files, opts.max_name_len)
            .ok_or_else(|| OrganizeError::Io {
                path: source.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
            })?;

        let mut claim = self.reservations.claim();
        let desired = dir.join(&file_name);
        let (target, resolution) = match self.reservations.probe(
            &mut claim,
            source,
            &desired,
            opts.conflict_mode,
            opts.max_conflict_probe,
        )? {
            Probe::AlreadyThere(path) => return Ok(Planned::AlreadyOrganized(path)),
            Probe::Free(path, resolution) => (path, resolution),
        };

        let final_stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let renamed = opts.rename_files || target.file_stem() != source.file_stem();

        let mut companions = Vec::new();
        let mut left_behind = Vec::new();
        for companion in discover_companions(source, &opts.subtitle_extensions) {
            let Some(name) = companion_file_name(&companion, &final_stem, renamed) else {
                continue;
            };
            let desired = dir.join(name);
            match self.reservations.probe(
                &mut claim,
                &companion.path,
                &desired,
                opts.conflict_mode,
                opts.max_conflict_probe,
            ) {
                Ok(Probe::Free(target_path, conflict_resolution)) => companions.push(CompanionPlan {
                    source_path: companion.path,
                    target_path,
                    conflict_resolution,
                }),
                Ok(Probe::AlreadyThere(_)) => {}
                Err(e) => {
                    warn!(companion = %companion.path.display(), error = %e, "companion left in place");
                    left_behind.push(ReportedError {
                        path: companion.path,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(Planned::Ready {
            plan: OrganizePlan {
                source_path: source.to_path_buf(),
                target_path: target,
                companions,
                conflict_resolution: resolution,
            },
            claim,
            left_behind,
        })
    }

    /// Plan and relocate one primary file with its companions. Never panics
    /// or returns early: every outcome is an [`OperationResult`].
    pub async fn plan_and_move(&self, source: &Path, m: &ResolvedMatch) -> OperationResult {
        match self.execute(source, m).await {
            Ok(result) => result,
            Err(e) => {
                warn!(path = %source.display(), kind = %e.kind(), error = %e, "organize failed");
                OperationResult::failed(source.to_path_buf(), e.kind(), e.to_string())
            }
        }
    }

    async fn execute(&self, source: &Path, m: &ResolvedMatch) -> Result<OperationResult, OrganizeError> {
        let size = match tokio::fs::metadata(source).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OrganizeError::SourceMissing(source.to_path_buf()));
            }
            Err(e) => return Err(OrganizeError::from_io(source, e)),
        };

        let (plan, _claim, mut companion_errors) = match self.plan(source, m)? {
            Planned::AlreadyOrganized(path) => {
                debug!(path = %path.display(), "already organized");
                let mut result = OperationResult::skipped(source.to_path_buf(), None, "already_organized");
                result.target_path = Some(path);
                return Ok(result);
            }
            Planned::Ready {
                plan,
                claim,
                left_behind,
            } => (plan, claim, left_behind),
        };

        if self.options.dry_run {
            info!(
                source = %plan.source_path.display(),
                target = %plan.target_path.display(),
                companions = plan.companions.len(),
                "dry run"
            );
            let mut result = OperationResult::success(source.to_path_buf(), plan.target_path, Vec::new());
            result.message = Some(format!("dry run: {} companion(s) planned", plan.companions.len()));
            result.companion_errors = companion_errors;
            return Ok(result);
        }

        self.preflight(&plan, size).await?;

        move_file(&plan.source_path, &plan.target_path).await?;
        let mut moves = vec![MoveRecord {
            from: plan.source_path.clone(),
            to: plan.target_path.clone(),
        }];

        for c in &plan.companions {
            match move_file(&c.source_path, &c.target_path).await {
                Ok(_) => moves.push(MoveRecord {
                    from: c.source_path.clone(),
                    to: c.target_path.clone(),
                }),
                Err(OrganizeError::SourceMissing(path)) => {
                    debug!(path = %path.display(), "companion disappeared before move");
                }
                Err(e) => {
                    warn!(companion = %c.source_path.display(), error = %e, "companion move failed");
                    companion_errors.push(ReportedError {
                        path: c.source_path.clone(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            source = %plan.source_path.display(),
            target = %plan.target_path.display(),
            conflict = ?plan.conflict_resolution,
            companions = moves.len() - 1,
            "organized"
        );
        let mut result = OperationResult::success(source.to_path_buf(), plan.target_path, moves);
        if !companion_errors.is_empty() {
            result.message = Some(format!(
                "{} companion(s) could not be moved",
                companion_errors.len()
            ));
        }
        result.companion_errors = companion_errors;
        Ok(result)
    }

    /// Writability of the target directory and room for the payload plus
    /// the safety margin. A same-volume rename needs only the margin.
    async fn preflight(&self, plan: &OrganizePlan, primary_size: u64) -> Result<(), OrganizeError> {
        let Some(dir) = plan.target_path.parent() else {
            return Ok(());
        };
        fsops::ensure_writable(dir).await?;

        let payload = if fsops::same_device(&plan.source_path, dir) {
            0
        } else {
            let mut total = primary_size;
            for c in &plan.companions {
                if let Ok(meta) = tokio::fs::metadata(&c.source_path).await {
                    total += meta.len();
                }
            }
            total
        };
        let needed = payload.saturating_add(self.options.free_space_margin);

        match (self.space)(dir) {
            Some(available) if available < needed => Err(OrganizeError::InsufficientSpace {
                path: dir.to_path_buf(),
                needed,
                available,
            }),
            Some(_) => Ok(()),
            None => {
                debug!(path = %dir.display(), "free space unknown, skipping check");
                Ok(())
            }
        }
    }

    /// Replay a move journal backwards. Each record is undone with the same
    /// move rules; a record whose original location is occupied again is
    /// left alone and reported.
    pub async fn undo(&self, records: &[MoveRecord]) -> UndoReport {
        let mut report = UndoReport::default();
        for record in records.iter().rev() {
            match undo_one(record).await {
                Ok(()) => report.restored += 1,
                Err(e) => {
                    warn!(path = %record.to.display(), error = %e, "undo failed");
                    report.failures.push(ReportedError {
                        path: record.to.clone(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }
        info!(restored = report.restored, failed = report.failures.len(), "undo finished");
        report
    }
}

fn companion_file_name(companion: &Companion, primary_stem: &str, renamed: bool) -> Option<String> {
    if !renamed {
        return companion
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
    }
    let ext = companion.extension()?;
    Some(format!("{primary_stem}{}.{ext}", companion.suffix))
}

async fn undo_one(record: &MoveRecord) -> Result<(), OrganizeError> {
    if std::fs::symlink_metadata(&record.to).is_err() {
        return Err(OrganizeError::SourceMissing(record.to.clone()));
    }
    if std::fs::symlink_metadata(&record.from).is_ok() {
        return Err(OrganizeError::Io {
            path: record.from.clone(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "original location is occupied"),
        });
    }
    if let Some(parent) = record.from.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OrganizeError::from_io(parent, e))?;
    }
    move_file(&record.to, &record.from).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasort_core::{ConflictResolution, MediaType, ParsedIdentity};
    use mediasort_scanner::subtitles::CompanionRule;

    #[test]
    fn companion_names_follow_renamed_primary() {
        let c = Companion {
            path: PathBuf::from("/in/video.en.forced.srt"),
            rule: CompanionRule::LanguageSuffix,
            language: Some("en".into()),
            forced: true,
            sdh: false,
            suffix: ".en.forced".into(),
        };
        assert_eq!(
            companion_file_name(&c, "Show - S01E01", true).as_deref(),
            Some("Show - S01E01.en.forced.srt")
        );
        assert_eq!(
            companion_file_name(&c, "Show - S01E01", false).as_deref(),
            Some("video.en.forced.srt")
        );
    }

    #[test]
    fn plan_reserves_targets_for_companions() {
        let tmp = tempfile::tempdir().unwrap();
        let src_dir = tmp.path().join("in");
        std::fs::create_dir_all(&src_dir).unwrap();
        std::fs::write(src_dir.join("video.mkv"), "v").unwrap();
        std::fs::write(src_dir.join("video.ko.srt"), "s").unwrap();

        let organizer = Organizer::new(OrganizeOptions {
            library_root: tmp.path().join("lib"),
            ..OrganizeOptions::default()
        });
        let m = ResolvedMatch {
            identity: ParsedIdentity {
                title: "video".into(),
                season: 1,
                episode: None,
                year: None,
                is_movie: true,
                raw_filename: "video.mkv".into(),
                low_confidence: false,
            },
            external_id: "1".into(),
            media_type: MediaType::Movie,
            display_title: "Your Name".into(),
            release_year: Some(2016),
            season_count: None,
            episode_title: None,
            confidence: 0.9,
        };

        let Planned::Ready {
            plan,
            claim,
            left_behind,
        } = organizer.plan(&src_dir.join("video.mkv"), &m).unwrap()
        else {
            panic!("expected a plan");
        };
        let dir = tmp.path().join("lib/Your Name (2016)");
        assert_eq!(plan.target_path, dir.join("video.mkv"));
        assert_eq!(plan.conflict_resolution, ConflictResolution::None);
        assert_eq!(plan.companions.len(), 1);
        assert_eq!(plan.companions[0].target_path, dir.join("video.ko.srt"));
        assert_eq!(claim.paths().len(), 2);
        assert!(left_behind.is_empty());
        assert!(!dir.exists());
    }
}
