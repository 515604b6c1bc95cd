//! Batch driver: resolve then organize each file under separate
//! concurrency limits for provider calls and filesystem moves.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use mediasort_core::{BatchSummary, ErrorKind, OperationResult, OperationStatus, ParsedIdentity};
use mediasort_metadata::{ResolveError, Resolver};
use mediasort_organizer::{Organizer, cleanup_empty_dirs};
use mediasort_scanner::walk::ScannedFile;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::events::{ProgressEvent, ProgressSink};

/// One input to a batch.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub identity: ParsedIdentity,
}

impl From<ScannedFile> for SourceFile {
    fn from(scanned: ScannedFile) -> Self {
        Self {
            path: scanned.entry.path,
            identity: scanned.identity,
        }
    }
}

pub struct Orchestrator {
    resolver: Arc<Resolver>,
    organizer: Arc<Organizer>,
    workers: usize,
    move_concurrency: usize,
    max_reported_errors: usize,
    cleanup_source_dirs: bool,
    dry_run: bool,
    source_roots: Vec<PathBuf>,
}

/// Per-run state shared by the workers.
struct Run<'a> {
    sink: &'a dyn ProgressSink,
    stop: CancellationToken,
    aborted: AtomicBool,
    moves: Semaphore,
}

impl Orchestrator {
    pub fn new(resolver: Arc<Resolver>, organizer: Arc<Organizer>, config: &PipelineConfig) -> Self {
        let move_concurrency = config.move_concurrency.max(1);
        Self {
            resolver,
            organizer,
            workers: config.provider_concurrency.max(1) + move_concurrency,
            move_concurrency,
            max_reported_errors: config.max_reported_errors,
            cleanup_source_dirs: config.cleanup_source_dirs,
            dry_run: config.dry_run,
            source_roots: Vec::new(),
        }
    }

    /// Directories emptied by a run are removed up to, never including,
    /// these roots.
    pub fn with_source_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.source_roots = roots;
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn organizer(&self) -> &Organizer {
        &self.organizer
    }

    /// Process every file and return the summary. A failure on one file
    /// never stops the others; only cancellation or a fatal provider error
    /// ends the batch early, and files not yet started are then reported
    /// as cancelled.
    pub async fn run(
        &self,
        files: Vec<SourceFile>,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> BatchSummary {
        let total = files.len();
        info!(total, workers = self.workers, dry_run = self.dry_run, "batch started");

        let run = Run {
            sink,
            stop: cancel.child_token(),
            aborted: AtomicBool::new(false),
            moves: Semaphore::new(self.move_concurrency),
        };
        let mut summary = BatchSummary::new(total);

        let mut results = futures::stream::iter(files)
            .map(|file| self.process(file, &run))
            .buffer_unordered(self.workers);

        let mut completed = 0;
        while let Some(result) = results.next().await {
            completed += 1;
            summary.record(&result, self.max_reported_errors);
            sink.emit(ProgressEvent::FileCompleted {
                completed,
                total,
                path: result.source_path.clone(),
                status: result.status,
                error_kind: result.error_kind,
            });
        }
        drop(results);
        summary.aborted = run.aborted.load(Ordering::SeqCst);

        if self.cleanup_source_dirs && !self.dry_run && !summary.journal.is_empty() {
            let dirs: BTreeSet<PathBuf> = summary
                .journal
                .iter()
                .filter_map(|record| record.from.parent().map(Path::to_path_buf))
                .collect();
            let removed = cleanup_empty_dirs(dirs, &self.source_roots).await;
            debug!(removed, "source directories cleaned");
        }

        info!(
            total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            companions = summary.companions_moved,
            aborted = summary.aborted,
            "batch finished"
        );
        sink.emit(ProgressEvent::BatchCompleted {
            summary: summary.clone(),
        });
        summary
    }

    async fn process(&self, file: SourceFile, run: &Run<'_>) -> OperationResult {
        let SourceFile { path, identity } = file;
        if run.stop.is_cancelled() {
            return cancelled(path, "not started");
        }
        run.sink.emit(ProgressEvent::FileStarted { path: path.clone() });

        if identity.low_confidence {
            warn!(
                path = %path.display(),
                kind = %ErrorKind::ParseLowConfidence,
                title = %identity.title,
                "filename parsed with low confidence"
            );
        }

        let resolved = tokio::select! {
            biased;
            _ = run.stop.cancelled() => return cancelled(path, "cancelled during lookup"),
            r = self.resolver.resolve(&identity) => r,
        };
        let matched = match resolved {
            Ok(Some(m)) => m,
            Ok(None) => {
                info!(path = %path.display(), title = %identity.title, "no confident match");
                return OperationResult::skipped(
                    path,
                    Some(ErrorKind::NoConfidentMatch),
                    format!("no confident match for '{}'", identity.title),
                );
            }
            Err(e @ ResolveError::Fatal(_)) => {
                if !run.aborted.swap(true, Ordering::SeqCst) {
                    error!(path = %path.display(), error = %e, "provider failure, stopping batch");
                }
                run.stop.cancel();
                return OperationResult::failed(path, e.kind(), e.to_string());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "lookup failed");
                return OperationResult::failed(path, e.kind(), e.to_string());
            }
        };
        debug!(
            path = %path.display(),
            external_id = %matched.external_id,
            confidence = matched.confidence,
            "resolved"
        );

        let _permit = tokio::select! {
            biased;
            _ = run.stop.cancelled() => return cancelled(path, "cancelled before move"),
            permit = run.moves.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return cancelled(path, "cancelled before move"),
            },
        };
        if run.stop.is_cancelled() {
            return cancelled(path, "cancelled before move");
        }

        // A started move always runs to completion.
        let result = self.organizer.plan_and_move(&path, &matched).await;
        match result.status {
            OperationStatus::Failed => warn!(
                path = %path.display(),
                kind = ?result.error_kind,
                message = result.message.as_deref().unwrap_or(""),
                "organize failed"
            ),
            _ => debug!(path = %path.display(), status = %result.status, "organized"),
        }
        result
    }
}

fn cancelled(path: PathBuf, message: &str) -> OperationResult {
    OperationResult::skipped(path, Some(ErrorKind::Cancelled), message)
}
