use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use mediasort_core::MoveRecord;
use mediasort_metadata::tmdb::TmdbClient;
use mediasort_metadata::{MetadataCache, Resolver};
use mediasort_organizer::{ConflictMode, Organizer, cleanup_empty_dirs};
use mediasort_pipeline::{LogSink, PipelineConfig, SourceFile};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DAY: u64 = 24 * 60 * 60;

#[derive(Parser)]
#[command(name = "mediasort", version, about = "Identify media files and file them into a library")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "MEDIASORT_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve and move every media file under a source directory.
    Organize(OrganizeArgs),
    /// Print the identity parsed from each filename.
    Parse { names: Vec<String> },
    /// Inspect or purge the metadata cache.
    Cache {
        #[arg(long, env = "MEDIASORT_DB")]
        db: String,
        #[command(subcommand)]
        action: CacheAction,
    },
    /// List the best catalog candidates for a filename, ignoring the threshold.
    Suggest {
        name: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long, env = "MEDIASORT_TMDB_API_KEY", hide_env_values = true)]
        tmdb_api_key: String,
        #[arg(long, env = "MEDIASORT_TMDB_LANGUAGE", default_value = "en-US")]
        language: String,
    },
    /// Move files back using a journal written by `organize --journal`.
    Undo {
        journal: PathBuf,
        /// Source root to stop empty-directory cleanup at.
        #[arg(long)]
        library: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Stats,
    /// Drop the entry for one title.
    Remove {
        title: String,
        #[arg(long)]
        year: Option<u16>,
    },
    /// Drop entries older than the given age, or everything.
    Purge {
        #[arg(long)]
        older_than_days: Option<u64>,
    },
}

#[derive(Args)]
struct OrganizeArgs {
    source: PathBuf,
    #[arg(short, long, env = "MEDIASORT_LIBRARY")]
    library: PathBuf,
    #[arg(long, env = "MEDIASORT_TEMPLATE", default_value = "{title} ({year})")]
    template: String,
    #[arg(long, env = "MEDIASORT_SEASON_TEMPLATE", default_value = "Season {season}")]
    season_template: String,
    #[arg(long, env = "MEDIASORT_CONFLICT", default_value = "suffix")]
    conflict: ConflictMode,
    /// Rename files to canonical names instead of keeping the originals.
    #[arg(long, env = "MEDIASORT_RENAME")]
    rename: bool,
    #[arg(long)]
    dry_run: bool,
    #[arg(long, env = "MEDIASORT_TMDB_API_KEY", hide_env_values = true)]
    tmdb_api_key: String,
    #[arg(long, env = "MEDIASORT_TMDB_LANGUAGE", default_value = "en-US")]
    language: String,
    /// SQLite file for the persistent metadata cache.
    #[arg(long, env = "MEDIASORT_DB")]
    db: Option<String>,
    #[arg(long, env = "MEDIASORT_CACHE_TTL_DAYS", default_value_t = 7)]
    cache_ttl_days: u64,
    #[arg(long, env = "MEDIASORT_CACHE_CAPACITY", default_value_t = 1000)]
    cache_capacity: u64,
    #[arg(long, env = "MEDIASORT_PROVIDER_CONCURRENCY", default_value_t = 4)]
    provider_concurrency: usize,
    #[arg(long, env = "MEDIASORT_MOVE_CONCURRENCY", default_value_t = 2)]
    move_concurrency: usize,
    #[arg(long, env = "MEDIASORT_MIN_CONFIDENCE", default_value_t = 0.6)]
    min_confidence: f64,
    /// Subtitle extensions moved along with their video.
    #[arg(long, value_delimiter = ',')]
    subtitle_ext: Option<Vec<String>>,
    /// Leave source directories in place even when emptied.
    #[arg(long)]
    keep_empty_dirs: bool,
    /// Write the move journal here for a later `undo`.
    #[arg(long)]
    journal: Option<PathBuf>,
}

impl OrganizeArgs {
    fn config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            library_root: self.library.clone(),
            path_template: self.template.clone(),
            season_template: self.season_template.clone(),
            conflict_mode: self.conflict,
            rename_files: self.rename,
            dry_run: self.dry_run,
            cache_ttl: Duration::from_secs(self.cache_ttl_days * DAY),
            cache_capacity: self.cache_capacity,
            provider_concurrency: self.provider_concurrency,
            move_concurrency: self.move_concurrency,
            min_confidence: self.min_confidence,
            subtitle_extensions: self
                .subtitle_ext
                .clone()
                .unwrap_or(defaults.subtitle_extensions.clone()),
            cleanup_source_dirs: !self.keep_empty_dirs,
            tmdb_api_key: Some(self.tmdb_api_key.clone()),
            tmdb_language: self.language.clone(),
            db_path: self.db.clone(),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Organize(args) => organize(args).await,
        Command::Parse { names } => {
            for name in names {
                let identity = mediasort_scanner::parse(&name);
                println!("{}", serde_json::to_string(&identity)?);
            }
            Ok(())
        }
        Command::Cache { db, action } => cache(db, action).await,
        Command::Suggest {
            name,
            limit,
            tmdb_api_key,
            language,
        } => suggest(name, limit, tmdb_api_key, language).await,
        Command::Undo { journal, library } => undo(journal, library).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn organize(args: OrganizeArgs) -> anyhow::Result<()> {
    let config = args.config();
    let provider = Arc::new(TmdbClient::new(
        args.tmdb_api_key.clone(),
        config.tmdb_language.clone(),
    ));
    let orchestrator = mediasort_pipeline::build_orchestrator(config, provider)
        .await
        .context("invalid configuration")?
        .with_source_roots(vec![args.source.clone()]);

    let source = args.source.clone();
    let files: Vec<SourceFile> = tokio::task::spawn_blocking(move || {
        mediasort_scanner::walk::scan_and_parse(&source)
    })
    .await
    .context("scan task failed")?
    .into_iter()
    .map(SourceFile::from)
    .collect();
    info!(source = %args.source.display(), files = files.len(), "scan complete");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight moves");
                cancel.cancel();
            }
        });
    }

    let summary = orchestrator.run(files, &LogSink, cancel).await;

    if let Some(path) = &args.journal {
        let json = serde_json::to_vec_pretty(&summary.journal)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write journal {}", path.display()))?;
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.aborted {
        anyhow::bail!("batch aborted after a provider failure");
    }
    Ok(())
}

async fn cache(db: String, action: CacheAction) -> anyhow::Result<()> {
    let config = PipelineConfig {
        db_path: Some(db),
        ..PipelineConfig::default()
    };
    let cache = mediasort_pipeline::open_cache(&config)
        .await
        .context("failed to open cache")?;

    match action {
        CacheAction::Stats => {
            println!("{}", serde_json::to_string_pretty(&cache.stats().await)?);
        }
        CacheAction::Remove { title, year } => {
            let removed = cache.remove(&title, year).await;
            println!("{}", if removed { "removed" } else { "not cached" });
        }
        CacheAction::Purge { older_than_days } => {
            let removed = match older_than_days {
                Some(days) => cache.invalidate_older_than(Duration::from_secs(days * DAY)).await,
                None => cache.clear().await,
            };
            println!("removed {removed} entries");
        }
    }
    Ok(())
}

async fn suggest(
    name: String,
    limit: usize,
    api_key: String,
    language: String,
) -> anyhow::Result<()> {
    let identity = mediasort_scanner::parse(&name);
    let resolver = Resolver::new(
        Arc::new(TmdbClient::new(api_key, language)),
        Arc::new(MetadataCache::disabled()),
        PipelineConfig::default().resolver_config(),
    );
    let ranked = resolver
        .suggestions(&identity, limit)
        .await
        .context("catalog search failed")?;
    for scored in ranked {
        println!(
            "{:.3}  {:<5}  {}  {} ({})",
            scored.score,
            scored.media_type,
            scored.candidate.external_id,
            scored.candidate.title,
            scored
                .candidate
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "?".into()),
        );
    }
    Ok(())
}

async fn undo(journal: PathBuf, library: Option<PathBuf>) -> anyhow::Result<()> {
    let raw = tokio::fs::read(&journal)
        .await
        .with_context(|| format!("failed to read journal {}", journal.display()))?;
    let records: Vec<MoveRecord> = serde_json::from_slice(&raw).context("malformed journal")?;

    let organizer = Organizer::new(PipelineConfig::default().organize_options());
    let report = organizer.undo(&records).await;

    if let Some(root) = library {
        let dirs = records
            .iter()
            .filter_map(|r| r.to.parent().map(|p| p.to_path_buf()));
        cleanup_empty_dirs(dirs, &[root]).await;
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
