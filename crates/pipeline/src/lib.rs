pub mod config;
pub mod events;
pub mod orchestrator;

use std::sync::Arc;

use mediasort_metadata::{
    MemoryCacheStore, MetadataCache, MetadataProvider, Resolver, SqliteCacheStore,
};
use mediasort_organizer::Organizer;
use thiserror::Error;
use tracing::info;

pub use config::{ConfigError, PipelineConfig};
pub use events::{ChannelSink, LogSink, ProgressEvent, ProgressSink};
pub use orchestrator::{Orchestrator, SourceFile};

#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot open cache database: {0}")]
    Db(#[from] mediasort_db::DbError),
}

/// Open the metadata cache described by `config`: SQLite-backed when a
/// database path is set, in memory otherwise.
pub async fn open_cache(config: &PipelineConfig) -> Result<MetadataCache, SetupError> {
    let cache = match config.db_path.as_deref() {
        Some(path) => {
            let pool = mediasort_db::connect(path).await?;
            mediasort_db::migrate::run(&pool)
                .await
                .map_err(mediasort_db::DbError::from)?;
            info!(path, "metadata cache opened");
            MetadataCache::new(
                Arc::new(SqliteCacheStore::new(pool)),
                config.cache_ttl,
                config.cache_capacity,
            )
        }
        None => MetadataCache::new(
            Arc::new(MemoryCacheStore::new()),
            config.cache_ttl,
            config.cache_capacity,
        ),
    };
    Ok(cache)
}

/// Validate `config` and wire the resolver and organizer it describes.
pub async fn build_orchestrator(
    mut config: PipelineConfig,
    provider: Arc<dyn MetadataProvider>,
) -> Result<Orchestrator, SetupError> {
    config.validate()?;
    let cache = Arc::new(open_cache(&config).await?);
    let resolver = Arc::new(Resolver::new(provider, cache, config.resolver_config()));
    let organizer = Arc::new(Organizer::new(config.organize_options()));
    Ok(Orchestrator::new(resolver, organizer, &config))
}
