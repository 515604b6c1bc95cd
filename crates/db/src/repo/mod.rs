pub mod metadata_cache;
