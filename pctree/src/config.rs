//! Application configuration: defaults embedded at compile time, layered with an
//! optional user file and `PCTREE_*` environment overrides.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;

/// Ambient settings that aren't part of a persisted [`crate::structure::StructureMetadata`]
/// document: where chunks live, how big the in-process caches are, and what a new
/// `Structure` defaults to when a caller doesn't specify one explicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub chunk_store_root: String,
    pub chunk_cache_capacity: usize,
    pub driver_cache_capacity: usize,
    pub default_dimensions: u8,
    pub default_dynamic_chunks: bool,
}

impl AppConfig {
    pub fn builder() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(
            include_str!("config_default.toml"),
            FileFormat::Toml,
        ))
    }

    /// Load defaults, then layer `path` (if given) and `PCTREE_*` environment
    /// variables (e.g. `PCTREE_CHUNK_STORE_ROOT`) on top.
    pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
        let mut builder = Self::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(Environment::with_prefix("PCTREE").separator("_"));
        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::builder()
            .build()
            .and_then(Config::try_deserialize)
            .expect("embedded config_default.toml must deserialize to AppConfig")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_overrides() {
        let cfg = AppConfig::load(None).unwrap();
        assert_eq!(cfg.chunk_store_root, "./chunks");
        assert!(cfg.chunk_cache_capacity > 0);
    }

    #[test]
    fn default_impl_matches_load_none() {
        let via_default = AppConfig::default();
        let via_load = AppConfig::load(None).unwrap();
        assert_eq!(via_default.chunk_store_root, via_load.chunk_store_root);
        assert_eq!(via_default.default_dimensions, via_load.default_dimensions);
    }
}
