use crate::config::EngineConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;

const DEFAULT_TOML: &str = "config/Engine.toml";
const DEFAULT_JSON: &str = "config/Engine.json";
const ENV_PREFIX: &str = "LAGSCAN_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads engine configuration by merging TOML, environment variables, and JSON.
    ///
    /// Missing files are ignored; unset fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or the
    /// merged configuration is out of range.
    pub fn load() -> Result<EngineConfig> {
        Self::extract(
            Figment::new()
                .merge(Toml::file(DEFAULT_TOML))
                .merge(Env::prefixed(ENV_PREFIX))
                .join(Json::file(DEFAULT_JSON)),
        )
    }

    /// Loads engine configuration from a specific TOML file, still
    /// honouring environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the configuration
    /// is out of range.
    pub fn load_from(path: impl AsRef<Path>) -> Result<EngineConfig> {
        Self::extract(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Loads engine configuration with a specific profile.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or the
    /// merged configuration is out of range.
    pub fn load_with_profile(profile: &str) -> Result<EngineConfig> {
        Self::extract(
            Figment::new()
                .merge(Toml::file(DEFAULT_TOML))
                .merge(Toml::file(format!("config/Engine.{profile}.toml")))
                .merge(Env::prefixed(ENV_PREFIX))
                .join(Json::file(DEFAULT_JSON)),
        )
    }

    fn extract(figment: Figment) -> Result<EngineConfig> {
        let config: EngineConfig = figment
            .extract()
            .context("failed to read engine configuration")?;

        config.validate().context("invalid engine configuration")?;
        tracing::debug!(?config, "engine configuration loaded");

        Ok(config)
    }
}
