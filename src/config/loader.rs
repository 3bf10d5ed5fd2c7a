//! Configuration loading and merging logic
//!
//! Handles loading configuration from multiple sources and merging them
//! according to precedence rules.

use super::{defaults, schema::Config};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "CHARTFLOW_CONFIG";
pub const WORKFLOW_NAMESPACE_ENV: &str = "CHARTFLOW_WORKFLOW_NAMESPACE";
pub const PARALLELISM_ENV: &str = "CHARTFLOW_PARALLELISM";
pub const EXECUTOR_IMAGE_ENV: &str = "CHARTFLOW_EXECUTOR_IMAGE";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with all layers merged
    ///
    /// Precedence order (highest to lowest):
    /// 1. Environment variable overrides
    /// 2. The file at `path`, or at `$CHARTFLOW_CONFIG`
    /// 3. Built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path: Option<PathBuf> = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let config = match path {
            Some(path) => Self::load_file(&path)?,
            None => Self::load_defaults(),
        };

        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    /// Load configuration from a file; missing keys take their defaults
    pub fn load_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML text
    pub fn parse(contents: &str) -> Result<Config> {
        if contents.trim().is_empty() {
            return Ok(Self::load_defaults());
        }
        let config: Config = serde_yaml::from_str(contents)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load default configuration
    pub fn load_defaults() -> Config {
        defaults::default_config()
    }

    /// Apply overrides looked up by environment variable name
    pub fn apply_overrides<F>(mut config: Config, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ns) = lookup(WORKFLOW_NAMESPACE_ENV).filter(|v| !v.is_empty()) {
            config.workflow_namespace = ns;
        }
        if let Some(value) = lookup(PARALLELISM_ENV).filter(|v| !v.is_empty()) {
            let parallelism: i64 = value
                .parse()
                .with_context(|| format!("{} must be a number", PARALLELISM_ENV))?;
            config.parallelism = Some(parallelism);
        }
        if let Some(image) = lookup(EXECUTOR_IMAGE_ENV).filter(|v| !v.is_empty()) {
            config.executor.image = image;
        }
        Self::validate(&config)?;
        Ok(config)
    }

    /// Check values serde cannot check
    pub fn validate(config: &Config) -> Result<()> {
        if config.workflow_namespace.is_empty() {
            anyhow::bail!("workflowNamespace must not be empty");
        }
        if let Some(parallelism) = config.parallelism {
            if parallelism < 1 {
                anyhow::bail!("parallelism must be at least 1, got {}", parallelism);
            }
        }
        super::parse_duration(&config.executor.poll_interval)
            .context("executor.pollInterval is not a valid duration")?;
        super::parse_duration(&config.executor.timeout)
            .context("executor.timeout is not a valid duration")?;
        super::parse_duration(&config.default_release_timeout)
            .context("defaultReleaseTimeout is not a valid duration")?;
        Ok(())
    }
}
