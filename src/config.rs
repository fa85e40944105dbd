//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lyrebird configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Discord connection settings.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Copy job behavior settings.
    #[serde(default)]
    pub copy: CopyConfig,
}

/// Discord connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. Usually supplied through `DISCORD_TOKEN` instead of the
    /// config file.
    pub token: String,

    /// Re-register the global slash commands on startup. Registration only
    /// needs to run when the command set changes.
    pub register_commands: bool,

    /// Presence activity shown as "Playing ...".
    pub activity: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            register_commands: false,
            activity: "copycat".into(),
        }
    }
}

/// Copy job behavior configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Reuse the current webhook while consecutive messages share an
    /// author instead of resolving one per message.
    pub group_authors: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self { group_authors: true }
    }
}

impl Config {
    /// Load configuration from the default path, falling back to built-in
    /// defaults when no file exists.
    pub fn load() -> Result<Self> {
        let path = dirs::config_dir()
            .map(|dir| dir.join("lyrebird").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./lyrebird.toml"));
        Self::load_from_path(&path)
    }

    /// Load from a specific config file path. Environment overrides are
    /// applied on top of whatever the file provides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Load {
                path: path.display().to_string(),
                source: Arc::new(source),
            })?;
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            tracing::debug!(path = %path.display(), "no config file found, using defaults");
            Self::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("DISCORD_TOKEN") {
            if !token.is_empty() {
                self.discord.token = token;
            }
        }
        if let Ok(flag) = std::env::var("LYREBIRD_REGISTER_COMMANDS") {
            self.discord.register_commands = matches!(flag.as_str(), "1" | "true" | "yes");
        }
    }

    fn validate(&self) -> Result<()> {
        if self.discord.token.is_empty() {
            return Err(ConfigError::MissingKey(
                "discord.token (or the DISCORD_TOKEN environment variable)".into(),
            )
            .into());
        }
        Ok(())
    }
}
