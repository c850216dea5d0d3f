//! Application configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::models::{EngineOptions, SelectionPolicy};
use super::thumbnail::DEFAULT_THUMBNAIL_USER_AGENT;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub download: EngineOptions,
    pub controller: ControllerConfig,
    pub player: PlayerConfig,
    pub log_level: String,
}

/// Format resolver settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Show a notice when an analysis fails instead of failing silently
    pub report_analysis_failures: bool,
    pub title_max_chars: usize,
    pub default_selection: SelectionPolicy,
    pub fetch_thumbnail: bool,
    pub thumbnail_user_agent: String,
    pub thumbnail_timeout_secs: u64,
}

/// Download task controller settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Wake-up interval of a paused worker
    pub pause_poll_interval_ms: u64,
    /// Offer pause/cancel controls to the user
    pub task_controls: bool,
}

/// Preview player settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub position_poll_interval_ms: u64,
    /// Pause between stopping the old media and loading the new one
    pub refresh_settle_ms: u64,
}

/// Presets matching the three shipped flavours of the app
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VariantProfile {
    Baseline,
    /// No task controls, analysis failures are reported to the user
    PreRelease,
    /// Header spoofing and resilient transfers
    Update,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            download: EngineOptions::default(),
            controller: ControllerConfig::default(),
            player: PlayerConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            report_analysis_failures: false,
            title_max_chars: 30,
            default_selection: SelectionPolicy::Last,
            fetch_thumbnail: true,
            thumbnail_user_agent: DEFAULT_THUMBNAIL_USER_AGENT.to_string(),
            thumbnail_timeout_secs: 15,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pause_poll_interval_ms: 500,
            task_controls: true,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            position_poll_interval_ms: 1000,
            refresh_settle_ms: 200,
        }
    }
}

impl ControllerConfig {
    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms)
    }
}

impl PlayerConfig {
    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms)
    }

    pub fn refresh_settle(&self) -> Duration {
        Duration::from_millis(self.refresh_settle_ms)
    }
}

impl AppConfig {
    /// Build the preset for one app flavour
    pub fn for_profile(profile: VariantProfile) -> Self {
        let mut config = Self::default();

        match profile {
            VariantProfile::Baseline => {}
            VariantProfile::PreRelease => {
                config.analysis.report_analysis_failures = true;
                config.controller.task_controls = false;
            }
            VariantProfile::Update => {
                config.download = EngineOptions {
                    concurrent_fragments: 15,
                    buffer_size: Some(1024 * 1024),
                    retries: Some(10),
                    fragment_retries: Some(10),
                    continue_partial: true,
                    user_agent: Some(DEFAULT_THUMBNAIL_USER_AGENT.to_string()),
                    send_referer: true,
                    skip_certificate_check: true,
                    ..EngineOptions::default()
                };
            }
        }

        config
    }

    /// Load configuration from file, creating default if not exists
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let config: AppConfig =
                serde_json::from_str(&content).with_context(|| "Failed to parse config file")?;
            config
                .validate()
                .with_context(|| format!("Invalid config file: {:?}", config_path))?;

            tracing::info!("Loaded configuration from: {:?}", config_path);
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(config_path)?;
            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = self.export()?;

        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved configuration to: {:?}", config_path);
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "mediadownloader", "pro")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.config_dir().join("config.json"))
    }

    /// Reset configuration to defaults
    pub fn reset() -> Result<Self> {
        let config = Self::default();
        config.save()?;
        tracing::info!("Reset configuration to defaults");
        Ok(config)
    }

    /// Export configuration as JSON string
    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "Failed to export configuration")
    }

    /// Parse and validate a JSON configuration; the caller decides whether to save it
    pub fn import(json: &str) -> Result<Self> {
        let config: AppConfig =
            serde_json::from_str(json).with_context(|| "Failed to parse imported configuration")?;

        config
            .validate()
            .with_context(|| "Imported configuration is invalid")?;

        tracing::info!("Imported and validated configuration from JSON");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.download.engine_binary.trim().is_empty() {
            anyhow::bail!("Engine binary must not be empty");
        }

        if self.download.concurrent_fragments == 0 {
            anyhow::bail!("Concurrent fragments must be greater than 0");
        }

        if self.download.buffer_size == Some(0) {
            anyhow::bail!("Buffer size must be greater than 0 when set");
        }

        if self.analysis.title_max_chars == 0 {
            anyhow::bail!("Title length must be greater than 0");
        }

        if self.analysis.thumbnail_timeout_secs == 0 {
            anyhow::bail!("Thumbnail timeout must be greater than 0");
        }

        if self.controller.pause_poll_interval_ms == 0 {
            anyhow::bail!("Pause poll interval must be greater than 0");
        }

        if self.player.position_poll_interval_ms == 0 {
            anyhow::bail!("Position poll interval must be greater than 0");
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level: must be 'error', 'warn', 'info', 'debug', or 'trace'"
            );
        }

        Ok(())
    }
}
