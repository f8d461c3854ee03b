//! Configuration module
//!
//! Loads protection settings from a TOML file and environment variables.
//! The same loader is used at startup and by the reload command.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::protection::glow::GlowColor;
use crate::visibility::VisibilitySettings;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/lootguard.toml";

/// Plugin configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GuardConfig {
    /// Path the configuration was loaded from
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Enable verbose diagnostics
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub protection: ProtectionConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub janitor: JanitorConfig,
}

/// Item protection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProtectionConfig {
    /// Protection state for players who never toggled it
    #[serde(default = "default_true")]
    pub default_enabled: bool,

    #[serde(default)]
    pub visibility: VisibilityConfig,

    #[serde(default)]
    pub glow: GlowConfig,
}

/// Network visibility settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VisibilityConfig {
    /// Show protected items to players other than the owner
    #[serde(default)]
    pub visible_to_others: bool,
}

/// Glow outline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlowConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Color name, case insensitive
    #[serde(default = "default_glow_color")]
    pub color: String,
}

/// Player message settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotificationConfig {
    /// Tell players when their drop becomes protected
    #[serde(default = "default_true")]
    pub notify_on_drop: bool,
}

/// Stale entry sweep settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JanitorConfig {
    /// Sweep interval of the registry and the fallback backend
    #[serde(default = "default_registry_interval")]
    pub registry_interval_secs: u64,

    /// Sweep interval of the packet backends
    #[serde(default = "default_packet_interval")]
    pub packet_interval_secs: u64,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_glow_color() -> String {
    GlowColor::default().name().to_string()
}

fn default_registry_interval() -> u64 {
    5
}

fn default_packet_interval() -> u64 {
    10
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            default_enabled: default_true(),
            visibility: VisibilityConfig::default(),
            glow: GlowConfig::default(),
        }
    }
}

impl Default for GlowConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            color: default_glow_color(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            notify_on_drop: default_true(),
        }
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            registry_interval_secs: default_registry_interval(),
            packet_interval_secs: default_packet_interval(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            debug: false,
            protection: ProtectionConfig::default(),
            notifications: NotificationConfig::default(),
            janitor: JanitorConfig::default(),
        }
    }
}

fn parse_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl GuardConfig {
    /// Load configuration from the path in `LOOTGUARD_CONFIG` (or the default path)
    pub async fn load() -> Result<Self> {
        let config_path = env::var("LOOTGUARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&config_path).await
    }

    /// Load configuration from a file, falling back to defaults when it is missing
    pub async fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(config_path)
                .await
                .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path.to_path_buf();

        // Override with environment variables
        config.apply_env_overrides();

        config.validate()?;

        Ok(config)
    }

    /// Re-read a configuration file that must still exist
    pub async fn reload_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            anyhow::bail!("Config file not found: {}", config_path.display());
        }
        Self::load_from(config_path).await
    }

    /// Parse configuration text without touching the environment
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("LOOTGUARD_DEBUG") {
            self.debug = parse_flag(&val);
        }
        if let Ok(val) = env::var("LOOTGUARD_VISIBLE_TO_OTHERS") {
            self.protection.visibility.visible_to_others = parse_flag(&val);
        }
        if let Ok(val) = env::var("LOOTGUARD_DEFAULT_ENABLED") {
            self.protection.default_enabled = parse_flag(&val);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("janitor.registry-interval-secs", self.janitor.registry_interval_secs),
            ("janitor.packet-interval-secs", self.janitor.packet_interval_secs),
        ] {
            if !(1..=300).contains(&secs) {
                anyhow::bail!("{} must be between 1 and 300 seconds, got {}", name, secs);
            }
        }
        Ok(())
    }

    /// Settings the visibility backend listener is installed with
    pub fn visibility_settings(&self) -> VisibilitySettings {
        VisibilitySettings {
            visible_to_others: self.protection.visibility.visible_to_others,
            debug: self.debug,
        }
    }

    /// Configured glow color, white when invalid
    pub fn glow_color(&self) -> GlowColor {
        GlowColor::parse_or_default(&self.protection.glow.color)
    }

    pub fn registry_interval(&self) -> Duration {
        Duration::from_secs(self.janitor.registry_interval_secs)
    }

    pub fn packet_interval(&self) -> Duration {
        Duration::from_secs(self.janitor.packet_interval_secs)
    }

    /// Log filter directive for this configuration
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "info,lootguard=debug"
        } else {
            "info"
        }
    }
}
