//! Show configuration
//!
//! [`ShowConfig`] is read from YAML and may be overlaid at runtime with the
//! string key/values of a remote configuration source. Remote values are
//! pulled through [`CachedConfig`], which fetches at most once per
//! `config_refresh_secs` and keeps the last good values when a fetch fails.
//!
//! ```yaml
//! flash_enabled: true
//! default_flash_frequency: 2
//! flash_duty_cycle: 0.5
//! default_blue_color: "#0000FF"
//! safety:
//!   photosensitive:
//!     max_frequency_hz: 3
//!     max_continuous_duration_ms: 30000
//!     max_daily_duration_ms: 30000
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::calculator::{self, PatternCalculator};
use crate::safety::SafetyProfiles;
use crate::types::{Color, SeatPalette};

/// Keys read from the remote configuration, in the order they are applied
pub const REMOTE_KEYS: &[&str] = &[
    "flash_enabled",
    "flash_safety_enabled",
    "max_flash_frequency",
    "default_flash_frequency",
    "flash_duty_cycle",
    "default_blue_color",
    "default_red_color",
];
use crate::{Result, StuntError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    /// Master switch for hardware flashing
    pub flash_enabled: bool,
    pub default_flash_frequency: u32,
    /// Upper bound on selectable frequencies, at most 10 Hz
    pub max_flash_frequency: u32,
    pub flash_duty_cycle: f64,
    /// Enforce the per-profile frequency cap at start
    pub flash_safety_enabled: bool,
    /// Even-seat color
    pub default_blue_color: Color,
    /// Odd-seat color
    pub default_red_color: Color,
    /// Bound on every remote store call
    pub remote_timeout_ms: u64,
    /// Minimum interval between remote configuration fetches
    pub config_refresh_secs: u64,
    pub safety: SafetyProfiles,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            flash_enabled: true,
            default_flash_frequency: calculator::DEFAULT_FREQUENCY,
            max_flash_frequency: calculator::MAX_FREQUENCY,
            flash_duty_cycle: calculator::DEFAULT_DUTY_CYCLE,
            flash_safety_enabled: true,
            default_blue_color: Color::BLUE,
            default_red_color: Color::RED,
            remote_timeout_ms: 5_000,
            config_refresh_secs: 3_600,
            safety: SafetyProfiles::default(),
        }
    }
}

impl ShowConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ShowConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StuntError::persistence_failed(format!("read {}", path.display()), Box::new(e))
        })?;
        let config = Self::from_yaml_str(&text)?;
        info!(path = %path.display(), "Loaded show configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        PatternCalculator::validate_frequency(self.default_flash_frequency)?;
        PatternCalculator::validate_frequency(self.max_flash_frequency)?;
        PatternCalculator::validate_duty_cycle(self.flash_duty_cycle)?;
        if self.default_flash_frequency > self.max_flash_frequency {
            return Err(StuntError::config(
                "default_flash_frequency",
                format!(
                    "{}Hz exceeds max_flash_frequency {}Hz",
                    self.default_flash_frequency, self.max_flash_frequency
                ),
            ));
        }
        if self.remote_timeout_ms == 0 {
            return Err(StuntError::config("remote_timeout_ms", "must be positive"));
        }
        Ok(())
    }

    /// Overlay remote string values
    ///
    /// Unknown keys are ignored and values that do not parse are logged and
    /// skipped. Colors that do not parse fall back to their defaults. All
    /// parsed values are applied together when the result is valid;
    /// otherwise each is tried alone in [`REMOTE_KEYS`] order and the ones
    /// that would make the configuration invalid are rejected.
    pub fn apply_remote(&mut self, values: &HashMap<String, String>) {
        for key in values.keys().filter(|key| !REMOTE_KEYS.contains(&key.as_str())) {
            debug!(key, "Ignoring unknown remote config key");
        }

        let mut overlay = self.clone();
        let mut parsed = Vec::new();
        for &key in REMOTE_KEYS {
            let Some(value) = values.get(key) else { continue };
            if overlay.set_remote(key, value) {
                parsed.push((key, value));
            } else {
                warn!(key, value, "Unparsable remote config value");
            }
        }
        if overlay.validate().is_ok() {
            *self = overlay;
            return;
        }

        for (key, value) in parsed {
            let mut candidate = self.clone();
            candidate.set_remote(key, value);
            match candidate.validate() {
                Ok(()) => *self = candidate,
                Err(e) => warn!(key, value, "Rejected remote config value: {}", e),
            }
        }
    }

    /// Set one remote key, returning whether its value parsed
    fn set_remote(&mut self, key: &str, value: &str) -> bool {
        match key {
            "flash_enabled" => value.parse::<bool>().map(|v| self.flash_enabled = v).is_ok(),
            "flash_safety_enabled" => {
                value.parse::<bool>().map(|v| self.flash_safety_enabled = v).is_ok()
            }
            "max_flash_frequency" => {
                value.parse::<u32>().map(|v| self.max_flash_frequency = v).is_ok()
            }
            "default_flash_frequency" => {
                value.parse::<u32>().map(|v| self.default_flash_frequency = v).is_ok()
            }
            "flash_duty_cycle" => value.parse::<f64>().map(|v| self.flash_duty_cycle = v).is_ok(),
            "default_blue_color" => {
                self.default_blue_color = Self::remote_color(key, value, Color::BLUE);
                true
            }
            "default_red_color" => {
                self.default_red_color = Self::remote_color(key, value, Color::RED);
                true
            }
            _ => false,
        }
    }

    fn remote_color(key: &str, value: &str, default: Color) -> Color {
        Color::parse(value).unwrap_or_else(|e| {
            warn!(key, "{}, using {}", e, default);
            default
        })
    }

    /// Even/odd seat colors
    pub fn palette(&self) -> SeatPalette {
        SeatPalette { even: self.default_blue_color, odd: self.default_red_color }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.config_refresh_secs)
    }
}

/// Remote configuration key/value source
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self) -> Result<HashMap<String, String>>;
}

/// Rate-limited view of a remote configuration source
pub struct CachedConfig<S: ConfigSource> {
    source: S,
    config: ShowConfig,
    last_fetch: Option<Instant>,
}

impl<S: ConfigSource> CachedConfig<S> {
    pub fn new(source: S, base: ShowConfig) -> Self {
        Self { source, config: base, last_fetch: None }
    }

    pub fn current(&self) -> &ShowConfig {
        &self.config
    }

    /// Fetch and apply remote values if the refresh interval has passed
    ///
    /// A failed fetch still counts as an attempt, so an unreachable source
    /// is retried no sooner than a healthy one.
    pub async fn refresh(&mut self) -> &ShowConfig {
        let due = self
            .last_fetch
            .is_none_or(|fetched| fetched.elapsed() >= self.config.refresh_interval());
        if !due {
            debug!("Remote configuration still fresh");
            return &self.config;
        }

        self.last_fetch = Some(Instant::now());
        match self.source.fetch().await {
            Ok(values) => {
                self.config.apply_remote(&values);
                debug!(keys = values.len(), "Remote configuration applied");
            }
            Err(e) => warn!("Remote configuration fetch failed, keeping cached values: {}", e),
        }
        &self.config
    }
}
