//! Configuration management with validation and defaults
//!
//! Sections map one-to-one onto TOML tables. Every field has a default, so a
//! config file only needs the values it changes. `ConfigLoader` layers
//! `WINGO_*` environment variables on top of the file.

use crate::errors::{ConfigurationError, WingoResult};
use crate::games::liability::RiskPolicy;
use crate::games::taxonomy::STAKE_SCALE;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Longest accepted round, one day
pub const MAX_ROUND_DURATION_SECS: u64 = 86_400;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WingoConfig {
    pub game: GameConfig,
    pub risk: RiskConfig,
    pub scheduler: SchedulerConfig,
    pub retention: RetentionConfig,
    pub monitoring: MonitoringConfig,
}

/// Betting window and stake bounds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub round_duration_secs: u64,
    pub min_bet: Decimal,
    pub max_bet: Decimal,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_duration_secs: 60,
            min_bet: dec!(10),
            max_bet: dec!(100000),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub profit_floor_percent: Decimal,
    /// Largest loss the house accepts on one round, as a positive amount
    pub max_loss: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            profit_floor_percent: dec!(10),
            max_loss: Decimal::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Declared rounds kept before the oldest are pruned
    pub max_declared_rounds: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_declared_rounds: 500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    /// Buffer size of the event feed
    pub feed_capacity: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            feed_capacity: 256,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigurationError::InvalidValue {
                field: "monitoring.log_level".to_string(),
                value: s.to_string(),
                reason: "expected error, warn, info, debug or trace".to_string(),
            }),
        }
    }
}

impl WingoConfig {
    /// Standard one-minute rounds
    pub fn production() -> Self {
        Self {
            monitoring: MonitoringConfig {
                log_level: LogLevel::Info,
                feed_capacity: 1024,
            },
            ..Default::default()
        }
    }

    /// Short rounds and a fast tick for local runs and tests
    pub fn testing() -> Self {
        Self {
            game: GameConfig {
                round_duration_secs: 5,
                min_bet: dec!(1),
                ..Default::default()
            },
            scheduler: SchedulerConfig {
                tick_interval_ms: 100,
            },
            retention: RetentionConfig {
                max_declared_rounds: 50,
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> WingoResult<()> {
        fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
            ConfigurationError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.game.round_duration_secs == 0 {
            return Err(invalid("game.round_duration_secs", 0, "must be > 0").into());
        }
        if self.game.round_duration_secs > MAX_ROUND_DURATION_SECS {
            return Err(invalid(
                "game.round_duration_secs",
                self.game.round_duration_secs,
                "must not exceed 86400",
            )
            .into());
        }
        if self.game.min_bet <= Decimal::ZERO {
            return Err(invalid("game.min_bet", self.game.min_bet, "must be positive").into());
        }
        if self.game.max_bet <= Decimal::ZERO {
            return Err(invalid("game.max_bet", self.game.max_bet, "must be positive").into());
        }
        for (field, value) in [("game.min_bet", self.game.min_bet), ("game.max_bet", self.game.max_bet)] {
            if value.normalize().scale() > STAKE_SCALE {
                return Err(invalid(field, value, "at most 2 decimal places").into());
            }
        }
        if self.game.min_bet > self.game.max_bet {
            return Err(ConfigurationError::ValidationFailed(format!(
                "min_bet {} exceeds max_bet {}",
                self.game.min_bet, self.game.max_bet
            ))
            .into());
        }
        if self.risk.max_loss < Decimal::ZERO {
            return Err(invalid("risk.max_loss", self.risk.max_loss, "must not be negative").into());
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(invalid("scheduler.tick_interval_ms", 0, "must be > 0").into());
        }
        if self.retention.max_declared_rounds == 0 {
            return Err(invalid("retention.max_declared_rounds", 0, "must be > 0").into());
        }
        if self.monitoring.feed_capacity == 0 {
            return Err(invalid("monitoring.feed_capacity", 0, "must be > 0").into());
        }

        Ok(())
    }

    pub fn risk_policy(&self) -> RiskPolicy {
        RiskPolicy {
            profit_floor_percent: self.risk.profit_floor_percent,
            max_loss: self.risk.max_loss,
        }
    }

    pub fn round_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.game.round_duration_secs as i64)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_interval_ms)
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load from file (or defaults), apply `WINGO_*` overrides, then validate
    pub fn load(&self) -> WingoResult<WingoConfig> {
        let mut config = match &self.config_path {
            Some(path) => Self::load_from_file(path)?,
            None => WingoConfig::default(),
        };

        Self::apply_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(path: &Path) -> WingoResult<WingoConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into()
        })
    }

    /// Apply overrides looked up through `lookup`
    fn apply_overrides<F>(config: &mut WingoConfig, lookup: F) -> WingoResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("WINGO_ROUND_DURATION_SECS") {
            config.game.round_duration_secs = parse_var("WINGO_ROUND_DURATION_SECS", value)?;
        }
        if let Some(value) = lookup("WINGO_MAX_LOSS") {
            config.risk.max_loss = parse_var("WINGO_MAX_LOSS", value)?;
        }
        if let Some(value) = lookup("WINGO_PROFIT_FLOOR") {
            config.risk.profit_floor_percent = parse_var("WINGO_PROFIT_FLOOR", value)?;
        }
        if let Some(value) = lookup("WINGO_TICK_INTERVAL_MS") {
            config.scheduler.tick_interval_ms = parse_var("WINGO_TICK_INTERVAL_MS", value)?;
        }
        if let Some(value) = lookup("WINGO_MAX_DECLARED_ROUNDS") {
            config.retention.max_declared_rounds = parse_var("WINGO_MAX_DECLARED_ROUNDS", value)?;
        }
        if let Some(value) = lookup("WINGO_LOG_LEVEL") {
            config.monitoring.log_level = value.parse()?;
        }

        Ok(())
    }
}

fn parse_var<T: FromStr>(field: &str, value: String) -> Result<T, ConfigurationError> {
    value.trim().parse().map_err(|_| ConfigurationError::InvalidValue {
        field: field.to_string(),
        value,
        reason: format!("cannot parse as {}", std::any::type_name::<T>()),
    })
}
