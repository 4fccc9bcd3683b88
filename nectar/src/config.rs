use anyhow::Result;
use config::{Config, File};
use farm_core::{parse_level, ConfigError, DelayRange, RetryPolicy};
use serde::Deserialize;
use tracing::Level;

#[derive(Debug, Deserialize, Clone)]
pub struct ThreadsConfig {
    pub registration: usize,
    pub farming: usize,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            registration: 5,
            farming: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReferralConfig {
    /// When true every registration binds the configured `code`; otherwise
    /// codes are drawn from previously registered accounts, falling back to
    /// `code` while the pool is empty.
    pub static_mode: bool,
    pub code: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default)]
    pub threads: ThreadsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub referral: ReferralConfig,
    #[serde(default)]
    pub delay_before_start: DelayRange,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl BotConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path))
            .build()
            .map_err(|e| ConfigError::IoError {
                path: path.to_string(),
                msg: e.to_string(),
            })?;

        let cfg: BotConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigError::InvalidValue {
                field: "config".to_string(),
                reason: e.to_string(),
            })?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if parse_level(&self.logging.level).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!(
                    "'{}' is not one of DEBUG, INFO, WARNING, ERROR, CRITICAL",
                    self.logging.level
                ),
            });
        }
        if self.threads.registration == 0 || self.threads.farming == 0 {
            return Err(ConfigError::InvalidValue {
                field: "threads".to_string(),
                reason: "thread counts must be at least 1".to_string(),
            });
        }
        if self.delay_before_start.min > self.delay_before_start.max {
            return Err(ConfigError::InvalidValue {
                field: "delay_before_start".to_string(),
                reason: "min must not exceed max".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.referral.code.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "referral.code".to_string(),
            });
        }
        Ok(())
    }

    pub fn log_level(&self) -> Level {
        // Validated at load time.
        parse_level(&self.logging.level).unwrap_or(Level::INFO)
    }
}

#[cfg(test)]
pub mod tests_support {
    use super::*;

    pub fn minimal_config() -> BotConfig {
        BotConfig {
            threads: ThreadsConfig::default(),
            logging: LoggingConfig::default(),
            referral: ReferralConfig {
                static_mode: true,
                code: "TEST".to_string(),
            },
            delay_before_start: DelayRange::default(),
            retry: RetryPolicy::default(),
        }
    }
}
