//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Assistant configuration.
#[derive(Debug, Clone)]
pub struct NinaConfig {
    /// Name the assistant introduces itself with.
    pub assistant_name: String,
    /// How many calendar days ahead availability is searched.
    pub days_ahead: u32,
    /// Maximum number of slots offered in one list.
    pub max_slots: usize,
    /// Prior turns included as context for diet questions.
    pub diet_history_turns: usize,
    /// Temperature for intent classification (near zero).
    pub classifier_temperature: f32,
    /// Max tokens for the one-word classification answer.
    pub classifier_max_tokens: u32,
    /// Temperature for grounded diet answers.
    pub diet_temperature: f32,
    /// Max tokens for a diet answer.
    pub diet_max_tokens: u32,
    /// Messages of history loaded per turn by the conversation service.
    pub history_limit: usize,
    /// Patient messages allowed per session within `rate_limit_window`.
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
}

impl Default for NinaConfig {
    fn default() -> Self {
        Self {
            assistant_name: "Nina".to_string(),
            days_ahead: 14,
            max_slots: 10,
            diet_history_turns: 6,
            classifier_temperature: 0.0,
            classifier_max_tokens: 20,
            diet_temperature: 0.2,
            diet_max_tokens: 600,
            history_limit: 20,
            rate_limit_max: 20,
            rate_limit_window: Duration::from_secs(60), // 1 minute
        }
    }
}

impl NinaConfig {
    /// Build from `NINA_*` environment variables, keeping defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            assistant_name: lookup("NINA_ASSISTANT_NAME")
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(defaults.assistant_name),
            days_ahead: parse_or(&lookup, "NINA_DAYS_AHEAD", defaults.days_ahead)?,
            max_slots: parse_or(&lookup, "NINA_MAX_SLOTS", defaults.max_slots)?,
            diet_history_turns: parse_or(
                &lookup,
                "NINA_DIET_HISTORY_TURNS",
                defaults.diet_history_turns,
            )?,
            classifier_temperature: parse_or(
                &lookup,
                "NINA_CLASSIFIER_TEMPERATURE",
                defaults.classifier_temperature,
            )?,
            classifier_max_tokens: parse_or(
                &lookup,
                "NINA_CLASSIFIER_MAX_TOKENS",
                defaults.classifier_max_tokens,
            )?,
            diet_temperature: parse_or(&lookup, "NINA_DIET_TEMPERATURE", defaults.diet_temperature)?,
            diet_max_tokens: parse_or(&lookup, "NINA_DIET_MAX_TOKENS", defaults.diet_max_tokens)?,
            history_limit: parse_or(&lookup, "NINA_HISTORY_LIMIT", defaults.history_limit)?,
            rate_limit_max: parse_or(&lookup, "NINA_RATE_LIMIT_MAX", defaults.rate_limit_max)?,
            rate_limit_window: Duration::from_secs(parse_or(
                &lookup,
                "NINA_RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.days_ahead == 0 {
            return Err(invalid("NINA_DAYS_AHEAD", "must be at least 1"));
        }
        if self.max_slots == 0 {
            return Err(invalid("NINA_MAX_SLOTS", "must be at least 1"));
        }
        // The current patient message is part of the history window.
        if self.history_limit == 0 {
            return Err(invalid("NINA_HISTORY_LIMIT", "must be at least 1"));
        }
        for (key, value) in [
            ("NINA_CLASSIFIER_TEMPERATURE", self.classifier_temperature),
            ("NINA_DIET_TEMPERATURE", self.diet_temperature),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(key, "must be between 0.0 and 1.0"));
            }
        }
        if self.rate_limit_window.is_zero() {
            return Err(invalid("NINA_RATE_LIMIT_WINDOW_SECS", "must be positive"));
        }
        Ok(())
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &e.to_string())),
        _ => Ok(default),
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
