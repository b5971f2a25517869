#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! [`RuntimeConfig`] holds the few knobs of the dispatcher and the builder.
//! Values come from the defaults, from environment overrides
//! ([`RuntimeConfig::from_env`]) or, with the `policy-config` feature, from a
//! TOML document ([`RuntimeConfig::from_toml_str`]).
//!
//! | Field | Default | Environment |
//! |-------|---------|-------------|
//! | `catch_panics` | `true` | `WEFT_CATCH_PANICS` |
//! | `max_batch` | `10_000` | `WEFT_MAX_BATCH` |
//! | `strict_descriptions` | `true` | `WEFT_STRICT` |
//!
//! Unparsable environment values are ignored with a warning.

use std::env;
use std::fmt;

#[cfg(feature = "policy-config")]
use serde::Deserialize;

pub const ENV_CATCH_PANICS: &str = "WEFT_CATCH_PANICS";
pub const ENV_MAX_BATCH: &str = "WEFT_MAX_BATCH";
pub const ENV_STRICT: &str = "WEFT_STRICT";

/// Dispatcher and builder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default, deny_unknown_fields))]
pub struct RuntimeConfig {
    /// Catch panics escaping queued tasks and report them as notifications.
    pub catch_panics: bool,
    /// Upper bound on tasks executed by one `run_queued` call.
    pub max_batch: usize,
    /// Treat unknown properties and events in descriptions as errors rather
    /// than warnings.
    pub strict_descriptions: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            catch_panics: true,
            max_batch: 10_000,
            strict_descriptions: true,
        }
    }
}

impl RuntimeConfig {
    /// Defaults with overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults with overrides from `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CATCH_PANICS) {
            match parse_flag(&raw) {
                Some(flag) => config.catch_panics = flag,
                None => tracing::warn!(key = ENV_CATCH_PANICS, value = %raw, "ignoring invalid flag"),
            }
        }
        if let Some(raw) = lookup(ENV_MAX_BATCH) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_batch = n,
                _ => tracing::warn!(key = ENV_MAX_BATCH, value = %raw, "ignoring invalid batch size"),
            }
        }
        if let Some(raw) = lookup(ENV_STRICT) {
            match parse_flag(&raw) {
                Some(flag) => config.strict_descriptions = flag,
                None => tracing::warn!(key = ENV_STRICT, value = %raw, "ignoring invalid flag"),
            }
        }
        config
    }

    /// Parse a TOML policy document. Missing keys keep their defaults.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError(e.to_string()))?;
        if config.max_batch == 0 {
            return Err(ConfigError("max_batch must be positive".into()));
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }

    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    #[must_use]
    pub fn with_strict_descriptions(mut self, strict: bool) -> Self {
        self.strict_descriptions = strict;
        self
    }
}

/// A configuration document could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid runtime config: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn defaults() {
        let config = RuntimeConfig::from_lookup(|_| None);
        assert_eq!(config, RuntimeConfig::default());
        assert!(config.catch_panics);
        assert_eq!(config.max_batch, 10_000);
    }

    #[test]
    fn env_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_CATCH_PANICS, "0"),
            (ENV_MAX_BATCH, "32"),
            (ENV_STRICT, "False"),
        ]));
        assert!(!config.catch_panics);
        assert_eq!(config.max_batch, 32);
        assert!(!config.strict_descriptions);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_CATCH_PANICS, "maybe"),
            (ENV_MAX_BATCH, "0"),
        ]));
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn builder_methods_clamp() {
        let config = RuntimeConfig::default().with_max_batch(0);
        assert_eq!(config.max_batch, 1);
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn toml_policy() {
        let config = RuntimeConfig::from_toml_str("max_batch = 8\nstrict_descriptions = false\n")
            .unwrap();
        assert_eq!(config.max_batch, 8);
        assert!(!config.strict_descriptions);
        assert!(config.catch_panics);
        assert!(RuntimeConfig::from_toml_str("bogus = 1").is_err());
        assert!(RuntimeConfig::from_toml_str("max_batch = 0").is_err());
    }
}
