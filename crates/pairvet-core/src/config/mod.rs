//! Engine configuration parsing and validation.
//!
//! Configuration is TOML: engine tunables (retry, rate smoothing, caches,
//! write buffering) plus one `[categories.<name>]` table per triage
//! category binding the category to its manifest, folders, and log blobs.
//!
//! # Example
//!
//! ```toml
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 400
//!
//! [categories.demography]
//! manifest_blob = "blob-manifest-demo"
//! hypothesis_src = "folder-hypo-src"
//! adversarial_src = "folder-adv-src"
//! hypothesis_dst = "folder-hypo-dst"
//! adversarial_dst = "folder-adv-dst"
//! hypothesis_log = "blob-log-hypo"
//! adversarial_log = "blob-log-adv"
//! progress_folder = "folder-progress"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Side;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Retry budget for store calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Client-side rate smoothing.
    #[serde(default)]
    pub rate: RateConfig,

    /// Cache tier tunables.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Journal write buffering.
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Category bindings, keyed by category name.
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryBinding>,
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validates tunables and category bindings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.rate.window_secs == 0 {
            return Err(ConfigError::Validation(
                "rate.window_secs must be at least 1".to_string(),
            ));
        }
        if self.rate.max_calls == 0 {
            return Err(ConfigError::Validation(
                "rate.max_calls must be at least 1".to_string(),
            ));
        }
        if self.cache.preview_capacity == 0 {
            return Err(ConfigError::Validation(
                "cache.preview_capacity must be at least 1".to_string(),
            ));
        }
        if self.buffer.max_pending == 0 {
            return Err(ConfigError::Validation(
                "buffer.max_pending must be at least 1".to_string(),
            ));
        }
        if self.categories.is_empty() {
            return Err(ConfigError::Validation(
                "at least one [categories.<name>] binding is required".to_string(),
            ));
        }
        for (name, binding) in &self.categories {
            binding
                .validate()
                .map_err(|field| ConfigError::Validation(format!("categories.{name}.{field} must be non-empty")))?;
        }
        Ok(())
    }

    /// Looks up a category binding by name.
    #[must_use]
    pub fn category(&self, name: &str) -> Option<&CategoryBinding> {
        self.categories.get(name)
    }
}

/// Retry budget for store calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first (minimum 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay; the sleep after failed attempt `n` is
    /// `min(base_delay_ms * 2^(n-1), max_delay_ms)`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on a single backoff sleep.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Sliding-window smoothing of outbound store calls.
///
/// When `max_calls` calls have gone out within the trailing `window_secs`,
/// the next call waits for the window to open. The gate delays; it never
/// rejects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateConfig {
    /// Maximum calls per window.
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            window_secs: default_window_secs(),
        }
    }
}

/// Cache tier tunables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for folder listings, in seconds.
    #[serde(default = "default_folder_ttl_secs")]
    pub folder_ttl_secs: u64,

    /// Maximum entries in the preview byte cache.
    #[serde(default = "default_preview_capacity")]
    pub preview_capacity: usize,

    /// TTL for preview byte entries, in seconds.
    #[serde(default = "default_preview_ttl_secs")]
    pub preview_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            folder_ttl_secs: default_folder_ttl_secs(),
            preview_capacity: default_preview_capacity(),
            preview_ttl_secs: default_preview_ttl_secs(),
        }
    }
}

/// Journal write buffering thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Buffered lines that force a flush.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Age of the oldest buffered line that forces a flush, in seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

/// Wiring of one triage category to its remote objects.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CategoryBinding {
    /// Blob id of the NDJSON manifest listing the category's records.
    pub manifest_blob: String,

    /// Source folder holding hypothesis images.
    pub hypothesis_src: String,

    /// Source folder holding adversarial images.
    pub adversarial_src: String,

    /// Destination folder for accepted-hypothesis export links.
    pub hypothesis_dst: String,

    /// Destination folder for accepted-adversarial export links.
    pub adversarial_dst: String,

    /// Blob id of the hypothesis decision log.
    pub hypothesis_log: String,

    /// Blob id of the adversarial decision log.
    pub adversarial_log: String,

    /// Folder holding advisory progress hint blobs.
    pub progress_folder: String,
}

impl CategoryBinding {
    /// The source folder for `side`.
    #[must_use]
    pub fn source_folder(&self, side: Side) -> &str {
        match side {
            Side::Hypothesis => &self.hypothesis_src,
            Side::Adversarial => &self.adversarial_src,
        }
    }

    /// The export destination folder for `side`.
    #[must_use]
    pub fn dest_folder(&self, side: Side) -> &str {
        match side {
            Side::Hypothesis => &self.hypothesis_dst,
            Side::Adversarial => &self.adversarial_dst,
        }
    }

    /// The decision log blob for `side`.
    #[must_use]
    pub fn log_blob(&self, side: Side) -> &str {
        match side {
            Side::Hypothesis => &self.hypothesis_log,
            Side::Adversarial => &self.adversarial_log,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        let fields = [
            ("manifest_blob", &self.manifest_blob),
            ("hypothesis_src", &self.hypothesis_src),
            ("adversarial_src", &self.adversarial_src),
            ("hypothesis_dst", &self.hypothesis_dst),
            ("adversarial_dst", &self.adversarial_dst),
            ("hypothesis_log", &self.hypothesis_log),
            ("adversarial_log", &self.adversarial_log),
            ("progress_folder", &self.progress_folder),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(name);
            }
        }
        Ok(())
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    400
}

const fn default_max_delay_ms() -> u64 {
    5_000
}

const fn default_max_calls() -> u32 {
    30
}

const fn default_window_secs() -> u64 {
    10
}

const fn default_folder_ttl_secs() -> u64 {
    3600
}

const fn default_preview_capacity() -> usize {
    256
}

const fn default_preview_ttl_secs() -> u64 {
    3600
}

const fn default_max_pending() -> usize {
    16
}

const fn default_max_age_secs() -> u64 {
    20
}

/// Errors while loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field failed validation.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
