//! `migrate.toml` engine configuration.
//!
//! Every section and field is optional. A missing file means defaults; a file
//! that exists but does not parse is an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::capture::CaptureOptions;
use crate::classifier::DefaultCatalog;
use crate::conflict::{ConflictPolicy, ResolutionStrategy};
use crate::references::ReferenceRules;
use crate::repository::snapshot::DEFAULT_PAGE_SIZE;
use crate::repository::{RateLimiter, RetryPolicy};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "migrate.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub concurrency: usize,
    pub page_size: usize,
    pub include_defaults: bool,
}

impl Default for CaptureSection {
    fn default() -> Self {
        let options = CaptureOptions::default();
        Self {
            concurrency: options.concurrency,
            page_size: DEFAULT_PAGE_SIZE,
            include_defaults: options.include_defaults,
        }
    }
}

/// Token bucket settings. `requests_per_minute = 0` turns limiting off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThrottleSection {
    pub requests_per_minute: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PushSection {
    pub strategy: ResolutionStrategy,
    /// Fields that never count as a difference between a candidate and the
    /// target's record, by name or dotted path.
    pub ignore_fields: Vec<String>,
}

/// Optional override file for an embedded table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OverrideSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub capture: CaptureSection,
    pub throttle: ThrottleSection,
    pub retry: RetrySection,
    pub push: PushSection,
    pub catalog: OverrideSection,
    pub rules: OverrideSection,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        // Override paths are relative to the config file.
        if let Some(dir) = path.parent() {
            config.catalog.rebase(dir);
            config.rules.rebase(dir);
        }
        Ok(config)
    }

    /// Load `path` if given, else `./migrate.toml` when present, else defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::load(local)
                } else {
                    debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::per_minute(self.throttle.requests_per_minute, self.throttle.burst)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            concurrency: self.capture.concurrency.max(1),
            include_defaults: self.capture.include_defaults,
        }
    }

    pub fn catalog(&self) -> DefaultCatalog {
        DefaultCatalog::load_or_embedded(self.catalog.path.as_deref())
    }

    pub fn reference_rules(&self) -> ReferenceRules {
        ReferenceRules::load_or_embedded(self.rules.path.as_deref())
    }

    /// Policy for `strategy`; named lists come from `rules`.
    pub fn conflict_policy(&self, strategy: ResolutionStrategy, rules: &ReferenceRules) -> ConflictPolicy {
        ConflictPolicy::new(strategy)
            .with_ignored_fields(self.push.ignore_fields.iter().cloned())
            .with_keyed_lists(rules.named_lists())
    }
}

impl OverrideSection {
    fn rebase(&mut self, dir: &Path) {
        if let Some(path) = &self.path {
            if path.is_relative() {
                self.path = Some(dir.join(path));
            }
        }
    }
}
