// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::RetryPolicy;
use crate::dag::descriptor::DEFAULT_TIMEOUT;
use crate::engine::SchedulerOptions;
use crate::errors::ConfigError;
use crate::logging::LogLevel;
use crate::store::{LockOptions, StoreOptions};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// max_parallelism = 4
/// fail_fast = false
///
/// [defaults]
/// timeout = "300s"
/// max_attempts = 3
/// base_backoff = "2s"
/// max_backoff = "60s"
///
/// [store]
/// dir = ".rundag"
/// lock_wait = "100ms"
/// lock_retries = 50
/// stale_temp_age = "10m"
///
/// [log]
/// level = "info"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RundagConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Defaults applied to task descriptors via [`TaskDefaults`].
    #[serde(default)]
    pub defaults: DefaultsSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub log: LogSection,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Worker pool size; must be >= 1.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    #[serde(default)]
    pub fail_fast: bool,
}

fn default_max_parallelism() -> usize {
    4
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_parallelism: default_max_parallelism(),
            fail_fast: false,
        }
    }
}

/// `[defaults]` section. Durations are strings like `"500ms"`, `"2s"`,
/// `"1m"`, `"1h"`.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Total attempts per task, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_backoff")]
    pub base_backoff: String,

    #[serde(default = "default_max_backoff")]
    pub max_backoff: String,
}

fn default_timeout() -> String {
    format!("{}s", DEFAULT_TIMEOUT.as_secs())
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff() -> String {
    "2s".to_string()
}

fn default_max_backoff() -> String {
    "60s".to_string()
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_attempts: default_max_attempts(),
            base_backoff: default_base_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_lock_wait")]
    pub lock_wait: String,

    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    #[serde(default = "default_stale_temp_age")]
    pub stale_temp_age: String,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".rundag")
}

fn default_lock_wait() -> String {
    "100ms".to_string()
}

fn default_lock_retries() -> u32 {
    50
}

fn default_stale_temp_age() -> String {
    "10m".to_string()
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            lock_wait: default_lock_wait(),
            lock_retries: default_lock_retries(),
            stale_temp_age: default_stale_temp_age(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogSection {
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// Timeout and retry policy applied to descriptors that opt in with
/// [`TaskDescriptor::with_defaults`](crate::dag::TaskDescriptor::with_defaults).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDefaults {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl RundagConfig {
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            max_parallelism: self.scheduler.max_parallelism,
            fail_fast: self.scheduler.fail_fast,
        }
    }

    pub fn task_defaults(&self) -> Result<TaskDefaults, ConfigError> {
        let d = &self.defaults;
        Ok(TaskDefaults {
            timeout: parse_duration(&d.timeout).map_err(|e| invalid("defaults.timeout", e))?,
            retry: RetryPolicy {
                max_attempts: d.max_attempts,
                base_backoff: parse_duration(&d.base_backoff)
                    .map_err(|e| invalid("defaults.base_backoff", e))?,
                max_backoff: parse_duration(&d.max_backoff)
                    .map_err(|e| invalid("defaults.max_backoff", e))?,
            },
        })
    }

    pub fn store_options(&self) -> Result<StoreOptions, ConfigError> {
        let s = &self.store;
        Ok(StoreOptions {
            dir: s.dir.clone(),
            lock: LockOptions {
                wait: parse_duration(&s.lock_wait).map_err(|e| invalid("store.lock_wait", e))?,
                retries: s.lock_retries,
            },
            stale_temp_age: parse_duration(&s.stale_temp_age)
                .map_err(|e| invalid("store.stale_temp_age", e))?,
        })
    }
}

fn invalid(field: &str, msg: String) -> ConfigError {
    ConfigError::Invalid(format!("[{field}]: {msg}"))
}

/// Parse `"<n>ms" | "<n>s" | "<n>m" | "<n>h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' missing unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' out of range"))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(60),
        "h" => secs(60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
