// src/config/validate.rs

use crate::config::model::RundagConfig;
use crate::errors::ConfigError;

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - `scheduler.max_parallelism >= 1`
/// - `defaults.max_attempts >= 1`, a non-zero timeout, and
///   `base_backoff <= max_backoff`
/// - `store.lock_retries >= 1`
/// - every duration string parses
pub fn validate_config(cfg: &RundagConfig) -> Result<(), ConfigError> {
    validate_scheduler(cfg)?;
    validate_defaults(cfg)?;
    validate_store(cfg)?;
    Ok(())
}

fn validate_scheduler(cfg: &RundagConfig) -> Result<(), ConfigError> {
    if cfg.scheduler.max_parallelism == 0 {
        return Err(ConfigError::Invalid(
            "[scheduler].max_parallelism must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_defaults(cfg: &RundagConfig) -> Result<(), ConfigError> {
    let defaults = cfg.task_defaults()?;

    if defaults.retry.max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "[defaults].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    if defaults.timeout.is_zero() {
        return Err(ConfigError::Invalid(
            "[defaults].timeout must be greater than zero".to_string(),
        ));
    }
    if defaults.retry.base_backoff > defaults.retry.max_backoff {
        return Err(ConfigError::Invalid(format!(
            "[defaults].base_backoff ({:?}) must not exceed max_backoff ({:?})",
            defaults.retry.base_backoff, defaults.retry.max_backoff
        )));
    }
    Ok(())
}

fn validate_store(cfg: &RundagConfig) -> Result<(), ConfigError> {
    let store = cfg.store_options()?;
    if store.lock.retries == 0 {
        return Err(ConfigError::Invalid(
            "[store].lock_retries must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
