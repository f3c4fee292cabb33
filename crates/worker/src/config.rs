use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use v2t_core::retention::ExportRetention;
use v2t_core::storage::StorageLayout;
use v2t_db::DEFAULT_MAX_CONNECTIONS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Worker configuration loaded from environment variables.
///
/// Everything except the database URL has a default suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub layout: StorageLayout,
    /// Seconds between sampled frames.
    pub frame_interval_secs: f64,
    /// Minimum detection confidence, `0..=1`.
    pub confidence_threshold: f64,
    pub max_concurrent_jobs: usize,
    pub poll_interval: Duration,
    pub capability_timeout: Duration,
    /// How long a processing lease survives without renewal before the
    /// video is failed.
    pub lease_ttl: Duration,
    /// Detector program plus leading arguments, whitespace separated.
    pub detector_command: String,
    pub tesseract_bin: PathBuf,
    pub ocr_language: String,
    pub export_retention: ExportRetention,
    /// Identity recorded on processing leases.
    pub worker_name: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default           |
    /// |----------------------------|-------------------|
    /// | `DATABASE_URL`             | (required)        |
    /// | `DATABASE_MAX_CONNECTIONS` | `20`              |
    /// | `UPLOAD_DIR`               | `storage/uploads` |
    /// | `FRAMES_DIR`               | `storage/frames`  |
    /// | `EXPORTS_DIR`              | `storage/exports` |
    /// | `FRAME_INTERVAL_SECS`      | `1.0`             |
    /// | `CONFIDENCE_THRESHOLD`     | `0.5`             |
    /// | `MAX_CONCURRENT_JOBS`      | `2`               |
    /// | `POLL_INTERVAL_MS`         | `1000`            |
    /// | `CAPABILITY_TIMEOUT_SECS`  | `60`              |
    /// | `LEASE_TTL_SECS`           | `1800`            |
    /// | `DETECTOR_COMMAND`         | `yolo-detect`     |
    /// | `TESSERACT_BIN`            | `tesseract`       |
    /// | `OCR_LANGUAGE`             | `eng`             |
    /// | `EXPORT_RETENTION_HOURS`   | unset (keep)      |
    /// | `WORKER_NAME`              | `{HOSTNAME}-{pid}`|
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`WorkerConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let database_max_connections = parse_or(
            &var,
            "DATABASE_MAX_CONNECTIONS",
            DEFAULT_MAX_CONNECTIONS,
        )?;
        if database_max_connections == 0 {
            return Err(invalid("DATABASE_MAX_CONNECTIONS", "0", "must be at least 1"));
        }

        let layout = StorageLayout::new(
            var("UPLOAD_DIR").unwrap_or_else(|| "storage/uploads".into()),
            var("FRAMES_DIR").unwrap_or_else(|| "storage/frames".into()),
            var("EXPORTS_DIR").unwrap_or_else(|| "storage/exports".into()),
        );

        let frame_interval_secs: f64 = parse_or(&var, "FRAME_INTERVAL_SECS", 1.0)?;
        if !(frame_interval_secs.is_finite() && frame_interval_secs > 0.0) {
            return Err(invalid(
                "FRAME_INTERVAL_SECS",
                &frame_interval_secs.to_string(),
                "must be a positive number of seconds",
            ));
        }

        let confidence_threshold: f64 = parse_or(&var, "CONFIDENCE_THRESHOLD", 0.5)?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(invalid(
                "CONFIDENCE_THRESHOLD",
                &confidence_threshold.to_string(),
                "must be between 0 and 1",
            ));
        }

        let max_concurrent_jobs: usize = parse_or(&var, "MAX_CONCURRENT_JOBS", 2)?;
        if max_concurrent_jobs == 0 {
            return Err(invalid("MAX_CONCURRENT_JOBS", "0", "must be at least 1"));
        }

        let poll_interval_ms: u64 = parse_or(&var, "POLL_INTERVAL_MS", 1000)?;
        if poll_interval_ms == 0 {
            return Err(invalid("POLL_INTERVAL_MS", "0", "must be at least 1"));
        }

        let capability_timeout_secs: u64 = parse_or(&var, "CAPABILITY_TIMEOUT_SECS", 60)?;
        if capability_timeout_secs == 0 {
            return Err(invalid("CAPABILITY_TIMEOUT_SECS", "0", "must be at least 1"));
        }

        let lease_ttl_secs: u64 = parse_or(&var, "LEASE_TTL_SECS", 1800)?;
        if lease_ttl_secs == 0 {
            return Err(invalid("LEASE_TTL_SECS", "0", "must be at least 1"));
        }

        let retention_hours: Option<u64> = var("EXPORT_RETENTION_HOURS")
            .map(|raw| parse_value("EXPORT_RETENTION_HOURS", &raw))
            .transpose()?;

        let worker_name = var("WORKER_NAME").unwrap_or_else(|| {
            let host = var("HOSTNAME").unwrap_or_else(|| "v2t".into());
            format!("{host}-{}", std::process::id())
        });

        Ok(Self {
            database_url,
            database_max_connections,
            layout,
            frame_interval_secs,
            confidence_threshold,
            max_concurrent_jobs,
            poll_interval: Duration::from_millis(poll_interval_ms),
            capability_timeout: Duration::from_secs(capability_timeout_secs),
            lease_ttl: Duration::from_secs(lease_ttl_secs),
            detector_command: var("DETECTOR_COMMAND").unwrap_or_else(|| "yolo-detect".into()),
            tesseract_bin: var("TESSERACT_BIN")
                .unwrap_or_else(|| "tesseract".into())
                .into(),
            ocr_language: var("OCR_LANGUAGE").unwrap_or_else(|| "eng".into()),
            export_retention: ExportRetention::from_hours(retention_hours),
            worker_name,
        })
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, raw, &e.to_string()))
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
