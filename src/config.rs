//! Webhook configuration.
//!
//! Values come from environment variables set on the webhook pod; anything
//! unset falls back to the defaults below.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::health::HEALTH_PORT;
use crate::webhooks::{DEFAULT_IO_TIMEOUT, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT};

/// Grace period for in-flight admission requests during shutdown
pub const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;
/// Largest AdmissionReview body accepted
pub const DEFAULT_MAX_BODY_BYTES: usize = 3 * 1024 * 1024;

pub const ENV_CERT_PATH: &str = "WEBHOOK_CERT_PATH";
pub const ENV_KEY_PATH: &str = "WEBHOOK_KEY_PATH";
pub const ENV_PORT: &str = "WEBHOOK_PORT";
pub const ENV_FILTER_KINDS: &str = "WEBHOOK_FILTER_KINDS";
pub const ENV_READ_TIMEOUT_SECS: &str = "WEBHOOK_READ_TIMEOUT_SECS";
pub const ENV_WRITE_TIMEOUT_SECS: &str = "WEBHOOK_WRITE_TIMEOUT_SECS";
pub const ENV_SHUTDOWN_GRACE_SECS: &str = "WEBHOOK_SHUTDOWN_GRACE_SECS";
pub const ENV_MAX_BODY_BYTES: &str = "WEBHOOK_MAX_BODY_BYTES";
pub const ENV_HEALTH_PORT: &str = "HEALTH_PORT";

/// Configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable set to a value that does not parse
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration of the webhook process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub port: u16,
    /// Kinds admitted without running any handler
    pub filter_kinds: Vec<String>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub shutdown_grace: Duration,
    pub max_body_bytes: usize,
    pub health_port: u16,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from(WEBHOOK_CERT_PATH),
            key_path: PathBuf::from(WEBHOOK_KEY_PATH),
            port: WEBHOOK_PORT,
            filter_kinds: Vec::new(),
            read_timeout: DEFAULT_IO_TIMEOUT,
            write_timeout: DEFAULT_IO_TIMEOUT,
            shutdown_grace: Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            health_port: HEALTH_PORT,
        }
    }
}

impl WebhookConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let seconds = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parse_var::<u64>(&lookup, name)?
                .map(Duration::from_secs)
                .unwrap_or(default))
        };

        Ok(Self {
            cert_path: lookup(ENV_CERT_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.cert_path),
            key_path: lookup(ENV_KEY_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.key_path),
            port: parse_var(&lookup, ENV_PORT)?.unwrap_or(defaults.port),
            filter_kinds: lookup(ENV_FILTER_KINDS)
                .map(|raw| split_kinds(&raw))
                .unwrap_or_default(),
            read_timeout: seconds(ENV_READ_TIMEOUT_SECS, defaults.read_timeout)?,
            write_timeout: seconds(ENV_WRITE_TIMEOUT_SECS, defaults.write_timeout)?,
            shutdown_grace: seconds(ENV_SHUTDOWN_GRACE_SECS, defaults.shutdown_grace)?,
            max_body_bytes: parse_var(&lookup, ENV_MAX_BODY_BYTES)?
                .unwrap_or(defaults.max_body_bytes),
            health_port: parse_var(&lookup, ENV_HEALTH_PORT)?.unwrap_or(defaults.health_port),
        })
    }
}

/// Split a comma separated kind list, e.g. `"Event, Pod,Namespace"`.
pub fn split_kinds(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                name,
                reason: e.to_string(),
                value,
            }),
    }
}
