use std::str::FromStr;
use std::time::Duration;

/// Base URL of the hosted try-on backend.
pub const DEFAULT_API_URL: &str = "https://api-virtual-try-on.vercel.app";

/// Model used for every try-on request.
pub const DEFAULT_MODEL_NAME: &str = "kolors-virtual-try-on-v1-5";

const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults that target the hosted service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Try-on service base URL.
    pub api_url: String,
    /// Model identifier sent with each task.
    pub model_name: String,
    /// Delay between status queries.
    pub poll_interval: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Enforce format, size, and resolution limits on uploads.
    pub strict_validation: bool,
}

/// A configuration variable held a value that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {key}: '{value}' ({reason})")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: &'static str,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            strict_validation: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                                 |
    /// |------------------------------|-----------------------------------------|
    /// | `TRYON_API_URL`              | `https://api-virtual-try-on.vercel.app` |
    /// | `TRYON_MODEL_NAME`           | `kolors-virtual-try-on-v1-5`            |
    /// | `TRYON_POLL_INTERVAL_MS`     | `5000`                                  |
    /// | `TRYON_REQUEST_TIMEOUT_SECS` | `30`                                    |
    /// | `TRYON_STRICT_VALIDATION`    | `true`                                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("TRYON_API_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.into());

        let model_name = lookup("TRYON_MODEL_NAME")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_NAME.into());

        let poll_interval_ms: u64 =
            parse_var(&lookup, "TRYON_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        if poll_interval_ms == 0 {
            return Err(ConfigError {
                key: "TRYON_POLL_INTERVAL_MS",
                value: "0".into(),
                reason: "must be greater than 0",
            });
        }

        let request_timeout_secs: u64 = parse_var(
            &lookup,
            "TRYON_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        let strict_validation = match lookup("TRYON_STRICT_VALIDATION") {
            None => true,
            Some(raw) => parse_bool(&raw).ok_or(ConfigError {
                key: "TRYON_STRICT_VALIDATION",
                value: raw,
                reason: "expected true or false",
            })?,
        };

        Ok(Self {
            api_url,
            model_name,
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            strict_validation,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError {
            key,
            value: raw,
            reason: "expected an unsigned integer",
        }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
