//! Adapter configuration read from the host environment.

use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";
pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 15;
/// One week.
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_ACCESS_TOKEN: &str = "HUBSPOT_ACCESS_TOKEN";
pub const ENV_BASE_URL: &str = "HUBSPOT_BASE_URL";
pub const ENV_POLL_INTERVAL: &str = "HUBSPOT_POLL_INTERVAL_MINUTES";
pub const ENV_TIMEOUT: &str = "HUBSPOT_TIMEOUT_SECS";
pub const ENV_WRITE_POLICY: &str = "HUBSPOT_WRITE_POLICY";

/// Which attribute values the write path treats as "no value".
///
/// `DropFalsy` omits null, `""`, `0` and `false` from write payloads, so a
/// zero amount or a `false` flag cannot be written. `KeepZeroAndFalse`
/// omits only null and `""`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WritePolicy {
    #[default]
    DropFalsy,
    KeepZeroAndFalse,
}

impl WritePolicy {
    /// Whether `value` should be written.
    pub fn keeps(&self, value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Bool(b) => *b || *self == WritePolicy::KeepZeroAndFalse,
            Value::Number(n) => {
                *self == WritePolicy::KeepZeroAndFalse || n.as_f64().is_some_and(|f| f != 0.0)
            }
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

impl FromStr for WritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop-falsy" => Ok(WritePolicy::DropFalsy),
            "keep-zero-and-false" => Ok(WritePolicy::KeepZeroAndFalse),
            other => Err(format!("unknown write policy: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub access_token: Option<String>,
    pub base_url: String,
    pub poll_interval_minutes: u64,
    pub timeout: Duration,
    pub write_policy: WritePolicy,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            write_policy: WritePolicy::default(),
        }
    }
}

impl CrmConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a host-provided accessor. Missing,
    /// empty or unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let poll_interval_minutes = get(ENV_POLL_INTERVAL)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|m| *m > 0)
            .map(|m| m.min(MAX_POLL_INTERVAL_MINUTES))
            .unwrap_or(DEFAULT_POLL_INTERVAL_MINUTES);

        let timeout_secs = get(ENV_TIMEOUT)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let write_policy = match get(ENV_WRITE_POLICY) {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!(%err, "falling back to default write policy");
                WritePolicy::default()
            }),
            None => WritePolicy::default(),
        };

        Self {
            access_token: get(ENV_ACCESS_TOKEN),
            base_url: get(ENV_BASE_URL)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            poll_interval_minutes,
            timeout: Duration::from_secs(timeout_secs),
            write_policy,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into()).filter(|t: &String| !t.is_empty());
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Clamped to `1..=MAX_POLL_INTERVAL_MINUTES`; the field is public and
    /// may hold any value.
    pub fn poll_interval(&self) -> Duration {
        let minutes = self.poll_interval_minutes.clamp(1, MAX_POLL_INTERVAL_MINUTES);
        Duration::from_secs(minutes.saturating_mul(60))
    }
}
