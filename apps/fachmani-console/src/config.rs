//! Environment-backed configuration for `fachmani-console`.

use std::{env, error::Error, fmt, time::Duration};

const DEFAULT_CUSTOMER_EMAIL: &str = "jana@example.cz";
const DEFAULT_FACHMAN_EMAIL: &str = "petr@example.cz";
const DEFAULT_DEMO_PASSWORD: &str = "tajneheslo";
const DEFAULT_EVENT_TIMEOUT_MS: u64 = 2_000;

/// Settings the walkthrough reads at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Email the customer account is seeded and signed in with.
    pub customer_email: String,
    /// Email the fachman account is seeded and signed in with.
    pub fachman_email: String,
    /// Password shared by both demo accounts.
    pub demo_password: String,
    /// How long to wait for each expected runtime event.
    pub event_timeout_ms: u64,
}

impl ConsoleConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let customer_email = optional_trimmed_env("FACHMANI_CUSTOMER_EMAIL", &mut lookup)
            .unwrap_or_else(|| DEFAULT_CUSTOMER_EMAIL.to_owned());
        let fachman_email = optional_trimmed_env("FACHMANI_FACHMAN_EMAIL", &mut lookup)
            .unwrap_or_else(|| DEFAULT_FACHMAN_EMAIL.to_owned());
        let demo_password = optional_trimmed_env("FACHMANI_DEMO_PASSWORD", &mut lookup)
            .unwrap_or_else(|| DEFAULT_DEMO_PASSWORD.to_owned());
        let event_timeout_ms = parse_optional_u64_with_default(
            "FACHMANI_EVENT_TIMEOUT_MS",
            DEFAULT_EVENT_TIMEOUT_MS,
            &mut lookup,
        )?;

        if event_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FACHMANI_EVENT_TIMEOUT_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if customer_email.eq_ignore_ascii_case(&fachman_email) {
            return Err(ConfigError::InvalidValue {
                key: "FACHMANI_FACHMAN_EMAIL",
                value: fachman_email,
                reason: "must differ from the customer email".to_owned(),
            });
        }

        Ok(Self {
            customer_email,
            fachman_email,
            demo_password,
            event_timeout_ms,
        })
    }

    /// Timeout applied to each awaited event.
    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_u64_with_default<F>(
    key: &'static str,
    default: u64,
    lookup: &mut F,
) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    value
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}
