use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_PORT: u16 = 8443;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {0} is empty")]
    Empty(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// How updates reach the bot.
#[derive(Debug, Clone, PartialEq)]
pub enum Transport {
    /// Telegram pushes updates to `url`, served on `0.0.0.0:port`.
    Webhook { port: u16, url: Url },
    Polling,
}

#[derive(Clone)]
pub struct TranslatorConfig {
    pub api_key: String,
    pub endpoint: String,
    pub region: String,
    pub timeout: Duration,
}

impl fmt::Debug for TranslatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorConfig")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub translator: TranslatorConfig,
    pub transport: Transport,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"<redacted>")
            .field("translator", &self.translator)
            .field("transport", &self.transport)
            .finish()
    }
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Every required value is checked here so that a bad deployment fails
    /// before anything is bound or registered with Telegram.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = required(&lookup, "BOT_TOKEN")?;
        let api_key = required(&lookup, "AZURE_KEY")?;
        let endpoint = required(&lookup, "AZURE_ENDPOINT")?;
        let region = required(&lookup, "LOCATION")?;

        let timeout_secs = match optional(&lookup, "TRANSLATOR_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        var: "TRANSLATOR_TIMEOUT_SECS",
                        reason: "must be greater than zero".to_string(),
                    })
                }
                Ok(secs) => secs,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        var: "TRANSLATOR_TIMEOUT_SECS",
                        reason: e.to_string(),
                    })
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        let mode = optional(&lookup, "BOT_MODE").unwrap_or_else(|| "webhook".to_string());
        let transport = match mode.to_ascii_lowercase().as_str() {
            "webhook" => webhook_transport(&lookup)?,
            "polling" => Transport::Polling,
            other => {
                return Err(ConfigError::Invalid {
                    var: "BOT_MODE",
                    reason: format!("expected 'webhook' or 'polling', got '{}'", other),
                })
            }
        };

        Ok(Self {
            bot_token,
            translator: TranslatorConfig {
                api_key,
                endpoint,
                region,
                timeout: Duration::from_secs(timeout_secs),
            },
            transport,
        })
    }
}

fn webhook_transport<F>(lookup: &F) -> Result<Transport, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let port = match optional(lookup, "PORT") {
        Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
            var: "PORT",
            reason: e.to_string(),
        })?,
        None => DEFAULT_PORT,
    };

    let base = required(lookup, "WEBHOOK_URL")?;
    // The path token is independent of the bot token so the secret never
    // appears in a URL.
    let path = optional(lookup, "WEBHOOK_PATH")
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let url = webhook_url(&base, &path)?;

    Ok(Transport::Webhook { port, url })
}

/// Join the public base URL and the path token into the URL Telegram calls.
fn webhook_url(base: &str, path: &str) -> Result<Url, ConfigError> {
    let mut base = Url::parse(base).map_err(|e| ConfigError::Invalid {
        var: "WEBHOOK_URL",
        reason: e.to_string(),
    })?;
    if base.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            var: "WEBHOOK_URL",
            reason: "not a base URL".to_string(),
        });
    }
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }

    let path = path.trim_matches('/');
    if path.is_empty() || path.contains('/') {
        return Err(ConfigError::Invalid {
            var: "WEBHOOK_PATH",
            reason: "must be a single non-empty path segment".to_string(),
        });
    }

    base.join(path).map_err(|e| ConfigError::Invalid {
        var: "WEBHOOK_PATH",
        reason: e.to_string(),
    })
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or(ConfigError::Missing(key))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Empty(key));
    }
    Ok(value.to_string())
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
