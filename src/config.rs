//! Configuration types.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default DATA size limit: 32 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Default name announced in the SMTP greeting.
pub const DEFAULT_SMTP_HOSTNAME: &str = "paperless-smtp";

/// Every environment variable the bridge reads, with a short description.
pub const RECOGNIZED_VARS: &[(&str, &str)] = &[
    ("PAPERLESS_URL", "base URL of the Paperless-ngx instance (required)"),
    ("PAPERLESS_USERNAME", "Paperless-ngx user (required)"),
    ("PAPERLESS_PASSWORD", "Paperless-ngx password (required)"),
    ("EMAIL_DOMAIN", "recipient domain accepted for tagging (required)"),
    ("SMTP_HOST", "address the SMTP listener binds to (required)"),
    ("SMTP_PORT", "port the SMTP listener binds to (required)"),
    ("LOG_LEVEL", "DEBUG, INFO, WARNING, ERROR or CRITICAL (default INFO)"),
    ("SMTP_MAX_MESSAGE_SIZE", "maximum message size in bytes (default 33554432)"),
    ("SMTP_HOSTNAME", "name announced in the SMTP greeting (default paperless-smtp)"),
];

/// Connection settings for the Paperless-ngx backend.
#[derive(Debug, Clone)]
pub struct PaperlessConfig {
    /// Base URL as configured, without trailing slash.
    pub url: String,
    pub username: String,
    pub password: SecretString,
}

impl PaperlessConfig {
    /// Root of the REST API (`{url}/api`).
    pub fn api_base(&self) -> String {
        format!("{}/api", self.url)
    }
}

/// SMTP listener settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Name used in the greeting and EHLO reply.
    pub hostname: String,
    /// Largest accepted DATA payload, in bytes.
    pub max_message_size: usize,
}

impl SmtpConfig {
    /// Listener settings with default hostname and size limit.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            hostname: DEFAULT_SMTP_HOSTNAME.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Full bridge configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub paperless: PaperlessConfig,
    pub smtp: SmtpConfig,
    /// Recipients outside this domain contribute no tags.
    pub email_domain: String,
    /// Raw `LOG_LEVEL` value.
    pub log_level: String,
}

impl BridgeConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// All missing required keys are reported together.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        let mut required = |key: &str| {
            let value = get(key);
            if value.is_none() {
                missing.push(key.to_string());
            }
            value.unwrap_or_default()
        };

        let url = required("PAPERLESS_URL");
        let username = required("PAPERLESS_USERNAME");
        let password = required("PAPERLESS_PASSWORD");
        let email_domain = required("EMAIL_DOMAIN");
        let host = required("SMTP_HOST");
        let port = required("SMTP_PORT");

        if !missing.is_empty() {
            return Err(ConfigError::Missing {
                missing,
                help: help_text(),
            });
        }

        let port: u16 = port.parse().map_err(|e| ConfigError::InvalidValue {
            key: "SMTP_PORT".into(),
            message: format!("{port:?} is not a valid port: {e}"),
        })?;

        let max_message_size = match get("SMTP_MAX_MESSAGE_SIZE") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "SMTP_MAX_MESSAGE_SIZE".into(),
                message: format!("{raw:?} is not a byte count: {e}"),
            })?,
            None => DEFAULT_MAX_MESSAGE_SIZE,
        };

        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string());
        if level_directive(&log_level).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "LOG_LEVEL".into(),
                message: format!("unknown level {log_level:?}"),
            });
        }

        let email_domain = email_domain.trim_start_matches('@').to_string();

        Ok(Self {
            paperless: PaperlessConfig {
                url: url.trim_end_matches('/').to_string(),
                username,
                password: SecretString::from(password),
            },
            smtp: SmtpConfig {
                host,
                port,
                hostname: get("SMTP_HOSTNAME").unwrap_or_else(|| DEFAULT_SMTP_HOSTNAME.to_string()),
                max_message_size,
            },
            email_domain,
            log_level,
        })
    }

    /// `tracing` filter directive for the configured `LOG_LEVEL`.
    pub fn log_directive(&self) -> &'static str {
        level_directive(&self.log_level).unwrap_or("info")
    }
}

/// Map Python-style level names onto `tracing` filter directives.
fn level_directive(level: &str) -> Option<&'static str> {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => Some("trace"),
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARN" | "WARNING" => Some("warn"),
        "ERROR" | "CRITICAL" | "FATAL" => Some("error"),
        "OFF" => Some("off"),
        _ => None,
    }
}

fn help_text() -> String {
    let vars: Vec<String> = RECOGNIZED_VARS
        .iter()
        .map(|(name, desc)| format!("{name}: {desc}"))
        .collect();
    format!("Recognized variables: {}", vars.join("; "))
}
