use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;
use url::Url;

use crate::nitter::MirrorConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Nitter mirror
    pub mirror: MirrorConfig,
    pub fetch_timeout: Duration,
    /// Upper bound of the randomized pause between successive mirror requests.
    pub politeness_delay: Duration,

    // Feed window
    pub window_hours: u32,
    pub max_per_account: usize,
    pub accounts_file: PathBuf,

    // Rendering
    pub display_timezone: Tz,

    // Database
    pub database_path: PathBuf,

    // Images
    pub image_dir: PathBuf,
    pub image_server_path: Option<PathBuf>,
    pub image_server_url: Option<String>,

    // Mail
    pub smtp: Option<SmtpConfig>,
}

/// SMTP delivery settings. Present only when every variable is set.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_base_url(&required_env("NITTER_BASE_URL")?)?;
        let max_depth = parse_env_usize("MAX_QUOTE_DEPTH", crate::nitter::DEFAULT_MAX_DEPTH)?;

        Ok(Self {
            // Nitter mirror
            mirror: MirrorConfig::new(base_url).with_max_depth(max_depth),
            fetch_timeout: Duration::from_secs(parse_env_u64("FETCH_TIMEOUT_SECS", 15)?),
            politeness_delay: Duration::from_millis(parse_env_u64("POLITENESS_DELAY_MS", 1000)?),

            // Feed window
            window_hours: parse_env_u32("WINDOW_HOURS", 24)?,
            max_per_account: parse_env_usize("MAX_PER_ACCOUNT", 10)?,
            accounts_file: PathBuf::from(env_or_default("ACCOUNTS_FILE", "accounts.toml")),

            // Rendering
            display_timezone: parse_timezone(&env_or_default("DISPLAY_TIMEZONE", "UTC"))?,

            // Database
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/newsletter.sqlite",
            )),

            // Images
            image_dir: PathBuf::from(env_or_default("IMAGE_DIR", "./images")),
            image_server_path: optional_env("IMAGE_SERVER_PATH").map(PathBuf::from),
            image_server_url: optional_env("IMAGE_SERVER_URL"),

            // Mail
            smtp: smtp_from_env()?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mirror.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_QUOTE_DEPTH".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_per_account == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_PER_ACCOUNT".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.image_server_path.is_some() != self.image_server_url.is_some() {
            return Err(ConfigError::InvalidValue {
                name: "IMAGE_SERVER_PATH".to_string(),
                message: "IMAGE_SERVER_PATH and IMAGE_SERVER_URL must be set together".to_string(),
            });
        }
        Ok(())
    }

    /// Configuration with every field populated, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        let base_url = Url::parse("http://127.0.0.1:8080/").expect("valid test URL");
        Self {
            mirror: MirrorConfig::new(base_url),
            fetch_timeout: Duration::from_secs(5),
            politeness_delay: Duration::ZERO,
            window_hours: 24,
            max_per_account: 10,
            accounts_file: PathBuf::from("accounts.toml"),
            display_timezone: Tz::UTC,
            database_path: PathBuf::from("./data/test.sqlite"),
            image_dir: PathBuf::from("./data/images"),
            image_server_path: None,
            image_server_url: None,
            smtp: None,
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| ConfigError::InvalidValue {
        name: "NITTER_BASE_URL".to_string(),
        message: e.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidValue {
            name: "NITTER_BASE_URL".to_string(),
            message: format!("must be an http(s) URL, got '{value}'"),
        });
    }
    Ok(url)
}

fn parse_timezone(value: &str) -> Result<Tz, ConfigError> {
    value.parse::<Tz>().map_err(|_| ConfigError::InvalidValue {
        name: "DISPLAY_TIMEZONE".to_string(),
        message: format!("unknown timezone '{value}'"),
    })
}

/// SMTP settings are all-or-nothing; a partial set is reported, not ignored.
fn smtp_from_env() -> Result<Option<SmtpConfig>, ConfigError> {
    let names = [
        "SMTP_HOST",
        "SMTP_USER",
        "SMTP_PASS",
        "MAIL_FROM",
        "MAIL_TO",
    ];
    let values: Vec<Option<String>> = names.iter().map(|n| optional_env(n)).collect();

    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    if let Some(pos) = values.iter().position(Option::is_none) {
        return Err(ConfigError::MissingEnvVar(names[pos].to_string()));
    }

    let mut values = values.into_iter().flatten();
    let mut next = || values.next().unwrap_or_default();
    let (host, username, password, from, to) = (next(), next(), next(), next(), next());

    Ok(Some(SmtpConfig {
        host,
        port: parse_env_u16("SMTP_PORT", 587)?,
        username,
        password,
        from,
        to,
    }))
}
