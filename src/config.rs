use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MAX_CURRICULUM_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// SMTP settings for outbound mail. Absent when `SMTP_HOST` is unset.
#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub from_email: String,
    pub from_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub media_root: PathBuf,
    pub public_base_url: String,
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    pub dns_timeout: Duration,
    pub operations_email: Option<String>,
    pub smtp: Option<SmtpSettings>,
    pub download_requires_enrollment: bool,
    pub admin_token: Option<String>,
    pub max_curriculum_bytes: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let smtp = match get("SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: parse_or(get("SMTP_PORT"), "SMTP_PORT", 587)?,
                from_email: get("SMTP_FROM_EMAIL").unwrap_or_else(|| "noreply@localhost".to_string()),
                from_name: get("SMTP_FROM_NAME").unwrap_or_else(|| "Course Enrollments".to_string()),
                username: get("SMTP_USERNAME"),
                password: get("SMTP_PASSWORD"),
                use_tls: parse_bool(get("SMTP_USE_TLS"), "SMTP_USE_TLS", true)?,
            }),
            None => None,
        };

        Ok(Self {
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://catalog.db?mode=rwc".to_string()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8000".to_string()),
            media_root: PathBuf::from(get("MEDIA_ROOT").unwrap_or_else(|| "./media".to_string())),
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            webhook_url: get("ENROLLMENT_WEBHOOK_URL"),
            webhook_timeout: Duration::from_secs(parse_or(
                get("WEBHOOK_TIMEOUT_SECS"),
                "WEBHOOK_TIMEOUT_SECS",
                10,
            )?),
            dns_timeout: Duration::from_secs(parse_or(get("DNS_TIMEOUT_SECS"), "DNS_TIMEOUT_SECS", 5)?),
            operations_email: get("OPERATIONS_EMAIL"),
            smtp,
            download_requires_enrollment: parse_bool(
                get("DOWNLOAD_REQUIRES_ENROLLMENT"),
                "DOWNLOAD_REQUIRES_ENROLLMENT",
                false,
            )?,
            admin_token: get("ADMIN_TOKEN"),
            max_curriculum_bytes: parse_or(
                get("MAX_CURRICULUM_BYTES"),
                "MAX_CURRICULUM_BYTES",
                DEFAULT_MAX_CURRICULUM_BYTES,
            )?,
        })
    }

    /// Absolute URL of the curriculum download endpoint for a course.
    pub fn download_url(&self, slug: &str) -> String {
        format!("{}/courses/{}/download-curriculum/", self.public_base_url, slug)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://catalog.db?mode=rwc".to_string(),
            bind_addr: "127.0.0.1:8000".to_string(),
            media_root: PathBuf::from("./media"),
            public_base_url: "http://localhost:8000".to_string(),
            webhook_url: None,
            webhook_timeout: Duration::from_secs(10),
            dns_timeout: Duration::from_secs(5),
            operations_email: None,
            smtp: None,
            download_requires_enrollment: false,
            admin_token: None,
            max_curriculum_bytes: DEFAULT_MAX_CURRICULUM_BYTES,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn parse_bool(raw: Option<String>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}
