//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Path to the themes directory (default: ./themes).
    pub themes_dir: PathBuf,

    /// Path to the local cache directory holding running theme
    /// configuration and compiled views (default: ./var/cache).
    pub cache_dir: PathBuf,

    /// Site name used in outgoing notifications (default: "Atrium").
    pub site_name: String,

    /// Public site URL for constructing links in emails.
    pub site_url: String,

    /// Whether self-registration is open (default: false).
    ///
    /// Decides the access level needed to create or import users.
    pub registration_enabled: bool,

    /// Number of BCC recipients per outgoing bulk message (default: 100).
    pub mail_batch_size: usize,

    /// SMTP host for email delivery. When None, email is disabled.
    pub smtp_host: Option<String>,

    /// SMTP port (default: 587).
    pub smtp_port: u16,

    /// SMTP username for authentication.
    pub smtp_username: Option<String>,

    /// SMTP password for authentication.
    pub smtp_password: Option<String>,

    /// SMTP encryption mode: "starttls" (default), "tls", or "none".
    pub smtp_encryption: String,

    /// From address for outgoing email.
    pub smtp_from_email: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let themes_dir = env::var("THEMES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./themes"));

        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./var/cache"));

        let site_name = env::var("SITE_NAME").unwrap_or_else(|_| "Atrium".to_string());
        let site_url = env::var("SITE_URL").unwrap_or_else(|_| "http://localhost".to_string());

        let registration_enabled = env::var("REGISTRATION_ENABLED")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let mail_batch_size = env::var("MAIL_BATCH_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .context("MAIL_BATCH_SIZE must be a valid usize")?;

        let smtp_host = env::var("SMTP_HOST").ok();

        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .context("SMTP_PORT must be a valid u16")?;

        let smtp_username = env::var("SMTP_USERNAME").ok();
        let smtp_password = env::var("SMTP_PASSWORD").ok();

        let smtp_encryption = env::var("SMTP_ENCRYPTION")
            .unwrap_or_else(|_| "starttls".to_string())
            .to_lowercase();

        let smtp_from_email =
            env::var("SMTP_FROM_EMAIL").unwrap_or_else(|_| "noreply@localhost".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            themes_dir,
            cache_dir,
            site_name,
            site_url,
            registration_enabled,
            mail_batch_size,
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            smtp_encryption,
            smtp_from_email,
        })
    }
}

/// SMTP transport settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub encryption: String,
}

impl Config {
    /// SMTP settings, or `None` when mail is disabled.
    pub fn smtp(&self) -> Option<SmtpConfig> {
        self.smtp_host.as_ref().map(|host| SmtpConfig {
            host: host.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            encryption: self.smtp_encryption.clone(),
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" yes "));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn smtp_disabled_without_host() {
        let mut config = Config {
            database_url: "postgres://localhost/atrium".to_string(),
            database_max_connections: 10,
            themes_dir: PathBuf::from("./themes"),
            cache_dir: PathBuf::from("./var/cache"),
            site_name: "Atrium".to_string(),
            site_url: "http://localhost".to_string(),
            registration_enabled: false,
            mail_batch_size: 100,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_encryption: "starttls".to_string(),
            smtp_from_email: "noreply@localhost".to_string(),
        };
        assert!(config.smtp().is_none());

        config.smtp_host = Some("mail.example.com".to_string());
        let smtp = config.smtp().unwrap();
        assert_eq!(smtp.host, "mail.example.com");
        assert_eq!(smtp.port, 587);
    }
}
