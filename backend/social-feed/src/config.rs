/// Configuration management for the social feed core
///
/// Loads configuration from environment variables.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Feed pagination and invalidation
    pub feed: FeedConfig,
    /// Notification fan-out settings
    pub notifications: NotificationConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Name stamped on invalidation signals
    pub service_name: String,
}

/// Feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Posts requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Undelivered block-list signals buffered per listener
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Display name used when a profile has no username
    #[serde(default = "default_display_name")]
    pub default_display_name: String,
}

// Default values
fn default_page_size() -> usize {
    10
}

fn default_broadcast_capacity() -> usize {
    16
}

fn default_display_name() -> String {
    "Anonymous".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_display_name: default_display_name(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig {
                env: "development".to_string(),
                service_name: "social-feed".to_string(),
            },
            feed: FeedConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

/// Parse an optional numeric variable; unset falls back to the default, garbage is an error
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "social-feed".to_string()),
        };

        let feed = FeedConfig {
            page_size: parse_var("FEED_PAGE_SIZE", default_page_size())?,
            broadcast_capacity: parse_var(
                "BLOCK_BROADCAST_CAPACITY",
                default_broadcast_capacity(),
            )?,
        };

        let notifications = NotificationConfig {
            default_display_name: std::env::var("DEFAULT_DISPLAY_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(default_display_name),
        };

        let config = Config {
            app,
            feed,
            notifications,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed.page_size == 0 {
            bail!("FEED_PAGE_SIZE must be at least 1");
        }
        if self.feed.broadcast_capacity == 0 {
            bail!("BLOCK_BROADCAST_CAPACITY must be at least 1");
        }
        Ok(())
    }
}
