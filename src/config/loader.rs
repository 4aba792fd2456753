//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::{AppConfig, AppSettings, FeedConfig, ResilienceConfig};
use crate::common::errors::{ClientError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with SIGNAL_FEED__, e.g. `SIGNAL_FEED__FEED__CLIENT_ID`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("SIGNAL_FEED")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ClientError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ClientError::Configuration(e.to_string()))
}

/// Load configuration from environment variables only
pub fn load_from_env() -> Result<AppConfig> {
    // Try to load from .env file
    dotenvy::dotenv().ok();

    let defaults = FeedConfig::default();
    let feed = FeedConfig {
        server_url: std::env::var("SIGNAL_FEED_SERVER_URL").unwrap_or(defaults.server_url),
        client_id: std::env::var("SIGNAL_FEED_CLIENT_ID").unwrap_or_default(),
        password: std::env::var("SIGNAL_FEED_PASSWORD").unwrap_or_default(),
        stream_url: std::env::var("SIGNAL_FEED_STREAM_URL").ok(),
        stream_path: defaults.stream_path,
    };

    Ok(AppConfig {
        feed,
        resilience: ResilienceConfig::default(),
        settings: AppSettings::default(),
    })
}

/// Fill feed settings the file and `SIGNAL_FEED__*` variables left unset
/// from the flat `SIGNAL_FEED_*` variables read by [`load_from_env`].
pub fn apply_flat_env(config: &mut AppConfig, env: FeedConfig) {
    if config.feed.client_id.is_empty() {
        config.feed.client_id = env.client_id;
        config.feed.password = env.password;
    }
    if config.feed.server_url == FeedConfig::default().server_url {
        config.feed.server_url = env.server_url;
    }
    if config.feed.stream_url.is_none() {
        config.feed.stream_url = env.stream_url;
    }
}
