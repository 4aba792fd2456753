//! Application configuration

pub mod loader;
pub mod types;

pub use loader::{apply_flat_env, load_config, load_from_env};
pub use types::{AppConfig, AppSettings, FeedConfig, ResilienceConfig};
