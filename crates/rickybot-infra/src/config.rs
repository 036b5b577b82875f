//! Configuration loader for Rickybot.
//!
//! Reads `rickybot.toml` (or the path given with `--config`) and deserializes
//! it into [`RickybotConfig`]. Falls back to defaults when the file is missing
//! or malformed, then applies environment overrides.

use std::path::Path;

use rickybot_types::config::RickybotConfig;

/// Environment variable that overrides `cookie_secret`.
pub const COOKIE_SECRET_ENV: &str = "RICKYBOT_COOKIE_SECRET";

/// Load configuration from `path`.
///
/// - If the file does not exist, returns [`RickybotConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
/// - `RICKYBOT_COOKIE_SECRET` replaces the file's `cookie_secret` when set.
pub async fn load_config(path: &Path) -> RickybotConfig {
    let config = read_config_file(path).await;
    apply_env_overrides(config, |name| std::env::var(name).ok())
}

async fn read_config_file(path: &Path) -> RickybotConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return RickybotConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return RickybotConfig::default();
        }
    };

    match toml::from_str::<RickybotConfig>(&content) {
        Ok(config) => {
            tracing::debug!("Loaded config from {}", path.display());
            config
        }
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            RickybotConfig::default()
        }
    }
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(mut config: RickybotConfig, lookup: F) -> RickybotConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = lookup(COOKIE_SECRET_ENV).filter(|s| !s.is_empty()) {
        config.cookie_secret = Some(secret);
    }
    config
}
