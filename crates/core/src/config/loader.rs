use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variable carrying the sink address in existing deployments.
pub const SINK_URL_ENV: &str = "RTMP_URL";

/// Load configuration from file with environment variable overrides.
///
/// `PLAYOUT_SECTION__KEY` overrides `[section] key`; `RTMP_URL` overrides
/// `transmit.sink_url`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("PLAYOUT_").split("__"))
        .merge(
            Env::raw()
                .only(&[SINK_URL_ENV])
                .map(|_| "transmit.sink_url".into()),
        )
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
