use super::{types::Config, ConfigError};

/// Validate configuration.
///
/// Everything checked here is fatal at startup: a missing sink address or
/// overlay asset is never retried.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let sink = config.transmit.sink_url.as_deref().unwrap_or_default();
    if sink.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "transmit.sink_url is not set (set it in the config file or via RTMP_URL)"
                .to_string(),
        ));
    }

    if !config.transmit.overlay_path.is_file() {
        return Err(ConfigError::ValidationError(format!(
            "overlay asset not found: {}",
            config.transmit.overlay_path.display()
        )));
    }

    if let Some(font) = &config.transmit.label.font_file {
        if !font.is_file() {
            return Err(ConfigError::ValidationError(format!(
                "label font file not found: {}",
                font.display()
            )));
        }
    }

    if config.retry.max_consecutive_catalog_failures == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_consecutive_catalog_failures must be at least 1".to_string(),
        ));
    }

    if config.retry.max_consecutive_spawn_failures == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_consecutive_spawn_failures must be at least 1".to_string(),
        ));
    }

    if let Some(interstitial) = &config.interstitial {
        if interstitial.source.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "interstitial.source cannot be empty".to_string(),
            ));
        }
    }

    if config.server.enabled && config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;
    use tempfile::NamedTempFile;

    fn config_with_overlay(overlay: &std::path::Path, extra: &str) -> Config {
        let toml = format!(
            r#"
[transmit]
sink_url = "rtmp://localhost/live/key"
overlay_path = "{}"
{}
"#,
            overlay.display(),
            extra
        );
        load_config_from_str(&toml).unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        let overlay = NamedTempFile::new().unwrap();
        let config = config_with_overlay(overlay.path(), "");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_missing_sink_fails() {
        let overlay = NamedTempFile::new().unwrap();
        let mut config = config_with_overlay(overlay.path(), "");
        config.transmit.sink_url = None;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("sink_url"));

        config.transmit.sink_url = Some("   ".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_missing_overlay_fails() {
        let toml = r#"
[transmit]
sink_url = "rtmp://localhost/live/key"
overlay_path = "/nonexistent/overlay.png"
"#;
        let config = load_config_from_str(toml).unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("overlay"));
    }

    #[test]
    fn test_validate_zero_retry_limit_fails() {
        let overlay = NamedTempFile::new().unwrap();
        let config = config_with_overlay(
            overlay.path(),
            "[retry]\nmax_consecutive_catalog_failures = 0",
        );
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_interstitial_fails() {
        let overlay = NamedTempFile::new().unwrap();
        let config = config_with_overlay(overlay.path(), "[interstitial]\nsource = \"\"");
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_server_port_zero_fails() {
        let overlay = NamedTempFile::new().unwrap();
        let config = config_with_overlay(overlay.path(), "[server]\nenabled = true\nport = 0");
        assert!(validate_config(&config).is_err());
    }
}
