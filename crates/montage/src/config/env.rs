//! Environment overrides for deployments that cannot edit the config file.
//!
//! | Variable                     | Field                          |
//! |------------------------------|--------------------------------|
//! | `MONTAGE_DATA_DIR`           | `data_directory`               |
//! | `MONTAGE_PORT`               | `server.port`                  |
//! | `MONTAGE_FFMPEG`             | `media.ffmpeg_path`            |
//! | `MONTAGE_FFPROBE`            | `media.ffprobe_path`           |
//! | `MONTAGE_CAPTION_ENDPOINT`   | `captioning.endpoint`          |
//! | `MONTAGE_EMBEDDING_ENDPOINT` | `matching.embedding_endpoint`  |
//!
//! Empty values are ignored.

use std::path::PathBuf;

use crate::config::schema::Config;
use crate::error::ConfigError;

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Applies overrides in place and returns the names of the variables used.
pub fn apply_env_overrides(config: &mut Config) -> Result<Vec<&'static str>, ConfigError> {
    let mut applied = Vec::new();

    if let Some(dir) = var("MONTAGE_DATA_DIR") {
        config.data_directory = PathBuf::from(dir);
        applied.push("MONTAGE_DATA_DIR");
    }
    if let Some(port) = var("MONTAGE_PORT") {
        config.server.port = port.trim().parse().map_err(|_| ConfigError::Validation {
            message: format!("MONTAGE_PORT is not a valid port: {}", port),
        })?;
        applied.push("MONTAGE_PORT");
    }
    if let Some(path) = var("MONTAGE_FFMPEG") {
        config.media.ffmpeg_path = PathBuf::from(path);
        applied.push("MONTAGE_FFMPEG");
    }
    if let Some(path) = var("MONTAGE_FFPROBE") {
        config.media.ffprobe_path = PathBuf::from(path);
        applied.push("MONTAGE_FFPROBE");
    }
    if let Some(url) = var("MONTAGE_CAPTION_ENDPOINT") {
        config.captioning.endpoint = Some(url);
        applied.push("MONTAGE_CAPTION_ENDPOINT");
    }
    if let Some(url) = var("MONTAGE_EMBEDDING_ENDPOINT") {
        config.matching.embedding_endpoint = Some(url);
        applied.push("MONTAGE_EMBEDDING_ENDPOINT");
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL: &[&str] = &[
        "MONTAGE_DATA_DIR",
        "MONTAGE_PORT",
        "MONTAGE_FFMPEG",
        "MONTAGE_FFPROBE",
        "MONTAGE_CAPTION_ENDPOINT",
        "MONTAGE_EMBEDDING_ENDPOINT",
    ];

    fn clear() {
        for name in ALL {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_no_variables_changes_nothing() {
        clear();
        let mut config = Config::default();
        let applied = apply_env_overrides(&mut config).unwrap();
        assert!(applied.is_empty());
        assert_eq!(config.server.port, 10000);
    }

    #[test]
    #[serial]
    fn test_overrides_are_applied() {
        clear();
        std::env::set_var("MONTAGE_DATA_DIR", "/srv/montage");
        std::env::set_var("MONTAGE_PORT", "8088");
        std::env::set_var("MONTAGE_CAPTION_ENDPOINT", "http://captioner:9000/caption");

        let mut config = Config::default();
        let applied = apply_env_overrides(&mut config).unwrap();
        clear();

        assert_eq!(
            applied,
            vec!["MONTAGE_DATA_DIR", "MONTAGE_PORT", "MONTAGE_CAPTION_ENDPOINT"]
        );
        assert_eq!(config.data_directory, PathBuf::from("/srv/montage"));
        assert_eq!(config.server.port, 8088);
        assert_eq!(
            config.captioning.endpoint.as_deref(),
            Some("http://captioner:9000/caption")
        );
        assert!(config.matching.embedding_endpoint.is_none());
    }

    #[test]
    #[serial]
    fn test_empty_values_are_ignored() {
        clear();
        std::env::set_var("MONTAGE_FFMPEG", "  ");
        let mut config = Config::default();
        let applied = apply_env_overrides(&mut config).unwrap();
        clear();

        assert!(applied.is_empty());
        assert_eq!(config.media.ffmpeg_path, PathBuf::from("ffmpeg"));
    }

    #[test]
    #[serial]
    fn test_invalid_port_is_rejected() {
        clear();
        std::env::set_var("MONTAGE_PORT", "not-a-port");
        let result = apply_env_overrides(&mut Config::default());
        clear();

        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }
}
