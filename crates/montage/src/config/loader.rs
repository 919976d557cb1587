use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    let seg = &config.segmentation;
    if !(seg.threshold > 0.0 && seg.threshold <= 1.0) {
        return Err(invalid(format!(
            "segmentation.threshold must be in (0, 1], got {}",
            seg.threshold
        )));
    }
    if !seg.min_scene_seconds.is_finite() || seg.min_scene_seconds < 0.0 {
        return Err(invalid("segmentation.min_scene_seconds must be >= 0"));
    }
    if seg.max_scenes == 0 {
        return Err(invalid("segmentation.max_scenes must be at least 1"));
    }

    if config.captioning.concurrency == 0 {
        return Err(invalid("captioning.concurrency must be at least 1"));
    }

    let penalty = config.matching.out_of_order_penalty;
    if !penalty.is_finite() || penalty < 0.0 {
        return Err(invalid("matching.out_of_order_penalty must be >= 0"));
    }
    if config.matching.embedding_cache_capacity == 0 {
        return Err(invalid("matching.embedding_cache_capacity must be at least 1"));
    }

    for (name, url) in [
        ("captioning.endpoint", &config.captioning.endpoint),
        ("matching.embedding_endpoint", &config.matching.embedding_endpoint),
    ] {
        if let Some(url) = url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(format!("{} must be an http(s) URL: {}", name, url)));
            }
        }
    }

    if config.media.allowed_extensions.is_empty() {
        return Err(invalid("media.allowed_extensions must not be empty"));
    }
    if config.server.max_upload_bytes == 0 {
        return Err(invalid("server.max_upload_bytes must be positive"));
    }
    if config.pipeline.event_capacity == 0 {
        return Err(invalid("pipeline.event_capacity must be at least 1"));
    }

    Ok(())
}
