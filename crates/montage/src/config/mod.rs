pub mod env;
pub mod loader;
pub mod schema;

pub use env::apply_env_overrides;
pub use loader::{load_config, load_config_from_str, validate_config};
pub use schema::{
    CaptioningConfig, Config, MatchingConfig, MediaConfig, PipelineSettings, SegmentationConfig,
    ServerConfig,
};
