use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    /// Holds `montage.db` and the `artifacts/` blob directory.
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub captioning: CaptioningConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_data_directory() -> PathBuf {
    crate::db::default_data_directory().unwrap_or_else(|| PathBuf::from("./data"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_directory: default_data_directory(),
            server: ServerConfig::default(),
            media: MediaConfig::default(),
            segmentation: SegmentationConfig::default(),
            captioning: CaptioningConfig::default(),
            matching: MatchingConfig::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        crate::db::database_path(&self.data_directory)
    }

    pub fn artifact_directory(&self) -> PathBuf {
        self.data_directory.join("artifacts")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_max_upload_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Re-encode extracted clips for frame-accurate cuts. Stream copy is
    /// faster but snaps to keyframes.
    #[serde(default = "default_true")]
    pub reencode_clips: bool,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_allowed_extensions() -> Vec<String> {
    ["mp4", "mov", "avi", "mkv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            allowed_extensions: default_allowed_extensions(),
            reencode_clips: true,
        }
    }
}

impl MediaConfig {
    /// Case-insensitive check against `allowed_extensions`.
    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// ffmpeg scene-change score in (0, 1].
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_min_scene_seconds")]
    pub min_scene_seconds: f64,
    #[serde(default = "default_max_scenes")]
    pub max_scenes: usize,
}

fn default_threshold() -> f64 {
    0.3
}

fn default_min_scene_seconds() -> f64 {
    1.0
}

fn default_max_scenes() -> usize {
    200
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_scene_seconds: default_min_scene_seconds(),
            max_scenes: default_max_scenes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptioningConfig {
    /// Captioning service URL. Without one, scenes get positional captions.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_caption_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_caption_timeout")]
    pub timeout_secs: u64,
}

fn default_caption_concurrency() -> usize {
    std::cmp::max(2, num_cpus::get() * 3 / 4)
}

fn default_caption_timeout() -> u64 {
    120
}

impl Default for CaptioningConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            concurrency: default_caption_concurrency(),
            timeout_secs: default_caption_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Cost of assigning a segment to an earlier scene than its predecessor.
    #[serde(default = "default_out_of_order_penalty")]
    pub out_of_order_penalty: f64,
    /// Embedding service URL. Without one, the lexical scorer is used.
    #[serde(default)]
    pub embedding_endpoint: Option<String>,
    #[serde(default = "default_caption_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on cached embedding vectors, shared by all jobs.
    #[serde(default = "default_embedding_cache_capacity")]
    pub embedding_cache_capacity: u64,
}

fn default_out_of_order_penalty() -> f64 {
    0.15
}

fn default_embedding_cache_capacity() -> u64 {
    10_000
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            out_of_order_penalty: default_out_of_order_penalty(),
            embedding_endpoint: None,
            timeout_secs: default_caption_timeout(),
            embedding_cache_capacity: default_embedding_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Dispatch stages as soon as a job is submitted.
    #[serde(default = "default_true")]
    pub auto_start: bool,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            auto_start: true,
            event_capacity: default_event_capacity(),
        }
    }
}
