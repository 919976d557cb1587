//! Scene captioning.
//!
//! The model behind a caption is someone else's problem: the pipeline only
//! needs one short sentence per scene interval.

pub mod fallback;
pub mod http;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::media::MediaError;
use crate::segmenter::SceneInterval;

pub use fallback::FallbackCaptioner;
pub use http::HttpCaptioner;

#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("Frame extraction failed: {0}")]
    Media(#[from] MediaError),

    #[error("Captioning request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Captioning service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed captioning response: {0}")]
    MalformedResponse(String),

    #[error("Caption for scene at {start:.3}s is empty")]
    Empty { start: f64 },
}

#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    /// One descriptive sentence for `interval` of `video`.
    async fn caption(&self, video: &Path, interval: SceneInterval) -> Result<String, CaptionError>;
}

/// Trims a caption and rejects blank ones.
pub fn clean_caption(raw: &str, interval: SceneInterval) -> Result<String, CaptionError> {
    let caption = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if caption.is_empty() {
        return Err(CaptionError::Empty {
            start: interval.start,
        });
    }
    Ok(caption)
}
