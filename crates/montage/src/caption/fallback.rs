use std::path::Path;

use async_trait::async_trait;

use super::{CaptionError, CaptionGenerator};
use crate::segmenter::SceneInterval;

/// Describes a scene by where it sits in the video. Used when no captioning
/// service is configured, so matching degrades to position only.
#[derive(Debug, Clone, Default)]
pub struct FallbackCaptioner;

#[async_trait]
impl CaptionGenerator for FallbackCaptioner {
    async fn caption(&self, _video: &Path, interval: SceneInterval) -> Result<String, CaptionError> {
        Ok(format!(
            "Scene from {} to {} ({:.1}s)",
            clock(interval.start),
            clock(interval.end),
            interval.duration()
        ))
    }
}

fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
