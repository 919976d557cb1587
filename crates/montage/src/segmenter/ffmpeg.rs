//! Content-change segmentation using ffmpeg's scene score.

use std::path::Path;

use async_trait::async_trait;

use super::{SceneInterval, SceneSegmenter, SegmentError};
use crate::config::SegmentationConfig;
use crate::media::FfmpegTools;
use crate::sanitize;

pub struct FfmpegSegmenter {
    tools: FfmpegTools,
    config: SegmentationConfig,
}

impl FfmpegSegmenter {
    pub fn new(tools: FfmpegTools, config: SegmentationConfig) -> Self {
        Self { tools, config }
    }
}

#[async_trait]
impl SceneSegmenter for FfmpegSegmenter {
    async fn segment(&self, video: &Path) -> Result<Vec<SceneInterval>, SegmentError> {
        let duration = self.tools.probe_duration(video).await?;
        let cuts = self
            .tools
            .detect_cuts(video, self.config.threshold)
            .await?;

        tracing::debug!(
            video = %sanitize::redact_path(video),
            duration,
            cuts = cuts.len(),
            "Scene cuts detected"
        );

        let intervals = cuts_to_intervals(&cuts, duration, self.config.min_scene_seconds);
        let intervals = keep_longest(intervals, self.config.max_scenes);
        if intervals.is_empty() {
            return Err(SegmentError::NoScenes);
        }
        Ok(intervals)
    }
}

/// Turns cut timestamps into contiguous intervals covering `[0, duration)`.
///
/// A scene shorter than `min_len` is folded into its predecessor; a short
/// first scene is folded into the next one instead.
pub fn cuts_to_intervals(cuts: &[f64], duration: f64, min_len: f64) -> Vec<SceneInterval> {
    if !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }

    let mut boundaries: Vec<f64> = cuts
        .iter()
        .copied()
        .filter(|c| c.is_finite() && *c > 0.0 && *c < duration)
        .collect();
    boundaries.sort_by(|a, b| a.total_cmp(b));
    boundaries.dedup();

    let mut intervals: Vec<SceneInterval> = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0.0;
    for cut in boundaries.into_iter().chain(std::iter::once(duration)) {
        let candidate = SceneInterval::new(start, cut);
        match intervals.last_mut() {
            Some(prev) if candidate.duration() < min_len => prev.end = cut,
            _ => intervals.push(candidate),
        }
        start = cut;
    }

    if intervals.len() > 1 && intervals[0].duration() < min_len {
        let first = intervals.remove(0);
        intervals[0].start = first.start;
    }
    intervals
}

/// Keeps the `max` longest scenes, returned in playback order.
pub fn keep_longest(mut intervals: Vec<SceneInterval>, max: usize) -> Vec<SceneInterval> {
    if intervals.len() <= max {
        return intervals;
    }
    intervals.sort_by(|a, b| b.duration().total_cmp(&a.duration()).then(a.start.total_cmp(&b.start)));
    intervals.truncate(max);
    intervals.sort_by(|a, b| a.start.total_cmp(&b.start));
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: f64, end: f64) -> SceneInterval {
        SceneInterval::new(start, end)
    }

    #[test]
    fn test_no_cuts_gives_single_scene() {
        assert_eq!(cuts_to_intervals(&[], 12.0, 1.0), vec![iv(0.0, 12.0)]);
    }

    #[test]
    fn test_cuts_become_contiguous_intervals() {
        assert_eq!(
            cuts_to_intervals(&[4.0, 9.5], 20.0, 1.0),
            vec![iv(0.0, 4.0), iv(4.0, 9.5), iv(9.5, 20.0)]
        );
    }

    #[test]
    fn test_short_scenes_are_merged() {
        assert_eq!(
            cuts_to_intervals(&[4.0, 4.3, 10.0, 19.8], 20.0, 1.0),
            vec![iv(0.0, 4.3), iv(4.3, 10.0), iv(10.0, 20.0)]
        );
    }

    #[test]
    fn test_short_first_scene_joins_next() {
        assert_eq!(
            cuts_to_intervals(&[0.2, 5.0], 10.0, 1.0),
            vec![iv(0.0, 5.0), iv(5.0, 10.0)]
        );
    }

    #[test]
    fn test_out_of_range_and_duplicate_cuts_ignored() {
        assert_eq!(
            cuts_to_intervals(&[-1.0, 0.0, 5.0, 5.0, 30.0, f64::NAN], 10.0, 0.5),
            vec![iv(0.0, 5.0), iv(5.0, 10.0)]
        );
    }

    #[test]
    fn test_invalid_duration() {
        assert!(cuts_to_intervals(&[1.0], 0.0, 1.0).is_empty());
        assert!(cuts_to_intervals(&[1.0], f64::NAN, 1.0).is_empty());
    }

    #[test]
    fn test_keep_longest_preserves_order() {
        let intervals = vec![iv(0.0, 1.0), iv(1.0, 6.0), iv(6.0, 8.0), iv(8.0, 15.0)];
        assert_eq!(
            keep_longest(intervals.clone(), 2),
            vec![iv(1.0, 6.0), iv(8.0, 15.0)]
        );
        assert_eq!(keep_longest(intervals.clone(), 10), intervals);
    }

    #[tokio::test]
    async fn test_undecodable_video_fails_cleanly() {
        let segmenter = FfmpegSegmenter::new(
            FfmpegTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe"),
            SegmentationConfig::default(),
        );
        let result = segmenter.segment(Path::new("missing.mp4")).await;
        assert!(matches!(result, Err(SegmentError::Decode(_))));
    }
}
