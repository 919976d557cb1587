//! Scene segmentation: splits a source video into ordered intervals.

pub mod ffmpeg;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaError;

pub use ffmpeg::FfmpegSegmenter;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Video could not be decoded: {0}")]
    Decode(#[from] MediaError),

    #[error("No scenes detected")]
    NoScenes,
}

/// A `[start, end)` interval in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneInterval {
    pub start: f64,
    pub end: f64,
}

impl SceneInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn midpoint(&self) -> f64 {
        self.start + self.duration() / 2.0
    }
}

#[async_trait]
pub trait SceneSegmenter: Send + Sync {
    /// Returns scene intervals for `video`. Must fail rather than return an
    /// empty list when the video cannot be decoded.
    async fn segment(&self, video: &Path) -> Result<Vec<SceneInterval>, SegmentError>;
}

/// Brings arbitrary segmenter output into canonical form: finite, non-empty,
/// sorted by start and pairwise non-overlapping. Overlaps are resolved by
/// moving the later interval's start to the earlier one's end.
pub fn normalize_intervals(intervals: Vec<SceneInterval>) -> Vec<SceneInterval> {
    let mut valid: Vec<SceneInterval> = intervals
        .into_iter()
        .filter(|i| i.start.is_finite() && i.end.is_finite())
        .map(|i| SceneInterval::new(i.start.max(0.0), i.end))
        .filter(|i| i.end > i.start)
        .collect();

    valid.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));

    let mut result: Vec<SceneInterval> = Vec::with_capacity(valid.len());
    for interval in valid {
        let start = match result.last() {
            Some(prev) => interval.start.max(prev.end),
            None => interval.start,
        };
        if interval.end > start {
            result.push(SceneInterval::new(start, interval.end));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn iv(start: f64, end: f64) -> SceneInterval {
        SceneInterval::new(start, end)
    }

    #[test]
    fn test_sorted_input_is_unchanged() {
        let input = vec![iv(0.0, 2.0), iv(2.0, 5.0), iv(7.0, 9.0)];
        assert_eq!(normalize_intervals(input.clone()), input);
    }

    #[test]
    fn test_unsorted_and_overlapping() {
        let input = vec![iv(4.0, 8.0), iv(0.0, 5.0), iv(6.0, 7.0), iv(9.0, 10.0)];
        assert_eq!(
            normalize_intervals(input),
            vec![iv(0.0, 5.0), iv(5.0, 8.0), iv(9.0, 10.0)]
        );
    }

    #[test]
    fn test_drops_invalid_intervals() {
        let input = vec![
            iv(3.0, 3.0),
            iv(5.0, 4.0),
            iv(f64::NAN, 1.0),
            iv(0.0, f64::INFINITY),
            iv(-2.0, 1.0),
        ];
        assert_eq!(normalize_intervals(input), vec![iv(0.0, 1.0)]);
    }

    #[test]
    fn test_interval_helpers() {
        let i = iv(2.0, 6.0);
        assert_eq!(i.duration(), 4.0);
        assert_eq!(i.midpoint(), 4.0);
    }

    #[test]
    fn test_random_interval_sets_come_out_ordered_and_disjoint() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let count = rng.gen_range(0..20);
            let input: Vec<SceneInterval> = (0..count)
                .map(|_| {
                    let start = rng.gen_range(-5.0..100.0);
                    let len = rng.gen_range(-3.0..15.0);
                    iv(start, start + len)
                })
                .collect();

            let output = normalize_intervals(input);
            for interval in &output {
                assert!(interval.start >= 0.0);
                assert!(interval.end > interval.start);
            }
            for pair in output.windows(2) {
                assert!(pair[0].start < pair[1].start, "not ordered: {:?}", pair);
                assert!(pair[0].end <= pair[1].start, "overlap: {:?}", pair);
            }
        }
    }
}
