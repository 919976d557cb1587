//! Final montage assembly.
//!
//! An [`AssemblyPlan`] is the frozen match set turned into an ordered clip
//! list: one clip per summary segment, in segment order. A scene matched by
//! several segments appears several times.

pub mod ffmpeg;

use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::media::MediaError;
use crate::model::{Match, Scene, SummarySegment};

pub use ffmpeg::FfmpegAssembler;

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("Nothing to assemble")]
    EmptyPlan,

    #[error("Segment '{0}' has no match")]
    MissingMatch(String),

    #[error("Segment '{segment_id}' points at unknown scene '{scene_id}'")]
    UnknownScene {
        segment_id: String,
        scene_id: String,
    },

    #[error("Scene '{scene_id}' has an empty interval [{start:.3}, {end:.3})")]
    InvalidInterval { scene_id: String, start: f64, end: f64 },

    #[error("Clip {index} could not be extracted: {source}")]
    Clip {
        index: usize,
        #[source]
        source: MediaError,
    },

    #[error("Concatenation failed: {0}")]
    Concat(#[source] MediaError),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedClip {
    pub segment_rank: u32,
    pub segment_id: String,
    pub segment_text: String,
    pub scene_rank: u32,
    pub scene_id: String,
    pub start: f64,
    pub end: f64,
    pub caption: Option<String>,
}

impl PlannedClip {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyPlan {
    pub clips: Vec<PlannedClip>,
}

impl AssemblyPlan {
    /// Builds the plan from a job's segments, scenes and matches. Every
    /// segment must have a match pointing at one of `scenes`.
    pub fn from_matches(
        segments: &[SummarySegment],
        scenes: &[Scene],
        matches: &[Match],
    ) -> Result<Self, AssembleError> {
        if segments.is_empty() {
            return Err(AssembleError::EmptyPlan);
        }

        let scenes_by_id: HashMap<&str, &Scene> =
            scenes.iter().map(|s| (s.id.as_str(), s)).collect();
        let matches_by_segment: HashMap<&str, &Match> =
            matches.iter().map(|m| (m.segment_id.as_str(), m)).collect();

        let mut ordered: Vec<&SummarySegment> = segments.iter().collect();
        ordered.sort_by_key(|s| s.rank);

        let mut clips = Vec::with_capacity(ordered.len());
        for segment in ordered {
            let m = matches_by_segment
                .get(segment.id.as_str())
                .ok_or_else(|| AssembleError::MissingMatch(segment.id.clone()))?;
            let scene = scenes_by_id.get(m.scene_id.as_str()).ok_or_else(|| {
                AssembleError::UnknownScene {
                    segment_id: segment.id.clone(),
                    scene_id: m.scene_id.clone(),
                }
            })?;
            if scene.duration().is_nan() || scene.duration() <= 0.0 {
                return Err(AssembleError::InvalidInterval {
                    scene_id: scene.id.clone(),
                    start: scene.start_time,
                    end: scene.end_time,
                });
            }

            clips.push(PlannedClip {
                segment_rank: segment.rank,
                segment_id: segment.id.clone(),
                segment_text: segment.text.clone(),
                scene_rank: scene.rank,
                scene_id: scene.id.clone(),
                start: scene.start_time,
                end: scene.end_time,
                caption: scene.caption.clone(),
            });
        }

        Ok(Self { clips })
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.clips.iter().map(PlannedClip::duration).sum()
    }

    /// Plain-text edit decision list: one entry per clip with its source
    /// interval, the scene caption and the summary sentence it illustrates.
    pub fn to_decision_list(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# montage decision list");
        let _ = writeln!(
            out,
            "# {} clips, {:.3}s total",
            self.clips.len(),
            self.total_duration()
        );
        for (i, clip) in self.clips.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:03}  {:>10.3}  {:>10.3}  scene {}",
                i + 1,
                clip.start,
                clip.end,
                clip.scene_rank
            );
            if let Some(caption) = &clip.caption {
                let _ = writeln!(out, "     caption: {}", caption);
            }
            let _ = writeln!(out, "     summary: {}", clip.segment_text);
        }
        out
    }
}

#[async_trait]
pub trait Assembler: Send + Sync {
    /// Writes the montage for `plan` cut from `source` to `output`. Fails
    /// as a whole if any clip cannot be produced.
    async fn assemble(
        &self,
        source: &Path,
        plan: &AssemblyPlan,
        output: &Path,
    ) -> Result<(), AssembleError>;
}
