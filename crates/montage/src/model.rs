//! Domain types for montage jobs and everything a job owns.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::ArtifactHandle;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    SegmentingAndCaptioning,
    Matching,
    Reviewable,
    Finalizing,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "CREATED",
            JobState::SegmentingAndCaptioning => "SEGMENTING_AND_CAPTIONING",
            JobState::Matching => "MATCHING",
            JobState::Reviewable => "REVIEWABLE",
            JobState::Finalizing => "FINALIZING",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states only leave through an explicit retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }

    /// States in which a stage worker owns the job's progress.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            JobState::SegmentingAndCaptioning | JobState::Matching | JobState::Finalizing
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(JobState::Created),
            "SEGMENTING_AND_CAPTIONING" => Ok(JobState::SegmentingAndCaptioning),
            "MATCHING" => Ok(JobState::Matching),
            "REVIEWABLE" => Ok(JobState::Reviewable),
            "FINALIZING" => Ok(JobState::Finalizing),
            "DONE" => Ok(JobState::Done),
            "FAILED" => Ok(JobState::Failed),
            "CANCELLED" => Ok(JobState::Cancelled),
            other => Err(format!("unknown job state '{}'", other)),
        }
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Segmentation,
    Captioning,
    Splitting,
    Matching,
    Assembly,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Segmentation => "segmentation",
            Stage::Captioning => "captioning",
            Stage::Splitting => "splitting",
            Stage::Matching => "matching",
            Stage::Assembly => "assembly",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "segmentation" => Ok(Stage::Segmentation),
            "captioning" => Ok(Stage::Captioning),
            "splitting" => Ok(Stage::Splitting),
            "matching" => Ok(Stage::Matching),
            "assembly" => Ok(Stage::Assembly),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

/// One end-to-end montage request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub state: JobState,
    pub source: ArtifactHandle,
    pub source_filename: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ArtifactHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_list: Option<ArtifactHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Bumped on every retry and cancel. Workers only commit results for
    /// the attempt they were dispatched with.
    pub attempt: u32,
    pub scenes_ready: bool,
    pub segments_ready: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: String, source: ArtifactHandle, source_filename: String, summary: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Created,
            source,
            source_filename,
            summary,
            output: None,
            decision_list: None,
            failed_stage: None,
            error: None,
            attempt: 0,
            scenes_ready: false,
            segments_ready: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A `[start_time, end_time)` interval of the source video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub job_id: String,
    pub rank: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub caption: Option<String>,
}

impl Scene {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// One sentence-level piece of the summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummarySegment {
    pub id: String,
    pub job_id: String,
    pub rank: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrigin {
    Auto,
    Manual,
}

impl MatchOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOrigin::Auto => "auto",
            MatchOrigin::Manual => "manual",
        }
    }
}

impl FromStr for MatchOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(MatchOrigin::Auto),
            "manual" => Ok(MatchOrigin::Manual),
            other => Err(format!("unknown match origin '{}'", other)),
        }
    }
}

/// Current scene assignment for a summary segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub segment_id: String,
    pub scene_id: String,
    /// Similarity of the pair when chosen by the matcher; `None` for manual edits.
    pub score: Option<f64>,
    pub origin: MatchOrigin,
}

/// A client edit: point `segment_id` at `scene_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchEdit {
    #[serde(alias = "segment_id")]
    pub segment_id: String,
    #[serde(alias = "scene_id")]
    pub scene_id: String,
}

impl MatchEdit {
    pub fn new(segment_id: impl Into<String>, scene_id: impl Into<String>) -> Self {
        Self {
            segment_id: segment_id.into(),
            scene_id: scene_id.into(),
        }
    }
}

/// Everything a reviewer needs to inspect and edit a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSnapshot {
    pub job: Job,
    pub scenes: Vec<Scene>,
    pub segments: Vec<SummarySegment>,
    pub matches: Vec<Match>,
}
