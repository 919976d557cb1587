//! Stage workers.
//!
//! A job runs as two branches that join before matching:
//!
//! ```text
//! video   → segment → caption ─┐
//!                              ├→ match → (review) → assemble
//! summary → split ─────────────┘
//! ```
//!
//! Each branch commits its output with a `*_ready` flag. Whichever commit
//! finds the other flag already set moves the job to MATCHING and runs the
//! matcher, so matching starts exactly once.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use futures_util::{stream, StreamExt, TryStreamExt};
use tracing::{info_span, Instrument};

use super::{Orchestrator, OrchestratorError, StageFailure};
use crate::assembler::AssemblyPlan;
use crate::caption::clean_caption;
use crate::db::DatabaseError;
use crate::model::{Job, JobState, Scene, Stage, SummarySegment};
use crate::segmenter::{normalize_intervals, SegmentError};
use crate::storage::ArtifactKind;

fn failure(stage: Stage) -> impl Fn(&dyn Display) -> StageFailure {
    move |cause: &dyn Display| StageFailure::new(stage, cause)
}

impl Orchestrator {
    /// Moves a CREATED job into processing and spawns both branches. The
    /// caller holds the job's commit lock.
    pub(super) fn start(&self, job: &mut Job) -> Result<(), OrchestratorError> {
        let video = self.inner.artifacts.resolve(&job.source)?;

        job.state = JobState::SegmentingAndCaptioning;
        job.touch();
        self.inner.store.save(job)?;
        self.emit(job, "Segmenting video and splitting summary");

        let span = info_span!("scenes", job_id = %job.id, attempt = job.attempt);
        tokio::spawn(
            self.clone()
                .scene_branch(job.id.clone(), job.attempt, video)
                .instrument(span),
        );

        let span = info_span!("summary", job_id = %job.id, attempt = job.attempt);
        tokio::spawn(
            self.clone()
                .summary_branch(job.id.clone(), job.attempt, job.summary.clone())
                .instrument(span),
        );
        Ok(())
    }

    pub(super) fn dispatch_assembly(&self, job: &Job) {
        let span = info_span!("assembly", job_id = %job.id, attempt = job.attempt);
        tokio::spawn(
            self.clone()
                .assembly_branch(job.id.clone(), job.attempt)
                .instrument(span),
        );
    }

    /// Marks the job FAILED. Derived data is dropped unless the failure was
    /// in assembly, where the match set is still worth retrying from. The
    /// caller holds the job's commit lock.
    pub(super) fn record_failure(
        &self,
        job: &mut Job,
        failure: StageFailure,
    ) -> Result<(), DatabaseError> {
        job.state = JobState::Failed;
        job.failed_stage = Some(failure.stage);
        job.error = Some(failure.cause.clone());
        job.touch();

        if failure.stage == Stage::Assembly {
            self.inner.store.save(job)?;
        } else {
            job.scenes_ready = false;
            job.segments_ready = false;
            self.inner.store.reset_derived(job)?;
        }

        tracing::warn!(job_id = %job.id, stage = %failure.stage, cause = %failure.cause, "Job failed");
        self.emit(job, failure.to_string());
        Ok(())
    }

    /// Runs `commit` under the job's commit lock if the job is still in
    /// `expected` on the worker's `attempt`. Returns `None` for a stale
    /// worker (cancelled, retried or purged job).
    async fn commit_if_current<T>(
        &self,
        job_id: &str,
        attempt: u32,
        expected: JobState,
        commit: impl FnOnce(&mut Job) -> Result<T, DatabaseError>,
    ) -> Result<Option<T>, DatabaseError> {
        let _commit = self.inner.locks.commit(job_id).await;
        let Some(mut job) = self.inner.store.get(job_id)? else {
            return Ok(None);
        };
        if job.attempt != attempt || job.state != expected {
            tracing::debug!(
                current_attempt = job.attempt,
                state = %job.state,
                "Discarding stale stage result"
            );
            return Ok(None);
        }
        commit(&mut job).map(Some)
    }

    async fn fail(&self, job_id: &str, attempt: u32, expected: JobState, failure: StageFailure) {
        let result = self
            .commit_if_current(job_id, attempt, expected, |job| {
                self.record_failure(job, failure)
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Could not record stage failure");
        }
    }

    // ─── Video branch ───

    async fn scene_branch(self, job_id: String, attempt: u32, video: PathBuf) {
        let result = self.segment_and_caption(&job_id, attempt, &video).await;
        match result {
            Ok(true) => self.matching_branch(&job_id, attempt).await,
            Ok(false) => {}
            Err(failure) => {
                self.fail(&job_id, attempt, JobState::SegmentingAndCaptioning, failure)
                    .await
            }
        }
    }

    /// Returns whether this branch completed the join.
    async fn segment_and_caption(
        &self,
        job_id: &str,
        attempt: u32,
        video: &Path,
    ) -> Result<bool, StageFailure> {
        let segmentation = failure(Stage::Segmentation);
        let intervals = self
            .inner
            .capabilities
            .segmenter
            .segment(video)
            .await
            .map_err(|e| segmentation(&e))?;

        let intervals = normalize_intervals(intervals);
        if intervals.is_empty() {
            return Err(segmentation(&SegmentError::NoScenes));
        }

        let scenes: Vec<Scene> = intervals
            .iter()
            .enumerate()
            .map(|(rank, interval)| Scene {
                id: uuid::Uuid::new_v4().to_string(),
                job_id: job_id.to_string(),
                rank: rank as u32,
                start_time: interval.start,
                end_time: interval.end,
                caption: None,
            })
            .collect();
        tracing::info!(scenes = scenes.len(), "Scenes detected");

        let committed = self
            .commit_if_current(job_id, attempt, JobState::SegmentingAndCaptioning, |job| {
                job.touch();
                self.inner.store.commit_scenes(job, &scenes)?;
                self.emit(job, format!("{} scenes detected", scenes.len()));
                Ok(())
            })
            .await
            .map_err(|e| segmentation(&e))?;
        if committed.is_none() {
            return Ok(false);
        }

        let captioning = failure(Stage::Captioning);
        let captioner = &self.inner.capabilities.captioner;
        let captions: Vec<String> = stream::iter(intervals.iter().copied())
            .map(|interval| async move {
                let raw = captioner.caption(video, interval).await?;
                clean_caption(&raw, interval)
            })
            .buffered(self.inner.caption_concurrency)
            .try_collect()
            .await
            .map_err(|e| captioning(&e))?;

        let pairs: Vec<(String, String)> = scenes
            .iter()
            .map(|s| s.id.clone())
            .zip(captions)
            .collect();

        let joined = self
            .commit_if_current(job_id, attempt, JobState::SegmentingAndCaptioning, |job| {
                job.scenes_ready = true;
                let joined = job.segments_ready;
                if joined {
                    job.state = JobState::Matching;
                }
                job.touch();
                self.inner.store.commit_captions(job, &pairs)?;
                self.emit(
                    job,
                    if joined {
                        "Scenes captioned, matching"
                    } else {
                        "Scenes captioned"
                    },
                );
                Ok(joined)
            })
            .await
            .map_err(|e| captioning(&e))?;

        Ok(joined.unwrap_or(false))
    }

    // ─── Summary branch ───

    async fn summary_branch(self, job_id: String, attempt: u32, summary: String) {
        match self.split_summary(&job_id, attempt, &summary).await {
            Ok(true) => self.matching_branch(&job_id, attempt).await,
            Ok(false) => {}
            Err(failure) => {
                self.fail(&job_id, attempt, JobState::SegmentingAndCaptioning, failure)
                    .await
            }
        }
    }

    async fn split_summary(
        &self,
        job_id: &str,
        attempt: u32,
        summary: &str,
    ) -> Result<bool, StageFailure> {
        let splitting = failure(Stage::Splitting);
        let texts = self.inner.capabilities.splitter.split(summary);
        if texts.is_empty() {
            return Err(splitting(&"summary contains no sentences"));
        }

        let segments: Vec<SummarySegment> = texts
            .into_iter()
            .enumerate()
            .map(|(rank, text)| SummarySegment {
                id: uuid::Uuid::new_v4().to_string(),
                job_id: job_id.to_string(),
                rank: rank as u32,
                text,
            })
            .collect();
        tracing::info!(segments = segments.len(), "Summary split");

        let joined = self
            .commit_if_current(job_id, attempt, JobState::SegmentingAndCaptioning, |job| {
                job.segments_ready = true;
                let joined = job.scenes_ready;
                if joined {
                    job.state = JobState::Matching;
                }
                job.touch();
                self.inner.store.commit_segments(job, &segments)?;
                self.emit(
                    job,
                    if joined {
                        "Summary split, matching"
                    } else {
                        "Summary split"
                    },
                );
                Ok(joined)
            })
            .await
            .map_err(|e| splitting(&e))?;

        Ok(joined.unwrap_or(false))
    }

    // ─── Matching ───

    async fn matching_branch(&self, job_id: &str, attempt: u32) {
        let span = info_span!("matching", job_id = %job_id, attempt);
        if let Err(failure) = self.match_job(job_id, attempt).instrument(span).await {
            self.fail(job_id, attempt, JobState::Matching, failure).await;
        }
    }

    async fn match_job(&self, job_id: &str, attempt: u32) -> Result<(), StageFailure> {
        let matching = failure(Stage::Matching);
        let segments = self
            .inner
            .store
            .segments(job_id)
            .map_err(|e| matching(&e))?;
        let scenes = self.inner.store.scenes(job_id).map_err(|e| matching(&e))?;

        let matches = self
            .inner
            .matcher
            .match_segments(&segments, &scenes)
            .await
            .map_err(|e| matching(&e))?;

        self.commit_if_current(job_id, attempt, JobState::Matching, |job| {
            job.state = JobState::Reviewable;
            job.touch();
            self.inner.store.commit_matches(job, &matches)?;
            self.emit(job, "Matches ready for review");
            Ok(())
        })
        .await
        .map_err(|e| matching(&e))?;
        Ok(())
    }

    // ─── Assembly ───

    async fn assembly_branch(self, job_id: String, attempt: u32) {
        if let Err(failure) = self.assemble_job(&job_id, attempt).await {
            self.fail(&job_id, attempt, JobState::Finalizing, failure)
                .await;
        }
    }

    async fn assemble_job(&self, job_id: &str, attempt: u32) -> Result<(), StageFailure> {
        let assembly = failure(Stage::Assembly);
        let store = &self.inner.store;
        let artifacts = &self.inner.artifacts;

        // Matches cannot change while the job is FINALIZING.
        let Some(job) = store.get(job_id).map_err(|e| assembly(&e))? else {
            return Ok(());
        };
        let segments = store.segments(job_id).map_err(|e| assembly(&e))?;
        let scenes = store.scenes(job_id).map_err(|e| assembly(&e))?;
        let matches = store.matches(job_id).map_err(|e| assembly(&e))?;
        let plan =
            AssemblyPlan::from_matches(&segments, &scenes, &matches).map_err(|e| assembly(&e))?;

        let source = artifacts.resolve(&job.source).map_err(|e| assembly(&e))?;
        let extension = job.source.extension().unwrap_or("mp4");
        let (output, output_path) = artifacts
            .allocate(ArtifactKind::Montage, extension)
            .map_err(|e| assembly(&e))?;

        tracing::info!(clips = plan.clips.len(), "Assembling montage");
        if let Err(e) = self
            .inner
            .capabilities
            .assembler
            .assemble(&source, &plan, &output_path)
            .await
        {
            let _ = artifacts.delete(&output);
            return Err(assembly(&e));
        }

        let decision_list = match artifacts.put_bytes(
            ArtifactKind::DecisionList,
            "txt",
            plan.to_decision_list().as_bytes(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = artifacts.delete(&output);
                return Err(assembly(&e));
            }
        };

        let committed = self
            .commit_if_current(job_id, attempt, JobState::Finalizing, |job| {
                job.state = JobState::Done;
                job.output = Some(output.clone());
                job.decision_list = Some(decision_list.clone());
                job.completed_at = Some(chrono::Utc::now());
                job.touch();
                store.save(job)?;
                self.emit(job, "Montage ready");
                Ok(())
            })
            .await;

        match committed {
            Ok(Some(())) => Ok(()),
            Ok(None) => {
                tracing::info!("Job left FINALIZING during assembly, dropping output");
                let _ = artifacts.delete(&output);
                let _ = artifacts.delete(&decision_list);
                Ok(())
            }
            Err(e) => {
                let _ = artifacts.delete(&output);
                let _ = artifacts.delete(&decision_list);
                Err(assembly(&e))
            }
        }
    }
}
