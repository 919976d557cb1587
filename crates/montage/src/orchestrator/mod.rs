//! Job orchestration.
//!
//! The orchestrator owns the job state machine:
//!
//! ```text
//! CREATED → SEGMENTING_AND_CAPTIONING → MATCHING → REVIEWABLE → FINALIZING → DONE
//! ```
//!
//! Any non-terminal state may fall to FAILED (a stage gave up) or CANCELLED
//! (the client asked). Both leave only through [`Orchestrator::retry`].
//!
//! Client calls are serialised per job (see [`locks`]). Stage workers run as
//! spawned tasks and touch the job record only to commit, and only if the
//! job is still on the attempt they were started for.

mod error;
mod locks;
mod stages;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::assembler::{Assembler, FfmpegAssembler};
use crate::caption::{CaptionGenerator, FallbackCaptioner, HttpCaptioner};
use crate::config::{Config, MediaConfig};
use crate::error::ConfigError;
use crate::events::{JobEvent, JobEventBroadcaster};
use crate::matcher::{HttpEmbeddingScorer, LexicalScorer, Matcher, SimilarityScorer};
use crate::media::FfmpegTools;
use crate::model::{Job, JobState, Match, MatchEdit, MatchOrigin, ReviewSnapshot, Stage};
use crate::sanitize;
use crate::segmenter::{FfmpegSegmenter, SceneSegmenter};
use crate::storage::{ArtifactHandle, ArtifactKind, ArtifactStore};
use crate::store::JobStore;
use crate::summary::SummarySplitter;

use locks::JobLocks;

pub use error::{ConflictError, NotFoundError, OrchestratorError, StageFailure, ValidationError};

/// The external capabilities a job is processed with.
pub struct Capabilities {
    pub segmenter: Arc<dyn SceneSegmenter>,
    pub captioner: Arc<dyn CaptionGenerator>,
    pub splitter: SummarySplitter,
    pub scorer: Arc<dyn SimilarityScorer>,
    pub assembler: Arc<dyn Assembler>,
}

impl Capabilities {
    /// ffmpeg-backed media stages, plus HTTP captioning and embeddings when
    /// their endpoints are configured.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let tools = FfmpegTools::from_config(&config.media);

        let captioner: Arc<dyn CaptionGenerator> = match &config.captioning.endpoint {
            Some(endpoint) => Arc::new(
                HttpCaptioner::new(
                    endpoint.clone(),
                    Duration::from_secs(config.captioning.timeout_secs),
                    tools.clone(),
                )
                .map_err(|e| ConfigError::Validation {
                    message: format!("captioning client: {}", e),
                })?,
            ),
            None => {
                log::warn!("No captioning endpoint configured, scenes get positional captions");
                Arc::new(FallbackCaptioner)
            }
        };

        let scorer: Arc<dyn SimilarityScorer> = match &config.matching.embedding_endpoint {
            Some(endpoint) => Arc::new(
                HttpEmbeddingScorer::new(
                    endpoint.clone(),
                    Duration::from_secs(config.matching.timeout_secs),
                    config.matching.embedding_cache_capacity,
                )
                .map_err(|e| ConfigError::Validation {
                    message: format!("embedding client: {}", e),
                })?,
            ),
            None => Arc::new(LexicalScorer::new()),
        };

        Ok(Self {
            segmenter: Arc::new(FfmpegSegmenter::new(
                tools.clone(),
                config.segmentation.clone(),
            )),
            captioner,
            splitter: SummarySplitter::default(),
            scorer,
            assembler: Arc::new(FfmpegAssembler::new(tools, config.media.reencode_clips)),
        })
    }
}

/// Where the uploaded video currently lives.
#[derive(Debug, Clone)]
pub enum VideoSource {
    Bytes(Vec<u8>),
    /// A file that is moved into the artifact store.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub filename: String,
    pub summary: String,
    pub video: VideoSource,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: JobStore,
    artifacts: ArtifactStore,
    capabilities: Capabilities,
    matcher: Matcher,
    events: JobEventBroadcaster,
    locks: JobLocks,
    media: MediaConfig,
    caption_concurrency: usize,
    auto_start: bool,
}

impl Orchestrator {
    pub fn new(
        store: JobStore,
        artifacts: ArtifactStore,
        capabilities: Capabilities,
        config: &Config,
    ) -> Self {
        let matcher = Matcher::new(
            capabilities.scorer.clone(),
            config.matching.out_of_order_penalty,
        );
        Self {
            inner: Arc::new(Inner {
                store,
                artifacts,
                capabilities,
                matcher,
                events: JobEventBroadcaster::new(config.pipeline.event_capacity),
                locks: JobLocks::default(),
                media: config.media.clone(),
                caption_concurrency: config.captioning.concurrency.max(1),
                auto_start: config.pipeline.auto_start,
            }),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.inner.artifacts
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    // ─── Client mutations ───

    /// Stores the video and creates the job. Nothing is written when the
    /// input is rejected.
    pub async fn submit(&self, new_job: NewJob) -> Result<Job, OrchestratorError> {
        if new_job.summary.trim().is_empty() {
            return Err(ValidationError::EmptySummary.into());
        }

        let extension = Path::new(&new_job.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !self.inner.media.is_allowed_extension(&extension) {
            return Err(ValidationError::UnsupportedVideo(new_job.filename).into());
        }

        let source = match &new_job.video {
            VideoSource::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(ValidationError::EmptyVideo.into());
                }
                self.inner
                    .artifacts
                    .put_bytes(ArtifactKind::Source, &extension, bytes)?
            }
            VideoSource::File(path) => {
                let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                if len == 0 {
                    return Err(ValidationError::EmptyVideo.into());
                }
                self.inner
                    .artifacts
                    .import_file(ArtifactKind::Source, &extension, path)?
            }
        };

        let mut job = Job::new(
            uuid::Uuid::new_v4().to_string(),
            source,
            new_job.filename,
            new_job.summary,
        );
        if let Err(e) = self.inner.store.create(&job) {
            let _ = self.inner.artifacts.delete(&job.source);
            return Err(e.into());
        }

        tracing::info!(
            job_id = %job.id,
            filename = %sanitize::redact_path(Path::new(&job.source_filename)),
            summary = %sanitize::preview_text(&job.summary),
            "Job submitted"
        );
        self.emit(&job, "Job submitted");

        if self.inner.auto_start {
            let _commit = self.inner.locks.commit(&job.id).await;
            self.start(&mut job)?;
        }
        Ok(job)
    }

    /// Starts the pipeline for a job still in CREATED. Acknowledges any
    /// other state without changing it.
    pub async fn process(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        let _guard = self.inner.locks.mutation(job_id).await?;
        let mut job = self.load(job_id)?;
        if job.state == JobState::Created {
            self.start(&mut job)?;
        }
        Ok(job)
    }

    /// Upserts manual matches keyed by segment. Either every edit is applied
    /// or none is. Returns the job's full match set afterwards.
    pub async fn update_matches(
        &self,
        job_id: &str,
        edits: &[MatchEdit],
    ) -> Result<Vec<Match>, OrchestratorError> {
        let _guard = self.inner.locks.mutation(job_id).await?;
        let mut job = self.load(job_id)?;
        require_state(&job, "update matches", &[JobState::Reviewable])?;

        let segment_ids: HashSet<String> = self
            .inner
            .store
            .segments(job_id)?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let scene_ids: HashSet<String> = self
            .inner
            .store
            .scenes(job_id)?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let mut chosen: HashMap<&str, &str> = HashMap::new();
        let mut updates: Vec<Match> = Vec::with_capacity(edits.len());
        for edit in edits {
            if !segment_ids.contains(&edit.segment_id) {
                return Err(ValidationError::ForeignSegment {
                    job_id: job_id.to_string(),
                    segment_id: edit.segment_id.clone(),
                }
                .into());
            }
            if !scene_ids.contains(&edit.scene_id) {
                return Err(ValidationError::ForeignScene {
                    job_id: job_id.to_string(),
                    scene_id: edit.scene_id.clone(),
                }
                .into());
            }
            match chosen.insert(&edit.segment_id, &edit.scene_id) {
                Some(previous) if previous != edit.scene_id => {
                    return Err(ValidationError::AmbiguousEdit(edit.segment_id.clone()).into());
                }
                Some(_) => {}
                None => updates.push(Match {
                    segment_id: edit.segment_id.clone(),
                    scene_id: edit.scene_id.clone(),
                    score: None,
                    origin: MatchOrigin::Manual,
                }),
            }
        }

        if !updates.is_empty() {
            job.touch();
            self.inner.store.apply_match_edits(&job, &updates)?;
            tracing::debug!(job_id, edits = updates.len(), "Manual matches applied");
        }
        Ok(self.inner.store.matches(job_id)?)
    }

    /// Freezes the match set and starts assembly. The result shows up as a
    /// DONE or FAILED state.
    pub async fn finalize(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        let _guard = self.inner.locks.mutation(job_id).await?;
        let mut job = self.load(job_id)?;
        require_state(&job, "finalize", &[JobState::Reviewable])?;

        job.state = JobState::Finalizing;
        job.touch();
        self.inner.store.save(&job)?;
        self.emit(&job, "Assembling montage");

        self.dispatch_assembly(&job);
        Ok(job)
    }

    /// Re-enters a FAILED or CANCELLED job.
    ///
    /// A job that failed during assembly with its matches intact goes back
    /// to REVIEWABLE and keeps its manual edits. Anything else is reset to
    /// CREATED and processed from scratch.
    pub async fn retry(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        let _guard = self.inner.locks.mutation(job_id).await?;
        let mut job = self.load(job_id)?;
        require_state(&job, "retry", &[JobState::Failed, JobState::Cancelled])?;

        let resume_review =
            job.failed_stage == Some(Stage::Assembly) && self.has_total_matches(job_id)?;

        job.attempt += 1;
        job.failed_stage = None;
        job.error = None;
        job.completed_at = None;
        job.touch();

        if resume_review {
            job.state = JobState::Reviewable;
            self.inner.store.save(&job)?;
            self.emit(&job, "Retrying: matches kept for review");
            return Ok(job);
        }

        self.discard_outputs(&mut job);
        job.state = JobState::Created;
        job.scenes_ready = false;
        job.segments_ready = false;
        self.inner.store.reset_derived(&job)?;
        self.emit(&job, "Retrying from scratch");

        self.start(&mut job)?;
        Ok(job)
    }

    /// Moves a non-terminal job to CANCELLED. Running workers finish their
    /// current call but their results are dropped.
    pub async fn cancel(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        let _guard = self.inner.locks.mutation(job_id).await?;
        let mut job = self.load(job_id)?;
        if job.state.is_terminal() {
            return Err(ConflictError::InvalidState {
                job_id: job_id.to_string(),
                operation: "cancel",
                state: job.state,
            }
            .into());
        }

        job.state = JobState::Cancelled;
        job.attempt += 1;
        job.touch();
        self.inner.store.save(&job)?;
        tracing::info!(job_id, "Job cancelled");
        self.emit(&job, "Job cancelled");
        Ok(job)
    }

    /// Deletes a job that is not running a stage, with everything it owns.
    pub async fn purge(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let _guard = self.inner.locks.mutation(job_id).await?;
        let mut job = self.load(job_id)?;
        if job.state.is_running() {
            return Err(ConflictError::InvalidState {
                job_id: job_id.to_string(),
                operation: "purge",
                state: job.state,
            }
            .into());
        }

        self.inner.store.delete(job_id)?;
        if let Err(e) = self.inner.artifacts.delete(&job.source) {
            tracing::warn!(job_id, error = %e, "Could not delete source video");
        }
        self.discard_outputs(&mut job);

        tracing::info!(job_id, "Job purged");
        Ok(())
    }

    // ─── Reads ───

    pub fn job(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        self.load(job_id)
    }

    pub fn review(&self, job_id: &str) -> Result<ReviewSnapshot, OrchestratorError> {
        let job = self.load(job_id)?;
        Ok(ReviewSnapshot {
            scenes: self.inner.store.scenes(job_id)?,
            segments: self.inner.store.segments(job_id)?,
            matches: self.inner.store.matches(job_id)?,
            job,
        })
    }

    /// Handle of the finished montage. Only available once the job is DONE.
    pub fn download(&self, job_id: &str) -> Result<ArtifactHandle, OrchestratorError> {
        let job = self.load(job_id)?;
        require_state(&job, "download", &[JobState::Done])?;
        job.output
            .filter(|handle| self.inner.artifacts.exists(handle))
            .ok_or_else(|| NotFoundError::Artifact(job_id.to_string()).into())
    }

    pub fn list_jobs(
        &self,
        state: Option<JobState>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<(Vec<Job>, u64), OrchestratorError> {
        Ok(self.inner.store.list(state, limit, offset)?)
    }

    /// Resolves once the job satisfies `predicate`, or fails with
    /// [`OrchestratorError::Timeout`].
    pub async fn wait_for<F>(
        &self,
        job_id: &str,
        predicate: F,
        timeout: Duration,
    ) -> Result<Job, OrchestratorError>
    where
        F: Fn(&Job) -> bool,
    {
        let mut events = self.inner.events.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let job = self.load(job_id)?;
            if predicate(&job) {
                return Ok(job);
            }

            loop {
                match tokio::time::timeout_at(deadline, events.recv()).await {
                    Ok(Ok(event)) if event.job_id == job_id => break,
                    Ok(Ok(_)) => continue,
                    Ok(Err(RecvError::Lagged(_))) => break,
                    Ok(Err(RecvError::Closed)) | Err(_) => {
                        return Err(OrchestratorError::Timeout {
                            job_id: job_id.to_string(),
                            state: job.state,
                        });
                    }
                }
            }
        }
    }

    // ─── Startup ───

    /// Fails jobs a previous process left mid-stage so they can be retried,
    /// then deletes blobs no job refers to, such as a montage an interrupted
    /// assembly had started writing. Meant for startup, before any work is
    /// accepted. Returns the ids of the recovered jobs.
    pub async fn recover(&self) -> Result<Vec<String>, OrchestratorError> {
        let running = [
            JobState::SegmentingAndCaptioning,
            JobState::Matching,
            JobState::Finalizing,
        ];
        let mut recovered = Vec::new();

        for job_id in self.inner.store.ids_in_states(&running)? {
            let _commit = self.inner.locks.commit(&job_id).await;
            let Some(mut job) = self.inner.store.get(&job_id)? else {
                continue;
            };
            if !job.state.is_running() {
                continue;
            }

            let stage = self.interrupted_stage(&job)?;
            self.record_failure(&mut job, StageFailure::new(stage, "interrupted by a restart"))?;
            recovered.push(job_id);
        }

        if !recovered.is_empty() {
            log::info!("Marked {} interrupted jobs as failed", recovered.len());
        }
        self.sweep_orphaned_artifacts()?;
        Ok(recovered)
    }

    fn sweep_orphaned_artifacts(&self) -> Result<(), OrchestratorError> {
        let referenced = self.inner.store.referenced_artifacts()?;
        let mut removed = 0;
        for handle in self.inner.artifacts.handles()? {
            if referenced.contains(&handle) {
                continue;
            }
            match self.inner.artifacts.delete(&handle) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(handle = %handle, error = %e, "Could not delete orphaned artifact"),
            }
        }
        if removed > 0 {
            log::info!("Deleted {} orphaned artifacts", removed);
        }
        Ok(())
    }

    // ─── Helpers ───

    fn load(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        self.inner
            .store
            .get(job_id)?
            .ok_or_else(|| NotFoundError::Job(job_id.to_string()).into())
    }

    fn emit(&self, job: &Job, message: impl Into<String>) {
        self.inner.events.send(JobEvent::for_job(job, message));
    }

    fn has_total_matches(&self, job_id: &str) -> Result<bool, OrchestratorError> {
        let segments = self.inner.store.segments(job_id)?;
        if segments.is_empty() {
            return Ok(false);
        }
        let matched: HashSet<String> = self
            .inner
            .store
            .matches(job_id)?
            .into_iter()
            .map(|m| m.segment_id)
            .collect();
        Ok(segments.iter().all(|s| matched.contains(&s.id)))
    }

    fn interrupted_stage(&self, job: &Job) -> Result<Stage, OrchestratorError> {
        Ok(match job.state {
            JobState::Matching => Stage::Matching,
            JobState::Finalizing => Stage::Assembly,
            _ if job.scenes_ready => Stage::Splitting,
            _ if self.inner.store.scenes(&job.id)?.is_empty() => Stage::Segmentation,
            _ => Stage::Captioning,
        })
    }

    /// Deletes the montage and decision list, if any. Missing blobs are fine.
    fn discard_outputs(&self, job: &mut Job) {
        for handle in [job.output.take(), job.decision_list.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = self.inner.artifacts.delete(&handle) {
                tracing::warn!(job_id = %job.id, error = %e, "Could not delete artifact");
            }
        }
    }
}

fn require_state(
    job: &Job,
    operation: &'static str,
    allowed: &[JobState],
) -> Result<(), ConflictError> {
    if allowed.contains(&job.state) {
        Ok(())
    } else {
        Err(ConflictError::InvalidState {
            job_id: job.id.clone(),
            operation,
            state: job.state,
        })
    }
}
