//! Test harness for isolated orchestrator runs.
//!
//! Every harness owns a temporary data directory holding a real SQLite
//! database and artifact store. Media capabilities are scripted.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use montage::db::Database;
use montage::{
    ArtifactStore, Capabilities, Config, Job, JobState, JobStore, NewJob, Orchestrator,
    OrchestratorError, ReviewSnapshot, SummarySplitter, VideoSource,
};

use super::builders::{HarnessBuilder, RecordingAssembler, EXAMPLE_SUMMARY};

const WAIT: Duration = Duration::from_secs(5);

pub struct TestHarness {
    temp_dir: TempDir,
    pub orchestrator: Orchestrator,
    pub assembler: Arc<RecordingAssembler>,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        HarnessBuilder::new().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    pub(crate) fn from_builder(builder: HarnessBuilder) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        let mut config = Config::default();
        config.data_directory = temp_dir.path().to_path_buf();
        config.pipeline.auto_start = builder.auto_start;
        config.captioning.concurrency = 2;

        let db = Database::open(&config.database_path()).expect("Failed to open database");
        let artifacts =
            ArtifactStore::new(config.artifact_directory()).expect("Failed to open artifacts");

        let capabilities = Capabilities {
            segmenter: builder.segmenter,
            captioner: builder.captioner,
            splitter: SummarySplitter::default(),
            scorer: builder.scorer,
            assembler: builder.assembler.clone(),
        };
        let orchestrator = Orchestrator::new(JobStore::new(db), artifacts, capabilities, &config);

        Self {
            temp_dir,
            orchestrator,
            assembler: builder.assembler,
            config,
        }
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.config.artifact_directory()
    }

    /// Number of blobs in the artifact store.
    pub fn artifact_count(&self) -> usize {
        std::fs::read_dir(self.artifact_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub async fn submit(&self, summary: &str) -> Result<Job, OrchestratorError> {
        self.orchestrator
            .submit(NewJob {
                filename: "film.mp4".to_string(),
                summary: summary.to_string(),
                video: VideoSource::Bytes(b"not really a video".to_vec()),
            })
            .await
    }

    /// Waits until the job reaches `state`. Stops early on any terminal
    /// state so a failure shows up as a mismatch rather than a timeout.
    pub async fn wait_until(&self, job_id: &str, state: JobState) -> Job {
        let job = self
            .orchestrator
            .wait_for(
                job_id,
                |job| job.state == state || job.state.is_terminal(),
                WAIT,
            )
            .await
            .expect("job did not settle in time");
        assert_eq!(job.state, state, "job settled elsewhere, error: {:?}", job.error);
        job
    }

    /// Submits the worked example and waits for review.
    pub async fn reviewable(&self) -> ReviewSnapshot {
        self.reviewable_with(EXAMPLE_SUMMARY).await
    }

    pub async fn reviewable_with(&self, summary: &str) -> ReviewSnapshot {
        let job = self.submit(summary).await.expect("submit failed");
        self.wait_until(&job.id, JobState::Reviewable).await;
        self.orchestrator.review(&job.id).expect("review failed")
    }

    /// Finalizes and waits for DONE, returning the rendered montage.
    pub async fn finalize_and_read(&self, job_id: &str) -> String {
        self.orchestrator.finalize(job_id).await.expect("finalize failed");
        let job = self.wait_until(job_id, JobState::Done).await;
        let handle = job.output.expect("DONE job has no output");
        let bytes = self
            .orchestrator
            .artifacts()
            .read(&handle)
            .expect("output missing");
        String::from_utf8(bytes).expect("output is not text")
    }

    /// Gives spawned workers a chance to run to completion.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
