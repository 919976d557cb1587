//! Scripted capabilities and the builder that wires them into a harness.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use montage::assembler::{AssembleError, Assembler, AssemblyPlan};
use montage::caption::{CaptionError, CaptionGenerator};
use montage::matcher::{LexicalScorer, SimilarityScorer};
use montage::media::MediaError;
use montage::segmenter::{SceneInterval, SceneSegmenter, SegmentError};

use super::harness::TestHarness;

pub const EXAMPLE_SUMMARY: &str = "A man walks away. A woman calls him.";

pub const EXAMPLE_CAPTIONS: [&str; 3] = ["man walking at sunset", "woman on phone", "crowd cheering"];

pub fn example_intervals() -> Vec<SceneInterval> {
    vec![
        SceneInterval::new(0.0, 4.0),
        SceneInterval::new(4.0, 9.0),
        SceneInterval::new(9.0, 12.0),
    ]
}

// ─── Segmenter ───

/// Returns fixed intervals, optionally after failing a number of calls or
/// waiting for a gate to open.
pub struct ScriptedSegmenter {
    intervals: Vec<SceneInterval>,
    failures_left: AtomicUsize,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl ScriptedSegmenter {
    pub fn fixed(intervals: Vec<SceneInterval>) -> Self {
        Self {
            intervals,
            failures_left: AtomicUsize::new(0),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::flaky(usize::MAX)
    }

    /// Fails the first `failures` calls.
    pub fn flaky(failures: usize) -> Self {
        let segmenter = Self::fixed(example_intervals());
        segmenter.failures_left.store(failures, Ordering::SeqCst);
        segmenter
    }

    /// Blocks every call until the returned gate is notified once per call.
    pub fn gated(intervals: Vec<SceneInterval>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let mut segmenter = Self::fixed(intervals);
        segmenter.gate = Some(gate.clone());
        (segmenter, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SceneSegmenter for ScriptedSegmenter {
    async fn segment(&self, _video: &Path) -> Result<Vec<SceneInterval>, SegmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SegmentError::Decode(MediaError::Probe(
                "scripted decode failure".to_string(),
            )));
        }
        Ok(self.intervals.clone())
    }
}

// ─── Captioner ───

/// Looks captions up by interval start.
pub struct TableCaptioner {
    entries: Vec<(f64, String)>,
}

impl TableCaptioner {
    pub fn new(entries: &[(f64, &str)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(start, caption)| (*start, caption.to_string()))
                .collect(),
        }
    }

    pub fn example() -> Self {
        let intervals = example_intervals();
        Self::new(&[
            (intervals[0].start, EXAMPLE_CAPTIONS[0]),
            (intervals[1].start, EXAMPLE_CAPTIONS[1]),
            (intervals[2].start, EXAMPLE_CAPTIONS[2]),
        ])
    }
}

#[async_trait]
impl CaptionGenerator for TableCaptioner {
    async fn caption(&self, _video: &Path, interval: SceneInterval) -> Result<String, CaptionError> {
        self.entries
            .iter()
            .find(|(start, _)| (start - interval.start).abs() < 1e-9)
            .map(|(_, caption)| caption.clone())
            .ok_or_else(|| {
                CaptionError::MalformedResponse(format!("no caption for {}", interval.start))
            })
    }
}

// ─── Assembler ───

/// Writes the clip list as `start-end` lines instead of video, and keeps
/// every plan it was given.
#[derive(Default)]
pub struct RecordingAssembler {
    plans: Mutex<Vec<AssemblyPlan>>,
    failures_left: AtomicUsize,
}

impl RecordingAssembler {
    /// Fails the first `failures` calls.
    pub fn failing(failures: usize) -> Self {
        let assembler = Self::default();
        assembler.failures_left.store(failures, Ordering::SeqCst);
        assembler
    }

    pub fn calls(&self) -> usize {
        self.plans.lock().unwrap().len()
    }

    pub fn plans(&self) -> Vec<AssemblyPlan> {
        self.plans.lock().unwrap().clone()
    }

    pub fn render(plan: &AssemblyPlan) -> String {
        plan.clips
            .iter()
            .map(|c| format!("{:.3}-{:.3}", c.start, c.end))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Assembler for RecordingAssembler {
    async fn assemble(
        &self,
        _source: &Path,
        plan: &AssemblyPlan,
        output: &Path,
    ) -> Result<(), AssembleError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AssembleError::Clip {
                index: 0,
                source: MediaError::EmptyOutput {
                    tool: "scripted".to_string(),
                },
            });
        }

        tokio::fs::write(output, Self::render(plan))
            .await
            .map_err(|e| AssembleError::Io {
                path: output.to_path_buf(),
                source: e,
            })?;
        self.plans.lock().unwrap().push(plan.clone());
        Ok(())
    }
}

// ─── Harness builder ───

pub struct HarnessBuilder {
    pub(crate) segmenter: Arc<dyn SceneSegmenter>,
    pub(crate) captioner: Arc<dyn CaptionGenerator>,
    pub(crate) scorer: Arc<dyn SimilarityScorer>,
    pub(crate) assembler: Arc<RecordingAssembler>,
    pub(crate) auto_start: bool,
}

impl HarnessBuilder {
    /// The worked example: three captioned scenes, lexical scoring.
    pub fn new() -> Self {
        Self {
            segmenter: Arc::new(ScriptedSegmenter::fixed(example_intervals())),
            captioner: Arc::new(TableCaptioner::example()),
            scorer: Arc::new(LexicalScorer::new()),
            assembler: Arc::new(RecordingAssembler::default()),
            auto_start: true,
        }
    }

    pub fn segmenter(mut self, segmenter: impl SceneSegmenter + 'static) -> Self {
        self.segmenter = Arc::new(segmenter);
        self
    }

    pub fn shared_segmenter(mut self, segmenter: Arc<dyn SceneSegmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn captioner(mut self, captioner: impl CaptionGenerator + 'static) -> Self {
        self.captioner = Arc::new(captioner);
        self
    }

    pub fn assembler(mut self, assembler: RecordingAssembler) -> Self {
        self.assembler = Arc::new(assembler);
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn build(self) -> TestHarness {
        TestHarness::from_builder(self)
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
