pub mod assembler;
pub mod caption;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod matcher;
pub mod media;
pub mod model;
pub mod orchestrator;
pub mod sanitize;
pub mod segmenter;
pub mod storage;
pub mod store;
pub mod summary;

pub use assembler::{AssemblyPlan, Assembler, FfmpegAssembler, PlannedClip};
pub use caption::{CaptionGenerator, FallbackCaptioner, HttpCaptioner};
pub use config::{apply_env_overrides, load_config, load_config_from_str, Config};
pub use error::{ConfigError, MontageError, Result, StorageError};
pub use events::{JobEvent, JobEventBroadcaster};
pub use matcher::{LexicalScorer, Matcher, SimilarityScorer};
pub use model::{
    Job, JobState, Match, MatchEdit, MatchOrigin, ReviewSnapshot, Scene, Stage, SummarySegment,
};
pub use orchestrator::{
    Capabilities, ConflictError, NewJob, NotFoundError, Orchestrator, OrchestratorError,
    StageFailure, ValidationError, VideoSource,
};
pub use segmenter::{FfmpegSegmenter, SceneInterval, SceneSegmenter};
pub use storage::{ArtifactHandle, ArtifactStore};
pub use store::JobStore;
pub use summary::SummarySplitter;
