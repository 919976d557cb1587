//! Scene matching: pairs every summary segment with one scene.
//!
//! Similarity comes from an injected [`SimilarityScorer`]; the assignment
//! itself lives in [`assign`].

pub mod assign;
pub mod embedding;
pub mod lexical;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Match, MatchOrigin, Scene, SummarySegment};

pub use assign::{assign, Assignment};
pub use embedding::HttpEmbeddingScorer;
pub use lexical::LexicalScorer;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Similarity request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Similarity service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed similarity response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("No summary segments to match")]
    NoSegments,

    #[error("No scenes to match against")]
    NoScenes,

    #[error("Scoring failed: {0}")]
    Scoring(#[from] ScoreError),

    #[error("Scorer returned a {rows}x{cols} matrix, expected {expected_rows}x{expected_cols}")]
    Shape {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },
}

/// Semantic similarity between a summary sentence and a scene caption.
/// Higher is more similar.
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    async fn score(&self, text: &str, caption: &str) -> Result<f64, ScoreError>;

    /// Scores every (segment, caption) pair, row per segment. Remote
    /// scorers override this to batch their requests.
    async fn score_matrix(
        &self,
        segments: &[&str],
        captions: &[&str],
    ) -> Result<Vec<Vec<f64>>, ScoreError> {
        let mut matrix = Vec::with_capacity(segments.len());
        for segment in segments {
            let mut row = Vec::with_capacity(captions.len());
            for caption in captions {
                row.push(self.score(segment, caption).await?);
            }
            matrix.push(row);
        }
        Ok(matrix)
    }
}

#[derive(Clone)]
pub struct Matcher {
    scorer: Arc<dyn SimilarityScorer>,
    out_of_order_penalty: f64,
}

impl Matcher {
    pub fn new(scorer: Arc<dyn SimilarityScorer>, out_of_order_penalty: f64) -> Self {
        Self {
            scorer,
            out_of_order_penalty,
        }
    }

    /// Returns exactly one match per segment, in segment order.
    pub async fn match_segments(
        &self,
        segments: &[SummarySegment],
        scenes: &[Scene],
    ) -> Result<Vec<Match>, MatchError> {
        if segments.is_empty() {
            return Err(MatchError::NoSegments);
        }
        if scenes.is_empty() {
            return Err(MatchError::NoScenes);
        }

        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        let captions: Vec<&str> = scenes
            .iter()
            .map(|s| s.caption.as_deref().unwrap_or(""))
            .collect();

        let matrix = self.scorer.score_matrix(&texts, &captions).await?;
        if matrix.len() != segments.len() || matrix.iter().any(|row| row.len() != scenes.len()) {
            return Err(MatchError::Shape {
                rows: matrix.len(),
                cols: matrix.first().map(|r| r.len()).unwrap_or(0),
                expected_rows: segments.len(),
                expected_cols: scenes.len(),
            });
        }

        let assignments = assign(&matrix, self.out_of_order_penalty);

        Ok(segments
            .iter()
            .zip(assignments)
            .map(|(segment, a)| Match {
                segment_id: segment.id.clone(),
                scene_id: scenes[a.scene_index].id.clone(),
                score: Some(a.score),
                origin: MatchOrigin::Auto,
            })
            .collect())
    }
}
