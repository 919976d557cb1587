//! Similarity backed by a remote embedding service.
//!
//! The service receives `{"input": [text, ...]}` and answers
//! `{"embeddings": [[f32, ...], ...]}` in the same order. Vectors are kept in
//! a bounded cache shared by all jobs. No lock is held while a request is in
//! flight, so one job's slow call never delays another's.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};

use super::{ScoreError, SimilarityScorer};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct HttpEmbeddingScorer {
    client: reqwest::Client,
    endpoint: String,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl HttpEmbeddingScorer {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        cache_capacity: u64,
    ) -> Result<Self, ScoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            cache: Cache::new(cache_capacity),
        })
    }

    async fn embed_all(&self, texts: &[&str]) -> Result<Vec<Arc<Vec<f32>>>, ScoreError> {
        let mut resolved: Vec<Option<Arc<Vec<f32>>>> =
            texts.iter().map(|t| self.cache.get(*t)).collect();

        let mut missing: Vec<String> = Vec::new();
        for (text, vector) in texts.iter().zip(&resolved) {
            if vector.is_none() && !missing.iter().any(|m| m == text) {
                missing.push(text.to_string());
            }
        }

        if !missing.is_empty() {
            let fetched = self.request(&missing).await?;
            for (text, vector) in missing.iter().zip(&fetched) {
                self.cache.insert(text.clone(), vector.clone());
            }
            for (text, slot) in texts.iter().zip(resolved.iter_mut()) {
                if slot.is_none() {
                    *slot = missing
                        .iter()
                        .position(|m| m == text)
                        .map(|i| fetched[i].clone());
                }
            }
        }

        texts
            .iter()
            .zip(resolved)
            .map(|(t, vector)| {
                vector.ok_or_else(|| {
                    ScoreError::MalformedResponse(format!("no embedding for '{}'", t))
                })
            })
            .collect()
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Arc<Vec<f32>>>, ScoreError> {
        tracing::debug!(count = input.len(), "Requesting embeddings");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest { input })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.embeddings.len() != input.len() {
            return Err(ScoreError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                input.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(parsed.embeddings.into_iter().map(Arc::new).collect())
    }
}

#[async_trait]
impl SimilarityScorer for HttpEmbeddingScorer {
    async fn score(&self, text: &str, caption: &str) -> Result<f64, ScoreError> {
        let vectors = self.embed_all(&[text, caption]).await?;
        Ok(cosine(&vectors[0], &vectors[1]))
    }

    async fn score_matrix(
        &self,
        segments: &[&str],
        captions: &[&str],
    ) -> Result<Vec<Vec<f64>>, ScoreError> {
        let all: Vec<&str> = segments.iter().chain(captions.iter()).copied().collect();
        let vectors = self.embed_all(&all).await?;
        let (segment_vectors, caption_vectors) = vectors.split_at(segments.len());

        Ok(segment_vectors
            .iter()
            .map(|s| caption_vectors.iter().map(|c| cosine(s, c)).collect())
            .collect())
    }
}

/// Cosine similarity; zero when either vector is zero or lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
