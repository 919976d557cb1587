//! Bag-of-words cosine similarity, used when no embedding service is
//! configured.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{ScoreError, SimilarityScorer};

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "at", "by", "for", "with",
    "from", "is", "are", "was", "were", "be", "been", "it", "its", "his", "her", "him", "he",
    "she", "they", "them", "their", "this", "that", "these", "those", "as", "into", "while",
    "then", "there", "who", "what", "when", "where", "which", "i", "you", "we", "our", "your",
];

#[derive(Debug, Clone, Default)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let ta = term_frequencies(a);
        let tb = term_frequencies(b);
        if ta.is_empty() || tb.is_empty() {
            return 0.0;
        }

        let dot: f64 = ta
            .iter()
            .filter_map(|(term, x)| tb.get(term).map(|y| x * y))
            .sum();
        let norm_a = ta.values().map(|x| x * x).sum::<f64>().sqrt();
        let norm_b = tb.values().map(|y| y * y).sum::<f64>().sqrt();
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl SimilarityScorer for LexicalScorer {
    async fn score(&self, text: &str, caption: &str) -> Result<f64, ScoreError> {
        Ok(self.similarity(text, caption))
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        *counts.entry(stem(&word)).or_insert(0.0) += 1.0;
    }
    counts
}

/// Strips the most common English inflections.
fn stem(word: &str) -> String {
    let len = word.chars().count();
    if len > 5 && word.ends_with("ing") {
        return word[..word.len() - 3].to_string();
    }
    if len > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if len > 4 && word.ends_with("ed") {
        return word[..word.len() - 2].to_string();
    }
    if len > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}
