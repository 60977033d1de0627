//! Retrieval index over the fragment corpus.
//!
//! Wraps the corpus with nearest-neighbor vector search plus attribute
//! filtering. The trait models the external store boundary (a remote vector
//! database would implement it); [`MemoryIndex`] is the in-process reference
//! backend used by the engine and the test suite.

use async_trait::async_trait;
use thiserror::Error;

use crate::corpus::{Corpus, Fragment, FragmentId};
use crate::retrieval::{QuoteFilter, QuoteHit};

/// Infrastructure errors from the index backend.
///
/// These are the only retrieval failures that propagate as hard errors;
/// an empty result set is a valid outcome, not an error.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Query embedding has dimension {found}, index uses {expected}")]
    Dimension { expected: usize, found: usize },
}

/// A queryable fragment store.
#[async_trait]
pub trait QuoteIndex: Send + Sync {
    /// Nearest-neighbor search by cosine similarity, restricted to fragments
    /// matching `filter`, returning at most `k` hits ordered by descending
    /// score.
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &QuoteFilter,
    ) -> Result<Vec<QuoteHit>, IndexError>;

    /// Fetch a fragment by id.
    async fn fetch(&self, id: &FragmentId) -> Result<Option<Fragment>, IndexError>;

    /// Number of fragments in the index.
    async fn count(&self) -> Result<usize, IndexError>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// In-memory index: brute-force cosine scoring over a loaded corpus.
///
/// Immutable after construction, so it can be shared read-concurrently
/// across independent scene runs without locking.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    corpus: Corpus,
}

impl MemoryIndex {
    pub fn new(corpus: Corpus) -> Self {
        Self { corpus }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }
}

#[async_trait]
impl QuoteIndex for MemoryIndex {
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &QuoteFilter,
    ) -> Result<Vec<QuoteHit>, IndexError> {
        if !self.corpus.is_empty() && embedding.len() != self.corpus.dimension() {
            return Err(IndexError::Dimension {
                expected: self.corpus.dimension(),
                found: embedding.len(),
            });
        }

        let mut hits: Vec<QuoteHit> = self
            .corpus
            .iter()
            .filter(|fragment| filter.matches(fragment))
            .map(|fragment| QuoteHit {
                score: cosine_similarity(&fragment.embedding, embedding),
                fragment: fragment.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn fetch(&self, id: &FragmentId) -> Result<Option<Fragment>, IndexError> {
        Ok(self.corpus.get(id).cloned())
    }

    async fn count(&self) -> Result<usize, IndexError> {
        Ok(self.corpus.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::testing::{sample_corpus, sample_fragment};

    fn embed(text: &str) -> Vec<f32> {
        HashEmbedder::default().embed_sync(text)
    }

    #[tokio::test]
    async fn test_search_orders_by_score() {
        let index = MemoryIndex::new(sample_corpus());
        let hits = index
            .search(&embed("love and the heart"), 10, &QuoteFilter::default())
            .await
            .unwrap();

        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_search_applies_tag_filter() {
        let index = MemoryIndex::new(sample_corpus());
        let filter = QuoteFilter {
            themes: Some(vec!["power".to_string()]),
            ..Default::default()
        };
        let hits = index.search(&embed("crown"), 10, &filter).await.unwrap();

        assert!(!hits.is_empty());
        assert!(hits
            .iter()
            .all(|h| h.fragment.themes.iter().any(|t| t == "power")));
    }

    #[tokio::test]
    async fn test_search_applies_scalar_filter() {
        let index = MemoryIndex::new(sample_corpus());
        let filter = QuoteFilter {
            source_play: Some("Macbeth".to_string()),
            ..Default::default()
        };
        let hits = index.search(&embed("night"), 10, &filter).await.unwrap();

        assert!(hits.iter().all(|h| h.fragment.source_play == "Macbeth"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_an_error() {
        let index = MemoryIndex::new(sample_corpus());
        let result = index.search(&[0.5, 0.5], 5, &QuoteFilter::default()).await;
        assert!(matches!(result, Err(IndexError::Dimension { .. })));
    }

    #[tokio::test]
    async fn test_fetch_by_id() {
        let index = MemoryIndex::new(sample_corpus());
        let fetched = index.fetch(&FragmentId::from("love_1")).await.unwrap();
        assert!(fetched.is_some());

        let missing = index.fetch(&FragmentId::from("nope")).await.unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let c = [-1.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert!((cosine_similarity(&a, &c) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_truncates_to_k() {
        let corpus = crate::corpus::Corpus::from_fragments(vec![
            sample_fragment("a", "the moon shines bright", &["nature"], &["neutral"]),
            sample_fragment("b", "the stars shine bright", &["nature"], &["neutral"]),
            sample_fragment("c", "the sun shines bright", &["nature"], &["neutral"]),
        ])
        .unwrap();
        let index = MemoryIndex::new(corpus);

        let hits = index
            .search(&embed("bright shine"), 2, &QuoteFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }
}
