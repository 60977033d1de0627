//! The fragment corpus.
//!
//! A corpus is a read-only collection of annotated text fragments with
//! precomputed embeddings, produced offline by the chunking and metadata
//! extraction pipeline. This module owns the `Fragment` data model and the
//! JSON load/save boundary; it never computes embeddings itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors from loading or validating a corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate fragment id: {0}")]
    DuplicateId(FragmentId),

    #[error("Fragment {id} has no embedding")]
    MissingEmbedding { id: FragmentId },

    #[error("Fragment {id} has embedding dimension {found}, corpus uses {expected}")]
    DimensionMismatch {
        id: FragmentId,
        expected: usize,
        found: usize,
    },
}

/// Stable, globally unique identifier for a fragment.
///
/// Ids are assigned by the corpus builder and referenced by session state
/// across a scene's lifetime, so they must survive process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(String);

impl FragmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FragmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FragmentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Size class of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// A complete line of dialogue.
    FullLine,
    /// A clause or phrase within a line.
    Phrase,
    /// A 3-8 word splinter, suitable for stitching.
    Fragment,
}

impl Granularity {
    /// Parse a lowercase tag as emitted by the corpus builder.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "full_line" => Some(Self::FullLine),
            "phrase" => Some(Self::Phrase),
            "fragment" => Some(Self::Fragment),
            _ => None,
        }
    }
}

/// Dramatic context the fragment was spoken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryContext {
    Soliloquy,
    Dialogue,
    Aside,
    Monologue,
}

impl DeliveryContext {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "soliloquy" => Some(Self::Soliloquy),
            "dialogue" => Some(Self::Dialogue),
            "aside" => Some(Self::Aside),
            "monologue" => Some(Self::Monologue),
            _ => None,
        }
    }
}

/// Verse/prose classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Meter {
    Verse,
    Prose,
    Irregular,
}

impl Meter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "verse" => Some(Self::Verse),
            "prose" => Some(Self::Prose),
            "irregular" => Some(Self::Irregular),
            _ => None,
        }
    }
}

/// Register of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formality {
    High,
    Medium,
    Low,
}

impl Formality {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Tense orientation of the fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeReference {
    Past,
    Present,
    Future,
    Timeless,
}

impl TimeReference {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "past" => Some(Self::Past),
            "present" => Some(Self::Present),
            "future" => Some(Self::Future),
            "timeless" => Some(Self::Timeless),
            _ => None,
        }
    }
}

/// An atomic authored excerpt with fixed metadata and a precomputed embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub text: String,
    pub granularity: Granularity,

    // Provenance
    pub source_play: String,
    pub act: u32,
    pub scene: u32,
    pub speaking_character: String,

    // Annotations
    pub character_type: Vec<String>,
    pub emotional_tone: Vec<String>,
    pub themes: Vec<String>,
    #[serde(default)]
    pub addressee: Option<String>,
    pub delivery_context: DeliveryContext,
    pub meter: Meter,
    pub formality: Formality,
    pub has_metaphor: bool,
    pub has_question: bool,
    pub has_exclamation: bool,
    pub word_count: usize,
    pub time_reference: TimeReference,
    pub literary_devices: Vec<String>,

    /// Fixed-length vector, computed once by the corpus builder.
    pub embedding: Vec<f32>,
}

/// A loaded, validated fragment corpus.
///
/// Immutable after construction; safe to share read-concurrently across
/// independent scene runs.
#[derive(Debug, Clone)]
pub struct Corpus {
    fragments: Vec<Fragment>,
    by_id: HashMap<FragmentId, usize>,
    dimension: usize,
}

impl Corpus {
    /// Build a corpus from fragments, validating id uniqueness and a
    /// uniform embedding dimension.
    ///
    /// A ragged dimension means the corpus was built against more than one
    /// embedding model, which is a configuration error.
    pub fn from_fragments(fragments: Vec<Fragment>) -> Result<Self, CorpusError> {
        let dimension = fragments
            .first()
            .map(|f| f.embedding.len())
            .unwrap_or_default();

        let mut by_id = HashMap::with_capacity(fragments.len());
        for (i, fragment) in fragments.iter().enumerate() {
            if fragment.embedding.is_empty() {
                return Err(CorpusError::MissingEmbedding {
                    id: fragment.id.clone(),
                });
            }
            if fragment.embedding.len() != dimension {
                return Err(CorpusError::DimensionMismatch {
                    id: fragment.id.clone(),
                    expected: dimension,
                    found: fragment.embedding.len(),
                });
            }
            if by_id.insert(fragment.id.clone(), i).is_some() {
                return Err(CorpusError::DuplicateId(fragment.id.clone()));
            }
        }

        Ok(Self {
            fragments,
            by_id,
            dimension,
        })
    }

    /// Load a corpus from a JSON fragment array.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let content = fs::read_to_string(path).await?;
        let fragments: Vec<Fragment> = serde_json::from_str(&content)?;
        Self::from_fragments(fragments)
    }

    /// Save the corpus back to a JSON fragment array.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), CorpusError> {
        let content = serde_json::to_string_pretty(&self.fragments)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Number of fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Embedding dimension shared by every fragment (0 for an empty corpus).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Look up a fragment by id.
    pub fn get(&self, id: &FragmentId) -> Option<&Fragment> {
        self.by_id.get(id).map(|&i| &self.fragments[i])
    }

    /// Iterate over all fragments.
    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_fragment;

    #[test]
    fn test_from_fragments_indexes_by_id() {
        let corpus = Corpus::from_fragments(vec![
            sample_fragment("ham_1", "to be or not to be", &["death"], &["melancholy"]),
            sample_fragment("ham_2", "the rest is silence", &["death"], &["melancholy"]),
        ])
        .unwrap();

        assert_eq!(corpus.len(), 2);
        assert!(corpus.get(&FragmentId::from("ham_1")).is_some());
        assert!(corpus.get(&FragmentId::from("missing")).is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = Corpus::from_fragments(vec![
            sample_fragment("ham_1", "to be", &["death"], &["melancholy"]),
            sample_fragment("ham_1", "not to be", &["death"], &["melancholy"]),
        ]);

        assert!(matches!(result, Err(CorpusError::DuplicateId(_))));
    }

    #[test]
    fn test_ragged_dimension_rejected() {
        let mut short = sample_fragment("ham_2", "not to be", &["death"], &["melancholy"]);
        short.embedding.pop();

        let result = Corpus::from_fragments(vec![
            sample_fragment("ham_1", "to be", &["death"], &["melancholy"]),
            short,
        ]);

        assert!(matches!(result, Err(CorpusError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_fragment_deserializes_from_builder_json() {
        let json = r#"{
            "id": "hamlet_3_1_0001",
            "text": "To be, or not to be: that is the question",
            "granularity": "full_line",
            "source_play": "Hamlet",
            "act": 3,
            "scene": 1,
            "speaking_character": "Hamlet",
            "character_type": ["royalty"],
            "emotional_tone": ["melancholy", "contemplative"],
            "themes": ["death", "fate"],
            "delivery_context": "soliloquy",
            "meter": "verse",
            "formality": "high",
            "has_metaphor": false,
            "has_question": false,
            "has_exclamation": false,
            "word_count": 10,
            "time_reference": "timeless",
            "literary_devices": ["none"],
            "embedding": [0.1, 0.2, 0.3]
        }"#;

        let fragment: Fragment = serde_json::from_str(json).unwrap();
        assert_eq!(fragment.id.as_str(), "hamlet_3_1_0001");
        assert_eq!(fragment.granularity, Granularity::FullLine);
        assert_eq!(fragment.delivery_context, DeliveryContext::Soliloquy);
        assert_eq!(fragment.meter, Meter::Verse);
        assert!(fragment.addressee.is_none());
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!(Granularity::parse("full_line"), Some(Granularity::FullLine));
        assert_eq!(Granularity::parse("FRAGMENT"), Some(Granularity::Fragment));
        assert_eq!(Granularity::parse("stanza"), None);
        assert_eq!(Formality::parse("high"), Some(Formality::High));
        assert_eq!(TimeReference::parse("future"), Some(TimeReference::Future));
        assert_eq!(DeliveryContext::parse("aside"), Some(DeliveryContext::Aside));
    }
}
