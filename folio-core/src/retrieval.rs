//! Quote retrieval engine.
//!
//! One operation: [`QuoteEngine::retrieve`] — semantic ranking plus
//! structured filtering plus exclusion-by-id. The engine is a pure read:
//! it never mutates the session or the corpus, and an identical query with
//! an unchanged exclusion set returns an identical ordered result.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::corpus::{DeliveryContext, Formality, Fragment, FragmentId, Granularity, Meter, TimeReference};
use crate::embedding::{EmbedError, Embedder};
use crate::index::{IndexError, QuoteIndex};
use crate::Tool;

/// Result cap applied when a query does not specify one.
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Errors from the retrieval engine.
///
/// `InvalidQuery` is a local precondition violation (an orchestration bug)
/// and is never shown to the end user; `Index` and `Embed` are
/// infrastructure failures and the only conditions that abort a run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Embed(#[from] EmbedError),
}

/// Structured constraints on fragment attributes.
///
/// Scalar fields must match exactly; tag fields match when the fragment's
/// tag set intersects the requested set (any-of).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteFilter {
    pub source_play: Option<String>,
    pub speaking_character: Option<String>,
    pub delivery_context: Option<DeliveryContext>,
    pub granularity: Option<Granularity>,
    pub meter: Option<Meter>,
    pub formality: Option<Formality>,
    pub time_reference: Option<TimeReference>,
    pub has_metaphor: Option<bool>,
    pub has_question: Option<bool>,
    pub has_exclamation: Option<bool>,
    pub character_type: Option<Vec<String>>,
    pub emotional_tone: Option<Vec<String>>,
    pub themes: Option<Vec<String>>,
    pub literary_devices: Option<Vec<String>>,
}

fn intersects(wanted: &[String], present: &[String]) -> bool {
    wanted.iter().any(|w| present.iter().any(|p| p == w))
}

impl QuoteFilter {
    /// True when no constraint is set.
    pub fn is_empty(&self) -> bool {
        self.source_play.is_none()
            && self.speaking_character.is_none()
            && self.delivery_context.is_none()
            && self.granularity.is_none()
            && self.meter.is_none()
            && self.formality.is_none()
            && self.time_reference.is_none()
            && self.has_metaphor.is_none()
            && self.has_question.is_none()
            && self.has_exclamation.is_none()
            && self.character_type.is_none()
            && self.emotional_tone.is_none()
            && self.themes.is_none()
            && self.literary_devices.is_none()
    }

    /// Present filter values must be non-empty.
    fn validate(&self) -> Result<(), String> {
        let empty_scalar = [
            ("source_play", &self.source_play),
            ("speaking_character", &self.speaking_character),
        ]
        .into_iter()
        .find(|(_, v)| v.as_deref().is_some_and(|s| s.trim().is_empty()));
        if let Some((name, _)) = empty_scalar {
            return Err(format!("filter field '{name}' is present but empty"));
        }

        let empty_tags = [
            ("character_type", &self.character_type),
            ("emotional_tone", &self.emotional_tone),
            ("themes", &self.themes),
            ("literary_devices", &self.literary_devices),
        ]
        .into_iter()
        .find(|(_, v)| v.as_deref().is_some_and(|t| t.is_empty()));
        if let Some((name, _)) = empty_tags {
            return Err(format!("tag filter '{name}' is present but empty"));
        }

        Ok(())
    }

    /// A fragment survives only if every specified scalar matches exactly
    /// and every specified tag set has a non-empty intersection.
    pub fn matches(&self, fragment: &Fragment) -> bool {
        if let Some(ref play) = self.source_play {
            if &fragment.source_play != play {
                return false;
            }
        }
        if let Some(ref speaker) = self.speaking_character {
            if &fragment.speaking_character != speaker {
                return false;
            }
        }
        if let Some(context) = self.delivery_context {
            if fragment.delivery_context != context {
                return false;
            }
        }
        if let Some(granularity) = self.granularity {
            if fragment.granularity != granularity {
                return false;
            }
        }
        if let Some(meter) = self.meter {
            if fragment.meter != meter {
                return false;
            }
        }
        if let Some(formality) = self.formality {
            if fragment.formality != formality {
                return false;
            }
        }
        if let Some(time_reference) = self.time_reference {
            if fragment.time_reference != time_reference {
                return false;
            }
        }
        if let Some(has_metaphor) = self.has_metaphor {
            if fragment.has_metaphor != has_metaphor {
                return false;
            }
        }
        if let Some(has_question) = self.has_question {
            if fragment.has_question != has_question {
                return false;
            }
        }
        if let Some(has_exclamation) = self.has_exclamation {
            if fragment.has_exclamation != has_exclamation {
                return false;
            }
        }
        if let Some(ref tags) = self.character_type {
            if !intersects(tags, &fragment.character_type) {
                return false;
            }
        }
        if let Some(ref tags) = self.emotional_tone {
            if !intersects(tags, &fragment.emotional_tone) {
                return false;
            }
        }
        if let Some(ref tags) = self.themes {
            if !intersects(tags, &fragment.themes) {
                return false;
            }
        }
        if let Some(ref tags) = self.literary_devices {
            if !intersects(tags, &fragment.literary_devices) {
                return false;
            }
        }
        true
    }
}

/// A retrieval query, built fresh for each engine call.
#[derive(Debug, Clone)]
pub struct QuoteQuery {
    /// Natural language description of the desired meaning. Required.
    pub text: String,
    /// Precomputed query embedding; computed from `text` when absent.
    pub embedding: Option<Vec<f32>>,
    pub filter: QuoteFilter,
    /// Fragment ids that must not be returned, sourced from the session.
    pub exclude: HashSet<FragmentId>,
    pub max_results: usize,
}

impl QuoteQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            embedding: None,
            filter: QuoteFilter::default(),
            exclude: HashSet::new(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_filter(mut self, filter: QuoteFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_exclusions(mut self, exclude: impl IntoIterator<Item = FragmentId>) -> Self {
        self.exclude = exclude.into_iter().collect();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// A scored retrieval candidate. Score is cosine similarity in [-1, 1].
#[derive(Debug, Clone)]
pub struct QuoteHit {
    pub fragment: Fragment,
    pub score: f32,
}

/// Deterministic result order: score descending, ties broken by lower
/// word count, then by id.
fn rank(a: &QuoteHit, b: &QuoteHit) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.fragment.word_count.cmp(&b.fragment.word_count))
        .then_with(|| a.fragment.id.cmp(&b.fragment.id))
}

// Model-facing tool input; the doc comment below doubles as the tool
// description sent to the API, so keep it addressed to the model.
/// Search the Shakespeare quote corpus for authentic fragments matching a semantic query and optional metadata filters. Every piece of dialogue must come from this tool; never invent quote text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Tool)]
#[tool(name = "search_quotes")]
pub struct QuoteRequest {
    /// Natural language description of the desired quote meaning/content
    pub semantic_query: String,
    /// Filter by character type, any of (e.g. royalty, comic_relief, commoner)
    #[serde(default)]
    pub character_type: Option<Vec<String>>,
    /// Filter by emotional tone, any of (e.g. joyful, melancholy, angry, fearful, loving)
    #[serde(default)]
    pub emotional_tone: Option<Vec<String>>,
    /// Filter by themes, any of (e.g. love, death, power, betrayal, nature, fate)
    #[serde(default)]
    pub themes: Option<Vec<String>>,
    /// Filter by context type: soliloquy, dialogue, aside, or monologue
    #[serde(default)]
    pub context_type: Option<String>,
    /// Filter by chunk type: full_line, phrase, or fragment
    #[serde(default)]
    pub chunk_type: Option<String>,
    /// Filter by formality level: high, medium, or low
    #[serde(default)]
    pub formality_level: Option<String>,
    /// Filter by specific source play
    #[serde(default)]
    pub play_title: Option<String>,
    /// Maximum number of quotes to return (default: 5)
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl QuoteRequest {
    pub fn new(semantic_query: impl Into<String>) -> Self {
        Self {
            semantic_query: semantic_query.into(),
            ..Default::default()
        }
    }

    pub fn with_themes(mut self, themes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.themes = Some(themes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_tones(mut self, tones: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.emotional_tone = Some(tones.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// The same request with every optional filter dropped: only the query
    /// text (and the caller's exclusions) remain.
    pub fn relaxed(&self) -> Self {
        Self {
            semantic_query: self.semantic_query.clone(),
            max_results: self.max_results,
            ..Default::default()
        }
    }

    /// Convert into an engine query, attaching the caller's exclusion set.
    ///
    /// Unknown scalar tag values are an `InvalidQuery`: the schema declares
    /// the valid vocabulary, so anything else is a malformed request.
    pub fn to_query(&self, exclude: HashSet<FragmentId>) -> Result<QuoteQuery, EngineError> {
        let mut filter = QuoteFilter {
            source_play: self.play_title.clone(),
            character_type: self.character_type.clone(),
            emotional_tone: self.emotional_tone.clone(),
            themes: self.themes.clone(),
            ..Default::default()
        };

        if let Some(ref s) = self.context_type {
            filter.delivery_context = Some(DeliveryContext::parse(s).ok_or_else(|| {
                EngineError::InvalidQuery(format!("unknown context_type '{s}'"))
            })?);
        }
        if let Some(ref s) = self.chunk_type {
            filter.granularity = Some(Granularity::parse(s).ok_or_else(|| {
                EngineError::InvalidQuery(format!("unknown chunk_type '{s}'"))
            })?);
        }
        if let Some(ref s) = self.formality_level {
            filter.formality = Some(Formality::parse(s).ok_or_else(|| {
                EngineError::InvalidQuery(format!("unknown formality_level '{s}'"))
            })?);
        }

        Ok(QuoteQuery {
            text: self.semantic_query.clone(),
            embedding: None,
            filter,
            exclude,
            max_results: self.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
        })
    }
}

/// Semantic + structured-filter search with exclusion-by-id.
#[derive(Clone)]
pub struct QuoteEngine {
    index: Arc<dyn QuoteIndex>,
    embedder: Arc<dyn Embedder>,
}

impl QuoteEngine {
    pub fn new(index: Arc<dyn QuoteIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &Arc<dyn QuoteIndex> {
        &self.index
    }

    /// Run one retrieval.
    ///
    /// The index applies attribute filters natively, so requesting
    /// `max_results + exclude.len()` candidates guarantees the post-exclusion
    /// truncation is exact. An empty result is a valid outcome; callers are
    /// expected to have a fallback policy.
    pub async fn retrieve(&self, query: &QuoteQuery) -> Result<Vec<QuoteHit>, EngineError> {
        if query.text.trim().is_empty() {
            return Err(EngineError::InvalidQuery("query text is empty".into()));
        }
        if query.max_results < 1 {
            return Err(EngineError::InvalidQuery("max_results must be >= 1".into()));
        }
        query.filter.validate().map_err(EngineError::InvalidQuery)?;

        let embedding = match query.embedding {
            Some(ref embedding) => embedding.clone(),
            None => self.embedder.embed(&query.text).await?,
        };

        let k = query.max_results + query.exclude.len();
        let mut hits = self.index.search(&embedding, k, &query.filter).await?;

        hits.retain(|hit| !query.exclude.contains(&hit.fragment.id));
        hits.sort_by(rank);
        hits.truncate(query.max_results);
        Ok(hits)
    }
}
