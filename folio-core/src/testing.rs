//! Testing utilities for scene composition.
//!
//! This module provides tools for integration testing:
//! - `ScriptedOracle` for deterministic runs without API calls
//! - `sample_corpus` / `sample_fragment` constructors
//! - `TestHarness` wiring a director over the sample corpus
//! - Assertion helpers for verifying scene invariants

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::corpus::{
    Corpus, DeliveryContext, Formality, Fragment, FragmentId, Granularity, Meter, TimeReference,
};
use crate::director::oracle::{OracleError, SceneOracle, SearchOutcome, SpeechMove};
use crate::director::{DirectorError, DirectorLimits, QuoteOffer, SceneDirector};
use crate::embedding::HashEmbedder;
use crate::index::MemoryIndex;
use crate::retrieval::{QuoteEngine, QuoteRequest};
use crate::scene::{PlannedSpeech, Scene, SceneSpec, Speech};
use crate::session::Session;

/// Build a fragment with test defaults and a hash embedding.
pub fn sample_fragment(id: &str, text: &str, themes: &[&str], tones: &[&str]) -> Fragment {
    fragment_from(id, text, "Test Play", "Player", themes, tones)
}

fn fragment_from(
    id: &str,
    text: &str,
    play: &str,
    speaker: &str,
    themes: &[&str],
    tones: &[&str],
) -> Fragment {
    Fragment {
        id: FragmentId::from(id),
        text: text.to_string(),
        granularity: Granularity::Phrase,
        source_play: play.to_string(),
        act: 1,
        scene: 1,
        speaking_character: speaker.to_string(),
        character_type: vec!["commoner".to_string()],
        emotional_tone: tones.iter().map(|s| s.to_string()).collect(),
        themes: themes.iter().map(|s| s.to_string()).collect(),
        addressee: None,
        delivery_context: DeliveryContext::Dialogue,
        meter: Meter::Verse,
        formality: Formality::Medium,
        has_metaphor: false,
        has_question: false,
        has_exclamation: false,
        word_count: text.split_whitespace().count(),
        time_reference: TimeReference::Present,
        literary_devices: vec!["none".to_string()],
        embedding: HashEmbedder::default().embed_sync(text),
    }
}

/// A small themed corpus: exactly 3 fragments tagged `love` and 2 tagged
/// `power`, plus two death-themed lines for variety.
pub fn sample_corpus() -> Corpus {
    let fragments = vec![
        fragment_from(
            "love_1",
            "my heart is full of love",
            "Romeo and Juliet",
            "Romeo",
            &["love"],
            &["loving"],
        ),
        fragment_from(
            "love_2",
            "love looks not with the eyes but with the mind",
            "A Midsummer Night's Dream",
            "Helena",
            &["love"],
            &["loving", "contemplative"],
        ),
        fragment_from(
            "love_3",
            "the course of true love never did run smooth",
            "A Midsummer Night's Dream",
            "Lysander",
            &["love", "fate"],
            &["melancholy"],
        ),
        fragment_from(
            "power_1",
            "uneasy lies the head that wears a crown",
            "Henry IV Part 2",
            "King Henry",
            &["power"],
            &["melancholy"],
        ),
        fragment_from(
            "power_2",
            "stars hide your fires let not light see my black and deep desires",
            "Macbeth",
            "Macbeth",
            &["power", "ambition"],
            &["desperate"],
        ),
        fragment_from(
            "death_1",
            "out out brief candle life is but a walking shadow",
            "Macbeth",
            "Macbeth",
            &["death", "fate"],
            &["desperate", "melancholy"],
        ),
        fragment_from(
            "death_2",
            "the rest is silence",
            "Hamlet",
            "Hamlet",
            &["death"],
            &["melancholy"],
        ),
    ];
    Corpus::from_fragments(fragments).expect("sample corpus is valid")
}

/// An engine over the given corpus with the deterministic hash embedder.
pub fn engine_for(corpus: Corpus) -> QuoteEngine {
    QuoteEngine::new(
        Arc::new(MemoryIndex::new(corpus)),
        Arc::new(HashEmbedder::default()),
    )
}

/// Shorthand for a plan entry.
pub fn plan_entry(character: &str, intent: &str) -> PlannedSpeech {
    PlannedSpeech {
        character: character.to_string(),
        intent: intent.to_string(),
        emotional_tone: Vec::new(),
        themes: Vec::new(),
    }
}

/// One scripted step for the oracle.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Issue this search.
    Search(QuoteRequest),
    /// Take this exact fragment id.
    Take(FragmentId),
    /// Take the nth offer from the most recent search result.
    TakeNth(usize),
    /// Close the speech.
    Close,
}

/// A scene oracle that returns scripted moves.
///
/// Use this for deterministic director tests without API calls. When a
/// speech's script runs dry the oracle closes the speech.
pub struct ScriptedOracle {
    plan: Vec<PlannedSpeech>,
    scripts: Vec<VecDeque<ScriptStep>>,
    current: usize,
    observed: Vec<SearchOutcome>,
    last_offers: Vec<QuoteOffer>,
}

impl ScriptedOracle {
    /// Create an oracle with the given plan and no scripts.
    pub fn new(plan: Vec<PlannedSpeech>) -> Self {
        Self {
            plan,
            scripts: Vec::new(),
            current: 0,
            observed: Vec::new(),
            last_offers: Vec::new(),
        }
    }

    /// Append the script for the next speech (in plan order).
    pub fn with_speech_script(mut self, steps: Vec<ScriptStep>) -> Self {
        self.scripts.push(steps.into());
        self
    }

    /// Every outcome the director reported back.
    pub fn observed(&self) -> &[SearchOutcome] {
        &self.observed
    }

    /// Did any move get rejected?
    pub fn saw_rejection(&self) -> bool {
        self.observed
            .iter()
            .any(|o| matches!(o, SearchOutcome::Rejected(_)))
    }

    /// Did any search come back with relaxed filters?
    pub fn saw_relaxed_offers(&self) -> bool {
        self.observed
            .iter()
            .any(|o| matches!(o, SearchOutcome::Offers { relaxed: true, .. }))
    }

    /// Number of search results observed.
    pub fn searches_observed(&self) -> usize {
        self.observed
            .iter()
            .filter(|o| matches!(o, SearchOutcome::Offers { .. }))
            .count()
    }
}

#[async_trait]
impl SceneOracle for ScriptedOracle {
    async fn plan(&mut self, _spec: &SceneSpec) -> Result<Vec<PlannedSpeech>, OracleError> {
        Ok(self.plan.clone())
    }

    fn begin_speech(&mut self, index: usize, _plan: &PlannedSpeech, _preceding: &[Speech]) {
        self.current = index;
        self.last_offers.clear();
    }

    async fn next_move(
        &mut self,
        outcome: Option<SearchOutcome>,
    ) -> Result<SpeechMove, OracleError> {
        if let Some(outcome) = outcome {
            if let SearchOutcome::Offers { ref offers, .. } = outcome {
                self.last_offers = offers.clone();
            }
            self.observed.push(outcome);
        }

        let step = self
            .scripts
            .get_mut(self.current)
            .and_then(|script| script.pop_front());

        Ok(match step {
            Some(ScriptStep::Search(request)) => SpeechMove::Search(request),
            Some(ScriptStep::Take(id)) => SpeechMove::Take(id),
            Some(ScriptStep::TakeNth(n)) => match self.last_offers.get(n) {
                Some(offer) => SpeechMove::Take(offer.id.clone()),
                None => SpeechMove::Close,
            },
            Some(ScriptStep::Close) | None => SpeechMove::Close,
        })
    }
}

/// Test harness: a director over the sample corpus plus a fresh session.
pub struct TestHarness {
    pub director: SceneDirector,
    pub session: Session,
}

impl TestHarness {
    /// Harness over [`sample_corpus`].
    pub fn new() -> Self {
        Self::with_corpus(sample_corpus())
    }

    /// Harness over a custom corpus.
    pub fn with_corpus(corpus: Corpus) -> Self {
        Self {
            director: SceneDirector::new(engine_for(corpus)),
            session: Session::new(),
        }
    }

    /// Replace the director's budgets.
    pub fn with_limits(mut self, limits: DirectorLimits) -> Self {
        self.director = self.director.with_limits(limits);
        self
    }

    /// Compose a scene with a scripted oracle.
    pub async fn compose(
        &mut self,
        spec: &SceneSpec,
        oracle: &mut ScriptedOracle,
    ) -> Result<Scene, DirectorError> {
        self.director.compose(spec, oracle, &mut self.session).await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that no fragment id appears in the scene more than once.
#[track_caller]
pub fn assert_no_repeats(scene: &Scene) {
    let ids = scene.fragment_ids();
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        assert!(
            seen.insert(id),
            "Fragment '{id}' appears more than once in the scene"
        );
    }
}

/// Assert the number of non-empty speeches.
#[track_caller]
pub fn assert_speech_count(scene: &Scene, expected: usize) {
    let actual = scene.speeches.iter().filter(|s| !s.is_empty()).count();
    assert_eq!(
        actual, expected,
        "Expected {expected} non-empty speeches, got {actual}"
    );
}

/// Assert a fragment id was consumed by the session.
#[track_caller]
pub fn assert_used(session: &Session, id: &str) {
    assert!(
        session.is_used(&FragmentId::from(id)),
        "Expected fragment '{id}' to be marked used"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_speech_spec() -> SceneSpec {
        SceneSpec::new("a single declaration")
            .with_character("Romeo", "in love")
            .with_target_speeches(1)
    }

    #[tokio::test]
    async fn test_scripted_basic_flow() {
        let mut harness = TestHarness::new();
        let mut oracle = ScriptedOracle::new(vec![plan_entry("Romeo", "declare love")])
            .with_speech_script(vec![
                ScriptStep::Search(QuoteRequest::new("my heart is full of love")),
                ScriptStep::TakeNth(0),
                ScriptStep::Close,
            ]);

        let scene = harness.compose(&one_speech_spec(), &mut oracle).await.unwrap();

        assert_eq!(scene.speeches.len(), 1);
        assert_eq!(scene.speeches[0].fragments.len(), 1);
        assert_eq!(scene.speeches[0].character, "Romeo");
        assert_eq!(harness.session.usage_count(), 1);
        assert_no_repeats(&scene);
    }

    #[tokio::test]
    async fn test_script_runs_dry_closes_speech() {
        let mut harness = TestHarness::new();
        let mut oracle = ScriptedOracle::new(vec![plan_entry("Romeo", "nothing to say")]);

        let scene = harness.compose(&one_speech_spec(), &mut oracle).await.unwrap();

        assert_eq!(scene.speeches.len(), 1);
        assert!(scene.speeches[0].is_empty());
        assert_speech_count(&scene, 0);
    }

    #[tokio::test]
    async fn test_take_nth_uses_latest_offers() {
        let mut harness = TestHarness::new();
        let mut oracle = ScriptedOracle::new(vec![plan_entry("Romeo", "two fragments")])
            .with_speech_script(vec![
                ScriptStep::Search(QuoteRequest::new("love").with_max_results(3)),
                ScriptStep::TakeNth(1),
                ScriptStep::Close,
            ]);

        let scene = harness.compose(&one_speech_spec(), &mut oracle).await.unwrap();
        assert_eq!(scene.speeches[0].fragments.len(), 1);

        // The taken fragment is the second-ranked offer for the query.
        let offers = match &oracle.observed()[0] {
            SearchOutcome::Offers { offers, .. } => offers.clone(),
            other => panic!("expected offers, got {other:?}"),
        };
        assert_eq!(scene.speeches[0].fragments[0].id, offers[1].id);
    }
}
