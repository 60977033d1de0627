//! The oracle boundary.
//!
//! The language model is the sole source of the speech plan, each per-query
//! intent, and each per-fragment accept/stop decision. The director never
//! infers these itself; it asks the oracle for the next move and executes
//! it under its own budgets and invariants. Substituting a scripted oracle
//! makes the whole state machine testable without API calls.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::corpus::FragmentId;
use crate::retrieval::{QuoteHit, QuoteRequest};
use crate::scene::{PlannedSpeech, SceneSpec, Speech};

/// Errors from the oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Claude API error: {0:?}")]
    Api(#[from] claude::Error),

    #[error("Oracle output malformed: {0}")]
    Malformed(String),
}

/// What the oracle wants the director to do next for the current speech.
#[derive(Debug, Clone)]
pub enum SpeechMove {
    /// Run a retrieval with these parameters (the director attaches the
    /// session's exclusions).
    Search(QuoteRequest),
    /// Accept one fragment, by id, from the most recent search result.
    Take(FragmentId),
    /// The speech is complete.
    Close,
}

/// A candidate echoed back to the oracle after a search.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteOffer {
    pub id: FragmentId,
    pub text: String,
    pub source_play: String,
    pub speaking_character: String,
    pub emotional_tone: Vec<String>,
    pub themes: Vec<String>,
    pub score: f32,
}

impl From<&QuoteHit> for QuoteOffer {
    fn from(hit: &QuoteHit) -> Self {
        Self {
            id: hit.fragment.id.clone(),
            text: hit.fragment.text.clone(),
            source_play: hit.fragment.source_play.clone(),
            speaking_character: hit.fragment.speaking_character.clone(),
            emotional_tone: hit.fragment.emotional_tone.clone(),
            themes: hit.fragment.themes.clone(),
            score: hit.score,
        }
    }
}

/// Feedback on the oracle's previous move.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// Candidates from the last search. `relaxed` is set when the director
    /// had to drop the optional filters to fill an empty first result.
    Offers {
        offers: Vec<QuoteOffer>,
        relaxed: bool,
    },
    /// The previous move was inadmissible (malformed search parameters, or
    /// a take of an id that was never offered or is already used).
    Rejected(String),
}

/// External decision source driving the director's state machine.
#[async_trait]
pub trait SceneOracle: Send {
    /// Produce the speech plan for a scene: an ordered list of
    /// (character, intent) entries.
    async fn plan(&mut self, spec: &SceneSpec) -> Result<Vec<PlannedSpeech>, OracleError>;

    /// Called when the director opens a planned speech. `preceding` holds
    /// the speeches composed so far, for continuity.
    fn begin_speech(&mut self, index: usize, plan: &PlannedSpeech, preceding: &[Speech]);

    /// The next move for the current speech. `outcome` carries feedback on
    /// the previous move, if it was a search or was rejected.
    async fn next_move(
        &mut self,
        outcome: Option<SearchOutcome>,
    ) -> Result<SpeechMove, OracleError>;
}
