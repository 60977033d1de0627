//! The scene director state machine.
//!
//! Drives one scene through `Planning -> PerSpeech(i) -> Complete`,
//! executing the oracle's moves against the retrieval engine while
//! enforcing the invariants the oracle cannot be trusted with: exclusion
//! bookkeeping, admissibility of accepts, the empty-result fallback policy,
//! and termination budgets.

use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::watch;

use super::oracle::{SceneOracle, SearchOutcome, SpeechMove};
use crate::corpus::{Fragment, FragmentId};
use crate::retrieval::{EngineError, QuoteEngine, QuoteHit, QuoteRequest};
use crate::scene::{PlannedSpeech, Scene, SceneSpec, Speech};
use crate::session::Session;

/// Errors that abort a scene run.
///
/// Everything else (empty results, rejected moves, exhausted speeches) is
/// absorbed by the director's fallback logic once planning has succeeded.
#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Oracle error: {0}")]
    Oracle(#[from] super::oracle::OracleError),

    #[error("Retrieval failed: {0}")]
    Engine(EngineError),
}

/// Termination budgets for one scene run.
#[derive(Debug, Clone)]
pub struct DirectorLimits {
    /// Accepted fragments that close a speech.
    pub max_fragments_per_speech: usize,
    /// Engine calls allowed per speech (the relaxed retry counts).
    pub max_searches_per_speech: usize,
    /// Oracle moves allowed per speech.
    pub max_moves_per_speech: usize,
    /// Engine calls allowed per scene.
    pub max_searches_per_scene: usize,
}

impl Default for DirectorLimits {
    fn default() -> Self {
        Self {
            max_fragments_per_speech: 6,
            max_searches_per_speech: 8,
            max_moves_per_speech: 24,
            max_searches_per_scene: 64,
        }
    }
}

impl DirectorLimits {
    pub fn with_max_fragments_per_speech(mut self, n: usize) -> Self {
        self.max_fragments_per_speech = n;
        self
    }

    pub fn with_max_searches_per_speech(mut self, n: usize) -> Self {
        self.max_searches_per_speech = n;
        self
    }

    pub fn with_max_moves_per_speech(mut self, n: usize) -> Self {
        self.max_moves_per_speech = n;
        self
    }

    pub fn with_max_searches_per_scene(mut self, n: usize) -> Self {
        self.max_searches_per_scene = n;
        self
    }
}

/// The speech orchestration state machine.
pub struct SceneDirector {
    engine: QuoteEngine,
    limits: DirectorLimits,
    cancel: Option<watch::Receiver<bool>>,
}

impl SceneDirector {
    pub fn new(engine: QuoteEngine) -> Self {
        Self {
            engine,
            limits: DirectorLimits::default(),
            cancel: None,
        }
    }

    pub fn with_limits(mut self, limits: DirectorLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Install a cancellation flag, checked between speeches. A cancelled
    /// run returns the speeches completed so far.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Compose one scene.
    ///
    /// Queries and session updates are strictly ordered: each acceptance
    /// commits to the session before the next retrieval is issued, which is
    /// what gives the scene its global no-repeat guarantee.
    pub async fn compose(
        &self,
        spec: &SceneSpec,
        oracle: &mut dyn SceneOracle,
        session: &mut Session,
    ) -> Result<Scene, DirectorError> {
        let plan = oracle
            .plan(spec)
            .await
            .map_err(|e| DirectorError::Planning(e.to_string()))?;
        if plan.is_empty() {
            return Err(DirectorError::Planning(
                "the oracle produced no speeches".to_string(),
            ));
        }

        let mut speeches: Vec<Speech> = Vec::with_capacity(plan.len());
        let mut scene_searches = 0usize;

        for (index, planned) in plan.iter().enumerate() {
            if self.cancelled() {
                break;
            }
            let speech = self
                .compose_speech(index, planned, oracle, session, &speeches, &mut scene_searches)
                .await?;
            speeches.push(speech);
        }

        Ok(Scene {
            spec: spec.clone(),
            plan,
            speeches,
        })
    }

    /// The per-speech sub-loop: `AwaitingFragment -> accepted/rejected ->
    /// (loop | advance)`.
    async fn compose_speech(
        &self,
        index: usize,
        planned: &PlannedSpeech,
        oracle: &mut dyn SceneOracle,
        session: &mut Session,
        preceding: &[Speech],
        scene_searches: &mut usize,
    ) -> Result<Speech, DirectorError> {
        oracle.begin_speech(index, planned, preceding);

        let mut speech = Speech::new(&planned.character, &planned.intent);
        let mut offered: HashMap<FragmentId, Fragment> = HashMap::new();
        let mut outcome: Option<SearchOutcome> = None;
        let mut searches = 0usize;
        let mut relaxed_used = false;

        for _ in 0..self.limits.max_moves_per_speech {
            match oracle.next_move(outcome.take()).await? {
                SpeechMove::Close => break,

                SpeechMove::Take(id) => match offered.get(&id) {
                    Some(fragment) if !speech.contains(&id) && !session.is_used(&id) => {
                        // Acceptance and session update are one atomic step:
                        // no await between them, so cancellation can never
                        // observe a half-committed accept.
                        session.mark_used(id.clone(), &planned.character, index);
                        speech.push(fragment.clone());
                        if speech.fragments.len() >= self.limits.max_fragments_per_speech {
                            break;
                        }
                    }
                    Some(_) => {
                        outcome = Some(SearchOutcome::Rejected(format!(
                            "fragment {id} has already been used"
                        )));
                    }
                    None => {
                        outcome = Some(SearchOutcome::Rejected(format!(
                            "fragment {id} was not in the most recent search result"
                        )));
                    }
                },

                SpeechMove::Search(request) => {
                    if searches >= self.limits.max_searches_per_speech
                        || *scene_searches >= self.limits.max_searches_per_scene
                    {
                        break;
                    }
                    searches += 1;
                    *scene_searches += 1;

                    match self.run_search(&request, session).await {
                        Err(EngineError::InvalidQuery(reason)) => {
                            // An orchestration bug on the oracle's side;
                            // echoed back, never surfaced to the caller.
                            outcome = Some(SearchOutcome::Rejected(reason));
                        }
                        Err(err) => return Err(DirectorError::Engine(err)),
                        Ok(hits) if !hits.is_empty() => {
                            outcome = Some(offer(&hits, false, &mut offered));
                        }
                        Ok(_) if !speech.is_empty() => break,
                        Ok(_) if relaxed_used => break,
                        Ok(_) => {
                            // Empty result on an empty speech: retry once
                            // with every optional filter dropped before
                            // declaring the speech exhausted.
                            relaxed_used = true;
                            searches += 1;
                            *scene_searches += 1;
                            match self.run_search(&request.relaxed(), session).await {
                                Err(err) => return Err(DirectorError::Engine(err)),
                                Ok(hits) if hits.is_empty() => break,
                                Ok(hits) => {
                                    outcome = Some(offer(&hits, true, &mut offered));
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(speech)
    }

    async fn run_search(
        &self,
        request: &QuoteRequest,
        session: &Session,
    ) -> Result<Vec<QuoteHit>, EngineError> {
        let query = request.to_query(session.exclusion_list().clone())?;
        self.engine.retrieve(&query).await
    }
}

/// Record the hits as the current offer set and build the oracle feedback.
fn offer(
    hits: &[QuoteHit],
    relaxed: bool,
    offered: &mut HashMap<FragmentId, Fragment>,
) -> SearchOutcome {
    offered.clear();
    for hit in hits {
        offered.insert(hit.fragment.id.clone(), hit.fragment.clone());
    }
    SearchOutcome::Offers {
        offers: hits.iter().map(Into::into).collect(),
        relaxed,
    }
}
