//! SceneStudio - the primary public API for scene composition.
//!
//! This module provides a clean, high-level interface that wraps the
//! corpus, retrieval engine, Claude oracle, director, and session into a
//! single entry point, plus output persistence for finished scenes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;

use crate::corpus::{Corpus, CorpusError};
use crate::director::{ClaudeOracle, DirectorError, DirectorLimits, OracleConfig, SceneDirector};
use crate::embedding::{EmbedError, Embedder, HashEmbedder, HttpEmbedder};
use crate::index::MemoryIndex;
use crate::retrieval::{EngineError, QuoteEngine, QuoteHit, QuoteRequest};
use crate::scene::{assemble, Scene, SceneSpec};
use crate::session::Session;

/// Errors from studio operations.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("The corpus contains no fragments")]
    EmptyCorpus,

    #[error("No API key configured - set ANTHROPIC_API_KEY environment variable")]
    NoApiKey,

    #[error("Embedding configuration error: {0}")]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Director(#[from] DirectorError),

    #[error("Retrieval failed: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which embedder queries run through.
///
/// Queries must use the embedding model the corpus was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbedderKind {
    /// An OpenAI-compatible embeddings endpoint, configured from the
    /// `FOLIO_EMBEDDINGS_*` environment variables.
    #[default]
    Http,
    /// The deterministic offline hash embedder, for corpora built with it.
    Hash,
}

/// Configuration for opening a scene studio.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// Path to the corpus JSON file.
    pub corpus_path: PathBuf,

    /// Model to use for the oracle.
    pub model: Option<String>,

    /// Maximum tokens for oracle responses.
    pub max_tokens: usize,

    /// Temperature for oracle generation.
    pub temperature: Option<f32>,

    /// Extra system prompt instructions.
    pub custom_prompt: Option<String>,

    /// Director termination budgets.
    pub limits: DirectorLimits,

    /// Query embedder selection.
    pub embedder: EmbedderKind,
}

impl StudioConfig {
    pub fn new(corpus_path: impl Into<PathBuf>) -> Self {
        Self {
            corpus_path: corpus_path.into(),
            model: None,
            max_tokens: 2048,
            temperature: Some(0.8),
            custom_prompt: None,
            limits: DirectorLimits::default(),
            embedder: EmbedderKind::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }

    pub fn with_limits(mut self, limits: DirectorLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Use the deterministic hash embedder instead of the HTTP endpoint.
    pub fn with_hash_embeddings(mut self) -> Self {
        self.embedder = EmbedderKind::Hash;
        self
    }
}

/// A scene composition studio.
///
/// This is the main entry point: it owns the retrieval engine, the Claude
/// oracle, the director, and one session. Each `compose` call resets the
/// session, so fragments may repeat across scenes but never within one.
pub struct SceneStudio {
    engine: QuoteEngine,
    director: SceneDirector,
    oracle: ClaudeOracle,
    session: Session,
    corpus_size: usize,
}

impl SceneStudio {
    /// Load the corpus and build the retrieval engine for `config`.
    ///
    /// An empty corpus is a fatal precondition, reported before any
    /// retrieval is attempted.
    pub async fn open_engine(config: &StudioConfig) -> Result<QuoteEngine, StudioError> {
        let corpus = Corpus::load(&config.corpus_path).await?;
        if corpus.is_empty() {
            return Err(StudioError::EmptyCorpus);
        }

        let embedder: Arc<dyn Embedder> = match config.embedder {
            EmbedderKind::Hash => Arc::new(HashEmbedder::new(corpus.dimension())),
            EmbedderKind::Http => {
                Arc::new(HttpEmbedder::from_env()?.with_dimension(corpus.dimension()))
            }
        };

        Ok(QuoteEngine::new(Arc::new(MemoryIndex::new(corpus)), embedder))
    }

    /// Open a studio: load the corpus, build the engine, and connect the
    /// Claude oracle.
    ///
    /// Requires `ANTHROPIC_API_KEY` to be set.
    pub async fn open(config: StudioConfig) -> Result<Self, StudioError> {
        let engine = Self::open_engine(&config).await?;
        let corpus_size = engine
            .index()
            .count()
            .await
            .map_err(|e| StudioError::Engine(e.into()))?;

        let oracle = ClaudeOracle::from_env()
            .map_err(|_| StudioError::NoApiKey)?
            .with_config(OracleConfig {
                model: config.model.clone(),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                custom_system_prompt: config.custom_prompt.clone(),
            });

        let director = SceneDirector::new(engine.clone()).with_limits(config.limits.clone());

        Ok(Self {
            engine,
            director,
            oracle,
            session: Session::new(),
            corpus_size,
        })
    }

    /// Compose a scene from a specification.
    ///
    /// The session is reset first: every scene starts with a clean
    /// exclusion set.
    pub async fn compose(&mut self, spec: &SceneSpec) -> Result<Scene, StudioError> {
        self.session.reset();
        let scene = self
            .director
            .compose(spec, &mut self.oracle, &mut self.session)
            .await?;
        Ok(scene)
    }

    /// Run a one-off retrieval outside any scene (no exclusions).
    pub async fn search(&self, request: &QuoteRequest) -> Result<Vec<QuoteHit>, StudioError> {
        let query = request.to_query(HashSet::new())?;
        Ok(self.engine.retrieve(&query).await?)
    }

    /// Number of fragments in the corpus.
    pub fn corpus_size(&self) -> usize {
        self.corpus_size
    }

    /// Distinct fragments consumed by the most recent scene.
    pub fn quotes_used(&self) -> usize {
        self.session.usage_count()
    }

    /// The current session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Write the assembled scene text to `path` and the scene data to a
    /// `.json` sidecar next to it.
    pub async fn save_scene(scene: &Scene, path: impl AsRef<Path>) -> Result<(), StudioError> {
        let path = path.as_ref();
        fs::write(path, assemble(scene)).await?;

        let sidecar = path.with_extension("json");
        fs::write(sidecar, serde_json::to_string_pretty(scene)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Speech;
    use crate::testing::sample_fragment;

    #[test]
    fn test_studio_config_builder() {
        let config = StudioConfig::new("corpus.json")
            .with_model("claude-sonnet-4-20250514")
            .with_max_tokens(1024)
            .with_temperature(0.5)
            .with_hash_embeddings();

        assert_eq!(config.corpus_path, PathBuf::from("corpus.json"));
        assert_eq!(config.model.as_deref(), Some("claude-sonnet-4-20250514"));
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.embedder, EmbedderKind::Hash);
    }

    #[test]
    fn test_embedder_kind_defaults_to_http() {
        let config = StudioConfig::new("corpus.json");
        assert_eq!(config.embedder, EmbedderKind::Http);
    }

    #[tokio::test]
    async fn test_open_engine_rejects_missing_corpus() {
        let config = StudioConfig::new("/nonexistent/corpus.json");
        let result = SceneStudio::open_engine(&config).await;
        assert!(matches!(result, Err(StudioError::Corpus(_))));
    }

    #[tokio::test]
    async fn test_open_engine_rejects_empty_corpus() {
        let path = std::env::temp_dir().join("folio_empty_corpus.json");
        fs::write(&path, "[]").await.unwrap();

        let config = StudioConfig::new(&path).with_hash_embeddings();
        let result = SceneStudio::open_engine(&config).await;
        let _ = fs::remove_file(&path).await;

        assert!(matches!(result, Err(StudioError::EmptyCorpus)));
    }

    #[tokio::test]
    async fn test_save_scene_writes_text_and_sidecar() {
        let mut speech = Speech::new("Romeo", "declare");
        speech.push(sample_fragment("r1", "my heart is full of love", &["love"], &["loving"]));
        let scene = Scene {
            spec: SceneSpec::new("a test").with_character("Romeo", "in love"),
            plan: Vec::new(),
            speeches: vec![speech],
        };

        let path = std::env::temp_dir().join("folio_scene_out.txt");
        SceneStudio::save_scene(&scene, &path).await.unwrap();

        let text = fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("ROMEO"));
        assert!(text.contains("Quotes used: 1"));

        let sidecar = path.with_extension("json");
        let data = fs::read_to_string(&sidecar).await.unwrap();
        assert!(data.contains("\"speeches\""));

        let _ = fs::remove_file(&path).await;
        let _ = fs::remove_file(&sidecar).await;
    }
}
