//! Scene composition engine over a corpus of annotated Shakespeare fragments.
//!
//! This crate provides:
//! - Semantic + structured-filter quote retrieval with a no-repeat guarantee
//! - A speech orchestration state machine driven by Claude tool calls
//! - Per-scene session state and deterministic scene assembly
//!
//! # Quick Start
//!
//! ```ignore
//! use folio_core::{SceneSpec, SceneStudio, StudioConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StudioConfig::new("corpus.json");
//!     let mut studio = SceneStudio::open(config).await?;
//!
//!     let spec = SceneSpec::new("Two lovers meet in a secret garden at night")
//!         .with_character("ROMEO", "passionate, deeply in love but conflicted")
//!         .with_character("JULIET", "torn between love and family loyalty")
//!         .with_themes(["love", "secrecy"])
//!         .with_target_speeches(6);
//!
//!     let scene = studio.compose(&spec).await?;
//!     println!("{}", folio_core::assemble(&scene));
//!     Ok(())
//! }
//! ```

pub mod corpus;
pub mod director;
pub mod embedding;
pub mod index;
pub mod retrieval;
pub mod scene;
pub mod session;
pub mod studio;
pub mod testing;

// Re-export for convenience
pub use folio_macros::Tool;

// Primary public API
pub use corpus::{Corpus, CorpusError, Fragment, FragmentId};
pub use director::{
    ClaudeOracle, DirectorError, DirectorLimits, OracleConfig, SceneDirector, SceneOracle,
};
pub use retrieval::{EngineError, QuoteEngine, QuoteFilter, QuoteHit, QuoteQuery, QuoteRequest};
pub use scene::{assemble, CharacterRole, PlannedSpeech, Scene, SceneSpec, Speech};
pub use session::{Session, SessionError};
pub use studio::{SceneStudio, StudioConfig, StudioError};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    /// Note a stage direction for the current speech
    #[derive(Tool, Deserialize)]
    #[tool(name = "stage_direction")]
    struct StageDirection {
        /// The direction text, e.g. "aside" or "draws his sword"
        direction: String,
        /// Optional character the direction applies to
        character: Option<String>,
    }

    #[test]
    fn test_tool_derive() {
        assert_eq!(StageDirection::tool_name(), "stage_direction");
        assert_eq!(
            StageDirection::tool_description(),
            "Note a stage direction for the current speech"
        );
    }

    #[test]
    fn test_tool_schema() {
        let schema = StageDirection::input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["direction"]["type"], "string");
        assert_eq!(schema["properties"]["character"]["type"], "string");

        // direction should be required, character should not be (it's Option)
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "direction"));
        assert!(!required.iter().any(|v| v == "character"));
    }

    #[test]
    fn test_tool_as_tool() {
        let tool = StageDirection::as_tool();
        assert_eq!(tool.name, "stage_direction");
        assert!(!tool.description.is_empty());
    }
}
