//! Compose a short scene against the built-in sample corpus.
//!
//! Requires ANTHROPIC_API_KEY. Run with:
//! `cargo run -p folio-core --example compose_scene`

use folio_core::director::ClaudeOracle;
use folio_core::testing::{engine_for, sample_corpus};
use folio_core::{assemble, SceneDirector, SceneSpec, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let engine = engine_for(sample_corpus());
    let director = SceneDirector::new(engine);
    let mut oracle = ClaudeOracle::from_env()?;
    let mut session = Session::new();

    let spec = SceneSpec::new("Two lovers meet in a moonlit garden, torn between passion and duty")
        .with_character("Romeo", "passionate, deeply in love but conflicted")
        .with_character("Juliet", "torn between love and family loyalty")
        .with_themes(["love", "fate"])
        .with_target_speeches(4);

    println!("Composing scene...");
    let scene = director.compose(&spec, &mut oracle, &mut session).await?;

    println!("{}", assemble(&scene));
    println!("Session {} used {} quotes", session.id(), session.usage_count());
    Ok(())
}
