//! Live API integration tests for scene composition.
//!
//! These exercise the Claude oracle against the real Messages API.
//!
//! Run with: `ANTHROPIC_API_KEY=$ANTHROPIC_API_KEY cargo test -p folio-core --test api_integration -- --ignored --nocapture`

use folio_core::director::{ClaudeOracle, OracleConfig, SceneOracle};
use folio_core::testing::{assert_no_repeats, engine_for, sample_corpus};
use folio_core::{assemble, SceneDirector, SceneSpec, Session};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok()
}

fn power_spec() -> SceneSpec {
    SceneSpec::new("Two sisters argue over a crown at midnight, ambition against ambition")
        .with_character("Regan", "cold, calculating, hungry for power")
        .with_character("Goneril", "proud, ruthless, equally hungry")
        .with_themes(["power", "ambition"])
        .with_target_speeches(2)
}

#[tokio::test]
#[ignore]
async fn test_live_planning_uses_roster_names() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let spec = power_spec();
    let mut oracle = ClaudeOracle::from_env().unwrap();

    let plan = oracle.plan(&spec).await.unwrap();
    println!("Planned {} speeches", plan.len());
    for entry in &plan {
        println!("  {}: {}", entry.character, entry.intent);
    }

    assert!(!plan.is_empty());
    for entry in &plan {
        assert!(
            entry.character == "Regan" || entry.character == "Goneril",
            "unexpected character {}",
            entry.character
        );
        assert!(!entry.intent.is_empty());
    }
}

#[tokio::test]
#[ignore]
async fn test_live_two_speech_scene() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let engine = engine_for(sample_corpus());
    let director = SceneDirector::new(engine);
    let mut oracle = ClaudeOracle::from_env().unwrap().with_config(OracleConfig {
        temperature: Some(0.5),
        ..OracleConfig::default()
    });
    let mut session = Session::new();

    match director.compose(&power_spec(), &mut oracle, &mut session).await {
        Ok(scene) => {
            println!("{}", assemble(&scene));
            assert!(!scene.plan.is_empty());
            assert_no_repeats(&scene);
            assert_eq!(scene.quotes_used(), session.usage_count());
        }
        Err(e) => panic!("FAILED: scene composition error: {e:?}"),
    }
}
