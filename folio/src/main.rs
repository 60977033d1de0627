//! Folio command line interface.
//!
//! Compose Shakespearean scenes from authentic quote fragments, query the
//! corpus directly, or inspect a corpus file.
//!
//! ```bash
//! folio compose --corpus corpus.json \
//!     --scene "Two lovers meet in a secret garden at night" \
//!     --characters "Romeo: passionate and conflicted; Juliet: torn between love and duty" \
//!     --themes love,secrecy --speeches 6
//! ```

use std::collections::HashSet;

use folio_core::{
    assemble, Corpus, DirectorError, QuoteRequest, SceneSpec, SceneStudio, StudioConfig,
    StudioError,
};

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    let result = match args[1].as_str() {
        "compose" => compose(&args).await,
        "search" => search(&args).await,
        "info" => info(&args).await,
        other => {
            eprintln!("Unknown command: {other}\n");
            print_help();
            std::process::exit(2);
        }
    };

    if let Err(message) = result {
        eprintln!("Error: {message}");
        std::process::exit(1);
    }
}

/// Value following a `--flag`, if present.
fn arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn studio_config(args: &[String]) -> Result<StudioConfig, String> {
    let corpus = arg_value(args, "--corpus").ok_or("missing required --corpus <path>")?;
    let mut config = StudioConfig::new(corpus);
    if let Some(model) = arg_value(args, "--model") {
        config = config.with_model(model);
    }
    if has_flag(args, "--hash-embeddings") {
        config = config.with_hash_embeddings();
    }
    Ok(config)
}

/// Parse `"Name: description; Name2: description"` into roster pairs.
fn parse_characters(raw: &str) -> Result<Vec<(String, String)>, String> {
    let mut characters = Vec::new();
    for part in raw.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, description) = part
            .split_once(':')
            .ok_or_else(|| format!("character entry '{part}' is not 'Name: description'"))?;
        characters.push((name.trim().to_uppercase(), description.trim().to_string()));
    }
    if characters.len() < 2 {
        return Err("provide at least 2 characters as 'Name: desc; Name2: desc'".to_string());
    }
    Ok(characters)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

async fn compose(args: &[String]) -> Result<(), String> {
    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        return Err(
            "ANTHROPIC_API_KEY environment variable not set. Set it in .env or the environment."
                .to_string(),
        );
    }

    let description = arg_value(args, "--scene").ok_or("missing required --scene <description>")?;
    let roster = arg_value(args, "--characters").ok_or("missing required --characters <list>")?;
    let characters = parse_characters(&roster)?;
    let config = studio_config(args)?;

    let mut spec = SceneSpec::new(description);
    for (name, role) in characters {
        spec = spec.with_character(name, role);
    }
    if let Some(themes) = arg_value(args, "--themes") {
        spec = spec.with_themes(parse_list(&themes));
    }
    if let Some(speeches) = arg_value(args, "--speeches") {
        let n = speeches
            .parse()
            .map_err(|_| format!("--speeches '{speeches}' is not a number"))?;
        spec = spec.with_target_speeches(n);
    }

    let mut studio = SceneStudio::open(config).await.map_err(|e| e.to_string())?;
    println!("Corpus loaded: {} fragments", studio.corpus_size());
    println!("Composing scene...");

    let scene = match studio.compose(&spec).await {
        Ok(scene) => scene,
        Err(StudioError::Director(DirectorError::Planning(reason))) => {
            return Err(format!("planning failed: {reason}"));
        }
        Err(e) => return Err(e.to_string()),
    };

    println!();
    println!("{}", assemble(&scene));

    if let Some(output) = arg_value(args, "--output") {
        SceneStudio::save_scene(&scene, &output)
            .await
            .map_err(|e| e.to_string())?;
        println!("Scene saved to: {output}");
    }
    Ok(())
}

async fn search(args: &[String]) -> Result<(), String> {
    let config = studio_config(args)?;
    let query_text = arg_value(args, "--query").ok_or("missing required --query <text>")?;

    let mut request = QuoteRequest::new(query_text);
    if let Some(themes) = arg_value(args, "--themes") {
        request.themes = Some(parse_list(&themes));
    }
    if let Some(tones) = arg_value(args, "--tones") {
        request.emotional_tone = Some(parse_list(&tones));
    }
    if let Some(play) = arg_value(args, "--play") {
        request.play_title = Some(play);
    }
    if let Some(n) = arg_value(args, "--max-results") {
        request.max_results = Some(n.parse().map_err(|_| format!("--max-results '{n}' is not a number"))?);
    }

    let engine = SceneStudio::open_engine(&config)
        .await
        .map_err(|e| e.to_string())?;
    let query = request
        .to_query(HashSet::new())
        .map_err(|e| e.to_string())?;
    let hits = engine.retrieve(&query).await.map_err(|e| e.to_string())?;

    println!("Found {} results:", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let f = &hit.fragment;
        println!();
        println!("{}. {}", i + 1, f.text);
        println!("   {} ({}.{}), {}", f.source_play, f.act, f.scene, f.speaking_character);
        println!(
            "   themes: {}  tone: {}",
            f.themes.join(", "),
            f.emotional_tone.join(", ")
        );
        println!("   score: {:.4}", hit.score);
    }
    Ok(())
}

async fn info(args: &[String]) -> Result<(), String> {
    let corpus_path = arg_value(args, "--corpus").ok_or("missing required --corpus <path>")?;
    let corpus = Corpus::load(&corpus_path).await.map_err(|e| e.to_string())?;

    println!("Corpus: {corpus_path}");
    println!("Fragments: {}", corpus.len());
    println!("Embedding dimension: {}", corpus.dimension());
    Ok(())
}

fn print_help() {
    println!("folio - compose Shakespearean scenes from authentic quote fragments");
    println!();
    println!("USAGE:");
    println!("    folio <command> [options]");
    println!();
    println!("COMMANDS:");
    println!("    compose    Generate a scene from a corpus");
    println!("    search     Query the corpus for quotes");
    println!("    info       Show corpus statistics");
    println!();
    println!("COMPOSE OPTIONS:");
    println!("    --corpus <path>        Corpus JSON file (required)");
    println!("    --scene <text>         Scene description (required)");
    println!("    --characters <list>    'Name: desc; Name2: desc' (required, at least 2)");
    println!("    --themes <a,b>         Comma-separated theme list");
    println!("    --speeches <n>         Target speech count (default 10)");
    println!("    --output <path>        Write the scene (plus a .json sidecar) here");
    println!("    --model <name>         Claude model override");
    println!("    --hash-embeddings      Use the offline hash embedder");
    println!();
    println!("SEARCH OPTIONS:");
    println!("    --corpus <path>        Corpus JSON file (required)");
    println!("    --query <text>         Semantic query (required)");
    println!("    --themes <a,b>         Filter by themes (any of)");
    println!("    --tones <a,b>          Filter by emotional tone (any of)");
    println!("    --play <title>         Filter by source play");
    println!("    --max-results <n>      Result cap (default 5)");
    println!("    --hash-embeddings      Use the offline hash embedder");
    println!();
    println!("ENVIRONMENT:");
    println!("    ANTHROPIC_API_KEY          Claude API key (compose)");
    println!("    FOLIO_EMBEDDINGS_URL       OpenAI-compatible embeddings endpoint");
    println!("    FOLIO_EMBEDDINGS_MODEL     Embedding model name");
    println!("    FOLIO_EMBEDDINGS_API_KEY   Embeddings bearer token");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_characters() {
        let roster =
            parse_characters("Romeo: passionate; Juliet: torn between love and duty").unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].0, "ROMEO");
        assert_eq!(roster[1].1, "torn between love and duty");
    }

    #[test]
    fn test_parse_characters_requires_two() {
        assert!(parse_characters("Romeo: alone").is_err());
        assert!(parse_characters("no colon here").is_err());
    }

    #[test]
    fn test_parse_list_trims_and_drops_empties() {
        assert_eq!(parse_list("love, death , ,fate"), vec!["love", "death", "fate"]);
    }

    #[test]
    fn test_arg_value() {
        let args: Vec<String> = ["folio", "search", "--query", "a crown"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(arg_value(&args, "--query").as_deref(), Some("a crown"));
        assert_eq!(arg_value(&args, "--corpus"), None);
    }
}
