//! Claude-backed scene oracle.
//!
//! Planning is a single low-temperature completion parsed as strict JSON.
//! Each speech is a fresh tool-use conversation: tool calls become `Search`
//! moves, the director's outcomes are echoed back as tool results, and the
//! closing text is a JSON verdict naming the fragment ids to take.

use async_trait::async_trait;
use claude::{Claude, ContentBlock, Message, Request, Role, ToolResult};
use serde::Deserialize;
use std::collections::VecDeque;

use super::oracle::{OracleError, QuoteOffer, SceneOracle, SearchOutcome, SpeechMove};
use super::tools::{parse_search_request, scene_tools};
use crate::retrieval::QuoteRequest;
use crate::scene::{PlannedSpeech, SceneSpec, Speech};

/// Maximum tokens for the planning completion.
const PLANNING_MAX_TOKENS: usize = 1500;

/// Low temperature keeps the plan JSON well-formed.
const PLANNING_TEMPERATURE: f32 = 0.2;

/// Completions allowed inside one `next_move` call while correcting
/// malformed output.
const MAX_TURNS_PER_MOVE: usize = 4;

/// How many preceding speeches the per-speech brief quotes back.
const BRIEF_CONTEXT_SPEECHES: usize = 3;

/// Configuration for the Claude oracle.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// The model to use (defaults to the client's default).
    pub model: Option<String>,

    /// Maximum tokens for per-speech responses.
    pub max_tokens: usize,

    /// Temperature for speech composition.
    pub temperature: Option<f32>,

    /// Extra instructions appended to the system prompt.
    pub custom_system_prompt: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 2048,
            temperature: Some(0.8),
            custom_system_prompt: None,
        }
    }
}

/// The Claude-backed implementation of [`SceneOracle`].
pub struct ClaudeOracle {
    client: Claude,
    config: OracleConfig,
    system_prompt: String,
    conversation: Vec<Message>,
    pending_tool: Option<String>,
    queued: VecDeque<SpeechMove>,
}

impl ClaudeOracle {
    /// Create an oracle with an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(Claude::new(api_key))
    }

    /// Create an oracle from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, OracleError> {
        Ok(Self::with_client(Claude::from_env()?))
    }

    /// Create an oracle over an existing client.
    pub fn with_client(client: Claude) -> Self {
        Self {
            client,
            config: OracleConfig::default(),
            system_prompt: String::new(),
            conversation: Vec::new(),
            pending_tool: None,
            queued: VecDeque::new(),
        }
    }

    /// Configure the oracle.
    pub fn with_config(mut self, config: OracleConfig) -> Self {
        self.config = config;
        self
    }

    fn build_system_prompt(&self, spec: &SceneSpec) -> String {
        let mut prompt = String::new();
        prompt.push_str(include_str!("prompts/director_base.txt"));

        if let Some(ref custom) = self.config.custom_system_prompt {
            prompt.push_str("\n## Additional Instructions\n");
            prompt.push_str(custom);
            prompt.push('\n');
        }

        prompt.push_str("\n## The Scene\n");
        prompt.push_str(&spec.description);
        prompt.push_str("\n\n## Characters\n");
        for role in &spec.characters {
            prompt.push_str(&format!("- {}: {}\n", role.name, role.description));
        }
        if !spec.themes.is_empty() {
            prompt.push_str(&format!("\nThemes: {}\n", spec.themes.join(", ")));
        }

        prompt
    }

    fn apply_request_config(&self, mut request: Request) -> Request {
        if let Some(ref model) = self.config.model {
            request = request.with_model(model);
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }

    async fn complete_plan_turn(&self, messages: Vec<Message>) -> Result<String, OracleError> {
        let mut request = Request::new(messages)
            .with_max_tokens(PLANNING_MAX_TOKENS)
            .with_temperature(PLANNING_TEMPERATURE);
        if let Some(ref model) = self.config.model {
            request = request.with_model(model);
        }
        let response = self.client.complete(request).await?;
        Ok(response.text())
    }

    fn absorb_outcome(&mut self, outcome: SearchOutcome) {
        match (self.pending_tool.take(), outcome) {
            (Some(tool_use_id), SearchOutcome::Offers { offers, relaxed }) => {
                let result = ToolResult::success(offers_payload(&offers, relaxed));
                self.push_tool_result(tool_use_id, result);
            }
            (Some(tool_use_id), SearchOutcome::Rejected(reason)) => {
                self.push_tool_result(tool_use_id, ToolResult::error(reason));
            }
            (None, SearchOutcome::Rejected(reason)) => {
                self.conversation.push(Message::user(format!(
                    "That selection was rejected: {reason}. Choose only ids from the most recent search result."
                )));
            }
            (None, SearchOutcome::Offers { offers, relaxed }) => {
                self.conversation
                    .push(Message::user(offers_payload(&offers, relaxed)));
            }
        }
    }

    fn push_tool_result(&mut self, tool_use_id: String, result: ToolResult) {
        self.conversation.push(Message {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id,
                content: result.content,
                is_error: result.is_error,
            }],
        });
    }
}

#[async_trait]
impl SceneOracle for ClaudeOracle {
    async fn plan(&mut self, spec: &SceneSpec) -> Result<Vec<PlannedSpeech>, OracleError> {
        self.system_prompt = self.build_system_prompt(spec);

        let prompt = planning_prompt(spec);
        let mut messages = vec![Message::user(&prompt)];

        let first = self.complete_plan_turn(messages.clone()).await?;
        match parse_plan(&first, spec) {
            Ok(plan) => return Ok(plan),
            Err(reason) => {
                // One corrective retry before planning counts as failed.
                messages.push(Message::assistant(&first));
                messages.push(Message::user(format!(
                    "That plan was rejected: {reason}. Reply again with ONLY the JSON array, using exactly the roster names."
                )));
            }
        }

        let second = self.complete_plan_turn(messages).await?;
        parse_plan(&second, spec).map_err(OracleError::Malformed)
    }

    fn begin_speech(&mut self, index: usize, plan: &PlannedSpeech, preceding: &[Speech]) {
        self.pending_tool = None;
        self.queued.clear();
        self.conversation = vec![Message::user(speech_brief(index, plan, preceding))];
    }

    async fn next_move(
        &mut self,
        outcome: Option<SearchOutcome>,
    ) -> Result<SpeechMove, OracleError> {
        if let Some(mv) = self.queued.pop_front() {
            return Ok(mv);
        }

        if let Some(outcome) = outcome {
            self.absorb_outcome(outcome);
        }

        let mut corrected = false;
        for _ in 0..MAX_TURNS_PER_MOVE {
            // The API requires alternating roles; after a drained verdict the
            // last turn is the assistant's, so prompt for continuation.
            if matches!(self.conversation.last(), Some(m) if m.role == Role::Assistant) {
                self.conversation.push(Message::user(
                    "Continue this speech: search for more quotes, or reply with your final verdict JSON.",
                ));
            }

            let request = self
                .apply_request_config(Request::new(self.conversation.clone()))
                .with_system(&self.system_prompt)
                .with_max_tokens(self.config.max_tokens)
                .with_tools(scene_tools());

            let response = self.client.complete(request).await?;
            self.conversation.push(Message {
                role: Role::Assistant,
                content: response.content.clone(),
            });

            if let Some(tool_use) = response.tool_use() {
                if tool_use.name != QuoteRequest::tool_name() {
                    let reason = format!("Unknown tool: {}", tool_use.name);
                    self.push_tool_result(tool_use.id, ToolResult::error(reason.as_str()));
                    if corrected {
                        return Err(OracleError::Malformed(reason));
                    }
                    corrected = true;
                    continue;
                }
                match parse_search_request(&tool_use.input) {
                    Ok(request) => {
                        self.pending_tool = Some(tool_use.id);
                        return Ok(SpeechMove::Search(request));
                    }
                    Err(reason) => {
                        self.push_tool_result(tool_use.id, ToolResult::error(reason.as_str()));
                        if corrected {
                            return Err(OracleError::Malformed(reason));
                        }
                        corrected = true;
                        continue;
                    }
                }
            }

            match parse_verdict(&response.text()) {
                Ok(verdict) => {
                    for id in verdict.take {
                        self.queued.push_back(SpeechMove::Take(id.into()));
                    }
                    if verdict.done || self.queued.is_empty() {
                        self.queued.push_back(SpeechMove::Close);
                    }
                    return Ok(self.queued.pop_front().unwrap_or(SpeechMove::Close));
                }
                Err(reason) => {
                    if corrected {
                        return Err(OracleError::Malformed(reason));
                    }
                    corrected = true;
                    self.conversation.push(Message::user(format!(
                        "Your reply could not be parsed: {reason}. Reply with ONLY the verdict JSON, e.g. {{\"take\": [\"<id>\"], \"done\": true}}."
                    )));
                }
            }
        }

        Err(OracleError::Malformed(
            "no usable move after repeated attempts".to_string(),
        ))
    }
}

/// Serialize offers for the model, flagging a relaxed search.
fn offers_payload(offers: &[QuoteOffer], relaxed: bool) -> String {
    let body = serde_json::to_string_pretty(offers).unwrap_or_else(|_| "[]".to_string());
    if relaxed {
        format!("Your filters matched nothing, so they were dropped for this search. Results:\n{body}")
    } else {
        body
    }
}

fn planning_prompt(spec: &SceneSpec) -> String {
    let characters: Vec<String> = spec
        .characters
        .iter()
        .map(|c| format!("- {}: {}", c.name, c.description))
        .collect();
    let themes = if spec.themes.is_empty() {
        "general".to_string()
    } else {
        spec.themes.join(", ")
    };

    format!(
        r#"Plan the speeches for a Shakespearean scene.

## Scene
{description}

## Characters
{characters}

## Themes
{themes}

## Instructions
Decide the sequence of speeches: who speaks, in what order, and what each speech should accomplish. Aim for about {target} speeches; use fewer or more only if the drama requires it. Use exactly the character names given above.

Respond with ONLY a JSON array (no markdown, no commentary outside the JSON):
[
  {{"character": "NAME", "intent": "what this speech accomplishes", "emotional_tone": ["tag"], "themes": ["tag"]}}
]"#,
        description = spec.description,
        characters = characters.join("\n"),
        themes = themes,
        target = spec.target_speeches,
    )
}

fn speech_brief(index: usize, plan: &PlannedSpeech, preceding: &[Speech]) -> String {
    let mut brief = format!(
        "Compose speech {number} for {character}.\nIntent: {intent}\n",
        number = index + 1,
        character = plan.character,
        intent = plan.intent,
    );
    if !plan.emotional_tone.is_empty() {
        brief.push_str(&format!("Suggested tone: {}\n", plan.emotional_tone.join(", ")));
    }
    if !plan.themes.is_empty() {
        brief.push_str(&format!("Suggested themes: {}\n", plan.themes.join(", ")));
    }

    let spoken: Vec<&Speech> = preceding.iter().filter(|s| !s.is_empty()).collect();
    if !spoken.is_empty() {
        brief.push_str("\nThe scene so far:\n");
        let start = spoken.len().saturating_sub(BRIEF_CONTEXT_SPEECHES);
        for speech in &spoken[start..] {
            let text: Vec<&str> = speech.fragments.iter().map(|f| f.text.as_str()).collect();
            brief.push_str(&format!("{}: {}\n", speech.character.to_uppercase(), text.join(" ")));
        }
    }

    brief.push_str("\nUse search_quotes to find this speech's fragments.");
    brief
}

/// Response format expected from the planner.
#[derive(Debug, Deserialize)]
struct PlanEntryWire {
    character: String,
    intent: String,
    #[serde(default)]
    emotional_tone: Vec<String>,
    #[serde(default)]
    themes: Vec<String>,
}

fn parse_plan(text: &str, spec: &SceneSpec) -> Result<Vec<PlannedSpeech>, String> {
    let json = extract_json(text);
    let entries: Vec<PlanEntryWire> =
        serde_json::from_str(json).map_err(|e| format!("{e}: {json}"))?;

    if entries.is_empty() {
        return Err("plan is empty".to_string());
    }

    let mut plan = Vec::with_capacity(entries.len());
    for entry in entries {
        let role = spec
            .characters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&entry.character))
            .ok_or_else(|| format!("'{}' is not in the character roster", entry.character))?;
        if entry.intent.trim().is_empty() {
            return Err(format!("speech for '{}' has no intent", role.name));
        }
        plan.push(PlannedSpeech {
            character: role.name.clone(),
            intent: entry.intent,
            emotional_tone: entry.emotional_tone,
            themes: entry.themes,
        });
    }
    Ok(plan)
}

/// The per-speech closing verdict.
#[derive(Debug, Deserialize)]
struct VerdictWire {
    #[serde(default)]
    take: Vec<String>,
    #[serde(default = "default_done")]
    done: bool,
}

fn default_done() -> bool {
    true
}

fn parse_verdict(text: &str) -> Result<VerdictWire, String> {
    let json = extract_json(text);
    serde_json::from_str(json).map_err(|e| format!("{e}: {json}"))
}

/// Extract JSON from a response that might have markdown code blocks.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json specifier)
    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Just return the text as-is
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::FragmentId;

    fn spec() -> SceneSpec {
        SceneSpec::new("a balcony at night")
            .with_character("Romeo", "passionate")
            .with_character("Juliet", "torn")
            .with_target_speeches(4)
    }

    #[test]
    fn test_extract_json_plain() {
        let text = r#"[{"character": "Romeo", "intent": "declare love"}]"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn test_extract_json_markdown() {
        let text = "```json\n{\"take\": [\"abc\"], \"done\": true}\n```";
        assert_eq!(extract_json(text), r#"{"take": ["abc"], "done": true}"#);
    }

    #[test]
    fn test_extract_json_markdown_no_specifier() {
        let text = "```\n{\"take\": []}\n```";
        assert_eq!(extract_json(text), r#"{"take": []}"#);
    }

    #[test]
    fn test_parse_plan_validates_roster() {
        let text = r#"[{"character": "Mercutio", "intent": "mock them both"}]"#;
        let result = parse_plan(text, &spec());
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_plan_normalizes_name_case() {
        let text = r#"[{"character": "ROMEO", "intent": "declare love", "themes": ["love"]}]"#;
        let plan = parse_plan(text, &spec()).unwrap();
        assert_eq!(plan[0].character, "Romeo");
        assert_eq!(plan[0].themes, vec!["love"]);
    }

    #[test]
    fn test_parse_plan_rejects_empty() {
        assert!(parse_plan("[]", &spec()).is_err());
        assert!(parse_plan("not json at all", &spec()).is_err());
    }

    #[test]
    fn test_parse_verdict_defaults_done() {
        let verdict = parse_verdict(r#"{"take": ["frag_1", "frag_2"]}"#).unwrap();
        assert!(verdict.done);
        assert_eq!(verdict.take.len(), 2);

        let open = parse_verdict(r#"{"take": ["frag_1"], "done": false}"#).unwrap();
        assert!(!open.done);
    }

    #[test]
    fn test_offers_payload_flags_relaxed() {
        let offers = vec![QuoteOffer {
            id: FragmentId::from("x"),
            text: "a line".to_string(),
            source_play: "Hamlet".to_string(),
            speaking_character: "Hamlet".to_string(),
            emotional_tone: vec![],
            themes: vec![],
            score: 0.5,
        }];

        assert!(offers_payload(&offers, true).starts_with("Your filters matched nothing"));
        assert!(offers_payload(&offers, false).starts_with('['));
    }

    #[test]
    fn test_speech_brief_includes_recent_context() {
        let plan = PlannedSpeech {
            character: "Juliet".to_string(),
            intent: "answer him".to_string(),
            emotional_tone: vec!["loving".to_string()],
            themes: vec![],
        };
        let mut previous = Speech::new("Romeo", "open");
        previous.push(crate::testing::sample_fragment(
            "r1",
            "but soft what light",
            &["love"],
            &["loving"],
        ));

        let brief = speech_brief(1, &plan, &[previous]);
        assert!(brief.contains("Compose speech 2 for Juliet"));
        assert!(brief.contains("ROMEO: but soft what light"));
        assert!(brief.contains("Suggested tone: loving"));
    }

    #[test]
    fn test_oracle_config_defaults() {
        let config = OracleConfig::default();
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.temperature, Some(0.8));
        assert!(config.model.is_none());
    }
}
