//! Scene types and assembly.
//!
//! A scene is built from a specification (description, roster, themes,
//! target length), a recorded speech plan, and the speeches the director
//! accepted. Assembly is a pure function: the same scene always formats to
//! the same text.

use serde::{Deserialize, Serialize};

use crate::corpus::{Fragment, FragmentId};

/// A character in the scene roster: a name plus a free-text description
/// the planner reasons over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRole {
    pub name: String,
    pub description: String,
}

impl CharacterRole {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// What a scene should be.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSpec {
    /// Setting, action, and emotional arc, in prose.
    pub description: String,
    pub characters: Vec<CharacterRole>,
    pub themes: Vec<String>,
    /// Target number of speeches.
    pub target_speeches: usize,
}

impl SceneSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            characters: Vec::new(),
            themes: Vec::new(),
            target_speeches: 10,
        }
    }

    pub fn with_character(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.characters.push(CharacterRole::new(name, description));
        self
    }

    pub fn with_themes(mut self, themes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.themes = themes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target_speeches(mut self, target: usize) -> Self {
        self.target_speeches = target;
        self
    }
}

/// One entry of the speech plan: who speaks and with what intent.
///
/// Produced once per scene by the oracle; the director only records it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedSpeech {
    pub character: String,
    /// What the speech should accomplish, in prose.
    pub intent: String,
    #[serde(default)]
    pub emotional_tone: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
}

/// An ordered sequence of accepted fragments for one character turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speech {
    pub character: String,
    pub intent: String,
    pub fragments: Vec<Fragment>,
}

impl Speech {
    pub fn new(character: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            intent: intent.into(),
            fragments: Vec::new(),
        }
    }

    /// A speech that acquired no fragments is exhausted; assembly skips it.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn contains(&self, id: &FragmentId) -> bool {
        self.fragments.iter().any(|f| &f.id == id)
    }

    pub fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }
}

/// A completed scene: the spec it was built from, the plan the oracle
/// produced, and the speeches in order (exhausted ones included).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub spec: SceneSpec,
    pub plan: Vec<PlannedSpeech>,
    pub speeches: Vec<Speech>,
}

impl Scene {
    /// Every accepted fragment id, in acceptance order.
    pub fn fragment_ids(&self) -> Vec<&FragmentId> {
        self.speeches
            .iter()
            .flat_map(|s| s.fragments.iter().map(|f| &f.id))
            .collect()
    }

    /// Total number of accepted fragments.
    pub fn quotes_used(&self) -> usize {
        self.speeches.iter().map(|s| s.fragments.len()).sum()
    }
}

/// Serialize a scene to play-script text.
///
/// Non-empty speeches in order, each an upper-cased character line followed
/// by its fragment texts joined with single spaces, then a trailing count of
/// quotes used. Pure: no hidden state.
pub fn assemble(scene: &Scene) -> String {
    let mut out = String::new();

    for speech in scene.speeches.iter().filter(|s| !s.is_empty()) {
        out.push_str(&speech.character.to_uppercase());
        out.push('\n');
        let texts: Vec<&str> = speech.fragments.iter().map(|f| f.text.as_str()).collect();
        out.push_str(&texts.join(" "));
        out.push_str("\n\n");
    }

    out.push_str(&format!("Quotes used: {}\n", scene.quotes_used()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_fragment;

    fn scene_with_speeches(speeches: Vec<Speech>) -> Scene {
        Scene {
            spec: SceneSpec::new("test")
                .with_character("Rosalind", "quick-witted")
                .with_character("Orlando", "lovestruck"),
            plan: Vec::new(),
            speeches,
        }
    }

    fn speech(character: &str, fragments: &[(&str, &str)]) -> Speech {
        let mut speech = Speech::new(character, "test intent");
        for (id, text) in fragments {
            speech.push(sample_fragment(id, text, &["love"], &["loving"]));
        }
        speech
    }

    #[test]
    fn test_assemble_labels_and_joins() {
        let scene = scene_with_speeches(vec![
            speech("Rosalind", &[("r1", "love is merely a madness"), ("r2", "and yet I lie")]),
            speech("Orlando", &[("o1", "my fair Rosalind")]),
        ]);

        let text = assemble(&scene);
        assert!(text.contains("ROSALIND\nlove is merely a madness and yet I lie\n"));
        assert!(text.contains("ORLANDO\nmy fair Rosalind\n"));
        assert!(text.ends_with("Quotes used: 3\n"));
    }

    #[test]
    fn test_assemble_skips_exhausted_speeches() {
        let scene = scene_with_speeches(vec![
            speech("Rosalind", &[("r1", "love is merely a madness")]),
            speech("Orlando", &[]),
            speech("Rosalind", &[("r2", "and yet I lie")]),
        ]);

        let text = assemble(&scene);
        assert!(!text.contains("ORLANDO"));
        let labels = text.lines().filter(|l| *l == "ROSALIND").count();
        assert_eq!(labels, 2);
        assert!(text.ends_with("Quotes used: 2\n"));
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let scene = scene_with_speeches(vec![speech("Rosalind", &[("r1", "a line")])]);
        assert_eq!(assemble(&scene), assemble(&scene));
    }

    #[test]
    fn test_fragment_ids_in_acceptance_order() {
        let scene = scene_with_speeches(vec![
            speech("Rosalind", &[("r1", "one"), ("r2", "two")]),
            speech("Orlando", &[("o1", "three")]),
        ]);

        let ids: Vec<&str> = scene.fragment_ids().iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "o1"]);
    }

    #[test]
    fn test_speech_contains() {
        let speech = speech("Rosalind", &[("r1", "a line")]);
        assert!(speech.contains(&FragmentId::from("r1")));
        assert!(!speech.contains(&FragmentId::from("r2")));
    }

    #[test]
    fn test_spec_builder() {
        let spec = SceneSpec::new("a garden at night")
            .with_character("Romeo", "passionate")
            .with_themes(["love", "secrecy"])
            .with_target_speeches(6);

        assert_eq!(spec.characters.len(), 1);
        assert_eq!(spec.themes, vec!["love", "secrecy"]);
        assert_eq!(spec.target_speeches, 6);
    }
}
