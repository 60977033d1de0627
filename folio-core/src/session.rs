//! Per-scene session state.
//!
//! A session tracks which fragments a scene has already consumed so that no
//! retrieval in the same run can offer them again. It is exclusively owned
//! by one scene; sharing a session across concurrent scenes leaks quotes
//! between them and is a correctness violation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::corpus::FragmentId;

/// Errors from session persistence.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One accepted fragment, with where it landed in the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub fragment_id: FragmentId,
    pub character: String,
    pub speech_index: usize,
}

/// Mutable exclusion state for one scene-generation run.
///
/// Created empty at scene start, grows monotonically as fragments are
/// accepted, and is discarded (or [`reset`](Session::reset)) when the scene
/// completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    used: HashSet<FragmentId>,
    history: Vec<UsageRecord>,
}

impl Session {
    /// Create an empty session with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            used: HashSet::new(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Record a fragment as consumed.
    pub fn mark_used(&mut self, fragment_id: FragmentId, character: &str, speech_index: usize) {
        self.used.insert(fragment_id.clone());
        self.history.push(UsageRecord {
            fragment_id,
            character: character.to_string(),
            speech_index,
        });
    }

    /// Has this fragment been consumed in this session?
    pub fn is_used(&self, fragment_id: &FragmentId) -> bool {
        self.used.contains(fragment_id)
    }

    /// The ids every retrieval in this session must exclude.
    pub fn exclusion_list(&self) -> &HashSet<FragmentId> {
        &self.used
    }

    /// Number of distinct fragments consumed.
    pub fn usage_count(&self) -> usize {
        self.used.len()
    }

    /// Acceptance order, with character and speech position.
    pub fn history(&self) -> &[UsageRecord] {
        &self.history
    }

    /// Clear the session for reuse. Previously excluded fragments become
    /// retrievable again.
    pub fn reset(&mut self) {
        self.used.clear();
        self.history.clear();
    }

    /// Union another session's usage into this one.
    pub fn merge(&mut self, other: &Session) {
        self.used.extend(other.used.iter().cloned());
        self.history.extend(other.history.iter().cloned());
    }

    /// Save session state to a JSON file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load session state from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new();
        assert_eq!(session.usage_count(), 0);
        assert!(session.exclusion_list().is_empty());
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_mark_and_check() {
        let mut session = Session::new();
        session.mark_used(FragmentId::from("ham_1"), "HAMLET", 0);

        assert!(session.is_used(&FragmentId::from("ham_1")));
        assert!(!session.is_used(&FragmentId::from("ham_2")));
        assert_eq!(session.usage_count(), 1);
        assert_eq!(session.history()[0].character, "HAMLET");
    }

    #[test]
    fn test_reset_clears_exclusions() {
        let mut session = Session::new();
        session.mark_used(FragmentId::from("ham_1"), "HAMLET", 0);
        session.mark_used(FragmentId::from("ham_2"), "OPHELIA", 1);

        session.reset();

        assert_eq!(session.usage_count(), 0);
        assert!(!session.is_used(&FragmentId::from("ham_1")));
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_duplicate_marks_count_once() {
        let mut session = Session::new();
        session.mark_used(FragmentId::from("ham_1"), "HAMLET", 0);
        session.mark_used(FragmentId::from("ham_1"), "HAMLET", 2);

        assert_eq!(session.usage_count(), 1);
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_merge_unions_usage() {
        let mut a = Session::new();
        a.mark_used(FragmentId::from("ham_1"), "HAMLET", 0);

        let mut b = Session::new();
        b.mark_used(FragmentId::from("ham_2"), "OPHELIA", 0);
        b.mark_used(FragmentId::from("ham_1"), "HAMLET", 1);

        a.merge(&b);
        assert_eq!(a.usage_count(), 2);
        assert!(a.is_used(&FragmentId::from("ham_2")));
    }

    #[tokio::test]
    async fn test_save_and_load_restores_used_set() {
        let mut session = Session::new();
        session.mark_used(FragmentId::from("ham_1"), "HAMLET", 0);

        let path = std::env::temp_dir().join(format!("folio_session_{}.json", session.id()));
        session.save(&path).await.unwrap();
        let loaded = Session::load(&path).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(loaded.id(), session.id());
        assert!(loaded.is_used(&FragmentId::from("ham_1")));
    }
}
