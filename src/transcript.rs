//! Conversation transcript
//!
//! Append-only record of the exchange, in causal order. The transcript is
//! the user-facing audit trail: entries are never mutated, deleted, or
//! reordered.

use std::sync::{Arc, Mutex};

/// Who authored a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    /// The local user
    User,
    /// The assistant (including error notices surfaced on its behalf)
    Assistant,
}

/// One immutable line of the transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Display text
    pub text: String,
    /// Author
    pub sender: Sender,
}

/// Shared handle to the ordered entry sequence
///
/// Cloning is cheap; all clones observe the same sequence.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry at the end of the sequence
    pub fn append(&self, sender: Sender, text: impl Into<String>) {
        let entry = Entry {
            text: text.into(),
            sender,
        };
        tracing::debug!(sender = ?entry.sender, text = %entry.text, "transcript entry");
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// Ordered copy of all entries appended so far
    #[must_use]
    pub fn snapshot(&self) -> Vec<Entry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the transcript is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order() {
        let transcript = Transcript::new();
        transcript.append(Sender::User, "first");
        transcript.append(Sender::Assistant, "second");
        transcript.append(Sender::Assistant, "third");

        let entries = transcript.snapshot();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].text, "first");
        assert_eq!(entries[0].sender, Sender::User);
        assert_eq!(entries[1].text, "second");
        assert_eq!(entries[2].text, "third");
    }

    #[test]
    fn snapshot_is_idempotent() {
        let transcript = Transcript::new();
        transcript.append(Sender::User, "hello");

        assert_eq!(transcript.snapshot(), transcript.snapshot());
    }

    #[test]
    fn clones_share_the_sequence() {
        let transcript = Transcript::new();
        let clone = transcript.clone();
        clone.append(Sender::Assistant, "shared");

        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.snapshot()[0].text, "shared");
    }
}
