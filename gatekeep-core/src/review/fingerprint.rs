//! Content fingerprints for duplicate detection

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

/// SHA-256 (hex) over the first `prefix_chars` characters of a diff
pub fn fingerprint(diff: &str, prefix_chars: usize) -> String {
    let end = diff
        .char_indices()
        .nth(prefix_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(diff.len());

    hex::encode(Sha256::digest(&diff.as_bytes()[..end]))
}

/// Rolling window of the most recent review fingerprints
///
/// Entries are keyed by queue id so that a retest of the same item never
/// counts as a duplicate of itself.
#[derive(Debug, Clone)]
pub struct FingerprintHistory {
    window: usize,
    entries: VecDeque<(String, String)>,
}

impl FingerprintHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            entries: VecDeque::with_capacity(window),
        }
    }

    /// Whether another item in the window has this fingerprint
    pub fn matches(&self, fingerprint: &str, queue_id: &str) -> bool {
        self.entries
            .iter()
            .any(|(id, entry)| entry == fingerprint && id != queue_id)
    }

    /// Record a review, evicting the oldest beyond the window
    pub fn push(&mut self, queue_id: &str, fingerprint: String) {
        if self.window == 0 {
            return;
        }
        self.entries.retain(|(id, _)| id != queue_id);
        while self.entries.len() >= self.window {
            self.entries.pop_front();
        }
        self.entries.push_back((queue_id.to_string(), fingerprint));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
