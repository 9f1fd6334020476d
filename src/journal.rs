//! Bounded FIFO journal of completed exchanges (C7).
//!
//! A fixed-capacity ring buffer: appending past the limit drops the oldest
//! entry first. `EntryLimit == 0` disables the journal outright — append,
//! read, and clear all fail with [`ProxyError::Disabled`] rather than
//! silently doing nothing, so a misconfigured limit of zero is visible to
//! callers instead of masking a missing journal.
//!
//! # Examples
//!
//! ```rust
//! use simulacra::journal::Journal;
//!
//! let journal = Journal::new(2);
//! assert_eq!(journal.len().unwrap(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

use crate::canonical::{RequestDetails, ResponseDetails};
use crate::error::ProxyError;
use crate::mode::Mode;

/// One completed proxy exchange.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub request: RequestDetails,
    pub response: ResponseDetails,
    pub mode: Mode,
    pub time_started: String,
    pub latency_millis: u64,
}

/// Bounded ring buffer of [`JournalEntry`] values.
pub struct Journal {
    limit: usize,
    entries: Mutex<VecDeque<JournalEntry>>,
}

impl Journal {
    /// Builds a journal with the given entry limit. A limit of `0` disables
    /// the journal: every operation below fails with `Disabled`.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    /// Appends `entry`, dropping the oldest entry first if already at the
    /// configured limit.
    pub fn append(&self, entry: JournalEntry) -> Result<(), ProxyError> {
        if self.limit == 0 {
            return Err(ProxyError::Disabled);
        }
        let mut entries = self.entries.lock().unwrap();
        if entries.len() == self.limit {
            entries.pop_front();
        }
        entries.push_back(entry);
        Ok(())
    }

    /// A snapshot of all stored entries, oldest first.
    pub fn get_entries(&self) -> Result<Vec<JournalEntry>, ProxyError> {
        if self.limit == 0 {
            return Err(ProxyError::Disabled);
        }
        Ok(self.entries.lock().unwrap().iter().cloned().collect())
    }

    /// Empties the journal.
    pub fn delete_entries(&self) -> Result<(), ProxyError> {
        if self.limit == 0 {
            return Err(ProxyError::Disabled);
        }
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    /// Current entry count. Unlike the other operations, this never fails
    /// on a disabled journal — it simply reports zero — so callers can
    /// cheaply check fill level without matching on `Disabled`.
    pub fn len(&self) -> Result<usize, ProxyError> {
        if self.limit == 0 {
            return Ok(0);
        }
        Ok(self.entries.lock().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::HeaderMultiMap;

    fn entry(tag: &str) -> JournalEntry {
        JournalEntry {
            request: RequestDetails {
                scheme: "http".into(),
                method: "GET".into(),
                destination: "example.com".into(),
                path: format!("/{tag}"),
                query: String::new(),
                body: String::new(),
                headers: HeaderMultiMap::default(),
            },
            response: ResponseDetails {
                status: 200,
                body: String::new(),
                headers: HeaderMultiMap::default(),
                encoded_body: false,
            },
            mode: Mode::Simulate,
            time_started: "2024-01-01T00:00:00Z".to_string(),
            latency_millis: 1,
        }
    }

    #[test]
    fn appends_beyond_limit_drop_oldest() {
        let journal = Journal::new(2);
        journal.append(entry("a")).unwrap();
        journal.append(entry("b")).unwrap();
        journal.append(entry("c")).unwrap();

        let entries = journal.get_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].request.path, "/b");
        assert_eq!(entries[1].request.path, "/c");
    }

    #[test]
    fn zero_limit_disables_journal() {
        let journal = Journal::new(0);
        assert!(matches!(journal.append(entry("a")), Err(ProxyError::Disabled)));
        assert!(matches!(journal.get_entries(), Err(ProxyError::Disabled)));
        assert!(matches!(journal.delete_entries(), Err(ProxyError::Disabled)));
        assert_eq!(journal.len().unwrap(), 0);
    }

    #[test]
    fn delete_entries_clears() {
        let journal = Journal::new(5);
        journal.append(entry("a")).unwrap();
        journal.delete_entries().unwrap();
        assert_eq!(journal.len().unwrap(), 0);
    }
}
