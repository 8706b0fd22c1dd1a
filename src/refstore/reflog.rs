//! Reflog entries for ref updates (§4.4). The persisted schema (§6) has no
//! `reflog` table, so this crate keeps reflogs in memory, scoped to the
//! runtime's lifetime — consistent with real Git's reflog being a
//! local/advisory log rather than a replicated source of truth.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct ReflogEntry {
    pub old_target: String,
    pub new_target: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
pub struct Reflog {
    entries: DashMap<String, Vec<ReflogEntry>>,
}

impl Reflog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, ref_name: &str, old_target: String, new_target: String, reason: impl Into<String>) {
        self.entries.entry(ref_name.to_string()).or_default().push(ReflogEntry {
            old_target,
            new_target,
            reason: reason.into(),
            at: Utc::now(),
        });
    }

    pub fn for_ref(&self, ref_name: &str) -> Vec<ReflogEntry> {
        self.entries.get(ref_name).map(|v| v.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_entries_are_retrievable_in_order() {
        let reflog = Reflog::new();
        reflog.append("refs/heads/main", "0".into(), "a".into(), "push");
        reflog.append("refs/heads/main", "a".into(), "b".into(), "push");
        let entries = reflog.for_ref("refs/heads/main");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].old_target, "a");
    }
}
