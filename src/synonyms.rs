//! Synonym groups shared with worker threads.
//!
//! The spec owns the map behind an `Arc`; ingest contexts snapshot the
//! `Arc` so tokenization on a worker thread never races a schema update
//! (updates swap in a rebuilt map instead of mutating in place).

use rustc_hash::FxHashMap;

/// Group id indexed alongside member terms so queries for any member
/// match documents containing any other.
pub type GroupId = u32;

/// Marker prefixed to the group term in the forward index, keeping group
/// entries out of the user-visible term namespace.
pub const SYNONYM_PREFIX: char = '~';

#[derive(Debug, Clone, Default)]
pub struct SynonymMap {
    groups: Vec<Vec<String>>,
    term_to_group: FxHashMap<String, GroupId>,
}

impl SynonymMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synonym group; terms are folded to lowercase. Returns
    /// the group id. A term already in another group keeps its first
    /// assignment.
    pub fn add_group(&mut self, terms: impl IntoIterator<Item = String>) -> GroupId {
        let id = self.groups.len() as GroupId;
        let mut members = Vec::new();
        for term in terms {
            let term = term.to_lowercase();
            self.term_to_group.entry(term.clone()).or_insert(id);
            members.push(term);
        }
        self.groups.push(members);
        id
    }

    pub fn group_of(&self, term: &str) -> Option<GroupId> {
        self.term_to_group.get(term).copied()
    }

    pub fn group_term(id: GroupId) -> String {
        format!("{}{}", SYNONYM_PREFIX, id)
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_lookup() {
        let mut map = SynonymMap::new();
        let id = map.add_group(["Car".to_string(), "automobile".to_string()]);
        assert_eq!(map.group_of("car"), Some(id));
        assert_eq!(map.group_of("automobile"), Some(id));
        assert_eq!(map.group_of("truck"), None);
        assert_eq!(SynonymMap::group_term(id), "~0");
    }
}
