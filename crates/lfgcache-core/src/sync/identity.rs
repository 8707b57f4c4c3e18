use std::collections::{HashMap, HashSet};

use crate::store::{Entity, LocalKey, Stored};

/// Local records keyed by their remote id.
///
/// Built before merging a remote result set: a hit means "update in place",
/// a miss means "insert", and whatever is left unprocessed afterwards is a
/// deletion candidate.
#[derive(Debug, Clone)]
pub struct IdentityIndex<E> {
    entries: HashMap<String, Stored<E>>,
}

impl<E: Entity> IdentityIndex<E> {
    /// Last record wins when two share a remote id.
    pub fn build(records: impl IntoIterator<Item = Stored<E>>) -> Self {
        let entries = records
            .into_iter()
            .map(|stored| (stored.record.remote_id().to_string(), stored))
            .collect();
        Self { entries }
    }

    pub fn get(&self, remote_id: &str) -> Option<&Stored<E>> {
        self.entries.get(remote_id)
    }

    pub fn key_of(&self, remote_id: &str) -> Option<LocalKey> {
        self.entries.get(remote_id).map(|stored| stored.key)
    }

    pub fn contains(&self, remote_id: &str) -> bool {
        self.entries.contains_key(remote_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_keys(self) -> HashMap<String, LocalKey> {
        self.entries
            .into_iter()
            .map(|(remote_id, stored)| (remote_id, stored.key))
            .collect()
    }

    /// Indexed records whose remote id is not in `processed`, in local key order.
    pub fn missing_from(&self, processed: &HashSet<String>) -> Vec<&Stored<E>> {
        let mut missing: Vec<&Stored<E>> = self
            .entries
            .iter()
            .filter(|(remote_id, _)| !processed.contains(*remote_id))
            .map(|(_, stored)| stored)
            .collect();
        missing.sort_by_key(|stored| stored.key);
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, LevelTier};
    use crate::store::LocalStore;

    fn category(id: &str, name: &str) -> Category {
        Category {
            remote_id: id.to_string(),
            display_name: name.to_string(),
            short_name: id.to_string(),
            primary_level: LevelTier::default(),
            secondary_level: LevelTier::default(),
            post_expiry_hours: -1,
            platforms: Vec::new(),
            characters: Vec::new(),
            game_types: Vec::new(),
            presets: None,
        }
    }

    fn stored(pairs: &[(&str, &str)]) -> Vec<Stored<Category>> {
        let store = LocalStore::in_memory();
        let mut tx = store.begin();
        for (id, name) in pairs {
            tx.insert(category(id, name));
        }
        tx.query::<Category>(None, None)
    }

    #[test]
    fn test_build_and_lookup() {
        let index = IdentityIndex::build(stored(&[("G1", "One"), ("G2", "Two")]));
        assert_eq!(index.len(), 2);
        assert!(index.contains("G1"));
        assert_eq!(index.get("G2").unwrap().record.display_name, "Two");
        assert!(index.key_of("G3").is_none());
    }

    #[test]
    fn test_duplicate_remote_id_last_wins() {
        let index = IdentityIndex::build(stored(&[("G1", "First"), ("G1", "Second")]));
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("G1").unwrap().record.display_name, "Second");
    }

    #[test]
    fn test_missing_from_processed() {
        let index = IdentityIndex::build(stored(&[("G1", "One"), ("G2", "Two"), ("G3", "Three")]));
        let processed: HashSet<String> = ["G2".to_string()].into_iter().collect();
        let missing: Vec<&str> = index
            .missing_from(&processed)
            .iter()
            .map(|s| s.record.remote_id.as_str())
            .collect();
        assert_eq!(missing, vec!["G1", "G3"]);
    }

    #[test]
    fn test_empty_index() {
        let index: IdentityIndex<Category> = IdentityIndex::build(Vec::new());
        assert!(index.is_empty());
        assert!(index.missing_from(&HashSet::new()).is_empty());
    }
}
