use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::ProviderError;
use crate::store::StateStore;

/// Persistent long-id → document-id table, one entry per collection.
///
/// Read-modify-write cycles on one collection are serialized through a
/// per-key mutex; different collections do not contend.
pub struct IdMappingTable {
    state: Arc<dyn StateStore>,
    namespace: String,
    locks: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

pub type IdMapping = BTreeMap<String, String>;

impl IdMappingTable {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>, namespace: impl Into<String>) -> Self {
        Self {
            state,
            namespace: namespace.into(),
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    /// State-store key for a collection: `<namespace>.vdb_mapping.<collection>`.
    #[must_use]
    pub fn key(&self, collection: &str) -> String {
        let mut key = String::with_capacity(self.namespace.len() + collection.len() + 13);
        key.push_str(&self.namespace);
        key.push_str(".vdb_mapping.");
        key.push_str(collection);
        key
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn read(&self, key: &str) -> IdMapping {
        match self.state.get(key) {
            Some(Value::Object(entries)) => entries
                .into_iter()
                .filter_map(|(long_id, doc_id)| match doc_id {
                    Value::String(doc_id) => Some((long_id, doc_id)),
                    _ => None,
                })
                .collect(),
            Some(other) => {
                tracing::warn!(key, value = %other, "Ignoring malformed id mapping entry");
                IdMapping::new()
            }
            None => IdMapping::new(),
        }
    }

    fn write(&self, key: &str, mapping: &IdMapping) -> Result<(), ProviderError> {
        if mapping.is_empty() {
            return self.state.delete(key);
        }
        let value = Value::Object(
            mapping
                .iter()
                .map(|(long_id, doc_id)| (long_id.clone(), Value::String(doc_id.clone())))
                .collect(),
        );
        self.state.set(key, value)
    }

    /// Snapshot of the whole table for a collection.
    #[must_use]
    pub fn get(&self, collection: &str) -> IdMapping {
        self.read(&self.key(collection))
    }

    /// Record new pairs; existing long ids are overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Storage`] when the state store refuses the write.
    pub fn insert_many<I>(&self, collection: &str, pairs: I) -> Result<(), ProviderError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let key = self.key(collection);
        let lock = self.lock_for(&key);
        let _guard = lock.lock();
        let mut mapping = self.read(&key);
        mapping.extend(pairs);
        self.write(&key, &mapping)
    }

    /// Drop the given long ids.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Storage`] when the state store refuses the write.
    pub fn remove_many(&self, collection: &str, long_ids: &[String]) -> Result<(), ProviderError> {
        let key = self.key(collection);
        let lock = self.lock_for(&key);
        let _guard = lock.lock();
        let mut mapping = self.read(&key);
        for long_id in long_ids {
            mapping.remove(long_id);
        }
        self.write(&key, &mapping)
    }

    /// Forget every entry of a collection and release its lock slot.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Storage`] when the state store refuses the delete.
    pub fn clear(&self, collection: &str) -> Result<(), ProviderError> {
        let key = self.key(collection);
        let lock = self.lock_for(&key);
        let result = {
            let _guard = lock.lock();
            self.state.delete(&key)
        };
        // Only drop the slot when nobody else holds or waits on it.
        let mut locks = self.locks.lock();
        if locks
            .get(&key)
            .is_some_and(|slot| Arc::ptr_eq(slot, &lock) && Arc::strong_count(slot) == 2)
        {
            locks.remove(&key);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;

    fn table() -> (Arc<MemoryStateStore>, IdMappingTable) {
        let state = Arc::new(MemoryStateStore::new());
        let table = IdMappingTable::new(state.clone(), "dashboard_ai");
        (state, table)
    }

    #[test]
    fn test_key_format() {
        let (_, table) = table();
        assert_eq!(table.key("docs"), "dashboard_ai.vdb_mapping.docs");
    }

    #[test]
    fn test_insert_lookup_remove_clear() {
        let (state, table) = table();
        table
            .insert_many(
                "docs",
                [
                    ("node:1".to_string(), "d-1".to_string()),
                    ("node:2".to_string(), "d-2".to_string()),
                ],
            )
            .unwrap();
        assert_eq!(table.get("docs").get("node:1").map(String::as_str), Some("d-1"));
        assert!(table.get("other").is_empty());

        table.remove_many("docs", &["node:1".to_string()]).unwrap();
        assert_eq!(table.get("docs").len(), 1);

        table.clear("docs").unwrap();
        assert!(state.get("dashboard_ai.vdb_mapping.docs").is_none());
        assert!(table.locks.lock().is_empty());
    }

    #[test]
    fn test_clear_keeps_lock_slot_while_held() {
        let (_, table) = table();
        table
            .insert_many("docs", [("a".to_string(), "1".to_string())])
            .unwrap();
        let held = table.lock_for(&table.key("docs"));
        table.clear("docs").unwrap();
        assert_eq!(table.locks.lock().len(), 1);
        drop(held);
        table.clear("docs").unwrap();
        assert!(table.locks.lock().is_empty());
    }

    #[test]
    fn test_removing_last_entry_deletes_key() {
        let (state, table) = table();
        table
            .insert_many("docs", [("a".to_string(), "1".to_string())])
            .unwrap();
        table.remove_many("docs", &["a".to_string()]).unwrap();
        assert!(state.get(&table.key("docs")).is_none());
    }

    #[test]
    fn test_concurrent_inserts_do_not_lose_entries() {
        let (_, table) = table();
        let table = Arc::new(table);
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        table
                            .insert_many(
                                "docs",
                                [(format!("{worker}-{i}"), format!("doc-{worker}-{i}"))],
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(table.get("docs").len(), 200);
    }
}
