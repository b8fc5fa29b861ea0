use crate::error::{NodeError, Result};
use crate::storage::{EntityKind, Record, RecordStore};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory record store for tests and ephemeral nodes.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<(EntityKind, String), Record>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl RecordStore for MemoryStore {
    fn get_all(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| NodeError::Storage("memory store lock poisoned".to_string()))?;
        Ok(inner
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| NodeError::Storage("memory store lock poisoned".to_string()))?;
        Ok(inner.get(&(kind, id.to_string())).cloned())
    }

    fn add(&self, record: Record) -> Result<bool> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| NodeError::Storage("memory store lock poisoned".to_string()))?;
        let key = (record.kind, record.id.clone());
        if inner.contains_key(&key) {
            return Ok(false);
        }
        inner.insert(key, record);
        Ok(true)
    }

    fn update(&self, id: &str, record: Record) -> Result<bool> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| NodeError::Storage("memory store lock poisoned".to_string()))?;
        let key = (record.kind, id.to_string());
        if !inner.contains_key(&key) {
            return Ok(false);
        }
        inner.insert(key, record);
        Ok(true)
    }

    fn delete(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| NodeError::Storage("memory store lock poisoned".to_string()))?;
        Ok(inner.remove(&(kind, id.to_string())).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::chain_of;
    use crate::storage::{block_record, load_chain, save_block};

    #[test]
    fn test_chain_round_trip_preserves_order() {
        let store = MemoryStore::new();
        let blocks = chain_of(3);
        // Persist out of order; load_chain must sort by index
        save_block(&store, &blocks[2]).unwrap();
        save_block(&store, &blocks[0]).unwrap();
        save_block(&store, &blocks[1]).unwrap();

        let loaded = load_chain(&store).unwrap();
        assert_eq!(loaded.len(), 3);
        for (original, restored) in blocks.iter().zip(&loaded) {
            assert_eq!(original.hash(), restored.hash());
            assert_eq!(original.index(), restored.index());
        }
    }

    #[test]
    fn test_save_block_rejects_duplicate() {
        let store = MemoryStore::new();
        let blocks = chain_of(1);
        save_block(&store, &blocks[0]).unwrap();
        assert!(save_block(&store, &blocks[0]).is_err());
        // Raw add reports the duplicate as false
        assert!(!store.add(block_record(&blocks[0]).unwrap()).unwrap());
    }
}
