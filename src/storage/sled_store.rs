use crate::error::{NodeError, Result};
use crate::storage::{EntityKind, Record, RecordStore};
use crate::utils::{deserialize, serialize};
use sled::{Db, Tree};
use std::path::Path;

/// Sled-backed record store: one tree per entity family, records stored
/// under their id.
pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SledStore> {
        let db = sled::open(path)
            .map_err(|e| NodeError::Storage(format!("failed to open database: {e}")))?;
        Ok(SledStore { db })
    }

    fn tree(&self, kind: EntityKind) -> Result<Tree> {
        self.db
            .open_tree(kind.as_str())
            .map_err(|e| NodeError::Storage(format!("failed to open tree: {e}")))
    }
}

impl RecordStore for SledStore {
    fn get_all(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let tree = self.tree(kind)?;
        let mut records = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let (_, value) = entry?;
            records.push(deserialize::<Record>(&value)?);
        }
        Ok(records)
    }

    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        let tree = self.tree(kind)?;
        match tree.get(id.as_bytes())? {
            Some(value) => Ok(Some(deserialize::<Record>(&value)?)),
            None => Ok(None),
        }
    }

    fn add(&self, record: Record) -> Result<bool> {
        let tree = self.tree(record.kind)?;
        if tree.contains_key(record.id.as_bytes())? {
            return Ok(false);
        }
        tree.insert(record.id.as_bytes(), serialize(&record)?)?;
        Ok(true)
    }

    fn update(&self, id: &str, record: Record) -> Result<bool> {
        let tree = self.tree(record.kind)?;
        if !tree.contains_key(id.as_bytes())? {
            return Ok(false);
        }
        tree.insert(id.as_bytes(), serialize(&record)?)?;
        Ok(true)
    }

    fn delete(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let tree = self.tree(kind)?;
        Ok(tree.remove(id.as_bytes())?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, kind: EntityKind, body: &[u8]) -> Record {
        Record {
            id: id.to_string(),
            kind,
            body: body.to_vec(),
        }
    }

    #[test]
    fn test_add_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();

        assert!(store
            .add(record("a", EntityKind::Peer, b"peer-a"))
            .unwrap());
        let fetched = store.get(EntityKind::Peer, "a").unwrap().unwrap();
        assert_eq!(fetched.body, b"peer-a");
    }

    #[test]
    fn test_add_rejects_existing_id() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();

        assert!(store.add(record("a", EntityKind::Peer, b"one")).unwrap());
        assert!(!store.add(record("a", EntityKind::Peer, b"two")).unwrap());
        let fetched = store.get(EntityKind::Peer, "a").unwrap().unwrap();
        assert_eq!(fetched.body, b"one");
    }

    #[test]
    fn test_update_requires_existing_id() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();

        assert!(!store
            .update("a", record("a", EntityKind::Peer, b"nope"))
            .unwrap());
        store.add(record("a", EntityKind::Peer, b"one")).unwrap();
        assert!(store
            .update("a", record("a", EntityKind::Peer, b"two"))
            .unwrap());
        let fetched = store.get(EntityKind::Peer, "a").unwrap().unwrap();
        assert_eq!(fetched.body, b"two");
    }

    #[test]
    fn test_delete_and_kind_isolation() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();

        store.add(record("a", EntityKind::Peer, b"peer")).unwrap();
        store.add(record("a", EntityKind::Block, b"block")).unwrap();

        assert!(store.delete(EntityKind::Peer, "a").unwrap());
        assert!(!store.delete(EntityKind::Peer, "a").unwrap());
        // Same id under a different kind is untouched
        assert!(store.get(EntityKind::Block, "a").unwrap().is_some());
        assert_eq!(store.get_all(EntityKind::Peer).unwrap().len(), 0);
    }
}
