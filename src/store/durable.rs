//! ACID-durable version store backed by redb.
//!
//! One database file per knowledge domain (`{domain}.redb`). All writes go
//! through transactions; reads use MVCC snapshots. On top of the plain
//! contract this store enforces a serialization boundary for multi-writer
//! deployments: `save` rejects any version number that is not strictly above
//! the stored head, so two racing publishers cannot both claim the same
//! number.

use std::marker::PhantomData;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::store::{Snapshot, StoreResult, VersionStore};

/// Table of published snapshots (version id → bincode-encoded value).
const VERSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("versions");

/// Table for the active pointer (`"active"` → version id).
const STATE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("state");

/// Table for the monotonic head counter (`"head"` → highest saved number).
const HEAD_TABLE: TableDefinition<&str, u32> = TableDefinition::new("head");

/// Persistent snapshot store using redb.
pub struct DurableVersionStore<V> {
    db: Database,
    _marker: PhantomData<V>,
}

impl<V> DurableVersionStore<V> {
    /// Open or create the store for one knowledge domain in `data_dir`.
    pub fn open(data_dir: &Path, domain: &str) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join(format!("{domain}.redb"));
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Materialize the tables so later read transactions never observe
        // a missing table.
        let txn = db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        txn.open_table(VERSIONS_TABLE).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        txn.open_table(STATE_TABLE).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        txn.open_table(HEAD_TABLE).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;

        Ok(Self {
            db,
            _marker: PhantomData,
        })
    }

    /// Highest version number ever saved, or 0 on a fresh store.
    pub fn head(&self) -> StoreResult<u32> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(HEAD_TABLE).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let head = table
            .get("head")
            .map_err(|e| StoreError::Redb {
                message: format!("get failed: {e}"),
            })?
            .map(|guard| guard.value())
            .unwrap_or(0);
        Ok(head)
    }
}

impl<V> VersionStore<V> for DurableVersionStore<V>
where
    V: Snapshot + Serialize + DeserializeOwned,
{
    fn save(&mut self, version: V) -> StoreResult<()> {
        let encoded = bincode::serialize(&version).map_err(|e| StoreError::Serialization {
            message: format!("failed to serialize version {}: {e}", version.id()),
        })?;

        let txn = self.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        {
            let mut head_table = txn.open_table(HEAD_TABLE).map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            let head = head_table
                .get("head")
                .map_err(|e| StoreError::Redb {
                    message: format!("get failed: {e}"),
                })?
                .map(|guard| guard.value())
                .unwrap_or(0);
            if version.number() <= head {
                // Dropping the uncommitted transaction aborts it.
                return Err(StoreError::NonMonotonicWrite {
                    number: version.number(),
                    head,
                });
            }
            head_table
                .insert("head", version.number())
                .map_err(|e| StoreError::Redb {
                    message: format!("insert failed: {e}"),
                })?;

            let mut versions = txn.open_table(VERSIONS_TABLE).map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            versions
                .insert(version.id(), encoded.as_slice())
                .map_err(|e| StoreError::Redb {
                    message: format!("insert failed: {e}"),
                })?;
        }
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(())
    }

    fn get(&self, id: &str) -> StoreResult<Option<V>> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(VERSIONS_TABLE).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let bytes = table
            .get(id)
            .map_err(|e| StoreError::Redb {
                message: format!("get failed: {e}"),
            })?
            .map(|guard| guard.value().to_vec());
        match bytes {
            Some(bytes) => {
                let version =
                    bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization {
                        message: format!("failed to deserialize version {id}: {e}"),
                    })?;
                Ok(Some(version))
            }
            None => Ok(None),
        }
    }

    fn get_active(&self) -> StoreResult<Option<V>> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let state = txn.open_table(STATE_TABLE).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let active_id = state
            .get("active")
            .map_err(|e| StoreError::Redb {
                message: format!("get failed: {e}"),
            })?
            .map(|guard| guard.value().to_string());
        match active_id {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }

    fn set_active(&mut self, id: &str) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        {
            let versions = txn.open_table(VERSIONS_TABLE).map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            let exists = versions
                .get(id)
                .map_err(|e| StoreError::Redb {
                    message: format!("get failed: {e}"),
                })?
                .is_some();
            if !exists {
                return Err(StoreError::VersionNotFound { id: id.to_string() });
            }

            let mut state = txn.open_table(STATE_TABLE).map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            state.insert("active", id).map_err(|e| StoreError::Redb {
                message: format!("insert failed: {e}"),
            })?;
        }
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<V>> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(VERSIONS_TABLE).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;

        let mut versions = Vec::new();
        let iter = table.iter().map_err(|e| StoreError::Redb {
            message: format!("iter failed: {e}"),
        })?;
        for row in iter {
            let (key, value) = row.map_err(|e| StoreError::Redb {
                message: format!("iter failed: {e}"),
            })?;
            let version =
                bincode::deserialize(value.value()).map_err(|e| StoreError::Serialization {
                    message: format!("failed to deserialize version {}: {e}", key.value()),
                })?;
            versions.push(version);
        }
        versions.sort_by_key(|v: &V| v.number());
        Ok(versions)
    }
}

impl<V> std::fmt::Debug for DurableVersionStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableVersionStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snap {
        id: String,
        number: u32,
        payload: Vec<String>,
    }

    impl Snapshot for Snap {
        fn id(&self) -> &str {
            &self.id
        }
        fn number(&self) -> u32 {
            self.number
        }
    }

    fn snap(number: u32) -> Snap {
        Snap {
            id: format!("test-v{number}"),
            number,
            payload: vec![format!("entry-{number}")],
        }
    }

    #[test]
    fn save_get_and_activate() {
        let dir = TempDir::new().unwrap();
        let mut store: DurableVersionStore<Snap> =
            DurableVersionStore::open(dir.path(), "test").unwrap();

        store.save(snap(1)).unwrap();
        store.set_active("test-v1").unwrap();

        assert_eq!(store.get("test-v1").unwrap(), Some(snap(1)));
        assert_eq!(store.get_active().unwrap(), Some(snap(1)));
        assert_eq!(store.head().unwrap(), 1);
    }

    #[test]
    fn fresh_store_has_no_active() {
        let dir = TempDir::new().unwrap();
        let store: DurableVersionStore<Snap> =
            DurableVersionStore::open(dir.path(), "test").unwrap();
        assert_eq!(store.get_active().unwrap(), None);
        assert_eq!(store.head().unwrap(), 0);
    }

    #[test]
    fn stale_number_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store: DurableVersionStore<Snap> =
            DurableVersionStore::open(dir.path(), "test").unwrap();

        store.save(snap(1)).unwrap();
        store.save(snap(2)).unwrap();

        let err = store.save(snap(2)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::NonMonotonicWrite { number: 2, head: 2 }
        ));
        // The rejected write must not have clobbered anything.
        assert_eq!(store.get("test-v2").unwrap(), Some(snap(2)));
    }

    #[test]
    fn set_active_unknown_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut store: DurableVersionStore<Snap> =
            DurableVersionStore::open(dir.path(), "test").unwrap();
        let err = store.set_active("missing").unwrap_err();
        assert!(matches!(err, StoreError::VersionNotFound { .. }));
    }

    #[test]
    fn list_is_sorted_by_number() {
        let dir = TempDir::new().unwrap();
        let mut store: DurableVersionStore<Snap> =
            DurableVersionStore::open(dir.path(), "test").unwrap();
        for n in 1..=3 {
            store.save(snap(n)).unwrap();
        }
        let numbers: Vec<u32> = store.list().unwrap().iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn persistence_across_reopens() {
        let dir = TempDir::new().unwrap();

        {
            let mut store: DurableVersionStore<Snap> =
                DurableVersionStore::open(dir.path(), "test").unwrap();
            store.save(snap(1)).unwrap();
            store.set_active("test-v1").unwrap();
        }

        let store: DurableVersionStore<Snap> =
            DurableVersionStore::open(dir.path(), "test").unwrap();
        assert_eq!(store.get("test-v1").unwrap(), Some(snap(1)));
        assert_eq!(store.get_active().unwrap(), Some(snap(1)));
        assert_eq!(store.head().unwrap(), 1);
    }
}
