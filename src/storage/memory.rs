//! In-memory storage service.
//!
//! The reference backend: one `HashMap` table per model source name, keyed by
//! the primary key's JSON text. Useful for tests and as a template for real
//! backends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::model::{pk_text, ModelDef};
use crate::storage::StorageService;

type Table = HashMap<String, Value>;

#[derive(Default)]
struct Tables {
    by_source: HashMap<String, Table>,
}

/// Shared in-memory tables. Cloning yields a handle onto the same data, so a
/// `MemoryStorage` can be inspected from outside the adapter that owns it.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<Mutex<Tables>>,
    /// When set, `connect` fails with this message. Test hook for exercising
    /// connection-failure paths.
    fail_connect: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `connect` calls fail until cleared with `None`.
    pub fn set_connect_failure(&self, message: Option<String>) {
        *self.fail_connect.lock() = message;
    }

    /// Snapshot of every record in a model's table, tombstones included.
    pub fn dump(&self, source_name: &str) -> Vec<Value> {
        self.tables
            .lock()
            .by_source
            .get(source_name)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Seeds a record directly, bypassing the engine.
    pub fn seed(&self, model: &ModelDef, record: Value) {
        if let Some(key) = model.primary_key_of(&record).map(pk_text) {
            self.tables
                .lock()
                .by_source
                .entry(model.source_name.clone())
                .or_default()
                .insert(key, record);
        }
    }
}

#[async_trait]
impl StorageService for MemoryStorage {
    type Connection = ();

    async fn connect(&self) -> StorageResult<Self::Connection> {
        if let Some(message) = self.fail_connect.lock().clone() {
            return Err(StorageError::Connection(message));
        }
        Ok(())
    }

    async fn create(
        &self,
        _connection: &Self::Connection,
        model: &ModelDef,
        record: Value,
    ) -> StorageResult<Value> {
        let pk = model
            .primary_key_of(&record)
            .ok_or_else(|| StorageError::backend("create requires a primary key"))?;
        let key = pk_text(pk);
        self.tables
            .lock()
            .by_source
            .entry(model.source_name.clone())
            .or_default()
            .insert(key, record.clone());
        Ok(record)
    }

    async fn find_one(
        &self,
        _connection: &Self::Connection,
        model: &ModelDef,
        pk: &Value,
    ) -> StorageResult<Option<Value>> {
        Ok(self
            .tables
            .lock()
            .by_source
            .get(&model.source_name)
            .and_then(|t| t.get(&pk_text(pk)))
            .cloned())
    }

    async fn find(
        &self,
        _connection: &Self::Connection,
        model: &ModelDef,
        include_deleted: bool,
    ) -> StorageResult<Vec<Value>> {
        Ok(self
            .tables
            .lock()
            .by_source
            .get(&model.source_name)
            .map(|t| {
                t.values()
                    .filter(|r| include_deleted || !model.is_deleted(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(
        &self,
        _connection: &Self::Connection,
        model: &ModelDef,
        pk: &Value,
        record: Value,
    ) -> StorageResult<Value> {
        let mut tables = self.tables.lock();
        let table = tables
            .by_source
            .entry(model.source_name.clone())
            .or_default();
        let key = pk_text(pk);
        if !table.contains_key(&key) {
            return Err(StorageError::NotFound {
                source_name: model.source_name.clone(),
                pk: key,
            });
        }
        table.insert(key, record.clone());
        Ok(record)
    }

    async fn remove(
        &self,
        _connection: &Self::Connection,
        model: &ModelDef,
        pk: &Value,
    ) -> StorageResult<()> {
        let mut tables = self.tables.lock();
        let key = pk_text(pk);
        let removed = tables
            .by_source
            .get_mut(&model.source_name)
            .and_then(|t| t.remove(&key));
        if removed.is_none() {
            return Err(StorageError::NotFound {
                source_name: model.source_name.clone(),
                pk: key,
            });
        }
        Ok(())
    }

    async fn find_by_association(
        &self,
        _connection: &Self::Connection,
        model: &ModelDef,
        mapped_by: &str,
        pk: &Value,
    ) -> StorageResult<Vec<Value>> {
        Ok(self
            .tables
            .lock()
            .by_source
            .get(&model.source_name)
            .map(|t| {
                t.values()
                    .filter(|r| r.get(mapped_by) == Some(pk) && !model.is_deleted(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, FieldType};
    use serde_json::json;

    fn person() -> ModelDef {
        ModelDef::builder("person")
            .field(FieldDef::primary_key("id", FieldType::String))
            .field(FieldDef::new("name", FieldType::String))
            .field(FieldDef::new("employerId", FieldType::String))
            .deleted_field("deleted")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_find_one() {
        let storage = MemoryStorage::new();
        let model = person();
        storage
            .create(&(), &model, json!({"id": "a", "name": "Ada"}))
            .await
            .unwrap();
        let found = storage.find_one(&(), &model, &json!("a")).await.unwrap();
        assert_eq!(found.unwrap()["name"], json!("Ada"));
        let missing = storage.find_one(&(), &model, &json!("zz")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn find_respects_include_deleted() {
        let storage = MemoryStorage::new();
        let model = person();
        storage.seed(&model, json!({"id": "a", "deleted": false}));
        storage.seed(&model, json!({"id": "b", "deleted": true}));
        assert_eq!(storage.find(&(), &model, false).await.unwrap().len(), 1);
        assert_eq!(storage.find(&(), &model, true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_missing_record_is_not_found() {
        let storage = MemoryStorage::new();
        let model = person();
        let err = storage
            .update(&(), &model, &json!("zz"), json!({"id": "zz"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn remove_is_hard() {
        let storage = MemoryStorage::new();
        let model = person();
        storage.seed(&model, json!({"id": "a"}));
        storage.remove(&(), &model, &json!("a")).await.unwrap();
        assert!(storage.dump("person").is_empty());
    }

    #[tokio::test]
    async fn find_by_association_matches_foreign_key() {
        let storage = MemoryStorage::new();
        let model = person();
        storage.seed(&model, json!({"id": "a", "employerId": "e1"}));
        storage.seed(&model, json!({"id": "b", "employerId": "e2"}));
        storage.seed(&model, json!({"id": "c", "employerId": "e1", "deleted": true}));
        let hits = storage
            .find_by_association(&(), &model, "employerId", &json!("e1"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["id"], json!("a"));
    }

    #[tokio::test]
    async fn connect_failure_hook() {
        let storage = MemoryStorage::new();
        storage.set_connect_failure(Some("offline".to_string()));
        assert!(matches!(
            storage.connect().await,
            Err(StorageError::Connection(m)) if m == "offline"
        ));
        storage.set_connect_failure(None);
        storage.connect().await.unwrap();
    }
}
