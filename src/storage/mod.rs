//! The storage-service seam the client adapter engine drives.

mod memory;

pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;
use crate::model::ModelDef;

/// Backend contract: seven primitives plus a registration-time veto hook.
///
/// Services return plain records and never interpret query options — all
/// filtering, ordering, paging, and association expansion happens in the
/// engine. `find_one` returns soft-deleted records; visibility is the
/// engine's decision. `remove` is a hard delete (the engine's public remove
/// is soft and goes through `update`).
#[async_trait]
pub trait StorageService: Send + Sync + 'static {
    /// Handle produced by a successful `connect` and shared by every
    /// subsequent call.
    type Connection: Send + Sync;

    async fn connect(&self) -> StorageResult<Self::Connection>;

    /// Inserts a record and returns it as stored.
    async fn create(
        &self,
        connection: &Self::Connection,
        model: &ModelDef,
        record: Value,
    ) -> StorageResult<Value>;

    /// Looks a record up by primary key, soft-deleted records included.
    async fn find_one(
        &self,
        connection: &Self::Connection,
        model: &ModelDef,
        pk: &Value,
    ) -> StorageResult<Option<Value>>;

    /// Returns all records of the model; soft-deleted ones only when
    /// `include_deleted` is set.
    async fn find(
        &self,
        connection: &Self::Connection,
        model: &ModelDef,
        include_deleted: bool,
    ) -> StorageResult<Vec<Value>>;

    /// Replaces the record stored under `pk` and returns it as stored.
    async fn update(
        &self,
        connection: &Self::Connection,
        model: &ModelDef,
        pk: &Value,
        record: Value,
    ) -> StorageResult<Value>;

    /// Hard-deletes the record stored under `pk`.
    async fn remove(
        &self,
        connection: &Self::Connection,
        model: &ModelDef,
        pk: &Value,
    ) -> StorageResult<()>;

    /// Returns the non-deleted records of `model` whose `mapped_by` field
    /// equals `pk`.
    async fn find_by_association(
        &self,
        connection: &Self::Connection,
        model: &ModelDef,
        mapped_by: &str,
        pk: &Value,
    ) -> StorageResult<Vec<Value>>;

    /// Lets a backend veto a model at registration time (unsupported field
    /// types, reserved names). Accepts everything by default.
    fn model_validation_hook(&self, _model: &ModelDef) -> bool {
        true
    }
}
