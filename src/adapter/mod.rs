//! Adapters: the engine that turns storage-service primitives into the
//! uniform operation surface, and the object-safe trait the sync
//! orchestrator routes through.

mod engine;
mod expand;
pub mod response;

pub use engine::ClientAdapter;
pub use response::{AdapterResponse, AdapterResult, Status};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::ModelDef;
use crate::query::QueryOptions;

/// The operation surface shared by every adapter, local or remote. The sync
/// orchestrator holds its master/slave pair as `Arc<dyn Adapter>`.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Makes a model known to the adapter. Association expansion resolves
    /// target models from what has been registered.
    fn register(&self, model: Arc<ModelDef>);

    /// Registration-time veto, forwarded from the backend.
    fn model_validation_hook(&self, model: &ModelDef) -> bool;

    async fn create(&self, model: &ModelDef, data: Value) -> AdapterResult;

    async fn find_one(
        &self,
        model: &ModelDef,
        pk: &Value,
        options: Option<&QueryOptions>,
        include_deleted: bool,
    ) -> AdapterResult;

    async fn find(
        &self,
        model: &ModelDef,
        options: Option<&QueryOptions>,
        include_deleted: bool,
    ) -> AdapterResult;

    async fn update(&self, model: &ModelDef, pk: &Value, data: Value) -> AdapterResult;

    async fn remove(&self, model: &ModelDef, pk: &Value) -> AdapterResult;

    /// Applies a batch of foreign records and returns the local delta the
    /// caller has not seen. `last_sync` bounds the send-back scan;
    /// `hard_delete` controls whether incoming tombstones purge or soft-
    /// delete the local copy.
    async fn synchronize(
        &self,
        model: &ModelDef,
        data: Vec<Value>,
        last_sync: Option<&str>,
        hard_delete: bool,
    ) -> AdapterResult;
}
