//! The generic client-side adapter engine.
//!
//! [`ClientAdapter`] turns the seven [`StorageService`] primitives into the
//! full operation surface: soft-delete-aware CRUD, in-memory query
//! evaluation (filter, order, page), association expansion, and
//! last-write-wins batch synchronization. It owns the single lazily
//! established backend connection.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::adapter::expand;
use crate::adapter::response::{AdapterResponse, AdapterResult, Status};
use crate::adapter::Adapter;
use crate::error::{StorageError, StorageResult};
use crate::model::{pk_text, ModelDef};
use crate::query::predicate::{get_path, loose_cmp};
use crate::query::{OrderBy, Predicate, QueryOptions, SortDirection};
use crate::storage::StorageService;

pub struct ClientAdapter<S: StorageService> {
    service: S,
    connection: OnceCell<S::Connection>,
    models: RwLock<HashMap<String, Arc<ModelDef>>>,
}

impl<S: StorageService> ClientAdapter<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            connection: OnceCell::new(),
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn register(&self, model: Arc<ModelDef>) {
        self.models.write().insert(model.name.clone(), model);
    }

    pub(crate) fn model(&self, name: &str) -> Option<Arc<ModelDef>> {
        self.models.read().get(name).cloned()
    }

    /// The shared backend connection. The first caller triggers `connect`;
    /// concurrent callers await the same attempt. A failed attempt is not
    /// cached, so the next operation retries.
    async fn connection(&self) -> Result<&S::Connection, AdapterResponse> {
        self.connection
            .get_or_try_init(|| self.service.connect())
            .await
            .map_err(|e| {
                error!(error = %e, "connection failed");
                AdapterResponse::failure(Status::InternalServerError, e.to_string())
            })
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    pub async fn create(&self, model: &ModelDef, data: Value) -> AdapterResult {
        debug!(model = %model.name, "create");
        let connection = self.connection().await?;
        let mut record = model.strip_to_model_fields(&data);
        model.apply_default_values(&mut record);
        if let Some(obj) = record.as_object_mut() {
            // The engine owns key assignment; a caller-supplied key is
            // always replaced.
            obj.insert(
                model.primary_key_field.clone(),
                Value::String(Uuid::new_v4().to_string()),
            );
            if let Some(lm) = &model.last_modified_field {
                obj.insert(lm.clone(), Value::String(crate::now_iso()));
            }
        }
        match self.service.create(connection, model, record).await {
            Ok(created) => Ok(AdapterResponse::created(created)),
            Err(e) => Err(storage_failure("create", model, e)),
        }
    }

    pub async fn find_one(
        &self,
        model: &ModelDef,
        pk: &Value,
        options: Option<&QueryOptions>,
        include_deleted: bool,
    ) -> AdapterResult {
        debug!(model = %model.name, pk = %pk_text(pk), "find_one");
        let connection = self.connection().await?;
        let stored = self
            .service
            .find_one(connection, model, pk)
            .await
            .map_err(|e| storage_failure("find_one", model, e))?;
        let Some(mut record) = stored else {
            return Err(not_found(model, pk));
        };
        if !include_deleted && model.is_deleted(&record) {
            return Err(not_found(model, pk));
        }
        if let Some(paths) = options.and_then(|o| o.expand()) {
            expand::expand_record(self, connection, model, &mut record, paths).await?;
        }
        Ok(AdapterResponse::new(record).with_count(1))
    }

    pub async fn find(
        &self,
        model: &ModelDef,
        options: Option<&QueryOptions>,
        include_deleted: bool,
    ) -> AdapterResult {
        debug!(model = %model.name, "find");
        let connection = self.connection().await?;
        let mut records = self
            .service
            .find(connection, model, include_deleted)
            .await
            .map_err(|e| storage_failure("find", model, e))?;

        let filter = options.and_then(|o| o.filter());
        if let Some(paths) = options.and_then(|o| o.expand()) {
            // Only records that already match are worth expanding.
            let work: Vec<_> = records
                .iter_mut()
                .filter_map(|record| {
                    let matches = filter.map_or(true, |f| f.test(record));
                    matches.then(|| expand::expand_record(self, connection, model, record, paths))
                })
                .collect();
            try_join_all(work).await?;
        }
        if let Some(filter) = filter {
            records = Self::apply_filter(records, filter);
        }
        if let Some(order_by) = options.and_then(|o| o.order_by()) {
            Self::apply_order_by(&mut records, order_by);
        }
        let total = records.len();
        let page = Self::apply_paging(
            records,
            options.and_then(|o| o.skip()).unwrap_or(0),
            options.and_then(|o| o.top()),
        );
        Ok(AdapterResponse::new(Value::Array(page)).with_count(total))
    }

    pub async fn update(&self, model: &ModelDef, pk: &Value, data: Value) -> AdapterResult {
        debug!(model = %model.name, pk = %pk_text(pk), "update");
        let connection = self.connection().await?;
        let stored = self
            .service
            .find_one(connection, model, pk)
            .await
            .map_err(|e| storage_failure("update", model, e))?;
        let Some(stored) = stored else {
            return Err(not_found(model, pk));
        };
        if model.is_deleted(&stored) {
            return Err(not_found(model, pk));
        }
        let mut patch = model.strip_to_model_fields(&data);
        if let Some(obj) = patch.as_object_mut() {
            // The key is immutable and the timestamp is engine-owned.
            obj.remove(&model.primary_key_field);
            if let Some(lm) = &model.last_modified_field {
                obj.insert(lm.clone(), Value::String(crate::now_iso()));
            }
        }
        let merged = shallow_merge(stored, patch);
        match self.service.update(connection, model, pk, merged).await {
            Ok(updated) => Ok(AdapterResponse::new(updated).with_count(1)),
            Err(e) => Err(storage_failure("update", model, e)),
        }
    }

    /// Soft delete: stamps the timestamp, raises the delete flag, writes the
    /// record back. The stored copy survives as a tombstone so the deletion
    /// can propagate through synchronization.
    pub async fn remove(&self, model: &ModelDef, pk: &Value) -> AdapterResult {
        debug!(model = %model.name, pk = %pk_text(pk), "remove");
        let connection = self.connection().await?;
        let stored = self
            .service
            .find_one(connection, model, pk)
            .await
            .map_err(|e| storage_failure("remove", model, e))?;
        let Some(mut record) = stored else {
            return Err(not_found(model, pk));
        };
        if let Some(obj) = record.as_object_mut() {
            if let Some(lm) = &model.last_modified_field {
                obj.insert(lm.clone(), Value::String(crate::now_iso()));
            }
            if let Some(del) = &model.deleted_field {
                obj.insert(del.clone(), Value::Bool(true));
            }
        }
        match self.service.update(connection, model, pk, record).await {
            Ok(_) => Ok(AdapterResponse::no_content()),
            Err(e) => Err(storage_failure("remove", model, e)),
        }
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    /// Applies a foreign batch record by record, then returns the local
    /// records the caller has not seen: everything modified strictly after
    /// `last_sync` (everything when unset) except the records the batch
    /// itself just wrote. The send-back scan excludes tombstones; deletions
    /// only travel inside batches.
    pub async fn synchronize(
        &self,
        model: &ModelDef,
        data: Vec<Value>,
        last_sync: Option<&str>,
        hard_delete: bool,
    ) -> AdapterResult {
        debug!(model = %model.name, incoming = data.len(), ?last_sync, "synchronize");
        let connection = self.connection().await?;
        let work = data
            .into_iter()
            .map(|incoming| self.sync_instance(connection, model, incoming, hard_delete));
        let applied = try_join_all(work)
            .await
            .map_err(|e| storage_failure("synchronize", model, e))?;
        // Conflict no-ops stay out of the ignore list so the winning local
        // copy is sent back to the caller.
        let ignore: HashSet<String> = applied
            .into_iter()
            .flatten()
            .map(|pk| pk_text(&pk))
            .collect();

        let stored = self
            .service
            .find(connection, model, false)
            .await
            .map_err(|e| storage_failure("synchronize", model, e))?;
        let send_back: Vec<Value> = stored
            .into_iter()
            .filter(|record| {
                let modified_after = match (last_sync, model.last_modified_field.as_deref()) {
                    (Some(cutoff), Some(lm)) => {
                        Predicate::new(lm).greater_than(cutoff).test(record)
                    }
                    _ => true,
                };
                let ignored = model
                    .primary_key_of(record)
                    .map(|pk| ignore.contains(&pk_text(pk)))
                    .unwrap_or(false);
                modified_after && !ignored
            })
            .collect();
        let count = send_back.len();
        Ok(AdapterResponse::new(Value::Array(send_back)).with_count(count))
    }

    /// Last-write-wins decision for one incoming record. Returns the primary
    /// key when a write happened, `None` for a no-op.
    async fn sync_instance(
        &self,
        connection: &S::Connection,
        model: &ModelDef,
        incoming: Value,
        hard_delete: bool,
    ) -> StorageResult<Option<Value>> {
        let Some(pk) = model.primary_key_of(&incoming).cloned() else {
            warn!(model = %model.name, "sync instance without a primary key skipped");
            return Ok(None);
        };
        let stored = self.service.find_one(connection, model, &pk).await?;
        let incoming_deleted = model.is_deleted(&incoming);
        match stored {
            Some(stored) => {
                // Only the timestamp decides; a newer write lands even on a
                // local tombstone.
                let locally_older = match model.last_modified_field.as_deref() {
                    Some(lm) => match incoming.get(lm) {
                        Some(incoming_lm) => {
                            Predicate::new(lm).less_than(incoming_lm.clone()).test(&stored)
                        }
                        None => false,
                    },
                    // Without timestamps there is nothing to lose a race to.
                    None => true,
                };
                if !locally_older {
                    return Ok(None);
                }
                if incoming_deleted && hard_delete {
                    self.service.remove(connection, model, &pk).await?;
                } else if incoming_deleted {
                    // Soft delete keeps the stored fields, restamps, and
                    // raises the flag.
                    let mut tombstone = stored;
                    if let Some(obj) = tombstone.as_object_mut() {
                        if let Some(lm) = &model.last_modified_field {
                            obj.insert(lm.clone(), Value::String(crate::now_iso()));
                        }
                        if let Some(del) = &model.deleted_field {
                            obj.insert(del.clone(), Value::Bool(true));
                        }
                    }
                    self.service.update(connection, model, &pk, tombstone).await?;
                } else {
                    // Merge-update keeps the incoming timestamp rather than
                    // restamping.
                    let merged = shallow_merge(stored, model.strip_to_model_fields(&incoming));
                    self.service.update(connection, model, &pk, merged).await?;
                }
                Ok(Some(pk))
            }
            None => {
                if incoming_deleted {
                    // Nothing local to delete.
                    return Ok(None);
                }
                self.service
                    .create(connection, model, model.strip_to_model_fields(&incoming))
                    .await?;
                Ok(Some(pk))
            }
        }
    }

    // ------------------------------------------------------------------
    // In-memory query helpers
    // ------------------------------------------------------------------

    pub fn apply_filter(records: Vec<Value>, filter: &Predicate) -> Vec<Value> {
        records.into_iter().filter(|r| filter.test(r)).collect()
    }

    /// Stable sort; date strings compare by instant, missing and null values
    /// sort after present ones.
    pub fn apply_order_by(records: &mut [Value], order_by: &OrderBy) {
        records.sort_by(|a, b| {
            let av = get_path(a, &order_by.property).filter(|v| !v.is_null());
            let bv = get_path(b, &order_by.property).filter(|v| !v.is_null());
            let ord = match (av, bv) {
                (Some(a), Some(b)) => loose_cmp(a, b).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            match order_by.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
    }

    /// Window `[skip, skip + top)`. Without a positive `top` paging is a
    /// no-op and the input comes back unchanged.
    pub fn apply_paging(records: Vec<Value>, skip: usize, top: Option<usize>) -> Vec<Value> {
        match top {
            Some(top) if top > 0 => records.into_iter().skip(skip).take(top).collect(),
            _ => records,
        }
    }
}

fn storage_failure(operation: &str, model: &ModelDef, err: StorageError) -> AdapterResponse {
    error!(operation, model = %model.name, error = %err, "storage failure");
    AdapterResponse::failure(Status::InternalServerError, err.to_string())
}

fn not_found(model: &ModelDef, pk: &Value) -> AdapterResponse {
    debug!(model = %model.name, pk = %pk_text(pk), "record not found");
    AdapterResponse::not_found()
}

/// Shallow merge: `patch`'s top-level entries overwrite `base`'s.
fn shallow_merge(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            for (k, v) in patch {
                base.insert(k, v);
            }
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}

// ============================================================================
// Adapter trait
// ============================================================================

#[async_trait]
impl<S: StorageService> Adapter for ClientAdapter<S> {
    fn register(&self, model: Arc<ModelDef>) {
        ClientAdapter::register(self, model);
    }

    fn model_validation_hook(&self, model: &ModelDef) -> bool {
        self.service.model_validation_hook(model)
    }

    async fn create(&self, model: &ModelDef, data: Value) -> AdapterResult {
        ClientAdapter::create(self, model, data).await
    }

    async fn find_one(
        &self,
        model: &ModelDef,
        pk: &Value,
        options: Option<&QueryOptions>,
        include_deleted: bool,
    ) -> AdapterResult {
        ClientAdapter::find_one(self, model, pk, options, include_deleted).await
    }

    async fn find(
        &self,
        model: &ModelDef,
        options: Option<&QueryOptions>,
        include_deleted: bool,
    ) -> AdapterResult {
        ClientAdapter::find(self, model, options, include_deleted).await
    }

    async fn update(&self, model: &ModelDef, pk: &Value, data: Value) -> AdapterResult {
        ClientAdapter::update(self, model, pk, data).await
    }

    async fn remove(&self, model: &ModelDef, pk: &Value) -> AdapterResult {
        ClientAdapter::remove(self, model, pk).await
    }

    async fn synchronize(
        &self,
        model: &ModelDef,
        data: Vec<Value>,
        last_sync: Option<&str>,
        hard_delete: bool,
    ) -> AdapterResult {
        ClientAdapter::synchronize(self, model, data, last_sync, hard_delete).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![
            json!({"id": "a", "age": 30}),
            json!({"id": "b", "age": 20}),
            json!({"id": "c"}),
            json!({"id": "d", "age": 25}),
        ]
    }

    fn order(property: &str, direction: SortDirection) -> OrderBy {
        OrderBy {
            property: property.to_string(),
            direction,
        }
    }

    type Engine = ClientAdapter<crate::storage::MemoryStorage>;

    #[test]
    fn order_by_sorts_missing_values_last() {
        let mut records = rows();
        Engine::apply_order_by(&mut records, &order("age", SortDirection::Ascending));
        let ids: Vec<_> = records.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("b"), json!("d"), json!("a"), json!("c")]);
    }

    #[test]
    fn order_by_descending_reverses() {
        let mut records = rows();
        Engine::apply_order_by(&mut records, &order("age", SortDirection::Descending));
        assert_eq!(records[0]["id"], json!("c"));
        assert_eq!(records[1]["id"], json!("a"));
    }

    #[test]
    fn order_by_date_field_compares_instants() {
        let mut records = vec![
            json!({"id": "a", "at": "2024-01-02T00:00:00.000Z"}),
            json!({"id": "b", "at": "2024-01-01T12:00:00.000+12:00"}),
        ];
        Engine::apply_order_by(&mut records, &order("at", SortDirection::Ascending));
        assert_eq!(records[0]["id"], json!("b"));
    }

    #[test]
    fn paging_windows_records() {
        let page = Engine::apply_paging(rows(), 1, Some(2));
        assert_eq!(page.len(), 2);
        assert_eq!(page[0]["id"], json!("b"));
        assert!(Engine::apply_paging(rows(), 10, Some(2)).is_empty());
    }

    #[test]
    fn paging_without_positive_top_is_a_noop() {
        assert_eq!(Engine::apply_paging(rows(), 1, Some(0)).len(), 4);
        assert_eq!(Engine::apply_paging(rows(), 2, None).len(), 4);
        assert_eq!(Engine::apply_paging(rows(), 10, None).len(), 4);
    }

    #[test]
    fn shallow_merge_overwrites_top_level() {
        let merged = shallow_merge(
            json!({"a": 1, "b": {"x": 1}}),
            json!({"b": {"y": 2}, "c": 3}),
        );
        assert_eq!(merged, json!({"a": 1, "b": {"y": 2}, "c": 3}));
    }
}
