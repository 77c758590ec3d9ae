//! The sync orchestrator.
//!
//! [`SyncEngine`] owns an explicit master/slave adapter pair, routes CRUD to
//! the slave unless a query prefers the master, and runs per-model
//! synchronization rounds: ship the slave's delta to the master, apply the
//! master's response locally, and advance the model's last-sync cutoff only
//! when the whole round succeeded.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::adapter::{Adapter, AdapterResponse, AdapterResult, Status};
use crate::error::ModelError;
use crate::model::ModelDef;
use crate::query::{Predicate, QueryOptions};
use crate::sync::LastSyncStore;

// ============================================================================
// SyncResult
// ============================================================================

/// Outcome of one per-model round. Serializes with the camelCase field
/// names status UIs expect.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub model: String,
    /// Records shipped from the slave to the master.
    pub sent: usize,
    /// Records the master sent back and the slave applied.
    pub returned: usize,
    pub total_processed: usize,
    /// `"Complete"`, or the text of the failure that ended the round.
    pub status: String,
}

impl SyncResult {
    fn started(model: &ModelDef) -> Self {
        Self {
            model: model.name.clone(),
            sent: 0,
            returned: 0,
            total_processed: 0,
            status: String::new(),
        }
    }

    fn failed(mut self, failure: &AdapterResponse) -> Self {
        self.status = failure.to_string();
        self
    }

    pub fn is_complete(&self) -> bool {
        self.status == "Complete"
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: sent {}, returned {}, {}",
            self.model, self.sent, self.returned, self.status
        )
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

pub struct SyncEngine {
    master: Arc<dyn Adapter>,
    slave: Arc<dyn Adapter>,
    last_sync: Arc<dyn LastSyncStore>,
    models: RwLock<HashMap<String, Arc<ModelDef>>>,
}

impl SyncEngine {
    pub fn new(
        master: Arc<dyn Adapter>,
        slave: Arc<dyn Adapter>,
        last_sync: Arc<dyn LastSyncStore>,
    ) -> Self {
        Self {
            master,
            slave,
            last_sync,
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Validates the model against both adapters and makes it available for
    /// routing, expansion, and synchronization.
    pub fn register_model(&self, model: ModelDef) -> Result<Arc<ModelDef>, ModelError> {
        if !self.master.model_validation_hook(&model) || !self.slave.model_validation_hook(&model)
        {
            return Err(ModelError::RejectedByAdapter { model: model.name });
        }
        let model = Arc::new(model);
        self.master.register(Arc::clone(&model));
        self.slave.register(Arc::clone(&model));
        self.models
            .write()
            .insert(model.name.clone(), Arc::clone(&model));
        Ok(model)
    }

    pub fn model(&self, name: &str) -> Option<Arc<ModelDef>> {
        self.models.read().get(name).cloned()
    }

    fn require_model(&self, name: &str) -> Result<Arc<ModelDef>, AdapterResponse> {
        self.model(name).ok_or_else(|| {
            AdapterResponse::failure(
                Status::BadRequest,
                format!("Model \"{name}\" is not registered"),
            )
        })
    }

    fn adapter_for(&self, options: Option<&QueryOptions>) -> &Arc<dyn Adapter> {
        if options.map_or(false, |o| o.prefer_master()) {
            &self.master
        } else {
            &self.slave
        }
    }

    fn require_pk(pk: &Value) -> Result<(), AdapterResponse> {
        if pk.is_null() {
            return Err(AdapterResponse::failure(
                Status::BadRequest,
                "A primary key is required",
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Routed CRUD
    // ------------------------------------------------------------------

    pub async fn create(
        &self,
        model_name: &str,
        data: Value,
        options: Option<&QueryOptions>,
    ) -> AdapterResult {
        let model = self.require_model(model_name)?;
        self.adapter_for(options).create(&model, data).await
    }

    pub async fn find_one(
        &self,
        model_name: &str,
        pk: &Value,
        options: Option<&QueryOptions>,
    ) -> AdapterResult {
        let model = self.require_model(model_name)?;
        Self::require_pk(pk)?;
        self.adapter_for(options)
            .find_one(&model, pk, options, false)
            .await
    }

    pub async fn find(&self, model_name: &str, options: Option<&QueryOptions>) -> AdapterResult {
        let model = self.require_model(model_name)?;
        self.adapter_for(options).find(&model, options, false).await
    }

    pub async fn update(
        &self,
        model_name: &str,
        pk: &Value,
        data: Value,
        options: Option<&QueryOptions>,
    ) -> AdapterResult {
        let model = self.require_model(model_name)?;
        Self::require_pk(pk)?;
        self.adapter_for(options).update(&model, pk, data).await
    }

    pub async fn remove(
        &self,
        model_name: &str,
        pk: &Value,
        options: Option<&QueryOptions>,
    ) -> AdapterResult {
        let model = self.require_model(model_name)?;
        Self::require_pk(pk)?;
        self.adapter_for(options).remove(&model, pk).await
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    /// Runs one round per named model, concurrently. Resolves with every
    /// round's result; a failed round rejects with its partial result and
    /// leaves that model's cutoff untouched.
    pub async fn synchronize(
        &self,
        model_names: &[String],
        force: bool,
    ) -> Result<Vec<SyncResult>, SyncResult> {
        let rounds = model_names.iter().map(|name| self.sync_model(name, force));
        try_join_all(rounds).await
    }

    /// One model's round: slave delta out, master's response applied back.
    /// `force` ignores the recorded cutoff and ships everything.
    pub async fn sync_model(&self, model_name: &str, force: bool) -> Result<SyncResult, SyncResult> {
        let model = match self.require_model(model_name) {
            Ok(model) => model,
            Err(failure) => {
                return Err(SyncResult {
                    model: model_name.to_string(),
                    sent: 0,
                    returned: 0,
                    total_processed: 0,
                    status: failure.to_string(),
                });
            }
        };
        let mut result = SyncResult::started(&model);
        if force {
            self.last_sync.clear(&model.name);
        }
        let last_sync = self.last_sync.get(&model.name);
        debug!(model = %model.name, ?last_sync, force, "sync round started");

        // Everything touched locally since the cutoff, tombstones included.
        let mut options = QueryOptions::new();
        if let (Some(cutoff), Some(lm)) = (&last_sync, model.last_modified_field.as_deref()) {
            options = options.with_filter(
                Predicate::new(lm).greater_than_or_equal_to(cutoff.clone()),
            );
        }
        let delta = self
            .slave
            .find(&model, Some(&options), true)
            .await
            .map_err(|e| sync_failure(&model, "slave delta scan", result.clone(), e))?;
        let outgoing = as_records(delta.data);
        result.sent = outgoing.len();
        result.total_processed += outgoing.len();

        let master_response = self
            .master
            .synchronize(&model, outgoing, last_sync.as_deref(), false)
            .await
            .map_err(|e| sync_failure(&model, "master synchronize", result.clone(), e))?;
        let incoming = as_records(master_response.data);
        result.returned = incoming.len();
        result.total_processed += incoming.len();

        if !incoming.is_empty() {
            // Propagated deletes stay soft on both sides so a stale peer can
            // still observe them.
            self.slave
                .synchronize(&model, incoming, last_sync.as_deref(), false)
                .await
                .map_err(|e| sync_failure(&model, "slave apply", result.clone(), e))?;
        }

        self.last_sync.set(&model.name, crate::now_iso());
        result.status = "Complete".to_string();
        info!(model = %model.name, sent = result.sent, returned = result.returned,
            "sync round complete");
        Ok(result)
    }

    /// Forgets a model's cutoff so the next round ships everything.
    pub fn clear_last_sync(&self, model_name: &str) {
        self.last_sync.clear(model_name);
    }
}

fn sync_failure(
    model: &ModelDef,
    phase: &str,
    result: SyncResult,
    failure: AdapterResponse,
) -> SyncResult {
    error!(model = %model.name, phase, failure = %failure, "sync round failed");
    result.failed(&failure)
}

fn as_records(data: Value) -> Vec<Value> {
    match data {
        Value::Array(records) => records,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}
