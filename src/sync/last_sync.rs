//! Per-model last-sync cutoffs.
//!
//! The orchestrator reads and advances one ISO-8601 timestamp per model. The
//! store is injected so hosts can persist cutoffs wherever they keep local
//! state; [`MemoryLastSyncStore`] is the default for tests and ephemeral
//! setups.

use std::collections::HashMap;

use parking_lot::Mutex;

pub trait LastSyncStore: Send + Sync {
    /// The cutoff recorded for a model, if any.
    fn get(&self, model_name: &str) -> Option<String>;

    /// Records a new cutoff. Called only after a fully successful round.
    fn set(&self, model_name: &str, timestamp: String);

    /// Forgets a model's cutoff, forcing the next round to scan everything.
    fn clear(&self, model_name: &str);
}

#[derive(Default)]
pub struct MemoryLastSyncStore {
    times: Mutex<HashMap<String, String>>,
}

impl MemoryLastSyncStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LastSyncStore for MemoryLastSyncStore {
    fn get(&self, model_name: &str) -> Option<String> {
        self.times.lock().get(model_name).cloned()
    }

    fn set(&self, model_name: &str, timestamp: String) {
        self.times.lock().insert(model_name.to_string(), timestamp);
    }

    fn clear(&self, model_name: &str) {
        self.times.lock().remove(model_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear_round_trip() {
        let store = MemoryLastSyncStore::new();
        assert_eq!(store.get("person"), None);
        store.set("person", "2024-01-01T00:00:00.000Z".to_string());
        assert_eq!(
            store.get("person").as_deref(),
            Some("2024-01-01T00:00:00.000Z")
        );
        // Cutoffs are per model.
        assert_eq!(store.get("address"), None);
        store.clear("person");
        assert_eq!(store.get("person"), None);
    }
}
