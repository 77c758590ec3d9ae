pub mod error;
pub mod model;

pub mod adapter;
pub mod query;
pub mod storage;
pub mod sync;

pub use adapter::{Adapter, AdapterResponse, AdapterResult, ClientAdapter, Status};
pub use error::{ModelError, StorageError, StorageResult};
pub use model::{AssociationDef, AssociationKind, FieldDef, FieldType, ModelDef};
pub use query::{OrderBy, Predicate, QueryOptions, SortDirection};
pub use storage::{MemoryStorage, StorageService};
pub use sync::{LastSyncStore, MemoryLastSyncStore, SyncEngine, SyncResult};

use chrono::{SecondsFormat, Utc};

/// Current instant as ISO-8601 with millisecond precision, the wire and
/// storage format for every timestamp in the crate.
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_iso_is_rfc3339_utc_with_millis() {
        let now = now_iso();
        assert!(now.ends_with('Z'), "not UTC: {now}");
        assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok(), "{now}");
        // Millisecond precision: ....sssZ
        let fraction = now.split('.').nth(1).unwrap_or("");
        assert_eq!(fraction.len(), "123Z".len(), "{now}");
    }
}
