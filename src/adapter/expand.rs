//! Association expansion.
//!
//! Walks dotted `$expand` paths (`"home"`, `"employer.boss"`) and grafts the
//! resolved associations onto the record under their aliases. hasOne follows
//! the foreign key on the owning record; hasMany collects the target records
//! pointing back at it. Recursion is data-driven, so the futures are boxed.
//!
//! Paths on a single record resolve sequentially, in request order, so a
//! nested path can rely on its prefix already being grafted. Concurrency
//! happens one level up, across the records of a `find`.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::error;

use crate::adapter::response::{AdapterResponse, Status};
use crate::adapter::ClientAdapter;
use crate::model::{AssociationKind, ModelDef};
use crate::storage::StorageService;

/// Expands every requested path on one record, in place and in order.
pub(crate) fn expand_record<'a, S: StorageService>(
    engine: &'a ClientAdapter<S>,
    connection: &'a S::Connection,
    model: &'a ModelDef,
    record: &'a mut Value,
    paths: &'a [String],
) -> BoxFuture<'a, Result<(), AdapterResponse>> {
    async move {
        for path in paths {
            expand_path(engine, connection, model, record, path).await?;
        }
        Ok(())
    }
    .boxed()
}

fn expand_path<'a, S: StorageService>(
    engine: &'a ClientAdapter<S>,
    connection: &'a S::Connection,
    model: &'a ModelDef,
    record: &'a mut Value,
    path: &'a str,
) -> BoxFuture<'a, Result<(), AdapterResponse>> {
    async move {
        let (alias, rest) = match path.split_once('.') {
            Some((alias, rest)) => (alias, Some(rest)),
            None => (path, None),
        };
        let Some(association) = model.association_by_alias(alias) else {
            return Err(bad_expand(model, alias, "no such association"));
        };
        let Some(target) = engine.model(&association.model_name) else {
            return Err(bad_expand(model, alias, "associated model is not registered"));
        };

        match association.kind {
            AssociationKind::HasOne => {
                let fk = record.get(&association.foreign_key).cloned();
                let found = match fk {
                    Some(fk) if !fk.is_null() => engine
                        .service()
                        .find_one(connection, &target, &fk)
                        .await
                        .map_err(|e| expand_failure(model, alias, e))?
                        .filter(|entity| !target.is_deleted(entity)),
                    // An unset foreign key expands to null without a lookup.
                    _ => None,
                };
                match found {
                    Some(mut entity) => {
                        if let Some(rest) = rest {
                            expand_path(engine, connection, &target, &mut entity, rest).await?;
                        }
                        set_alias(record, alias, entity);
                    }
                    None => set_alias(record, alias, Value::Null),
                }
            }
            AssociationKind::HasMany => {
                let Some(pk) = model.primary_key_of(record).cloned() else {
                    set_alias(record, alias, Value::Array(Vec::new()));
                    return Ok(());
                };
                let mut members = engine
                    .service()
                    .find_by_association(connection, &target, &association.foreign_key, &pk)
                    .await
                    .map_err(|e| expand_failure(model, alias, e))?;
                let options = association.options_for(record);
                if let Some(filter) = options.filter() {
                    members.retain(|member| filter.test(member));
                }
                if let Some(rest) = rest {
                    for member in &mut members {
                        expand_path(engine, connection, &target, member, rest).await?;
                    }
                }
                set_alias(record, alias, Value::Array(members));
            }
        }
        Ok(())
    }
    .boxed()
}

fn set_alias(record: &mut Value, alias: &str, value: Value) {
    if let Some(obj) = record.as_object_mut() {
        obj.insert(alias.to_string(), value);
    }
}

fn bad_expand(model: &ModelDef, alias: &str, reason: &str) -> AdapterResponse {
    error!(model = %model.name, alias, reason, "expand failed");
    AdapterResponse::failure(
        Status::InternalServerError,
        format!("Cannot expand \"{alias}\" on model \"{}\": {reason}", model.name),
    )
}

fn expand_failure(
    model: &ModelDef,
    alias: &str,
    err: crate::error::StorageError,
) -> AdapterResponse {
    error!(model = %model.name, alias, error = %err, "expand failed");
    AdapterResponse::failure(Status::InternalServerError, err.to_string())
}
