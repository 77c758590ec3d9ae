//! Model descriptors consumed by the adapter engine.
//!
//! A [`ModelDef`] describes one entity type: its typed fields, its
//! associations, which field is the primary key, and which fields carry the
//! last-modified timestamp and the soft-delete flag. Descriptors are produced
//! by an external declaration layer and validated here at registration time;
//! a descriptor that fails validation is never registered.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ModelError;
use crate::query::options::QueryOptions;

/// Canonical text form of a primary-key value, used wherever keys index a
/// map.
pub(crate) fn pk_text(pk: &Value) -> String {
    match pk {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Produces a default value for a field left undefined at creation.
pub type DefaultValueFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Custom per-field validator.
pub type ValidateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Record transformation hook (`transform_result`, `pre_save`, ...). Invoked
/// by the entity layer, never by the adapter engine itself.
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Produces per-expansion query options for an association, given the owning
/// record.
pub type AssociationOptionsFn = Arc<dyn Fn(&Value) -> QueryOptions + Send + Sync>;

// ============================================================================
// Fields
// ============================================================================

/// The four storable field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
}

/// A single typed field on a model.
#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub primary_key: bool,
    pub unique: bool,
    pub not_null: bool,
    pub indexed: bool,
    pub default_value: Option<DefaultValueFn>,
    pub validate: Option<ValidateFn>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            primary_key: false,
            unique: false,
            not_null: false,
            indexed: false,
            default_value: None,
            validate: None,
        }
    }

    /// A primary-key field. The key value is assigned by the adapter's
    /// generator, so the field is never not-null and never carries a default
    /// producer.
    pub fn primary_key(name: impl Into<String>, field_type: FieldType) -> Self {
        let mut field = Self::new(name, field_type);
        field.primary_key = true;
        field
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn default_value(mut self, f: DefaultValueFn) -> Self {
        self.default_value = Some(f);
        self
    }

    pub fn validator(mut self, f: ValidateFn) -> Self {
        self.validate = Some(f);
        self
    }

    fn has_valid_name(&self) -> bool {
        !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("primary_key", &self.primary_key)
            .field("unique", &self.unique)
            .field("not_null", &self.not_null)
            .field("indexed", &self.indexed)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Associations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    HasOne,
    HasMany,
}

/// A relation to another model, exposed under `alias` when expanded.
#[derive(Clone)]
pub struct AssociationDef {
    pub kind: AssociationKind,
    /// Name of the target model.
    pub model_name: String,
    /// Property name the expanded value is assigned to.
    pub alias: String,
    /// Foreign-key field. For hasOne this lives on the owning model; for
    /// hasMany it lives on the target model.
    pub foreign_key: String,
    /// Optional per-expansion query options (e.g. an extra filter applied to
    /// hasMany results).
    pub get_options: Option<AssociationOptionsFn>,
}

impl AssociationDef {
    pub fn has_one(
        model_name: impl Into<String>,
        alias: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: AssociationKind::HasOne,
            model_name: model_name.into(),
            alias: alias.into(),
            foreign_key: foreign_key.into(),
            get_options: None,
        }
    }

    pub fn has_many(
        model_name: impl Into<String>,
        alias: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: AssociationKind::HasMany,
            model_name: model_name.into(),
            alias: alias.into(),
            foreign_key: foreign_key.into(),
            get_options: None,
        }
    }

    pub fn with_options(mut self, f: AssociationOptionsFn) -> Self {
        self.get_options = Some(f);
        self
    }

    /// The expansion options for one owning record. Defaults to empty
    /// options when no hook is set.
    pub fn options_for(&self, instance: &Value) -> QueryOptions {
        match &self.get_options {
            Some(f) => f(instance),
            None => QueryOptions::new(),
        }
    }
}

impl fmt::Debug for AssociationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationDef")
            .field("kind", &self.kind)
            .field("model_name", &self.model_name)
            .field("alias", &self.alias)
            .field("foreign_key", &self.foreign_key)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ModelDef
// ============================================================================

/// A validated model descriptor.
///
/// Build one with [`ModelDef::builder`]; `build()` runs the registration-time
/// checks (exactly one primary key, tracking-field types) and synthesizes the
/// last-modified / deleted / foreign-key fields that were named but not
/// declared.
#[derive(Clone)]
pub struct ModelDef {
    pub name: String,
    /// Backend table / object-store / endpoint name. Defaults to the model
    /// name.
    pub source_name: String,
    pub fields: Vec<FieldDef>,
    pub associations: Vec<AssociationDef>,
    pub primary_key_field: String,
    pub last_modified_field: Option<String>,
    pub deleted_field: Option<String>,
    pub transform_result: Option<TransformFn>,
    pub pre_save: Option<TransformFn>,
    pub pre_create: Option<TransformFn>,
    pub pre_update: Option<TransformFn>,
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("source_name", &self.source_name)
            .field("fields", &self.fields)
            .field("associations", &self.associations)
            .field("primary_key_field", &self.primary_key_field)
            .field("last_modified_field", &self.last_modified_field)
            .field("deleted_field", &self.deleted_field)
            .finish_non_exhaustive()
    }
}

impl ModelDef {
    pub fn builder(name: impl Into<String>) -> ModelDefBuilder {
        ModelDefBuilder::new(name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn association_by_alias(&self, alias: &str) -> Option<&AssociationDef> {
        self.associations.iter().find(|a| a.alias == alias)
    }

    /// The record's primary key value, if present and non-null.
    pub fn primary_key_of<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        match record.get(&self.primary_key_field) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    /// True when the record carries a truthy soft-delete flag.
    pub fn is_deleted(&self, record: &Value) -> bool {
        match &self.deleted_field {
            Some(field) => record
                .get(field)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Retains only declared model fields, dropping expanded associations and
    /// any stray properties before a record goes to the backend.
    pub fn strip_to_model_fields(&self, record: &Value) -> Value {
        let mut out = Map::new();
        if let Some(obj) = record.as_object() {
            for field in &self.fields {
                if let Some(v) = obj.get(&field.name) {
                    out.insert(field.name.clone(), v.clone());
                }
            }
        }
        Value::Object(out)
    }

    /// Applies field default-value producers to any undefined field.
    pub fn apply_default_values(&self, record: &mut Value) {
        let Some(obj) = record.as_object_mut() else {
            return;
        };
        for field in &self.fields {
            if let Some(default) = &field.default_value {
                if !obj.contains_key(&field.name) {
                    obj.insert(field.name.clone(), default());
                }
            }
        }
    }
}

// ============================================================================
// Builder + validation
// ============================================================================

pub struct ModelDefBuilder {
    name: String,
    source_name: Option<String>,
    fields: Vec<FieldDef>,
    associations: Vec<AssociationDef>,
    last_modified_field: Option<String>,
    deleted_field: Option<String>,
    transform_result: Option<TransformFn>,
    pre_save: Option<TransformFn>,
    pre_create: Option<TransformFn>,
    pre_update: Option<TransformFn>,
}

impl ModelDefBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_name: None,
            fields: Vec::new(),
            associations: Vec::new(),
            last_modified_field: None,
            deleted_field: None,
            transform_result: None,
            pre_save: None,
            pre_create: None,
            pre_update: None,
        }
    }

    pub fn source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn association(mut self, association: AssociationDef) -> Self {
        self.associations.push(association);
        self
    }

    pub fn last_modified_field(mut self, name: impl Into<String>) -> Self {
        self.last_modified_field = Some(name.into());
        self
    }

    pub fn deleted_field(mut self, name: impl Into<String>) -> Self {
        self.deleted_field = Some(name.into());
        self
    }

    pub fn transform_result(mut self, f: TransformFn) -> Self {
        self.transform_result = Some(f);
        self
    }

    pub fn pre_save(mut self, f: TransformFn) -> Self {
        self.pre_save = Some(f);
        self
    }

    pub fn pre_create(mut self, f: TransformFn) -> Self {
        self.pre_create = Some(f);
        self
    }

    pub fn pre_update(mut self, f: TransformFn) -> Self {
        self.pre_update = Some(f);
        self
    }

    pub fn build(self) -> Result<ModelDef, ModelError> {
        let name = self.name;
        let mut fields = self.fields;

        for field in &fields {
            if !field.has_valid_name() {
                return Err(ModelError::InvalidFieldName {
                    model: name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        // Exactly one primary key, with generator-assigned semantics.
        let mut primary_key_field = None;
        for field in &mut fields {
            if !field.primary_key {
                continue;
            }
            if primary_key_field.is_some() {
                return Err(ModelError::MultiplePrimaryKeys { model: name });
            }
            primary_key_field = Some(field.name.clone());
            if field.default_value.take().is_some() {
                tracing::warn!(model = %name, field = %field.name,
                    "default value producers are ignored for the primary key");
            }
            if field.validate.take().is_some() {
                tracing::warn!(model = %name, field = %field.name,
                    "validators are ignored for the primary key");
            }
            field.not_null = false;
            field.unique = false;
        }
        let primary_key_field =
            primary_key_field.ok_or(ModelError::MissingPrimaryKey { model: name.clone() })?;

        // Tracking fields: declared-by-name fields must carry the right type;
        // named-but-undeclared fields are synthesized with sensible defaults.
        if let Some(lm) = &self.last_modified_field {
            match fields.iter().find(|f| &f.name == lm) {
                Some(f) if f.field_type != FieldType::Date => {
                    return Err(ModelError::LastModifiedNotDate {
                        model: name,
                        field: lm.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    fields.push(
                        FieldDef::new(lm.clone(), FieldType::Date)
                            .indexed()
                            .default_value(Arc::new(|| Value::String(crate::now_iso()))),
                    );
                }
            }
        }
        if let Some(del) = &self.deleted_field {
            match fields.iter().find(|f| &f.name == del) {
                Some(f) if f.field_type != FieldType::Boolean => {
                    return Err(ModelError::DeletedNotBoolean {
                        model: name,
                        field: del.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    fields.push(
                        FieldDef::new(del.clone(), FieldType::Boolean)
                            .indexed()
                            .default_value(Arc::new(|| Value::Bool(false))),
                    );
                }
            }
        }

        // hasOne associations imply a foreign-key field on the owning model,
        // typed like the primary key and indexed for lookup.
        let pk_type = fields
            .iter()
            .find(|f| f.name == primary_key_field)
            .map(|f| f.field_type)
            .unwrap_or(FieldType::String);
        for association in &self.associations {
            if association.model_name.is_empty()
                || association.alias.is_empty()
                || association.foreign_key.is_empty()
            {
                return Err(ModelError::InvalidAssociation {
                    model: name,
                    alias: association.alias.clone(),
                    reason: "model name, alias, and foreign key are all required".to_string(),
                });
            }
            if association.kind == AssociationKind::HasOne {
                match fields.iter_mut().find(|f| f.name == association.foreign_key) {
                    Some(f) => f.indexed = true,
                    None => fields.push(FieldDef::new(&association.foreign_key, pk_type).indexed()),
                }
            }
        }

        Ok(ModelDef {
            source_name: self.source_name.unwrap_or_else(|| name.clone()),
            name,
            fields,
            associations: self.associations,
            primary_key_field,
            last_modified_field: self.last_modified_field,
            deleted_field: self.deleted_field,
            transform_result: self.transform_result,
            pre_save: self.pre_save,
            pre_create: self.pre_create,
            pre_update: self.pre_update,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
