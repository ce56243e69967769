//! Target model: the typed arguments of an access request.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::fields::Field;
use crate::resources::ResourceClass;

/// Untyped arguments as they arrive on the wire.
pub type TargetArguments = IndexMap<String, String>;

/// Typed view of a target kind.
///
/// Values are deserialized from the parsed arguments, so every field is a
/// `String` (or `Option<String>` for optional fields).
pub trait Target: DeserializeOwned + 'static {
    const NAME: &'static str;

    fn fields() -> Vec<Field>;
}

/// Named schema of one kind of access grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetClass {
    name: String,
    fields: Vec<Field>,
}

impl TargetClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn of<T: Target>() -> Self {
        T::fields()
            .into_iter()
            .fold(Self::new(T::NAME), TargetClass::with_field)
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn public_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_internal())
    }
}

/// Arguments validated against a [`TargetClass`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInstance {
    kind: String,
    values: IndexMap<String, String>,
}

impl TargetInstance {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn values(&self) -> &IndexMap<String, String> {
        &self.values
    }

    pub fn decode<T: Target>(&self) -> Result<T, ParseError> {
        let object: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        serde_json::from_value(Value::Object(object)).map_err(|source| ParseError::Invalid {
            kind: self.kind.clone(),
            source,
        })
    }
}

/// Pulls every public field out of `raw`.
///
/// All missing required fields are reported together. Undeclared keys and
/// `_`-prefixed internal fields are ignored, so the accepted keys are exactly
/// the ones [`export_schema`] advertises.
pub fn parse(
    kind: &str,
    class: &TargetClass,
    raw: &TargetArguments,
) -> Result<TargetInstance, ParseError> {
    let mut values = IndexMap::new();
    let mut missing = Vec::new();

    for field in class.public_fields() {
        match raw.get(&field.id) {
            Some(v) => {
                values.insert(field.id.clone(), v.clone());
            }
            None if field.required => missing.push(field.id.clone()),
            None => {}
        }
    }

    if !missing.is_empty() {
        return Err(ParseError::MissingFields {
            kind: kind.to_string(),
            fields: missing,
        });
    }

    Ok(TargetInstance {
        kind: kind.to_string(),
        values,
    })
}

/// `{<kind>: {"schema": {<field>: {id, title, type, resourceName, resource?}}}}`
///
/// `resources` resolves relation fields to their nested class schema; a relation
/// to a class that is not in `resources` is exported without the nested schema.
pub fn export_schema(
    kind: &str,
    class: &TargetClass,
    resources: &IndexMap<String, ResourceClass>,
) -> Value {
    let mut schema = Map::new();

    for field in class.public_fields() {
        let related = field.kind.related_to();

        let mut entry = Map::new();
        entry.insert("id".into(), Value::String(field.id.clone()));
        entry.insert("title".into(), Value::String(field.display_title()));
        if let Some(description) = &field.description {
            entry.insert("description".into(), Value::String(description.clone()));
        }
        entry.insert("type".into(), Value::String(field.kind.json_type().into()));
        entry.insert(
            "resourceName".into(),
            related.map_or(Value::Null, |r| Value::String(r.to_string())),
        );
        if let Some(resource) = related.and_then(|r| resources.get(r)) {
            entry.insert("resource".into(), resource.schema());
        }

        schema.insert(field.id.clone(), Value::Object(entry));
    }

    let mut out = Map::new();
    out.insert(kind.to_string(), json!({ "schema": schema }));
    Value::Object(out)
}

/// Target argument validation failure. Raised before any grant/revoke side effect.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("target '{kind}' is missing required arguments: {}", fields.join(", "))]
    MissingFields { kind: String, fields: Vec<String> },
    #[error("invalid arguments for target '{kind}'")]
    Invalid {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ParseError {
    /// Field names reported by a missing-field failure.
    pub fn missing_fields(&self) -> &[String] {
        match self {
            ParseError::MissingFields { fields, .. } => fields,
            ParseError::Invalid { .. } => &[],
        }
    }
}
