//! Resource model: typed records a provider can enumerate through its loaders.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::fields::{Field, RESERVED_PREFIX};
use crate::registry::LookupError;

/// A record type the provider can load, e.g. a group or an account.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Group {
///     id: String,
///     name: String,
/// }
///
/// impl Resource for Group {
///     const NAME: &'static str = "Group";
///     fn id(&self) -> &str { &self.id }
///     fn fields() -> Vec<Field> { vec![Field::string("name")] }
/// }
/// ```
pub trait Resource: Serialize + DeserializeOwned {
    /// Class name; used as the `type` tag on the wire.
    const NAME: &'static str;

    fn id(&self) -> &str;

    /// Declared fields besides `id`, in schema order.
    fn fields() -> Vec<Field> {
        Vec::new()
    }

    fn export(&self) -> Result<ResourceRecord, ResourceError> {
        ResourceRecord::from_resource(self)
    }
}

/// Joins id parts into a single resource id (`a/b/c`).
pub fn composite_id<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join("/")
}

/// Named schema for a resource type. The first field is always `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceClass {
    name: String,
    fields: Vec<Field>,
}

impl ResourceClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![Field::string("id")],
        }
    }

    pub fn of<R: Resource>() -> Self {
        R::fields()
            .into_iter()
            .fold(Self::new(R::NAME), ResourceClass::with_field)
    }

    /// Adds a field. A field named `id` replaces the implicit one.
    pub fn with_field(mut self, field: Field) -> Self {
        match self.fields.iter_mut().find(|f| f.id == field.id) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Exported fields, in declaration order.
    pub fn public_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_internal())
    }

    /// JSON-schema style description of the class.
    pub fn schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in self.public_fields() {
            let mut prop = Map::new();
            prop.insert("title".into(), Value::String(field.display_title()));
            prop.insert("type".into(), Value::String(field.kind.json_type().into()));
            if let Some(description) = &field.description {
                prop.insert("description".into(), Value::String(description.clone()));
            }
            if let Some(related) = field.kind.related_to() {
                prop.insert("relatedTo".into(), Value::String(related.to_string()));
            }
            properties.insert(field.id.clone(), Value::Object(prop));

            if field.required {
                required.push(Value::String(field.id.clone()));
            }
        }

        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Builds an untyped instance from exported `data`, keeping declared fields only.
    pub fn instantiate(&self, data: &Map<String, Value>) -> Result<ResourceInstance, ResourceError> {
        let id = match data.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => {
                return Err(ResourceError::EmptyId {
                    type_name: self.name.clone(),
                })
            }
        };

        let mut missing = Vec::new();
        let mut fields = Map::new();
        for field in self.public_fields() {
            match data.get(&field.id) {
                Some(v) if !v.is_null() => {
                    fields.insert(field.id.clone(), v.clone());
                }
                _ if field.required => missing.push(field.id.clone()),
                _ => {}
            }
        }

        if !missing.is_empty() {
            return Err(ResourceError::MissingFields {
                type_name: self.name.clone(),
                fields: missing,
            });
        }

        Ok(ResourceInstance {
            type_name: self.name.clone(),
            id,
            data: fields,
        })
    }
}

/// Wire envelope of an exported resource: `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    pub data: Map<String, Value>,
}

impl ResourceRecord {
    pub fn from_resource<R: Resource>(resource: &R) -> Result<Self, ResourceError> {
        if resource.id().is_empty() {
            return Err(ResourceError::EmptyId {
                type_name: R::NAME.to_string(),
            });
        }

        let value = serde_json::to_value(resource).map_err(|source| ResourceError::Serde {
            type_name: R::NAME.to_string(),
            source,
        })?;
        let Value::Object(map) = value else {
            return Err(ResourceError::NotAnObject {
                type_name: R::NAME.to_string(),
            });
        };

        let data = map
            .into_iter()
            .filter(|(k, _)| !k.starts_with(RESERVED_PREFIX))
            .collect();

        Ok(Self {
            type_name: R::NAME.to_string(),
            data,
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.data.get("id").and_then(Value::as_str)
    }

    /// Converts back into `R`; fails if the record is tagged with another class.
    pub fn decode<R: Resource>(&self) -> Result<R, ResourceError> {
        if self.type_name != R::NAME {
            return Err(ResourceError::TypeMismatch {
                expected: R::NAME.to_string(),
                found: self.type_name.clone(),
            });
        }
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|source| {
            ResourceError::Serde {
                type_name: self.type_name.clone(),
                source,
            }
        })
    }
}

/// Untyped instance resolved through the namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInstance {
    pub type_name: String,
    pub id: String,
    pub data: Map<String, Value>,
}

/// In-memory storage over exported records, used as fixtures by provider tests.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
    records: Vec<ResourceRecord>,
}

impl ResourceStore {
    pub fn new(records: Vec<ResourceRecord>) -> Self {
        Self { records }
    }

    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_value(value)?))
    }

    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    /// All stored instances of class `R`, in storage order.
    pub fn all<R: Resource>(&self) -> Result<Vec<R>, ResourceError> {
        self.records
            .iter()
            .filter(|r| r.type_name == R::NAME)
            .map(ResourceRecord::decode)
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource of type '{type_name}' has an empty id")]
    EmptyId { type_name: String },
    #[error("duplicate resource '{type_name}' with id '{id}'")]
    Duplicate { type_name: String, id: String },
    #[error("resource of type '{type_name}' must serialize to a JSON object")]
    NotAnObject { type_name: String },
    #[error("expected resource type '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },
    #[error("resource '{type_name}' is missing required fields: {}", fields.join(", "))]
    MissingFields {
        type_name: String,
        fields: Vec<String>,
    },
    #[error("failed to convert resource '{type_name}'")]
    Serde {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Lookup(#[from] LookupError),
}
