//! Field descriptors attached to resource and target classes.
//!
//! Every class carries an explicit, ordered list of [`Field`]s. Schema export
//! and argument parsing walk this list directly; nothing is reflected.

/// Names starting with this prefix are internal and never exported.
pub const RESERVED_PREFIX: &str = "_";

/// Semantic type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// Refers to a resource class by name. The wire value is the related resource id.
    Related(String),
}

impl FieldKind {
    /// JSON type used for the field in exported schemas.
    pub fn json_type(&self) -> &'static str {
        "string"
    }

    pub fn related_to(&self) -> Option<&str> {
        match self {
            FieldKind::String => None,
            FieldKind::Related(name) => Some(name.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub id: String,
    pub kind: FieldKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub required: bool,
}

impl Field {
    /// A required string field.
    pub fn string(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: FieldKind::String,
            title: None,
            description: None,
            required: true,
        }
    }

    /// A required field holding the id of a resource of class `resource`.
    pub fn related(id: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Related(resource.into()),
            ..Self::string(id)
        }
    }

    /// Same as [`Field::related`], naming the class through its type.
    pub fn related_to<R: crate::resources::Resource>(id: impl Into<String>) -> Self {
        Self::related(id, R::NAME)
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn is_internal(&self) -> bool {
        self.id.starts_with(RESERVED_PREFIX)
    }

    /// Explicit title, or the id title-cased (`group_id` -> `Group Id`).
    pub fn display_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| title_case(&self.id))
    }
}

pub(crate) fn title_case(id: &str) -> String {
    id.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
