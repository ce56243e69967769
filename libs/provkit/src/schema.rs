//! Schema export: the provider's public contract as one JSON document.

use serde_json::{json, Map, Value};

use crate::provider::ConfigSchema;
use crate::registry::Namespace;
use crate::target;

/// `{"resourceLoaders": {id: {title}}, "resources": {name: schema}}`
pub fn export_resource_schema<P>(ns: &Namespace<P>) -> Value {
    Value::Object(resource_sections(ns))
}

fn resource_sections<P>(ns: &Namespace<P>) -> Map<String, Value> {
    let loaders: Map<String, Value> = ns
        .get_resource_loaders()
        .keys()
        .map(|id| (id.clone(), json!({ "title": id })))
        .collect();

    let resources: Map<String, Value> = ns
        .get_resource_classes()
        .iter()
        .map(|(name, class)| (name.clone(), class.schema()))
        .collect();

    let mut doc = Map::new();
    doc.insert("resourceLoaders".into(), Value::Object(loaders));
    doc.insert("resources".into(), Value::Object(resources));
    doc
}

/// Every registered target kind merged into one map.
pub fn export_target_schema<P>(ns: &Namespace<P>) -> Value {
    let mut targets = Map::new();
    for (kind, registered) in ns.get_target_classes() {
        if let Value::Object(entry) =
            target::export_schema(kind, registered.class(), ns.get_resource_classes())
        {
            targets.extend(entry);
        }
    }
    Value::Object(targets)
}

/// Full provider schema with stable top-level keys.
pub fn export_schema<P>(ns: &Namespace<P>, config: &ConfigSchema) -> Value {
    let mut doc = resource_sections(ns);
    doc.insert("targets".into(), export_target_schema(ns));
    doc.insert("config".into(), config.export());
    Value::Object(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::GrantResult;
    use crate::fields::Field;
    use crate::provider::ConfigField;
    use crate::registry::NamespaceBuilder;
    use crate::resources::Resource;
    use crate::target::Target;
    use serde::{Deserialize, Serialize};

    struct P;

    #[derive(Serialize, Deserialize)]
    struct Account {
        id: String,
        #[serde(rename = "_sync_token")]
        sync_token: String,
    }

    impl Resource for Account {
        const NAME: &'static str = "Account";
        fn id(&self) -> &str {
            &self.id
        }
        fn fields() -> Vec<Field> {
            vec![Field::string("_sync_token")]
        }
    }

    #[derive(Deserialize)]
    struct AccountAccess {}

    impl Target for AccountAccess {
        const NAME: &'static str = "AccountAccess";
        fn fields() -> Vec<Field> {
            vec![
                Field::related_to::<Account>("account"),
                Field::string("_internal"),
                Field::string("role").title("Role"),
            ]
        }
    }

    fn grant(_: &P, _: &str, _: &AccountAccess) -> anyhow::Result<Option<GrantResult>> {
        Ok(None)
    }

    fn ns() -> Namespace<P> {
        let mut b = NamespaceBuilder::<P>::new();
        b.register_resource::<Account>()
            .register_resource_loader("fetch_accounts", |_, _| Ok(()))
            .register_resource_loader("fetch_roles", |_, _| Ok(()))
            .register_target::<AccountAccess, _>("Account", grant);
        b.build().unwrap()
    }

    #[test]
    fn resource_section_lists_loaders_and_classes() {
        assert_eq!(
            export_resource_schema(&ns()),
            json!({
                "resourceLoaders": {
                    "fetch_accounts": {"title": "fetch_accounts"},
                    "fetch_roles": {"title": "fetch_roles"},
                },
                "resources": {
                    "Account": {
                        "title": "Account",
                        "type": "object",
                        "properties": {"id": {"title": "Id", "type": "string"}},
                        "required": ["id"],
                    }
                }
            })
        );
    }

    #[test]
    fn full_schema_has_stable_keys_and_skips_internal_fields() {
        let config = ConfigSchema::new(vec![ConfigField::new("api_token").secret()]);
        let doc = export_schema(&ns(), &config);

        let keys: Vec<_> = doc.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["resourceLoaders", "resources", "targets", "config"]);

        let fields: Vec<_> = doc["targets"]["Account"]["schema"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(fields, vec!["account", "role"]);
        assert_eq!(doc["targets"]["Account"]["schema"]["account"]["resourceName"], "Account");
        assert_eq!(
            doc["targets"]["Account"]["schema"]["account"]["resource"]["title"],
            "Account"
        );
        assert_eq!(doc["config"]["api_token"]["secret"], true);
    }

    #[test]
    fn export_is_deterministic() {
        let config = ConfigSchema::default();
        let a = serde_json::to_string(&export_schema(&ns(), &config)).unwrap();
        let b = serde_json::to_string(&export_schema(&ns(), &config)).unwrap();
        assert_eq!(a, b);
    }
}
