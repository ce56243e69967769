// provkit/src/registry.rs
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::access::{self, GrantFn, GrantResult, RegisteredTarget, RevokeFn};
use crate::fields::Field;
use crate::resources::{Resource, ResourceClass, ResourceError, ResourceInstance, ResourceRecord};
use crate::target::{Target, TargetClass};
use crate::tasks::LoaderFn;

/// The final, read-only namespace a runtime dispatches against.
///
/// Built once at startup through [`NamespaceBuilder`] and shared by reference.
pub struct Namespace<P> {
    resources: IndexMap<String, ResourceClass>,
    targets: IndexMap<String, RegisteredTarget<P>>,
    loaders: IndexMap<String, LoaderFn<P>>,
}

impl<P> std::fmt::Debug for Namespace<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("targets", &self.targets.keys().collect::<Vec<_>>())
            .field("loaders", &self.loaders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<P> Namespace<P> {
    pub fn get_resource_classes(&self) -> &IndexMap<String, ResourceClass> {
        &self.resources
    }

    pub fn get_target_classes(&self) -> &IndexMap<String, RegisteredTarget<P>> {
        &self.targets
    }

    pub fn get_resource_loaders(&self) -> &IndexMap<String, LoaderFn<P>> {
        &self.loaders
    }

    /// Target kinds in registration order.
    pub fn target_kinds(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    pub fn resolve_target(&self, kind: &str) -> Result<&RegisteredTarget<P>, LookupError> {
        self.targets
            .get(kind)
            .ok_or_else(|| LookupError::UnknownTargetKind {
                kind: kind.to_string(),
                supported: self.target_kinds(),
            })
    }

    pub fn loader(&self, id: &str) -> Result<&LoaderFn<P>, LookupError> {
        self.loaders
            .get(id)
            .ok_or_else(|| LookupError::UnknownTask { id: id.to_string() })
    }

    pub fn has_loader(&self, id: &str) -> bool {
        self.loaders.contains_key(id)
    }

    pub fn resource_class(&self, name: &str) -> Result<&ResourceClass, LookupError> {
        self.resources
            .get(name)
            .ok_or_else(|| LookupError::UnknownResourceType {
                name: name.to_string(),
            })
    }

    /// Resolves the record's `type` tag and builds an instance from its `data`.
    pub fn parse_resource(&self, record: &ResourceRecord) -> Result<ResourceInstance, ResourceError> {
        self.resource_class(&record.type_name)?
            .instantiate(&record.data)
    }
}

/// Builder that a provider's registration routine feeds.
/// Keys are class names / target kinds / loader ids; uniqueness enforced at build time.
pub struct NamespaceBuilder<P> {
    resources: IndexMap<String, ResourceClass>,
    targets: IndexMap<String, RegisteredTarget<P>>,
    loaders: IndexMap<String, LoaderFn<P>>,
    errors: Vec<NamespaceError>,
}

impl<P> Default for NamespaceBuilder<P> {
    fn default() -> Self {
        Self {
            resources: IndexMap::new(),
            targets: IndexMap::new(),
            loaders: IndexMap::new(),
            errors: Vec::new(),
        }
    }
}

impl<P: 'static> NamespaceBuilder<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_resource_class(&mut self, class: ResourceClass) -> &mut Self {
        let name = class.name().to_string();
        if self.resources.contains_key(&name) {
            self.errors.push(NamespaceError::DuplicateResource(name));
            return self;
        }
        self.resources.insert(name, class);
        self
    }

    pub fn register_resource<R: Resource>(&mut self) -> &mut Self {
        self.register_resource_class(ResourceClass::of::<R>())
    }

    pub fn register_target_class(
        &mut self,
        kind: impl Into<String>,
        class: TargetClass,
        grant: GrantFn<P>,
        revoke: Option<RevokeFn<P>>,
    ) -> &mut Self {
        let kind = kind.into();
        if kind.trim().is_empty() {
            self.errors.push(NamespaceError::EmptyTargetKind {
                class: class.name().to_string(),
            });
            return self;
        }
        if let Some(existing) = self.targets.get(&kind) {
            self.errors.push(NamespaceError::NamingConflict {
                kind,
                existing: existing.class().name().to_string(),
                new: class.name().to_string(),
            });
            return self;
        }
        self.targets
            .insert(kind, RegisteredTarget::new(class, grant, revoke));
        self
    }

    /// Registers `T` under `kind` with a grant function and no revoke.
    pub fn register_target<T, G>(&mut self, kind: impl Into<String>, grant: G) -> &mut Self
    where
        T: Target,
        G: Fn(&P, &str, &T) -> anyhow::Result<Option<GrantResult>> + Send + Sync + 'static,
    {
        self.register_target_class(kind, TargetClass::of::<T>(), access::grant_fn(grant), None)
    }

    pub fn register_target_with_revoke<T, G, R>(
        &mut self,
        kind: impl Into<String>,
        grant: G,
        revoke: R,
    ) -> &mut Self
    where
        T: Target,
        G: Fn(&P, &str, &T) -> anyhow::Result<Option<GrantResult>> + Send + Sync + 'static,
        R: Fn(&P, &str, &T, Option<&serde_json::Map<String, serde_json::Value>>) -> anyhow::Result<Option<serde_json::Value>>
            + Send
            + Sync
            + 'static,
    {
        self.register_target_class(
            kind,
            TargetClass::of::<T>(),
            access::grant_fn(grant),
            Some(access::revoke_fn(revoke)),
        )
    }

    pub fn register_resource_loader<F>(&mut self, id: impl Into<String>, loader: F) -> &mut Self
    where
        F: Fn(&P, &mut crate::tasks::LoadContext<'_, P>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = id.into();
        if id.trim().is_empty() {
            self.errors.push(NamespaceError::EmptyLoaderId);
            return self;
        }
        if self.loaders.contains_key(&id) {
            self.errors.push(NamespaceError::DuplicateLoader(id));
            return self;
        }
        self.loaders.insert(id, Arc::new(loader));
        self
    }

    /// Drops every registration and recorded error.
    pub fn clear(&mut self) {
        self.resources.clear();
        self.targets.clear();
        self.loaders.clear();
        self.errors.clear();
    }

    /// Every relation must point at a registered resource class.
    fn dangling_relations(&self) -> Vec<NamespaceError> {
        fn check<'a>(
            owner: &'a str,
            fields: &'a [Field],
            known: &'a IndexMap<String, ResourceClass>,
        ) -> impl Iterator<Item = NamespaceError> + 'a {
            fields.iter().filter_map(move |f| {
                let related = f.kind.related_to()?;
                (!known.contains_key(related)).then(|| NamespaceError::UnknownRelatedResource {
                    owner: owner.to_string(),
                    field: f.id.clone(),
                    resource: related.to_string(),
                })
            })
        }

        let from_resources = self
            .resources
            .values()
            .flat_map(|c| check(c.name(), c.fields(), &self.resources));
        let from_targets = self
            .targets
            .iter()
            .flat_map(|(kind, t)| check(kind, t.class().fields(), &self.resources));

        from_resources.chain(from_targets).collect()
    }

    /// Finalize; verify uniqueness and that every relation resolves.
    pub fn build(mut self) -> Result<Namespace<P>, NamespaceError> {
        let dangling = self.dangling_relations();
        self.errors.extend(dangling);

        if !self.errors.is_empty() {
            return Err(NamespaceError::InvalidConfiguration {
                errors: self.errors,
            });
        }

        tracing::info!(
            resources = ?self.resources.keys().collect::<Vec<_>>(),
            targets = ?self.targets.keys().collect::<Vec<_>>(),
            loaders = ?self.loaders.keys().collect::<Vec<_>>(),
            "Provider namespace registered"
        );

        Ok(Namespace {
            resources: self.resources,
            targets: self.targets,
            loaders: self.loaders,
        })
    }
}

/// Structured errors for namespace registration.
#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("resource class '{0}' is already registered")]
    DuplicateResource(String),
    #[error("target class '{class}' must be registered under a non-empty kind")]
    EmptyTargetKind { class: String },
    #[error("naming conflict: target kind '{kind}' is already registered by '{existing}', cannot register '{new}'")]
    NamingConflict {
        kind: String,
        existing: String,
        new: String,
    },
    #[error("resource loader id must be non-empty")]
    EmptyLoaderId,
    #[error("resource loader '{0}' is already registered")]
    DuplicateLoader(String),
    #[error("'{owner}.{field}' relates to unknown resource class '{resource}'")]
    UnknownRelatedResource {
        owner: String,
        field: String,
        resource: String,
    },
    #[error("invalid namespace configuration:\n{}", errors.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    InvalidConfiguration { errors: Vec<NamespaceError> },
}

/// A name did not resolve in the namespace. Fatal for the invocation.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("unhandled target kind {kind}, supported kinds are [{}]", supported.join(","))]
    UnknownTargetKind {
        kind: String,
        supported: Vec<String>,
    },
    #[error("unknown task '{id}'")]
    UnknownTask { id: String },
    #[error("unknown resource type '{name}'")]
    UnknownResourceType { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    /* --------------------------- Test helpers ------------------------- */
    struct DummyProvider;

    #[derive(Deserialize)]
    struct GroupTarget {
        #[allow(dead_code)]
        group: String,
    }

    impl Target for GroupTarget {
        const NAME: &'static str = "GroupTarget";
        fn fields() -> Vec<Field> {
            vec![Field::related("group", "Group")]
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Group {
        id: String,
    }

    impl Resource for Group {
        const NAME: &'static str = "Group";
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn noop_grant(_: &DummyProvider, _: &str, _: &GroupTarget) -> anyhow::Result<Option<GrantResult>> {
        Ok(None)
    }

    fn invalid_errors(err: NamespaceError) -> Vec<NamespaceError> {
        match err {
            NamespaceError::InvalidConfiguration { errors } => errors,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /* ------------------------------- Tests ---------------------------- */

    #[test]
    fn registered_kind_resolves_to_its_triple() {
        let mut b = NamespaceBuilder::<DummyProvider>::new();
        b.register_resource::<Group>()
            .register_target::<GroupTarget, _>("Default", noop_grant)
            .register_target_with_revoke::<GroupTarget, _, _>("Revocable", noop_grant, |_, _, _, _| {
                Ok(None)
            });
        let ns = b.build().unwrap();

        let t = ns.resolve_target("Default").unwrap();
        assert_eq!(t.class().name(), "GroupTarget");
        assert!(t.revoke_fn().is_none());

        let t = ns.resolve_target("Revocable").unwrap();
        assert!(t.revoke_fn().is_some());

        assert_eq!(ns.target_kinds(), vec!["Default", "Revocable"]);
    }

    #[test]
    fn unknown_kind_lists_supported_kinds() {
        let mut b = NamespaceBuilder::<DummyProvider>::new();
        b.register_resource::<Group>()
            .register_target::<GroupTarget, _>("Default", noop_grant);
        let ns = b.build().unwrap();

        let err = ns.resolve_target("Nonexistent").unwrap_err();
        match &err {
            LookupError::UnknownTargetKind { kind, supported } => {
                assert_eq!(kind, "Nonexistent");
                assert_eq!(supported, &vec!["Default".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "unhandled target kind Nonexistent, supported kinds are [Default]"
        );
    }

    #[test]
    fn duplicate_kind_is_a_naming_conflict() {
        let mut b = NamespaceBuilder::<DummyProvider>::new();
        b.register_resource::<Group>()
            .register_target::<GroupTarget, _>("Default", noop_grant)
            .register_target::<GroupTarget, _>("Default", noop_grant);

        let errors = invalid_errors(b.build().unwrap_err());
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], NamespaceError::NamingConflict { kind, .. } if kind == "Default"));
    }

    #[test]
    fn empty_kind_is_rejected() {
        let mut b = NamespaceBuilder::<DummyProvider>::new();
        b.register_resource::<Group>()
            .register_target::<GroupTarget, _>("  ", noop_grant);

        let errors = invalid_errors(b.build().unwrap_err());
        assert!(matches!(&errors[0], NamespaceError::EmptyTargetKind { .. }));
    }

    #[test]
    fn duplicates_are_all_reported() {
        let mut b = NamespaceBuilder::<DummyProvider>::new();
        b.register_resource::<Group>()
            .register_resource::<Group>()
            .register_resource_loader("fetch", |_, _| Ok(()))
            .register_resource_loader("fetch", |_, _| Ok(()));

        let err = b.build().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("resource class 'Group' is already registered"), "{msg}");
        assert!(msg.contains("resource loader 'fetch' is already registered"), "{msg}");
    }

    #[test]
    fn dangling_relation_fails_build() {
        let mut b = NamespaceBuilder::<DummyProvider>::new();
        b.register_target::<GroupTarget, _>("Default", noop_grant);

        let errors = invalid_errors(b.build().unwrap_err());
        match &errors[0] {
            NamespaceError::UnknownRelatedResource {
                owner,
                field,
                resource,
            } => {
                assert_eq!(owner, "Default");
                assert_eq!(field, "group");
                assert_eq!(resource, "Group");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn clear_forgets_registrations_and_errors() {
        let mut b = NamespaceBuilder::<DummyProvider>::new();
        b.register_resource::<Group>().register_resource::<Group>();
        b.clear();

        let ns = b.build().unwrap();
        assert!(ns.get_resource_classes().is_empty());
        assert!(ns.get_target_classes().is_empty());
        assert!(ns.get_resource_loaders().is_empty());
    }

    #[test]
    fn parse_resource_by_type_tag() {
        let mut b = NamespaceBuilder::<DummyProvider>::new();
        b.register_resource::<Group>();
        let ns = b.build().unwrap();

        let record = Group { id: "g1".into() }.export().unwrap();
        let instance = ns.parse_resource(&record).unwrap();
        assert_eq!(instance.type_name, "Group");
        assert_eq!(instance.id, "g1");

        let mut unknown = record.clone();
        unknown.type_name = "Bucket".into();
        let err = ns.parse_resource(&unknown).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Lookup(LookupError::UnknownResourceType { .. })
        ));
    }

    #[test]
    fn unknown_loader_is_a_lookup_error() {
        let ns = NamespaceBuilder::<DummyProvider>::new().build().unwrap();
        let err = ns.loader("fetch_groups").err().unwrap();
        assert_eq!(err.to_string(), "unknown task 'fetch_groups'");
    }
}
