//! # ProvKit - Access Provider Framework
//!
//! Building blocks for access providers: plugins that enumerate resources in an
//! external system and grant or revoke a subject's access to a target there.
//!
//! ## Features
//!
//! - **Explicit registration**: a provider declares its resources, targets and
//!   loaders in [`Provider::register`]; nothing is discovered implicitly
//! - **Schema export**: the registered namespace is exported as one JSON document
//! - **Loader engine**: loaders emit resources and follow-up tasks per Load event
//! - **Event dispatch**: Describe, Load, Grant and Revoke through [`ProviderRuntime`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use provkit::{Field, GrantResult, NamespaceBuilder, Provider, Resource, Target};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Group { id: String, name: String }
//!
//! impl Resource for Group {
//!     const NAME: &'static str = "Group";
//!     fn id(&self) -> &str { &self.id }
//!     fn fields() -> Vec<Field> { vec![Field::string("name")] }
//! }
//!
//! #[derive(Deserialize)]
//! struct GroupAccess { group: String }
//!
//! impl Target for GroupAccess {
//!     const NAME: &'static str = "GroupAccess";
//!     fn fields() -> Vec<Field> { vec![Field::related_to::<Group>("group")] }
//! }
//!
//! impl Provider for Directory {
//!     fn register(ns: &mut NamespaceBuilder<Self>) {
//!         ns.register_resource::<Group>()
//!             .register_target::<GroupAccess, _>("Default", |p: &Directory, subject: &str, t: &GroupAccess| {
//!                 p.client.add_member(&t.group, subject)?;
//!                 Ok(None)
//!             })
//!             .register_resource_loader("fetch_groups", |p: &Directory, ctx| {
//!                 for g in p.client.groups()? {
//!                     ctx.register(&g)?;
//!                 }
//!                 Ok(())
//!             });
//!     }
//! }
//!
//! let runtime = ProviderRuntime::new(Directory::default(), &NoopLoader)?;
//! let out = runtime.handle(serde_json::json!({"type": "describe"}))?;
//! ```

pub mod access;
pub mod diagnostics;
pub mod fields;
pub mod provider;
pub mod registry;
pub mod resources;
pub mod runtime;
pub mod schema;
pub mod target;
pub mod tasks;

pub use access::{AccessError, GrantFn, GrantResult, RegisteredTarget, RevokeFn};
pub use diagnostics::{Diagnostics, Log, LogLevel};
pub use fields::{Field, FieldKind, RESERVED_PREFIX};
pub use provider::{
    ConfigField, ConfigLoader, ConfigSchema, MapLoader, NoopLoader, Provider, ProviderConfig,
    ProviderInfo, REDACTED,
};
pub use registry::{LookupError, Namespace, NamespaceBuilder, NamespaceError};
pub use resources::{
    composite_id, Resource, ResourceClass, ResourceError, ResourceInstance, ResourceRecord,
    ResourceStore,
};
pub use runtime::{Event, ProviderRuntime, Response, RuntimeError};
pub use schema::{export_resource_schema, export_schema, export_target_schema};
pub use target::{ParseError, Target, TargetArguments, TargetClass, TargetInstance};
pub use tasks::{LoadContext, LoadState, Task, TaskEngine, TaskError};
