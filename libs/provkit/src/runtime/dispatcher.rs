//! Routes decoded host events to the provider and its namespace.

use serde_json::Value;
use thiserror::Error;
use tracing::info_span;
use uuid::Uuid;

use crate::access::AccessError;
use crate::diagnostics::Diagnostics;
use crate::provider::{ConfigLoader, Provider, ProviderConfig, ProviderInfo};
use crate::registry::{LookupError, Namespace, NamespaceBuilder, NamespaceError};
use crate::schema;
use crate::target::{self, ParseError};
use crate::tasks::{TaskEngine, TaskError};

use super::event::{
    AccessRequest, DescribeResponse, Event, GrantResponse, LoadRequest, LoadResponse, Response,
};

/// Owns a provider and its namespace and routes host events to them.
///
/// Construction registers the namespace, loads config and runs provider setup.
/// Afterwards the runtime is read-only; every Load gets its own accumulators.
pub struct ProviderRuntime<P: Provider> {
    provider: P,
    namespace: Namespace<P>,
    diagnostics: Diagnostics,
    config: ProviderConfig,
    info: ProviderInfo,
}

impl<P: Provider> ProviderRuntime<P> {
    pub fn new(mut provider: P, loader: &dyn ConfigLoader) -> Result<Self, RuntimeError> {
        let mut builder = NamespaceBuilder::new();
        P::register(&mut builder);
        let namespace = builder.build()?;

        let diagnostics = Diagnostics::new();
        let config = ProviderConfig::load(P::config_schema(), loader, &diagnostics);
        if let Err(e) = provider.setup(&config, &diagnostics) {
            let msg = format!("{e:#}");
            tracing::warn!(error = %msg, "Provider setup failed");
            diagnostics.error(format!("provider setup failed: {msg}"));
        }

        Ok(Self {
            provider,
            namespace,
            diagnostics,
            config,
            info: ProviderInfo::default(),
        })
    }

    /// Identity reported in Describe responses.
    pub fn with_info(mut self, info: ProviderInfo) -> Self {
        self.info = info;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn namespace(&self) -> &Namespace<P> {
        &self.namespace
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Decodes a raw event, dispatches it and encodes the response.
    pub fn handle(&self, event: Value) -> Result<Value, RuntimeError> {
        let event = Event::from_value(event).map_err(RuntimeError::Decode)?;
        let response = self.dispatch(event)?;
        serde_json::to_value(response).map_err(RuntimeError::Encode)
    }

    pub fn dispatch(&self, event: Event) -> Result<Response, RuntimeError> {
        let span = info_span!(
            "provkit.invoke",
            event = event.name(),
            invocation_id = %Uuid::new_v4()
        );
        let _guard = span.enter();

        let result = match event {
            Event::Describe(_) => Ok(Response::Describe(self.describe())),
            Event::Load(req) => self.load(req).map(Response::Load),
            Event::Grant(req) => self.grant(req).map(Response::Grant),
            Event::Revoke(req) => self.revoke(req).map(Response::Revoke),
        };

        if let Err(e) = &result {
            tracing::error!(error = %e, "Event failed");
        }
        result
    }

    fn describe(&self) -> DescribeResponse {
        let diagnostics = self.diagnostics.fork();
        self.provider.health_check(&diagnostics);

        DescribeResponse {
            provider: self.info.clone(),
            config: self.config.safe(),
            healthy: diagnostics.has_no_errors(),
            diagnostics: diagnostics.export(),
            schema: schema::export_schema(&self.namespace, self.config.schema()),
        }
    }

    fn load(&self, req: LoadRequest) -> Result<LoadResponse, RuntimeError> {
        let mut engine = TaskEngine::new(&self.namespace);
        engine
            .execute(&self.provider, &req.task, &req.ctx)
            .map_err(|e| match e {
                TaskError::Lookup(e) => RuntimeError::Lookup(e),
                other => RuntimeError::Task(other),
            })?;

        let (resources, tasks) = engine.finish().into_parts();
        tracing::info!(
            task = %req.task,
            resources = resources.len(),
            tasks = tasks.len(),
            "Load completed"
        );
        Ok(LoadResponse { resources, tasks })
    }

    fn grant(&self, req: AccessRequest) -> Result<GrantResponse, RuntimeError> {
        let kind = req.target.kind;
        let registered = self.namespace.resolve_target(&kind)?;
        let target = target::parse(&kind, registered.class(), &req.target.arguments)?;

        let result = (registered.grant_fn())(&self.provider, &req.subject, &target)
            .map_err(|e| access_failure(&kind, e, AccessOp::Grant))?;

        tracing::info!(kind = %kind, subject = %req.subject, "Grant completed");
        Ok(result.map(GrantResponse::from).unwrap_or_default())
    }

    fn revoke(&self, req: AccessRequest) -> Result<Value, RuntimeError> {
        let kind = req.target.kind;
        let registered = self.namespace.resolve_target(&kind)?;
        let revoke = registered
            .revoke_fn()
            .ok_or_else(|| RuntimeError::RevokeNotSupported { kind: kind.clone() })?;
        let target = target::parse(&kind, registered.class(), &req.target.arguments)?;

        let result = revoke(&self.provider, &req.subject, &target, req.state.as_ref())
            .map_err(|e| access_failure(&kind, e, AccessOp::Revoke))?;

        tracing::info!(kind = %kind, subject = %req.subject, "Revoke completed");
        Ok(result.unwrap_or(Value::Null))
    }
}

enum AccessOp {
    Grant,
    Revoke,
}

fn access_failure(kind: &str, err: AccessError, op: AccessOp) -> RuntimeError {
    let kind = kind.to_string();
    match (err, op) {
        (AccessError::Parse(e), _) => RuntimeError::Validation(e),
        (AccessError::Provider(source), AccessOp::Grant) => RuntimeError::Grant { kind, source },
        (AccessError::Provider(source), AccessOp::Revoke) => RuntimeError::Revoke { kind, source },
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to decode event")]
    Decode(#[source] serde_json::Error),
    #[error(transparent)]
    Namespace(#[from] NamespaceError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Validation(#[from] ParseError),
    #[error(transparent)]
    Task(TaskError),
    #[error("grant failed for target kind '{kind}'")]
    Grant {
        kind: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("target kind '{kind}' does not support revoke")]
    RevokeNotSupported { kind: String },
    #[error("revoke failed for target kind '{kind}'")]
    Revoke {
        kind: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to encode response")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::GrantResult;
    use crate::fields::Field;
    use crate::provider::{ConfigField, ConfigSchema, MapLoader, NoopLoader};
    use crate::target::Target;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Default)]
    struct Flaky {
        token: Option<String>,
        unhealthy: bool,
    }

    #[derive(Deserialize)]
    struct Repo {
        repo: String,
    }

    impl Target for Repo {
        const NAME: &'static str = "Repo";
        fn fields() -> Vec<Field> {
            vec![Field::string("repo")]
        }
    }

    impl Provider for Flaky {
        fn config_schema() -> ConfigSchema {
            ConfigSchema::new(vec![ConfigField::new("token").secret()])
        }

        fn register(ns: &mut NamespaceBuilder<Self>) {
            ns.register_target::<Repo, _>("Repo", |_: &Flaky, _: &str, t: &Repo| {
                anyhow::ensure!(t.repo != "locked", "repository is locked");
                Ok(Some(GrantResult::default().with_instructions(t.repo.clone())))
            });
        }

        fn setup(&mut self, config: &ProviderConfig, _: &Diagnostics) -> anyhow::Result<()> {
            self.token = config.get("token").map(str::to_string);
            anyhow::ensure!(self.token.is_some(), "no token configured");
            Ok(())
        }

        fn health_check(&self, diagnostics: &Diagnostics) {
            if self.unhealthy {
                diagnostics.error("upstream unreachable");
            }
        }
    }

    #[test]
    fn setup_receives_loaded_config() {
        let loader: MapLoader = [("token", "abc")].into_iter().collect();
        let rt = ProviderRuntime::new(Flaky::default(), &loader).unwrap();
        assert_eq!(rt.provider().token.as_deref(), Some("abc"));
        assert!(rt.diagnostics().has_no_errors());

        let out = rt.handle(json!({"type": "describe"})).unwrap();
        assert_eq!(out["config"], json!({"token": "*****"}));
        assert_eq!(out["healthy"], true);
    }

    #[test]
    fn setup_failure_marks_describe_unhealthy() {
        let rt = ProviderRuntime::new(Flaky::default(), &NoopLoader).unwrap();
        let out = rt.handle(json!({"type": "describe"})).unwrap();
        assert_eq!(out["healthy"], false);
        let msgs: Vec<_> = out["diagnostics"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["msg"].as_str().unwrap().to_string())
            .collect();
        assert!(msgs.iter().any(|m| m.contains("token")));
    }

    #[test]
    fn health_check_logs_do_not_accumulate() {
        let loader: MapLoader = [("token", "abc")].into_iter().collect();
        let provider = Flaky {
            unhealthy: true,
            ..Default::default()
        };
        let rt = ProviderRuntime::new(provider, &loader).unwrap();

        for _ in 0..3 {
            let out = rt.handle(json!({"type": "describe"})).unwrap();
            assert_eq!(out["healthy"], false);
            assert_eq!(out["diagnostics"].as_array().unwrap().len(), 1);
        }
        assert!(rt.diagnostics().is_empty());
    }

    #[test]
    fn provider_error_carries_target_kind() {
        let loader: MapLoader = [("token", "abc")].into_iter().collect();
        let rt = ProviderRuntime::new(Flaky::default(), &loader).unwrap();
        let err = rt
            .handle(json!({
                "type": "grant",
                "data": {"subject": "u1", "target": {"kind": "Repo", "arguments": {"repo": "locked"}}}
            }))
            .unwrap_err();
        match err {
            RuntimeError::Grant { kind, source } => {
                assert_eq!(kind, "Repo");
                assert_eq!(source.to_string(), "repository is locked");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn revoke_without_function_is_rejected() {
        let loader: MapLoader = [("token", "abc")].into_iter().collect();
        let rt = ProviderRuntime::new(Flaky::default(), &loader).unwrap();
        let err = rt
            .handle(json!({
                "type": "revoke",
                "data": {"subject": "u1", "target": {"kind": "Repo", "arguments": {"repo": "x"}}}
            }))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::RevokeNotSupported { kind } if kind == "Repo"));
    }

    #[test]
    fn malformed_event_is_a_decode_error() {
        let rt = ProviderRuntime::new(Flaky::default(), &NoopLoader).unwrap();
        let err = rt.handle(json!({"type": "load", "data": {}})).unwrap_err();
        assert!(matches!(err, RuntimeError::Decode(_)));
    }
}
