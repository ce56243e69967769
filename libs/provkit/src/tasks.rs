//! Loader engine: runs a registered loader and collects what it produces.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::registry::{LookupError, Namespace};
use crate::resources::{Resource, ResourceError, ResourceRecord};

pub type LoaderFn<P> =
    Arc<dyn Fn(&P, &mut LoadContext<'_, P>) -> anyhow::Result<()> + Send + Sync>;

/// A unit of loader work: which loader to run, with what context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub ctx: Map<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, ctx: Map<String, Value>) -> Self {
        Self { id: id.into(), ctx }
    }
}

/// Per-invocation accumulators. One instance lives for exactly one Load event.
#[derive(Debug, Default)]
pub struct LoadState {
    resources: Vec<ResourceRecord>,
    seen: HashSet<(String, String)>,
    tasks: Vec<Task>,
}

impl LoadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the resource and task accumulators.
    pub fn reset(&mut self) {
        self.resources.clear();
        self.seen.clear();
        self.tasks.clear();
    }

    /// Adds an exported record. Ids must be non-empty and unique per type.
    pub fn push_record(&mut self, record: ResourceRecord) -> Result<(), ResourceError> {
        let id = match record.id() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(ResourceError::EmptyId {
                    type_name: record.type_name,
                })
            }
        };
        if !self.seen.insert((record.type_name.clone(), id.clone())) {
            return Err(ResourceError::Duplicate {
                type_name: record.type_name,
                id,
            });
        }
        self.resources.push(record);
        Ok(())
    }

    pub fn push_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn resources(&self) -> &[ResourceRecord] {
        &self.resources
    }

    /// Follow-up tasks emitted so far.
    pub fn pending(&self) -> &[Task] {
        &self.tasks
    }

    pub fn into_parts(self) -> (Vec<ResourceRecord>, Vec<Task>) {
        (self.resources, self.tasks)
    }
}

/// Handed to a loader while it runs.
pub struct LoadContext<'a, P> {
    namespace: &'a Namespace<P>,
    ctx: &'a Map<String, Value>,
    state: &'a mut LoadState,
}

impl<'a, P> LoadContext<'a, P> {
    pub fn new(namespace: &'a Namespace<P>, ctx: &'a Map<String, Value>, state: &'a mut LoadState) -> Self {
        Self {
            namespace,
            ctx,
            state,
        }
    }

    /// Context the task was invoked with.
    pub fn ctx(&self) -> &Map<String, Value> {
        self.ctx
    }

    /// String value from the task context.
    pub fn ctx_str(&self, key: &str) -> Option<&str> {
        self.ctx.get(key).and_then(Value::as_str)
    }

    /// Records a loaded resource.
    pub fn register<R: Resource>(&mut self, resource: &R) -> Result<(), ResourceError> {
        self.state.push_record(resource.export()?)
    }

    /// Queues a follow-up task for the caller to run in a later Load event.
    pub fn call(&mut self, loader_id: &str, ctx: Map<String, Value>) -> Result<(), LookupError> {
        if !self.namespace.has_loader(loader_id) {
            return Err(LookupError::UnknownTask {
                id: loader_id.to_string(),
            });
        }
        self.state.push_task(Task::new(loader_id, ctx));
        Ok(())
    }
}

/// Runs loader tasks against a namespace, accumulating into one [`LoadState`].
pub struct TaskEngine<'a, P> {
    namespace: &'a Namespace<P>,
    state: LoadState,
}

impl<'a, P> TaskEngine<'a, P> {
    pub fn new(namespace: &'a Namespace<P>) -> Self {
        Self {
            namespace,
            state: LoadState::new(),
        }
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Looks up `task_id` and runs it to completion.
    pub fn execute(
        &mut self,
        provider: &P,
        task_id: &str,
        ctx: &Map<String, Value>,
    ) -> Result<(), TaskError> {
        let loader = Arc::clone(self.namespace.loader(task_id)?);

        tracing::debug!(task = task_id, "running resource loader");
        let mut load_ctx = LoadContext::new(self.namespace, ctx, &mut self.state);
        loader(provider, &mut load_ctx).map_err(|source| TaskError::Loader {
            task: task_id.to_string(),
            source,
        })?;

        tracing::debug!(
            task = task_id,
            resources = self.state.resources().len(),
            pending = self.state.pending().len(),
            "resource loader finished"
        );
        Ok(())
    }

    pub fn get_pending(&self) -> &[Task] {
        self.state.pending()
    }

    pub fn resources(&self) -> &[ResourceRecord] {
        self.state.resources()
    }

    pub fn finish(self) -> LoadState {
        self.state
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("resource loader '{task}' failed")]
    Loader {
        task: String,
        #[source]
        source: anyhow::Error,
    },
}
