//! Wire shapes of runtime events and their responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::access::GrantResult;
use crate::diagnostics::Log;
use crate::provider::ProviderInfo;
use crate::resources::ResourceRecord;
use crate::target::TargetArguments;
use crate::tasks::Task;

/// An event delivered by the host, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Event {
    /// `data` is optional and its keys are ignored.
    Describe(Option<DescribeRequest>),
    Load(LoadRequest),
    Grant(AccessRequest),
    Revoke(AccessRequest),
}

impl Event {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::Describe(_) => "describe",
            Event::Load(_) => "load",
            Event::Grant(_) => "grant",
            Event::Revoke(_) => "revoke",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescribeRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    /// Id of the resource loader to run.
    pub task: String,
    #[serde(default)]
    pub ctx: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub subject: String,
    pub target: TargetRef,
    /// State returned by the grant; only meaningful on revoke.
    #[serde(default)]
    pub state: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: String,
    #[serde(default)]
    pub arguments: TargetArguments,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescribeResponse {
    pub provider: ProviderInfo,
    pub config: Map<String, Value>,
    pub diagnostics: Vec<Log>,
    pub healthy: bool,
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResponse {
    pub resources: Vec<ResourceRecord>,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GrantResponse {
    pub access_instructions: Option<String>,
    pub state: Option<Map<String, Value>>,
}

impl From<GrantResult> for GrantResponse {
    fn from(r: GrantResult) -> Self {
        Self {
            access_instructions: r.access_instructions,
            state: r.state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Describe(DescribeResponse),
    Load(LoadResponse),
    Grant(GrantResponse),
    /// Whatever the provider's revoke function returned (`null` for nothing).
    Revoke(Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_every_variant() {
        assert_eq!(Event::from_value(json!({"type": "describe"})).unwrap(), Event::Describe(None));

        let load = Event::from_value(json!({"type": "load", "data": {"task": "fetch_groups"}})).unwrap();
        match load {
            Event::Load(req) => {
                assert_eq!(req.task, "fetch_groups");
                assert!(req.ctx.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let grant = Event::from_value(json!({
            "type": "grant",
            "data": {"subject": "u1", "target": {"kind": "Default", "arguments": {"group": "eng"}}}
        }))
        .unwrap();
        let Event::Grant(req) = grant else {
            panic!("expected grant");
        };
        assert_eq!(req.subject, "u1");
        assert_eq!(req.target.arguments.get("group").map(String::as_str), Some("eng"));
        assert!(req.state.is_none());

        let revoke = Event::from_value(json!({
            "type": "revoke",
            "data": {
                "subject": "u1",
                "target": {"kind": "Default", "arguments": {}},
                "state": {"membership": "m-1"}
            }
        }))
        .unwrap();
        let Event::Revoke(req) = revoke else {
            panic!("expected revoke");
        };
        assert_eq!(req.state.unwrap()["membership"], "m-1");
    }

    #[test]
    fn describe_tolerates_a_data_payload() {
        for data in [json!({}), json!({"verbose": true}), Value::Null] {
            let event = Event::from_value(json!({"type": "describe", "data": data})).unwrap();
            assert_eq!(event.name(), "describe");
        }
    }

    #[test]
    fn unknown_discriminator_is_a_decode_error() {
        assert!(Event::from_value(json!({"type": "audit"})).is_err());
        assert!(Event::from_value(json!({"data": {}})).is_err());
    }

    #[test]
    fn empty_grant_response_serializes_nulls() {
        let r = Response::Grant(GrantResponse::default());
        assert_eq!(
            serde_json::to_value(r).unwrap(),
            json!({"access_instructions": null, "state": null})
        );
    }
}
