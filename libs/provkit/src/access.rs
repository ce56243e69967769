//! Grant/revoke contract between the dispatcher and the provider's business logic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::target::{ParseError, Target, TargetClass, TargetInstance};

/// Outcome of a successful grant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantResult {
    /// Shown to the requester, e.g. a console URL.
    pub access_instructions: Option<String>,
    /// Opaque state handed back on revoke.
    pub state: Option<Map<String, Value>>,
}

impl GrantResult {
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.access_instructions = Some(instructions.into());
        self
    }

    pub fn with_state(mut self, state: Map<String, Value>) -> Self {
        self.state = Some(state);
        self
    }
}

pub type GrantFn<P> = Arc<
    dyn Fn(&P, &str, &TargetInstance) -> Result<Option<GrantResult>, AccessError> + Send + Sync,
>;

pub type RevokeFn<P> = Arc<
    dyn Fn(&P, &str, &TargetInstance, Option<&Map<String, Value>>) -> Result<Option<Value>, AccessError>
        + Send
        + Sync,
>;

/// Adapts a typed grant function to the untyped contract stored in the namespace.
pub fn grant_fn<P, T, F>(f: F) -> GrantFn<P>
where
    P: 'static,
    T: Target,
    F: Fn(&P, &str, &T) -> anyhow::Result<Option<GrantResult>> + Send + Sync + 'static,
{
    Arc::new(
        move |provider: &P, subject: &str, target: &TargetInstance| -> Result<_, AccessError> {
            let typed: T = target.decode()?;
            Ok(f(provider, subject, &typed)?)
        },
    )
}

/// Adapts a typed revoke function to the untyped contract stored in the namespace.
pub fn revoke_fn<P, T, F>(f: F) -> RevokeFn<P>
where
    P: 'static,
    T: Target,
    F: Fn(&P, &str, &T, Option<&Map<String, Value>>) -> anyhow::Result<Option<Value>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(
        move |provider: &P,
              subject: &str,
              target: &TargetInstance,
              state: Option<&Map<String, Value>>|
              -> Result<_, AccessError> {
            let typed: T = target.decode()?;
            Ok(f(provider, subject, &typed, state)?)
        },
    )
}

/// A target kind together with the functions that act on it.
pub struct RegisteredTarget<P> {
    class: TargetClass,
    grant: GrantFn<P>,
    revoke: Option<RevokeFn<P>>,
}

impl<P> Clone for RegisteredTarget<P> {
    fn clone(&self) -> Self {
        Self {
            class: self.class.clone(),
            grant: Arc::clone(&self.grant),
            revoke: self.revoke.clone(),
        }
    }
}

impl<P> std::fmt::Debug for RegisteredTarget<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTarget")
            .field("class", &self.class.name())
            .field("has_revoke", &self.revoke.is_some())
            .finish()
    }
}

impl<P> RegisteredTarget<P> {
    pub fn new(class: TargetClass, grant: GrantFn<P>, revoke: Option<RevokeFn<P>>) -> Self {
        Self {
            class,
            grant,
            revoke,
        }
    }

    pub fn class(&self) -> &TargetClass {
        &self.class
    }

    pub fn grant_fn(&self) -> &GrantFn<P> {
        &self.grant
    }

    pub fn revoke_fn(&self) -> Option<&RevokeFn<P>> {
        self.revoke.as_ref()
    }
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Field;
    use crate::target::{parse, TargetArguments};

    #[derive(serde::Deserialize)]
    struct Args {
        group: String,
    }

    impl Target for Args {
        const NAME: &'static str = "Args";
        fn fields() -> Vec<Field> {
            vec![Field::string("group")]
        }
    }

    struct Owner {
        prefix: &'static str,
    }

    #[test]
    fn typed_grant_receives_decoded_target() {
        let grant = grant_fn(|p: &Owner, subject: &str, t: &Args| {
            Ok(Some(
                GrantResult::default().with_instructions(format!("{}{subject}@{}", p.prefix, t.group)),
            ))
        });

        let mut raw = TargetArguments::new();
        raw.insert("group".into(), "eng".into());
        let instance = parse("Default", &TargetClass::of::<Args>(), &raw).unwrap();

        let got = grant(&Owner { prefix: "https://" }, "u1", &instance).unwrap();
        assert_eq!(
            got.and_then(|r| r.access_instructions).as_deref(),
            Some("https://u1@eng")
        );
    }

    #[test]
    fn provider_failure_is_wrapped() {
        let grant = grant_fn(|_: &Owner, _: &str, _: &Args| anyhow::bail!("upstream 503"));

        let mut raw = TargetArguments::new();
        raw.insert("group".into(), "eng".into());
        let instance = parse("Default", &TargetClass::of::<Args>(), &raw).unwrap();

        let err = grant(&Owner { prefix: "" }, "u1", &instance).unwrap_err();
        assert!(matches!(err, AccessError::Provider(_)));
        assert_eq!(err.to_string(), "upstream 503");
    }
}
