//! In-memory directory provider served by the reference host.

use parking_lot::Mutex;
use provkit::{
    composite_id, ConfigField, ConfigSchema, Diagnostics, Field, GrantResult, NamespaceBuilder,
    Provider, ProviderConfig, Resource, Target,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Seed data: `(group id, group name, members)`.
const SEED: &[(&str, &str, &[&str])] = &[
    ("eng", "Engineering", &["alice", "bob"]),
    ("ops", "Operations", &["carol"]),
    ("sales", "Sales", &[]),
];

#[derive(Default)]
pub struct DirectoryProvider {
    org: Option<String>,
    memberships: Mutex<Vec<(String, String)>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
}

impl Resource for Group {
    const NAME: &'static str = "Group";
    fn id(&self) -> &str {
        &self.id
    }
    fn fields() -> Vec<Field> {
        vec![Field::string("name")]
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Membership {
    pub id: String,
    pub group: String,
    pub user: String,
}

impl Resource for Membership {
    const NAME: &'static str = "Membership";
    fn id(&self) -> &str {
        &self.id
    }
    fn fields() -> Vec<Field> {
        vec![Field::related_to::<Group>("group"), Field::string("user")]
    }
}

#[derive(Debug, Deserialize)]
pub struct GroupAccess {
    pub group: String,
}

impl Target for GroupAccess {
    const NAME: &'static str = "GroupAccess";
    fn fields() -> Vec<Field> {
        vec![Field::related_to::<Group>("group")
            .title("Group")
            .description("The group to add the user to")]
    }
}

impl DirectoryProvider {
    fn group_exists(id: &str) -> bool {
        SEED.iter().any(|(g, _, _)| *g == id)
    }

    fn members_of(&self, group: &str) -> Vec<String> {
        let seeded = SEED
            .iter()
            .filter(|(g, _, _)| *g == group)
            .flat_map(|(_, _, users)| users.iter().map(|u| u.to_string()));
        let granted = self
            .memberships
            .lock()
            .iter()
            .filter(|(g, _)| g == group)
            .map(|(_, u)| u.clone())
            .collect::<Vec<_>>();
        seeded.chain(granted).collect()
    }

    fn grant(&self, subject: &str, target: &GroupAccess) -> anyhow::Result<Option<GrantResult>> {
        anyhow::ensure!(
            Self::group_exists(&target.group),
            "group '{}' does not exist",
            target.group
        );
        self.memberships
            .lock()
            .push((target.group.clone(), subject.to_string()));

        let mut state = Map::new();
        state.insert(
            "membership".into(),
            json!(composite_id(&[target.group.as_str(), subject])),
        );
        let org = self.org.as_deref().unwrap_or("the directory");
        Ok(Some(
            GrantResult::default()
                .with_instructions(format!("You are now a member of '{}' in {org}", target.group))
                .with_state(state),
        ))
    }

    fn revoke(
        &self,
        subject: &str,
        target: &GroupAccess,
        state: Option<&Map<String, Value>>,
    ) -> anyhow::Result<Option<Value>> {
        if let Some(recorded) = state.and_then(|s| s.get("membership")).and_then(Value::as_str) {
            let expected = composite_id(&[target.group.as_str(), subject]);
            anyhow::ensure!(
                recorded == expected,
                "grant state '{recorded}' does not match '{expected}'"
            );
        }

        let mut memberships = self.memberships.lock();
        let before = memberships.len();
        memberships.retain(|(g, u)| !(g == &target.group && u == subject));
        Ok(Some(json!({ "removed": before - memberships.len() })))
    }
}

impl Provider for DirectoryProvider {
    fn config_schema() -> ConfigSchema {
        ConfigSchema::new(vec![
            ConfigField::new("org_name").description("Display name of the directory"),
            ConfigField::new("api_token")
                .description("Token used to call the directory API")
                .secret()
                .optional(),
        ])
    }

    fn register(ns: &mut NamespaceBuilder<Self>) {
        ns.register_resource::<Group>()
            .register_resource::<Membership>()
            .register_target_with_revoke::<GroupAccess, _, _>(
                "Default",
                |p: &DirectoryProvider, subject: &str, t: &GroupAccess| p.grant(subject, t),
                |p: &DirectoryProvider,
                 subject: &str,
                 t: &GroupAccess,
                 state: Option<&Map<String, Value>>| p.revoke(subject, t, state),
            )
            .register_resource_loader("fetch_groups", |_: &DirectoryProvider, ctx| {
                for (id, name, _) in SEED {
                    ctx.register(&Group {
                        id: id.to_string(),
                        name: name.to_string(),
                    })?;
                    let mut next = Map::new();
                    next.insert("group".into(), json!(id));
                    ctx.call("fetch_members", next)?;
                }
                Ok(())
            })
            .register_resource_loader("fetch_members", |p: &DirectoryProvider, ctx| {
                let group = ctx
                    .ctx_str("group")
                    .ok_or_else(|| anyhow::anyhow!("fetch_members requires a 'group' in ctx"))?
                    .to_string();
                for user in p.members_of(&group) {
                    ctx.register(&Membership {
                        id: composite_id(&[group.as_str(), user.as_str()]),
                        group: group.clone(),
                        user,
                    })?;
                }
                Ok(())
            });
    }

    fn setup(&mut self, config: &ProviderConfig, diagnostics: &Diagnostics) -> anyhow::Result<()> {
        self.org = config.get("org_name").map(str::to_string);
        if config.get("api_token").is_none() {
            diagnostics.info("no api_token configured, serving seed data only");
        }
        Ok(())
    }

    fn health_check(&self, diagnostics: &Diagnostics) {
        match &self.org {
            Some(org) => diagnostics.info(format!("connected to {org}")),
            None => diagnostics.error("org_name is not configured"),
        }
    }
}
