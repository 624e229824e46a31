//! Virtual switches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::de;
use crate::collection::Scope;
use crate::entity::{Entity, Resource};
use crate::error::Result;
use crate::invoker::{JSON_DEPTH, Params, RETURN_FIELDS};
use crate::schema::{AttributeDef, Attributes, Schema, inherit};

const GET_VM_SWITCH: &str = "get_vm_switch";
const NEW_VM_SWITCH: &str = "new_vm_switch";
const SET_VM_SWITCH: &str = "set_vm_switch";
const RENAME_VM_SWITCH: &str = "rename_vm_switch";
const REMOVE_VM_SWITCH: &str = "remove_vm_switch";

pub type Switch = Entity<SwitchAttrs>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchAttrs {
    pub id: Option<String>,
    pub name: Option<String>,
    pub computer_name: Option<String>,
    #[serde(deserialize_with = "de::loose_string")]
    pub switch_type: Option<String>,
    pub notes: Option<String>,
    pub net_adapter_interface_description: Option<String>,
    pub allow_management_os: Option<bool>,
}

impl Attributes for SwitchAttrs {
    const SCHEMA: &'static Schema = &Schema {
        kind: "virtual switch",
        attributes: &[
            AttributeDef::string("id"),
            AttributeDef::string("name"),
            AttributeDef::string("computer_name"),
            AttributeDef::string("switch_type"),
            AttributeDef::string("notes"),
            AttributeDef::string("net_adapter_interface_description"),
            AttributeDef::bool("allow_management_os"),
        ],
    };

    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn computer_name(&self) -> Option<&str> {
        self.computer_name.as_deref()
    }

    fn apply_scope(&mut self, scope: &Scope) {
        inherit(&mut self.computer_name, &scope.computer_name);
    }
}

#[async_trait]
impl Resource for SwitchAttrs {
    const GET_OPERATION: &'static str = GET_VM_SWITCH;
    type Lazy = ();

    async fn save(switch: &mut Switch) -> Result<()> {
        switch.requires(&["name"])?;
        let depth = switch.service.config().json_depth;

        let (operation, params) = match switch.snapshot() {
            None => {
                let a = switch.attributes();
                info!(name = ?a.name, computer = ?a.computer_name, "creating virtual switch");
                let mut params = Params::new()
                    .with_opt("computer_name", a.computer_name.clone())
                    .with_opt("name", a.name.clone())
                    .with_opt("notes", a.notes.clone());
                // External switches are typed by the adapter they bind to.
                match &a.net_adapter_interface_description {
                    Some(description) => {
                        params.set("net_adapter_interface_description", description.as_str());
                        params = params.with_opt("allow_management_os", a.allow_management_os);
                    }
                    None => params = params.with_opt("switch_type", a.switch_type.clone()),
                }
                (NEW_VM_SWITCH, params)
            }
            Some(snapshot) => {
                let old = snapshot.attributes();
                let mut name = old.name.clone();
                if let Some(Value::String(new_name)) = switch.changed_value("name") {
                    info!(from = ?old.name, to = %new_name, "renaming virtual switch");
                    let rename = Params::new()
                        .with_opt("computer_name", old.computer_name.clone())
                        .with_opt("name", old.name.clone())
                        .with("new_name", new_name.as_str());
                    switch.service.invoke(RENAME_VM_SWITCH, rename).await?;
                    name = Some(new_name);
                }

                info!(name = ?name, changes = ?switch.dirty(), "updating virtual switch");
                let mut params = Params::new()
                    .with_opt("computer_name", old.computer_name.clone())
                    .with_opt("name", name)
                    .with("passthru", true);
                for attribute in [
                    "notes",
                    "allow_management_os",
                    "net_adapter_interface_description",
                    "switch_type",
                ] {
                    if let Some(value) = switch.changed_value(attribute) {
                        params.set(attribute, value);
                    }
                }
                (SET_VM_SWITCH, params)
            }
        };

        let params = params
            .with(RETURN_FIELDS, Self::SCHEMA.return_fields())
            .with(JSON_DEPTH, depth);
        let reply = switch.service.invoke(operation, params).await?;
        switch.merge_reply(reply, operation)
    }

    async fn destroy(switch: &Switch) -> Result<()> {
        switch.requires(&["name"])?;
        let a = switch.attributes();
        info!(name = ?a.name, computer = ?a.computer_name, "removing virtual switch");
        let params = Params::new()
            .with_opt("computer_name", a.computer_name.clone())
            .with_opt("name", a.name.clone())
            .with("force", true);
        switch.service.invoke(REMOVE_VM_SWITCH, params).await?;
        Ok(())
    }
}
