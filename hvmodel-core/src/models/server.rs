//! Virtual machines.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::de;
use super::{DvdDriveAttrs, HardDriveAttrs, NetworkAdapterAttrs};
use crate::collection::{Collection, Scope};
use crate::entity::{Entity, Resource};
use crate::error::Result;
use crate::invoker::{JSON_DEPTH, Params, RETURN_FIELDS};
use crate::schema::{AttributeDef, Attributes, Schema, inherit};

const GET_VM: &str = "get_vm";
const NEW_VM: &str = "new_vm";
const SET_VM: &str = "set_vm";
const REMOVE_VM: &str = "remove_vm";
const START_VM: &str = "start_vm";
const STOP_VM: &str = "stop_vm";

pub type Server = Entity<ServerAttrs>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerAttrs {
    pub id: Option<String>,
    pub name: Option<String>,
    pub computer_name: Option<String>,
    pub cluster_name: Option<String>,
    #[serde(deserialize_with = "de::loose_string")]
    pub state: Option<String>,
    pub generation: Option<u32>,
    pub processor_count: Option<u32>,
    pub memory_startup: Option<u64>,
    pub dynamic_memory_enabled: Option<bool>,
    pub notes: Option<String>,
    pub path: Option<String>,
}

impl Attributes for ServerAttrs {
    const SCHEMA: &'static Schema = &Schema {
        kind: "virtual machine",
        attributes: &[
            AttributeDef::string("id"),
            AttributeDef::string("name"),
            AttributeDef::string("computer_name"),
            AttributeDef::string("cluster_name"),
            AttributeDef::string("state"),
            AttributeDef::integer("generation"),
            AttributeDef::integer("processor_count"),
            AttributeDef::integer("memory_startup"),
            AttributeDef::bool("dynamic_memory_enabled"),
            AttributeDef::string("notes"),
            AttributeDef::string("path"),
            AttributeDef::list("network_adapters").lazy(),
            AttributeDef::list("hard_drives").lazy(),
            AttributeDef::list("dvd_drives").lazy(),
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

    fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    fn apply_scope(&mut self, scope: &Scope) {
        inherit(&mut self.computer_name, &scope.computer_name);
    }
}

#[async_trait]
impl Resource for ServerAttrs {
    const GET_OPERATION: &'static str = GET_VM;
    type Lazy = ();

    /// GUID keys address the VM by id, anything else by name.
    fn identity_filter(key: &str) -> Params {
        if Uuid::parse_str(key).is_ok() {
            Params::new().with("id", key)
        } else {
            Params::new().with("name", key)
        }
    }

    async fn save(vm: &mut Server) -> Result<()> {
        vm.requires(&["name"])?;
        let depth = vm.service.config().json_depth;

        let (operation, params) = match vm.snapshot() {
            None => {
                let a = vm.attributes();
                info!(name = ?a.name, computer = ?a.computer_name, "creating virtual machine");
                let params = Params::new()
                    .with_opt("computer_name", a.computer_name.clone())
                    .with_opt("name", a.name.clone())
                    .with_opt("generation", a.generation)
                    .with_opt("memory_startup_bytes", a.memory_startup)
                    .with_opt("path", a.path.clone());
                (NEW_VM, params)
            }
            Some(snapshot) => {
                let old = snapshot.attributes();
                info!(name = ?old.name, changes = ?vm.dirty(), "updating virtual machine");
                let mut params = Params::new()
                    .with_opt("computer_name", old.computer_name.clone())
                    .with_opt("name", old.name.clone())
                    .with("passthru", true);
                for (attribute, param) in [
                    ("processor_count", "processor_count"),
                    ("memory_startup", "memory_startup_bytes"),
                    ("notes", "notes"),
                    ("name", "new_name"),
                ] {
                    if let Some(value) = vm.changed_value(attribute) {
                        params.set(param, value);
                    }
                }
                match vm.changed_value("dynamic_memory_enabled") {
                    Some(Value::Bool(true)) => params.set("dynamic_memory", true),
                    Some(Value::Bool(false)) => params.set("static_memory", true),
                    _ => {}
                }
                (SET_VM, params)
            }
        };

        let params = params
            .with(RETURN_FIELDS, Self::SCHEMA.return_fields())
            .with(JSON_DEPTH, depth);
        let reply = vm.service.invoke(operation, params).await?;
        vm.merge_reply(reply, operation)
    }

    async fn destroy(vm: &Server) -> Result<()> {
        vm.requires(&["name"])?;
        let a = vm.attributes();
        info!(name = ?a.name, computer = ?a.computer_name, "removing virtual machine");
        let params = Params::new()
            .with_opt("computer_name", a.computer_name.clone())
            .with_opt("name", a.name.clone())
            .with("force", true);
        vm.service.invoke(REMOVE_VM, params).await?;
        Ok(())
    }
}

impl Server {
    pub async fn start(&mut self) -> Result<&mut Self> {
        self.power(START_VM, Params::new()).await
    }

    /// Shuts the VM down; `force` turns it off without a guest shutdown.
    pub async fn stop(&mut self, force: bool) -> Result<&mut Self> {
        let extra = if force {
            Params::new().with("turn_off", true)
        } else {
            Params::new()
        };
        self.power(STOP_VM, extra).await
    }

    async fn power(&mut self, operation: &'static str, extra: Params) -> Result<&mut Self> {
        self.requires(&["name"])?;
        let a = self.attributes();
        info!(name = ?a.name, operation, "changing virtual machine power state");
        let params = Params::new()
            .with_opt("computer_name", a.computer_name.clone())
            .with_opt("name", a.name.clone())
            .with("passthru", true)
            .merge(extra)
            .with(RETURN_FIELDS, ServerAttrs::SCHEMA.return_fields())
            .with(JSON_DEPTH, self.service.config().json_depth);
        let reply = self.service.invoke(operation, params).await?;
        self.merge_reply(reply, operation)?;
        Ok(self)
    }

    pub fn network_adapters(&self) -> Collection<NetworkAdapterAttrs> {
        Collection::scoped(self.service.clone(), Scope::for_vm(self))
    }

    pub fn hard_drives(&self) -> Collection<HardDriveAttrs> {
        Collection::scoped(self.service.clone(), Scope::for_vm(self))
    }

    pub fn dvd_drives(&self) -> Collection<DvdDriveAttrs> {
        Collection::scoped(self.service.clone(), Scope::for_vm(self))
    }
}
