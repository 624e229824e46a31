//! Hyper-V hosts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ServerAttrs, SwitchAttrs};
use crate::collection::{Collection, Scope};
use crate::entity::{Entity, Resource};
use crate::error::{Error, Result};
use crate::invoker::{JSON_DEPTH, Params, RETURN_FIELDS};
use crate::schema::{AttributeDef, Attributes, Schema, inherit};

const GET_VM_HOST: &str = "get_vm_host";
const SET_VM_HOST: &str = "set_vm_host";

pub type Host = Entity<HostAttrs>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostAttrs {
    pub name: Option<String>,
    pub computer_name: Option<String>,
    pub fully_qualified_domain_name: Option<String>,
    pub logical_processor_count: Option<u32>,
    pub memory_capacity: Option<u64>,
    pub virtual_hard_disk_path: Option<String>,
    pub virtual_machine_path: Option<String>,
    pub mac_address_minimum: Option<String>,
    pub mac_address_maximum: Option<String>,
}

impl HostAttrs {
    /// Name the host is addressed by.
    pub fn address(&self) -> Option<&str> {
        self.computer_name.as_deref().or(self.name.as_deref())
    }
}

impl Attributes for HostAttrs {
    const SCHEMA: &'static Schema = &Schema {
        kind: "host",
        attributes: &[
            AttributeDef::string("name"),
            AttributeDef::string("computer_name"),
            AttributeDef::string("fully_qualified_domain_name"),
            AttributeDef::integer("logical_processor_count"),
            AttributeDef::integer("memory_capacity"),
            AttributeDef::string("virtual_hard_disk_path"),
            AttributeDef::string("virtual_machine_path"),
            AttributeDef::string("mac_address_minimum"),
            AttributeDef::string("mac_address_maximum"),
        ],
    };

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn apply_scope(&mut self, scope: &Scope) {
        inherit(&mut self.computer_name, &scope.computer_name);
    }
}

#[async_trait]
impl Resource for HostAttrs {
    const GET_OPERATION: &'static str = GET_VM_HOST;
    type Lazy = ();

    fn identity_filter(key: &str) -> Params {
        Params::new().with("computer_name", key)
    }

    fn reload_filters(attributes: &Self) -> Params {
        Params::new().with_opt("computer_name", attributes.address())
    }

    /// Hosts cannot be created; saving pushes changed paths and MAC ranges.
    async fn save(host: &mut Host) -> Result<()> {
        let Some(snapshot) = host.snapshot() else {
            return Err(Error::Unsupported {
                kind: Self::SCHEMA.kind,
                operation: "create",
            });
        };
        let address = snapshot.attributes().address().map(str::to_string);
        info!(host = ?address, changes = ?host.dirty(), "updating host");

        let mut params = Params::new()
            .with_opt("computer_name", address)
            .with("passthru", true);
        for attribute in [
            "virtual_hard_disk_path",
            "virtual_machine_path",
            "mac_address_minimum",
            "mac_address_maximum",
        ] {
            if let Some(value) = host.changed_value(attribute) {
                params.set(attribute, value);
            }
        }
        let params = params
            .with(RETURN_FIELDS, Self::SCHEMA.return_fields())
            .with(JSON_DEPTH, host.service.config().json_depth);
        let reply = host.service.invoke(SET_VM_HOST, params).await?;
        host.merge_reply(reply, SET_VM_HOST)
    }
}

impl Host {
    pub fn servers(&self) -> Collection<ServerAttrs> {
        Collection::scoped(self.service.clone(), Scope::for_host(self))
    }

    pub fn switches(&self) -> Collection<SwitchAttrs> {
        Collection::scoped(self.service.clone(), Scope::for_host(self))
    }
}
