//! Virtual machine network adapters.
//!
//! Saving an adapter is the most involved write in the crate. An update is
//! addressed by the adapter's previous host/VM/name, carries only the fields
//! that changed, and may be followed by a separate connect or disconnect
//! call when the switch changed. A VLAN setting that was touched is saved
//! afterwards against the adapter's new address.
//!
//! None of these steps is rolled back when a later one fails: the adapter
//! stays merged and re-baselined even if its VLAN setting could not be saved.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::de;
use super::{NetworkAdapterVlan, NetworkAdapterVlanAttrs, Switch, SwitchAttrs};
use crate::collection::Scope;
use crate::entity::{Entity, Resource};
use crate::error::Result;
use crate::invoker::{JSON_DEPTH, Params, RETURN_FIELDS, Record};
use crate::relations::{Relations, found};
use crate::schema::{AttrDefault, AttributeDef, Attributes, Schema, inherit};

const GET_VM_NETWORK_ADAPTER: &str = "get_vm_network_adapter";
const ADD_VM_NETWORK_ADAPTER: &str = "add_vm_network_adapter";
const SET_VM_NETWORK_ADAPTER: &str = "set_vm_network_adapter";
const CONNECT_VM_NETWORK_ADAPTER: &str = "connect_vm_network_adapter";
const DISCONNECT_VM_NETWORK_ADAPTER: &str = "disconnect_vm_network_adapter";
const REMOVE_VM_NETWORK_ADAPTER: &str = "remove_vm_network_adapter";

pub type NetworkAdapter = Entity<NetworkAdapterAttrs>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkAdapterAttrs {
    pub id: Option<String>,
    pub name: Option<String>,
    pub computer_name: Option<String>,
    pub vm_id: Option<String>,
    pub vm_name: Option<String>,
    pub switch_id: Option<String>,
    pub switch_name: Option<String>,
    pub connected: Option<bool>,
    pub mac_address: Option<String>,
    pub dynamic_mac_address_enabled: Option<bool>,
    pub is_legacy: Option<bool>,
    pub is_external_adapter: Option<bool>,
    pub is_management_os: Option<bool>,
    #[serde(deserialize_with = "de::string_list")]
    pub ip_addresses: Option<Vec<String>>,
}

/// Sub-resources loaded on demand.
#[derive(Debug, Clone, Default)]
pub struct AdapterLazy {
    pub(crate) vlan: Option<Box<NetworkAdapterVlan>>,
}

impl Attributes for NetworkAdapterAttrs {
    const SCHEMA: &'static Schema = &Schema {
        kind: "network adapter",
        attributes: &[
            AttributeDef::string("id"),
            AttributeDef::string("name").default(AttrDefault::Str("Network Adapter")),
            AttributeDef::string("computer_name"),
            AttributeDef::string("vm_id"),
            AttributeDef::string("vm_name"),
            AttributeDef::string("switch_id"),
            AttributeDef::string("switch_name"),
            AttributeDef::bool("connected"),
            AttributeDef::string("mac_address"),
            AttributeDef::bool("dynamic_mac_address_enabled").default(AttrDefault::Bool(true)),
            AttributeDef::bool("is_legacy"),
            AttributeDef::bool("is_external_adapter"),
            AttributeDef::bool("is_management_os"),
            AttributeDef::list("ip_addresses"),
            AttributeDef::reference("vlan_setting").lazy(),
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

    fn vm_name(&self) -> Option<&str> {
        self.vm_name.as_deref()
    }

    fn apply_scope(&mut self, scope: &Scope) {
        inherit(&mut self.computer_name, &scope.computer_name);
        inherit(&mut self.vm_name, &scope.vm_name);
    }
}

#[async_trait]
impl Resource for NetworkAdapterAttrs {
    const GET_OPERATION: &'static str = GET_VM_NETWORK_ADAPTER;
    type Lazy = AdapterLazy;

    async fn save(adapter: &mut NetworkAdapter) -> Result<()> {
        adapter.requires(&["name", "computer_name", "vm_name"])?;

        let previous = adapter.snapshot().map(|s| s.attributes().clone());
        let was_persisted = previous.is_some();
        let record = match previous {
            None => create(adapter).await?,
            Some(previous) => update(adapter, &previous).await?,
        };
        adapter.merge_record(record)?;
        cascade_vlan(adapter, was_persisted).await
    }

    async fn destroy(adapter: &NetworkAdapter) -> Result<()> {
        adapter.requires(&["vm_name", "name", "computer_name", "id"])?;
        let a = adapter.attributes();
        info!(name = ?a.name, vm = ?a.vm_name, computer = ?a.computer_name, "removing network adapter");
        adapter
            .service
            .invoke(REMOVE_VM_NETWORK_ADAPTER, address(a))
            .await?;
        Ok(())
    }
}

/// Host, VM and adapter name locating an adapter remotely.
fn address(a: &NetworkAdapterAttrs) -> Params {
    Params::new()
        .with_opt("computer_name", a.computer_name.clone())
        .with_opt("name", a.name.clone())
        .with_opt("vm_name", a.vm_name.clone())
}

fn reply_shape(adapter: &NetworkAdapter) -> Params {
    Params::new()
        .with(RETURN_FIELDS, NetworkAdapterAttrs::SCHEMA.return_fields())
        .with(JSON_DEPTH, adapter.service.config().json_depth)
}

async fn create(adapter: &NetworkAdapter) -> Result<Record> {
    let a = adapter.attributes();
    info!(name = ?a.name, vm = ?a.vm_name, computer = ?a.computer_name, "adding network adapter");

    let mut params = address(a)
        .with("passthru", true)
        .with_opt("dynamic_mac_address", a.dynamic_mac_address_enabled)
        .with("is_legacy", a.is_legacy.unwrap_or(false));
    if a.dynamic_mac_address_enabled != Some(true) {
        params = params.with_opt("static_mac_address", a.mac_address.clone());
    }
    let params = params
        .with_opt("switch_name", a.switch_name.clone())
        .merge(reply_shape(adapter));

    let reply = adapter
        .service
        .invoke(ADD_VM_NETWORK_ADAPTER, params)
        .await?;
    adapter.select_reply(reply, ADD_VM_NETWORK_ADAPTER)
}

async fn update(adapter: &NetworkAdapter, previous: &NetworkAdapterAttrs) -> Result<Record> {
    let a = adapter.attributes();
    info!(name = ?previous.name, vm = ?previous.vm_name, changes = ?adapter.dirty(), "updating network adapter");

    let mut params = address(previous).with("passthru", true);
    if let Some(dynamic) = adapter.changed_value("dynamic_mac_address_enabled") {
        params.set("dynamic_mac_address", dynamic);
    }
    match adapter.changed_value("mac_address") {
        Some(Value::String(mac)) => params.set("static_mac_address", mac),
        _ if adapter.changed("dynamic_mac_address_enabled")
            && a.dynamic_mac_address_enabled == Some(false) =>
        {
            if let Some(mac) = &a.mac_address {
                params.set("static_mac_address", mac.as_str());
            }
        }
        _ => {}
    }
    let params = params.merge(reply_shape(adapter));

    let reply = adapter
        .service
        .invoke(SET_VM_NETWORK_ADAPTER, params)
        .await?;
    let mut record = adapter.select_reply(reply, SET_VM_NETWORK_ADAPTER)?;

    if adapter.changed("switch_name") {
        // The update reply is the authority on where the adapter lives now.
        let target = Params::new()
            .with_opt("computer_name", echoed(&record, "computer_name", &a.computer_name))
            .with_opt("name", echoed(&record, "name", &a.name))
            .with_opt("vm_name", echoed(&record, "vm_name", &a.vm_name));
        match &a.switch_name {
            Some(switch) => {
                info!(switch = %switch, "connecting network adapter");
                adapter
                    .service
                    .invoke(CONNECT_VM_NETWORK_ADAPTER, target.with("switch_name", switch.as_str()))
                    .await?;
            }
            None => {
                info!(name = ?a.name, "disconnecting network adapter");
                adapter
                    .service
                    .invoke(DISCONNECT_VM_NETWORK_ADAPTER, target)
                    .await?;
            }
        }
    }
    record.insert("switch_name".to_string(), Value::from(a.switch_name.clone()));
    Ok(record)
}

/// Field echoed back by a reply, falling back to the local value.
fn echoed(record: &Record, key: &str, local: &Option<String>) -> Option<Value> {
    match record.get(key) {
        Some(value) if !value.is_null() => Some(value.clone()),
        _ => local.clone().map(Value::String),
    }
}

/// Re-points an instantiated VLAN setting at the saved adapter and saves it
/// when it is new or was modified.
async fn cascade_vlan(adapter: &mut NetworkAdapter, was_persisted: bool) -> Result<()> {
    if adapter.lazy.vlan.is_none() {
        return Ok(());
    }
    let owner = adapter.owner_handle();
    let name = owner.attributes().name.clone();
    let Some(vlan) = adapter.lazy.vlan.as_deref_mut() else {
        return Ok(());
    };
    if was_persisted && !vlan.is_dirty() {
        vlan.adopt(owner);
        return Ok(());
    }
    vlan.attach(owner);
    debug!(adapter = ?name, "saving VLAN setting with its adapter");
    if let Err(e) = vlan.save().await {
        warn!(
            adapter = ?name,
            error = %e,
            "network adapter saved but its VLAN setting was not"
        );
        return Err(e);
    }
    Ok(())
}

impl NetworkAdapter {
    /// Addresses bound to the adapter inside the guest.
    pub fn ip_addresses(&self) -> &[String] {
        self.attributes().ip_addresses.as_deref().unwrap_or_default()
    }

    /// VLAN setting of this adapter, fetched on first access.
    ///
    /// An adapter that was never saved gets a fresh setting that is saved
    /// together with it.
    pub async fn vlan_setting(&mut self) -> Result<&mut NetworkAdapterVlan> {
        let vlan = match self.lazy.vlan.take() {
            Some(vlan) => vlan,
            None => Box::new(self.load_vlan().await?),
        };
        Ok(self.lazy.vlan.insert(vlan).as_mut())
    }

    async fn load_vlan(&self) -> Result<NetworkAdapterVlan> {
        let a = self.attributes();
        let vlans = self.service.network_adapter_vlans();
        if !self.is_persisted() {
            let mut vlan = vlans.new(NetworkAdapterVlanAttrs::default());
            vlan.attach(self.owner_handle());
            return Ok(vlan);
        }
        let filters = Params::new()
            .with_opt("computer_name", a.computer_name.clone())
            .with_opt("vm_name", a.vm_name.clone())
            .with_opt("vm_network_adapter_name", a.name.clone());
        let mut vlan = vlans.get(filters).await?;
        vlan.adopt(self.owner_handle());
        Ok(vlan)
    }

    /// Copy of the adapter for sub-resources to point back at, without its
    /// own relationships and sub-resources.
    fn owner_handle(&self) -> NetworkAdapter {
        Entity {
            tracked: self.tracked.clone(),
            scope: self.scope.clone(),
            relations: Relations::default(),
            lazy: AdapterLazy::default(),
            service: self.service.clone(),
        }
    }

    /// Connects the adapter to `switch`.
    pub async fn connect(&mut self, switch: &str) -> Result<&mut Self> {
        self.requires(&["name", "computer_name", "vm_name"])?;
        info!(name = ?self.attributes().name, switch, "connecting network adapter");
        let params = address(self.attributes())
            .with("switch_name", switch)
            .with("passthru", true)
            .merge(reply_shape(self));
        let reply = self
            .service
            .invoke(CONNECT_VM_NETWORK_ADAPTER, params)
            .await?;
        let mut record = self.select_reply(reply, CONNECT_VM_NETWORK_ADAPTER)?;
        record.insert("switch_name".to_string(), Value::from(switch));
        self.merge_record(record)?;
        Ok(self)
    }

    /// Disconnects the adapter from its switch.
    pub async fn disconnect(&mut self) -> Result<&mut Self> {
        self.requires(&["name", "computer_name", "vm_name"])?;
        info!(name = ?self.attributes().name, "disconnecting network adapter");
        let params = address(self.attributes())
            .with("passthru", true)
            .merge(reply_shape(self));
        let reply = self
            .service
            .invoke(DISCONNECT_VM_NETWORK_ADAPTER, params)
            .await?;
        let mut record = self.select_reply(reply, DISCONNECT_VM_NETWORK_ADAPTER)?;
        record.insert("switch_name".to_string(), Value::Null);
        self.merge_record(record)?;
        Ok(self)
    }

    /// Switch named by `switch_name` on the adapter's host.
    pub async fn switch(&mut self) -> Result<Option<&Switch>> {
        if !self.relations.switch.is_resolved() {
            let a = self.attributes();
            let Some(switch) = a.switch_name.clone() else {
                return Ok(None);
            };
            debug!(switch = %switch, "resolving virtual switch");
            let filters = SwitchAttrs::identity_filter(&switch)
                .with_opt("computer_name", a.computer_name.clone());
            let resolved = found(self.service.switches().get(filters).await)?;
            self.relations.switch.set(resolved);
        }
        Ok(self.relations.switch.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_ip_address_string_is_no_addresses() {
        let attrs = NetworkAdapterAttrs::from_record(
            json!({"name": "eth0", "ip_addresses": ""})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(attrs.ip_addresses, Some(vec![]));
    }

    #[test]
    fn defaults_fill_unset_attributes() {
        let attrs = NetworkAdapterAttrs::default().with_defaults();
        assert_eq!(attrs.name.as_deref(), Some("Network Adapter"));
        assert_eq!(attrs.dynamic_mac_address_enabled, Some(true));

        let explicit = NetworkAdapterAttrs {
            name: Some("eth0".into()),
            dynamic_mac_address_enabled: Some(false),
            ..Default::default()
        }
        .with_defaults();
        assert_eq!(explicit.name.as_deref(), Some("eth0"));
        assert_eq!(explicit.dynamic_mac_address_enabled, Some(false));
    }

    #[test]
    fn echoed_prefers_reply_values() {
        let record = json!({"name": "eth1", "vm_name": null})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(
            echoed(&record, "name", &Some("eth0".into())),
            Some(json!("eth1"))
        );
        assert_eq!(
            echoed(&record, "vm_name", &Some("VM1".into())),
            Some(json!("VM1"))
        );
        assert_eq!(echoed(&record, "computer_name", &None), None);
    }
}
