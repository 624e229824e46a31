//! VLAN settings of network adapters.
//!
//! A VLAN setting has no lifecycle of its own: it always exists for an
//! adapter, so saving it reconfigures the adapter and destroying it resets
//! the adapter to untagged traffic.

use std::fmt;

use async_trait::async_trait;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use super::de as loose;
use super::NetworkAdapter;
use crate::collection::Scope;
use crate::entity::{Entity, Resource};
use crate::error::{Error, Result};
use crate::invoker::{JSON_DEPTH, Params, RETURN_FIELDS};
use crate::schema::{AttributeDef, Attributes, Schema, inherit};

const GET_VM_NETWORK_ADAPTER_VLAN: &str = "get_vm_network_adapter_vlan";
const SET_VM_NETWORK_ADAPTER_VLAN: &str = "set_vm_network_adapter_vlan";

pub type NetworkAdapterVlan = Entity<NetworkAdapterVlanAttrs>;

/// Tagging mode of an adapter's traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum VlanMode {
    #[default]
    Untagged,
    Access,
    Trunk,
    Private,
}

impl VlanMode {
    fn from_ordinal(ordinal: u64) -> Option<Self> {
        match ordinal {
            0 => Some(VlanMode::Untagged),
            1 => Some(VlanMode::Access),
            2 => Some(VlanMode::Trunk),
            3 => Some(VlanMode::Private),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "untagged" => Some(VlanMode::Untagged),
            "access" => Some(VlanMode::Access),
            "trunk" => Some(VlanMode::Trunk),
            "private" => Some(VlanMode::Private),
            _ => None,
        }
    }
}

struct VlanModeVisitor;

impl Visitor<'_> for VlanModeVisitor {
    type Value = VlanMode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a VLAN operation mode name or ordinal 0..=3")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<VlanMode, E> {
        VlanMode::from_ordinal(v)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<VlanMode, E> {
        u64::try_from(v)
            .ok()
            .and_then(VlanMode::from_ordinal)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<VlanMode, E> {
        VlanMode::from_name(v).ok_or_else(|| E::unknown_variant(v, &["Untagged", "Access", "Trunk", "Private"]))
    }
}

impl<'de> Deserialize<'de> for VlanMode {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        d.deserialize_any(VlanModeVisitor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkAdapterVlanAttrs {
    pub computer_name: Option<String>,
    pub vm_name: Option<String>,
    pub vm_network_adapter_name: Option<String>,
    pub operation_mode: Option<VlanMode>,
    pub access_vlan_id: Option<u16>,
    pub native_vlan_id: Option<u16>,
    #[serde(deserialize_with = "loose::loose_string")]
    pub allowed_vlan_id_list: Option<String>,
}

impl Attributes for NetworkAdapterVlanAttrs {
    const SCHEMA: &'static Schema = &Schema {
        kind: "network adapter VLAN setting",
        attributes: &[
            AttributeDef::string("computer_name"),
            AttributeDef::string("vm_name"),
            AttributeDef::string("vm_network_adapter_name"),
            AttributeDef::string("operation_mode"),
            AttributeDef::integer("access_vlan_id"),
            AttributeDef::integer("native_vlan_id"),
            AttributeDef::string("allowed_vlan_id_list"),
            AttributeDef::reference("parent_adapter").lazy(),
        ],
    };

    fn computer_name(&self) -> Option<&str> {
        self.computer_name.as_deref()
    }

    fn vm_name(&self) -> Option<&str> {
        self.vm_name.as_deref()
    }

    fn adapter_name(&self) -> Option<&str> {
        self.vm_network_adapter_name.as_deref()
    }

    fn apply_scope(&mut self, scope: &Scope) {
        inherit(&mut self.computer_name, &scope.computer_name);
        inherit(&mut self.vm_name, &scope.vm_name);
    }

    // Replies describe the setting, not the adapter it belongs to.
    fn carry_address(&mut self, previous: &Self) {
        inherit(&mut self.computer_name, &previous.computer_name);
        inherit(&mut self.vm_name, &previous.vm_name);
        inherit(
            &mut self.vm_network_adapter_name,
            &previous.vm_network_adapter_name,
        );
    }
}

#[async_trait]
impl Resource for NetworkAdapterVlanAttrs {
    const GET_OPERATION: &'static str = GET_VM_NETWORK_ADAPTER_VLAN;
    type Lazy = ();

    fn identity_filter(key: &str) -> Params {
        Params::new().with("vm_network_adapter_name", key)
    }

    fn reload_filters(attributes: &Self) -> Params {
        address(attributes)
    }

    async fn save(vlan: &mut NetworkAdapterVlan) -> Result<()> {
        vlan.requires(&["computer_name", "vm_name", "vm_network_adapter_name"])?;
        let a = vlan.attributes();
        let mode = a.operation_mode.unwrap_or_default();
        info!(adapter = ?a.vm_network_adapter_name, vm = ?a.vm_name, ?mode, "setting VLAN mode");

        let mut params = address(a).with("passthru", true);
        match mode {
            VlanMode::Untagged => params.set("untagged", true),
            VlanMode::Access => {
                vlan.requires(&["access_vlan_id"])?;
                params = params
                    .with("access", true)
                    .with_opt("vlan_id", a.access_vlan_id);
            }
            VlanMode::Trunk => {
                vlan.requires(&["native_vlan_id", "allowed_vlan_id_list"])?;
                params = params
                    .with("trunk", true)
                    .with_opt("native_vlan_id", a.native_vlan_id)
                    .with_opt("allowed_vlan_id_list", a.allowed_vlan_id_list.clone());
            }
            VlanMode::Private => {
                return Err(Error::Unsupported {
                    kind: Self::SCHEMA.kind,
                    operation: "configure private VLAN",
                });
            }
        }
        let params = params
            .with(RETURN_FIELDS, Self::SCHEMA.return_fields())
            .with(JSON_DEPTH, vlan.service.config().json_depth);
        let reply = vlan
            .service
            .invoke(SET_VM_NETWORK_ADAPTER_VLAN, params)
            .await?;
        vlan.merge_reply(reply, SET_VM_NETWORK_ADAPTER_VLAN)
    }

    async fn destroy(vlan: &NetworkAdapterVlan) -> Result<()> {
        vlan.requires(&["computer_name", "vm_name", "vm_network_adapter_name"])?;
        let a = vlan.attributes();
        info!(adapter = ?a.vm_network_adapter_name, vm = ?a.vm_name, "resetting VLAN setting");
        let params = address(a).with("untagged", true);
        vlan.service
            .invoke(SET_VM_NETWORK_ADAPTER_VLAN, params)
            .await?;
        Ok(())
    }
}

fn address(a: &NetworkAdapterVlanAttrs) -> Params {
    Params::new()
        .with_opt("computer_name", a.computer_name.clone())
        .with_opt("vm_name", a.vm_name.clone())
        .with_opt("vm_network_adapter_name", a.vm_network_adapter_name.clone())
}

impl NetworkAdapterVlan {
    /// Points the setting at `adapter`'s current address and records the
    /// adapter as its owner.
    pub(crate) fn attach(&mut self, adapter: NetworkAdapter) {
        let owner = adapter.attributes();
        let a = self.attributes_mut();
        a.computer_name.clone_from(&owner.computer_name);
        a.vm_name.clone_from(&owner.vm_name);
        a.vm_network_adapter_name.clone_from(&owner.name);
        self.set_interface(adapter);
    }

    /// Attaches a setting whose remote state is known without marking its
    /// address dirty.
    pub(crate) fn adopt(&mut self, adapter: NetworkAdapter) {
        self.attach(adapter);
        if self.is_persisted() {
            self.tracked.rebaseline();
        }
    }

    pub fn mode(&self) -> VlanMode {
        self.attributes().operation_mode.unwrap_or_default()
    }

    /// Tags all traffic with `vlan_id`.
    pub fn set_access(&mut self, vlan_id: u16) -> &mut Self {
        let a = self.attributes_mut();
        a.operation_mode = Some(VlanMode::Access);
        a.access_vlan_id = Some(vlan_id);
        self
    }

    /// Carries `allowed` VLANs, leaving `native_vlan_id` untagged.
    pub fn set_trunk(&mut self, native_vlan_id: u16, allowed: impl Into<String>) -> &mut Self {
        let a = self.attributes_mut();
        a.operation_mode = Some(VlanMode::Trunk);
        a.native_vlan_id = Some(native_vlan_id);
        a.allowed_vlan_id_list = Some(allowed.into());
        self
    }

    pub fn set_untagged(&mut self) -> &mut Self {
        self.attributes_mut().operation_mode = Some(VlanMode::Untagged);
        self
    }
}
