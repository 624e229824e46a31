//! Hard disk and DVD drives attached to virtual machines.
//!
//! Drives have no stable name on the remote side; they are addressed by the
//! VM plus the controller slot they occupy. Moving a drive is an update that
//! names the old slot and the new one (`to_controller_*`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::de;
use crate::collection::Scope;
use crate::entity::{Entity, Resource};
use crate::error::Result;
use crate::invoker::{IDENTITY, JSON_DEPTH, Params, RETURN_FIELDS};
use crate::schema::{AttributeDef, Attributes, Schema, inherit};

pub type HardDrive = Entity<HardDriveAttrs>;
pub type DvdDrive = Entity<DvdDriveAttrs>;

/// Controller position a drive occupies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Slot {
    controller_type: Option<String>,
    controller_number: Option<u32>,
    controller_location: Option<u32>,
}

impl Slot {
    fn params(&self, prefix: &str, typed: bool) -> Params {
        let mut params = Params::new()
            .with_opt(
                &format!("{prefix}controller_number"),
                self.controller_number,
            )
            .with_opt(
                &format!("{prefix}controller_location"),
                self.controller_location,
            );
        if typed {
            params = params.with_opt(
                &format!("{prefix}controller_type"),
                self.controller_type.clone(),
            );
        }
        params
    }
}

/// Behaviour shared by both drive kinds.
trait Drive: Resource {
    /// Cmdlet noun, e.g. `vm_hard_disk_drive`.
    const NOUN: &'static str;
    /// Whether the cmdlets take a controller type.
    const TYPED_CONTROLLER: bool;
    /// Media attributes sent when they change.
    const MEDIA: &'static [&'static str];

    fn slot(&self) -> Slot;

    /// Media arguments for a new drive.
    fn media(&self) -> Params;
}

fn vm_address<D: Drive>(a: &D) -> Params {
    Params::new()
        .with_opt("computer_name", a.computer_name())
        .with_opt("vm_name", a.vm_name())
}

fn reload_drive<D: Drive>(a: &D) -> Params {
    vm_address(a)
        .merge(a.slot().params("", D::TYPED_CONTROLLER))
        .with_opt(IDENTITY, a.identity())
}

async fn save_drive<D: Drive>(drive: &mut Entity<D>) -> Result<()> {
    drive.requires(&["vm_name"])?;
    let (operation, params) = {
        let a = drive.attributes();
        match drive.snapshot() {
            None => {
                info!(kind = D::SCHEMA.kind, vm = ?a.vm_name(), slot = ?a.slot(), "adding drive");
                let params = vm_address(a)
                    .merge(a.slot().params("", D::TYPED_CONTROLLER))
                    .merge(a.media())
                    .with("passthru", true);
                (format!("add_{}", D::NOUN), params)
            }
            Some(snapshot) => {
                let old = snapshot.attributes();
                info!(kind = D::SCHEMA.kind, vm = ?old.vm_name(), changes = ?drive.dirty(), "updating drive");
                let mut params = vm_address(old)
                    .merge(old.slot().params("", D::TYPED_CONTROLLER))
                    .with("passthru", true);
                let slot = a.slot();
                if slot != old.slot() {
                    params = params.merge(slot.params("to_", D::TYPED_CONTROLLER));
                }
                for attribute in D::MEDIA {
                    if let Some(value) = drive.changed_value(attribute) {
                        params.set(attribute, value);
                    }
                }
                (format!("set_{}", D::NOUN), params)
            }
        }
    };
    let params = params
        .with(RETURN_FIELDS, D::SCHEMA.return_fields())
        .with(JSON_DEPTH, drive.service.config().json_depth);
    let reply = drive.service.invoke(&operation, params).await?;
    drive.merge_reply(reply, &operation)
}

async fn destroy_drive<D: Drive>(drive: &Entity<D>) -> Result<()> {
    drive.requires(&["vm_name"])?;
    let a = drive.attributes();
    info!(kind = D::SCHEMA.kind, vm = ?a.vm_name(), slot = ?a.slot(), "removing drive");
    let params = vm_address(a).merge(a.slot().params("", D::TYPED_CONTROLLER));
    drive
        .service
        .invoke(&format!("remove_{}", D::NOUN), params)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardDriveAttrs {
    pub id: Option<String>,
    pub name: Option<String>,
    pub computer_name: Option<String>,
    pub vm_name: Option<String>,
    #[serde(deserialize_with = "de::loose_string")]
    pub controller_type: Option<String>,
    pub controller_number: Option<u32>,
    pub controller_location: Option<u32>,
    pub path: Option<String>,
    pub disk_number: Option<u32>,
}

impl Attributes for HardDriveAttrs {
    const SCHEMA: &'static Schema = &Schema {
        kind: "hard disk drive",
        attributes: &[
            AttributeDef::string("id"),
            AttributeDef::string("name"),
            AttributeDef::string("computer_name"),
            AttributeDef::string("vm_name"),
            AttributeDef::string("controller_type"),
            AttributeDef::integer("controller_number"),
            AttributeDef::integer("controller_location"),
            AttributeDef::string("path"),
            AttributeDef::integer("disk_number"),
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

impl Drive for HardDriveAttrs {
    const NOUN: &'static str = "vm_hard_disk_drive";
    const TYPED_CONTROLLER: bool = true;
    const MEDIA: &'static [&'static str] = &["path", "disk_number"];

    fn slot(&self) -> Slot {
        Slot {
            controller_type: self.controller_type.clone(),
            controller_number: self.controller_number,
            controller_location: self.controller_location,
        }
    }

    fn media(&self) -> Params {
        Params::new()
            .with_opt("path", self.path.clone())
            .with_opt("disk_number", self.disk_number)
    }
}

#[async_trait]
impl Resource for HardDriveAttrs {
    const GET_OPERATION: &'static str = "get_vm_hard_disk_drive";
    type Lazy = ();

    fn identity_filter(key: &str) -> Params {
        Params::new().with("vm_name", key)
    }

    fn reload_filters(attributes: &Self) -> Params {
        reload_drive(attributes)
    }

    async fn save(drive: &mut HardDrive) -> Result<()> {
        save_drive(drive).await
    }

    async fn destroy(drive: &HardDrive) -> Result<()> {
        destroy_drive(drive).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DvdDriveAttrs {
    pub id: Option<String>,
    pub name: Option<String>,
    pub computer_name: Option<String>,
    pub vm_name: Option<String>,
    #[serde(deserialize_with = "de::loose_string")]
    pub controller_type: Option<String>,
    pub controller_number: Option<u32>,
    pub controller_location: Option<u32>,
    pub path: Option<String>,
}

impl Attributes for DvdDriveAttrs {
    const SCHEMA: &'static Schema = &Schema {
        kind: "DVD drive",
        attributes: &[
            AttributeDef::string("id"),
            AttributeDef::string("name"),
            AttributeDef::string("computer_name"),
            AttributeDef::string("vm_name"),
            AttributeDef::string("controller_type"),
            AttributeDef::integer("controller_number"),
            AttributeDef::integer("controller_location"),
            AttributeDef::string("path"),
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

impl Drive for DvdDriveAttrs {
    const NOUN: &'static str = "vm_dvd_drive";
    const TYPED_CONTROLLER: bool = false;
    const MEDIA: &'static [&'static str] = &["path"];

    fn slot(&self) -> Slot {
        Slot {
            controller_type: self.controller_type.clone(),
            controller_number: self.controller_number,
            controller_location: self.controller_location,
        }
    }

    fn media(&self) -> Params {
        Params::new().with_opt("path", self.path.clone())
    }
}

#[async_trait]
impl Resource for DvdDriveAttrs {
    const GET_OPERATION: &'static str = "get_vm_dvd_drive";
    type Lazy = ();

    fn identity_filter(key: &str) -> Params {
        Params::new().with("vm_name", key)
    }

    fn reload_filters(attributes: &Self) -> Params {
        reload_drive(attributes)
    }

    async fn save(drive: &mut DvdDrive) -> Result<()> {
        save_drive(drive).await
    }

    async fn destroy(drive: &DvdDrive) -> Result<()> {
        destroy_drive(drive).await
    }
}

impl DvdDrive {
    /// Inserts the ISO image at `path`.
    pub async fn insert(&mut self, path: impl Into<String>) -> Result<&mut Self> {
        self.attributes_mut().path = Some(path.into());
        self.save().await
    }
}
