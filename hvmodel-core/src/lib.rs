//! Change-tracked Hyper-V resource models.
//!
//! Entities mirror remote Hyper-V objects (virtual machines, hosts, switches,
//! network adapters and their VLAN settings, drives). Every read and write is
//! a named remote operation issued through a [`RemoteInvoker`]; entities keep
//! a snapshot of the last confirmed remote state so saves only send what
//! changed.

pub mod collection;
pub mod config;
pub mod entity;
pub mod error;
pub mod invoker;
pub mod models;
pub mod powershell;
pub mod relations;
pub mod schema;
pub mod service;
pub mod test_util;
pub mod tracker;

pub use collection::{Collection, Scope};
pub use config::ServiceConfig;
pub use entity::{Entity, Resource};
pub use error::{Error, Result};
pub use invoker::{Params, Record, RemoteInvoker, Reply};
pub use models::*;
pub use powershell::PowerShellInvoker;
pub use relations::ParentRef;
pub use service::Service;
