//! Change-tracked entities.
//!
//! An [`Entity`] composes a kind's typed attributes with its snapshot, its
//! collection scope, cached relationships and lazily loaded sub-resources.
//! Kind-specific reconciliation lives in the [`Resource`] implementation of
//! the attribute type.

use std::collections::BTreeSet;
use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::collection::{Collection, Scope};
use crate::error::{Error, Result};
use crate::invoker::{IDENTITY, Params, Record, Reply};
use crate::models::{
    Cluster, ClusterAttrs, Host, HostAttrs, NetworkAdapter, NetworkAdapterAttrs, Server,
    ServerAttrs,
};
use crate::relations::{ParentRef, Relations, found};
use crate::schema::Attributes;
use crate::service::Service;
use crate::tracker::{Snapshot, Tracked};

/// Remote lifecycle of a resource kind.
#[async_trait]
pub trait Resource: Attributes {
    /// Remote operation listing and fetching this kind.
    const GET_OPERATION: &'static str;

    /// Lazily loaded sub-resources owned by an entity of this kind.
    type Lazy: Default + Clone + Debug + Send + Sync;

    /// Filters locating one resource from a user supplied key.
    fn identity_filter(key: &str) -> Params {
        Params::new().with("name", key)
    }

    /// Filters re-fetching the canonical representation of `attributes`.
    fn reload_filters(attributes: &Self) -> Params {
        Params::new()
            .with_opt("name", attributes.name())
            .with_opt("computer_name", attributes.computer_name())
            .with_opt("vm_name", attributes.vm_name())
            .with_opt(IDENTITY, attributes.identity())
    }

    async fn save(_entity: &mut Entity<Self>) -> Result<()> {
        Err(Error::Unsupported {
            kind: Self::SCHEMA.kind,
            operation: "save",
        })
    }

    async fn destroy(_entity: &Entity<Self>) -> Result<()> {
        Err(Error::Unsupported {
            kind: Self::SCHEMA.kind,
            operation: "destroy",
        })
    }
}

/// A change-tracked, in-memory representation of one remote resource.
#[derive(Debug, Clone)]
pub struct Entity<A: Resource> {
    pub(crate) tracked: Tracked<A>,
    pub(crate) scope: Scope,
    pub(crate) relations: Relations,
    pub(crate) lazy: A::Lazy,
    pub(crate) service: Service,
}

impl<A: Resource> Entity<A> {
    /// Builds an entity the remote side does not know about yet.
    pub(crate) fn new(service: Service, scope: Scope, attributes: A) -> Self {
        let mut attributes = attributes.with_defaults();
        attributes.apply_scope(&scope);
        Self {
            tracked: Tracked::new(attributes),
            scope,
            relations: Relations::default(),
            lazy: A::Lazy::default(),
            service,
        }
    }

    /// Wraps attributes read from the remote side.
    pub(crate) fn from_remote(service: Service, scope: Scope, mut attributes: A) -> Self {
        attributes.apply_scope(&scope);
        Self {
            tracked: Tracked::persisted(attributes),
            scope,
            relations: Relations::default(),
            lazy: A::Lazy::default(),
            service,
        }
    }

    pub fn attributes(&self) -> &A {
        self.tracked.get()
    }

    pub fn attributes_mut(&mut self) -> &mut A {
        self.tracked.get_mut()
    }

    pub fn snapshot(&self) -> Option<&Snapshot<A>> {
        self.tracked.snapshot()
    }

    pub fn is_persisted(&self) -> bool {
        self.tracked.is_persisted()
    }

    pub fn identity(&self) -> Option<&str> {
        self.tracked.get().identity()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn dirty(&self) -> BTreeSet<&'static str> {
        self.tracked.dirty()
    }

    pub fn is_dirty(&self) -> bool {
        self.tracked.is_dirty()
    }

    pub fn changed(&self, name: &str) -> bool {
        self.tracked.changed(name)
    }

    pub fn changed_value(&self, name: &str) -> Option<Value> {
        self.tracked.changed_value(name)
    }

    /// Fails with [`Error::Precondition`] unless every named attribute holds a value.
    pub fn requires(&self, names: &[&'static str]) -> Result<()> {
        let record = self.tracked.get().to_record();
        let missing: Vec<&'static str> = names
            .iter()
            .copied()
            .filter(|name| record.get(*name).is_none_or(Value::is_null))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Precondition {
                kind: A::SCHEMA.kind,
                missing,
            })
        }
    }

    /// The collection this entity belongs to.
    pub fn collection(&self) -> Collection<A> {
        Collection::scoped(self.service.clone(), self.scope.clone())
    }

    /// Collapses a reply to the record describing this entity.
    pub(crate) fn select_reply(&self, reply: Reply, operation: &str) -> Result<Record> {
        reply.select(self.identity()).ok_or_else(|| Error::NotFound {
            kind: A::SCHEMA.kind,
            filters: match self.identity() {
                Some(id) => format!("id={} in reply to {}", id, operation),
                None => format!("empty reply to {}", operation),
            },
        })
    }

    /// Merges a confirmed remote record and re-baselines the snapshot.
    pub(crate) fn merge_record(&mut self, record: Record) -> Result<()> {
        self.tracked.merge(record)?;
        self.tracked.rebaseline();
        Ok(())
    }

    pub(crate) fn merge_reply(&mut self, reply: Reply, operation: &str) -> Result<()> {
        let record = self.select_reply(reply, operation)?;
        self.merge_record(record)
    }

    /// Creates or updates the remote resource from local changes.
    pub async fn save(&mut self) -> Result<&mut Self> {
        A::save(self).await?;
        Ok(self)
    }

    /// Deletes the remote resource. The local entity is left untouched.
    pub async fn destroy(&self) -> Result<()> {
        A::destroy(self).await
    }

    /// Re-fetches the resource and replaces both attributes and baseline.
    pub async fn reload(&mut self) -> Result<&mut Self> {
        let filters = A::reload_filters(self.tracked.get());
        let fresh = self.collection().get(filters).await?;
        let mut baseline = fresh.tracked.into_current();
        baseline.carry_address(self.tracked.get());
        self.tracked.merge(baseline.to_record())?;
        self.tracked.replace_snapshot(baseline);
        Ok(self)
    }

    // === Relationships ===

    pub fn set_vm(&mut self, vm: Server) {
        self.relations.vm.set(Some(vm));
    }

    pub fn set_computer(&mut self, host: Host) {
        self.relations.computer.set(Some(host));
    }

    pub fn set_cluster(&mut self, cluster: Cluster) {
        self.relations.cluster.set(Some(cluster));
    }

    pub fn set_interface(&mut self, adapter: NetworkAdapter) {
        self.relations.interface.set(Some(adapter));
    }

    /// Virtual machine named by `vm_name`.
    pub async fn vm(&mut self) -> Result<Option<&Server>> {
        if !self.relations.vm.is_resolved() {
            if self.scope.vm.is_some() {
                return Ok(self.scope.vm.as_deref());
            }
            let Some(vm_name) = self.tracked.get().vm_name().map(str::to_string) else {
                return Ok(None);
            };
            debug!(kind = A::SCHEMA.kind, vm = %vm_name, "resolving virtual machine");
            let filters = ServerAttrs::identity_filter(&vm_name)
                .with_opt("computer_name", self.tracked.get().computer_name());
            let vm = found(self.service.servers().get(filters).await)?;
            self.relations.vm.set(vm);
        }
        Ok(self.relations.vm.get())
    }

    /// Host named by `computer_name`.
    pub async fn computer(&mut self) -> Result<Option<&Host>> {
        if !self.relations.computer.is_resolved() {
            if self.scope.computer.is_some() {
                return Ok(self.scope.computer.as_deref());
            }
            let Some(computer) = self.tracked.get().computer_name().map(str::to_string) else {
                return Ok(None);
            };
            debug!(kind = A::SCHEMA.kind, computer = %computer, "resolving host");
            let host = found(
                self.service
                    .hosts()
                    .get(HostAttrs::identity_filter(&computer))
                    .await,
            )?;
            self.relations.computer.set(host);
        }
        Ok(self.relations.computer.get())
    }

    /// Failover cluster named by `cluster_name`.
    pub async fn cluster(&mut self) -> Result<Option<&Cluster>> {
        if !self.relations.cluster.is_resolved() {
            let Some(cluster) = self.tracked.get().cluster_name().map(str::to_string) else {
                return Ok(None);
            };
            debug!(kind = A::SCHEMA.kind, cluster = %cluster, "resolving cluster");
            let found_cluster = found(
                self.service
                    .clusters()
                    .get(ClusterAttrs::identity_filter(&cluster))
                    .await,
            )?;
            self.relations.cluster.set(found_cluster);
        }
        Ok(self.relations.cluster.get())
    }

    /// Network adapter this entity hangs off.
    pub async fn interface(&mut self) -> Result<Option<&NetworkAdapter>> {
        if !self.relations.interface.is_resolved() {
            let attributes = self.tracked.get();
            let Some(adapter) = attributes.adapter_name().map(str::to_string) else {
                return Ok(None);
            };
            debug!(kind = A::SCHEMA.kind, adapter = %adapter, "resolving network adapter");
            let filters = NetworkAdapterAttrs::identity_filter(&adapter)
                .with_opt("vm_name", attributes.vm_name())
                .with_opt("computer_name", attributes.computer_name());
            let interface = found(self.service.network_adapters().get(filters).await)?;
            self.relations.interface.set(interface);
        }
        Ok(self.relations.interface.get())
    }

    /// Logical owner: an explicitly known adapter, VM, host or cluster first,
    /// then the owner the collection was scoped to, then a lookup by
    /// `vm_name` or `computer_name`.
    pub async fn parent(&mut self) -> Result<Option<ParentRef<'_>>> {
        if self.relations.interface.is_present() {
            return Ok(self.relations.interface.get().map(ParentRef::Interface));
        }
        if self.relations.vm.is_present() {
            return Ok(self.relations.vm.get().map(ParentRef::Vm));
        }
        if self.relations.computer.is_present() {
            return Ok(self.relations.computer.get().map(ParentRef::Computer));
        }
        if self.relations.cluster.is_present() {
            return Ok(self.relations.cluster.get().map(ParentRef::Cluster));
        }
        if self.scope.vm.is_some() {
            return Ok(self.scope.vm.as_deref().map(ParentRef::Vm));
        }
        if self.scope.computer.is_some() {
            return Ok(self.scope.computer.as_deref().map(ParentRef::Computer));
        }
        if self.tracked.get().vm_name().is_some() {
            return Ok(self.vm().await?.map(ParentRef::Vm));
        }
        if self.tracked.get().computer_name().is_some() {
            return Ok(self.computer().await?.map(ParentRef::Computer));
        }
        Ok(None)
    }
}
