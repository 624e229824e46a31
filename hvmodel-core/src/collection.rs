//! Scoped collections of entities.

use std::marker::PhantomData;

use tracing::debug;

use crate::entity::{Entity, Resource};
use crate::error::{Error, Result};
use crate::invoker::{IDENTITY, JSON_DEPTH, Params, RETURN_FIELDS, Record};
use crate::models::{Host, Server};
use crate::service::Service;

/// Filters fixed for every member of a collection, plus the owning objects
/// the collection was reached through.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub computer_name: Option<String>,
    pub vm_name: Option<String>,
    pub vm: Option<Box<Server>>,
    pub computer: Option<Box<Host>>,
}

impl Scope {
    /// Scope of resources living directly on a host.
    pub fn host(computer_name: Option<String>) -> Self {
        Self {
            computer_name,
            ..Default::default()
        }
    }

    /// Scope of resources owned by a host entity.
    pub fn for_host(host: &Host) -> Self {
        let attributes = host.attributes();
        Self {
            computer_name: attributes
                .computer_name
                .clone()
                .or_else(|| attributes.name.clone()),
            computer: Some(Box::new(host.clone())),
            ..Default::default()
        }
    }

    /// Scope of resources owned by a virtual machine.
    pub fn for_vm(vm: &Server) -> Self {
        let attributes = vm.attributes();
        Self {
            computer_name: attributes.computer_name.clone(),
            vm_name: attributes.name.clone(),
            vm: Some(Box::new(vm.clone())),
            computer: None,
        }
    }

    /// Filters sent with every request of the collection.
    pub fn filters(&self) -> Params {
        Params::new()
            .with_opt("computer_name", self.computer_name.clone())
            .with_opt("vm_name", self.vm_name.clone())
    }
}

/// Typed, scoped view over the entities of one kind.
#[derive(Debug, Clone)]
pub struct Collection<A: Resource> {
    service: Service,
    scope: Scope,
    kind: PhantomData<fn() -> A>,
}

impl<A: Resource> Collection<A> {
    pub fn scoped(service: Service, scope: Scope) -> Self {
        Self {
            service,
            scope,
            kind: PhantomData,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    fn request(&self, filters: Params) -> Params {
        self.scope
            .filters()
            .with(RETURN_FIELDS, A::SCHEMA.return_fields())
            .with(JSON_DEPTH, self.service.config().json_depth)
            .merge(filters)
    }

    /// Lists every matching resource.
    pub async fn all(&self, filters: Params) -> Result<Vec<Entity<A>>> {
        let reply = self
            .service
            .invoke(A::GET_OPERATION, self.request(filters))
            .await?;
        let entities = reply
            .into_records()
            .into_iter()
            .map(|record| self.load(record))
            .collect::<Result<Vec<_>>>()?;
        debug!(kind = A::SCHEMA.kind, count = entities.len(), "listed resources");
        Ok(entities)
    }

    /// Fetches exactly one resource.
    ///
    /// A multi-row reply is collapsed by the `_identity`/`id` filter when one
    /// is given, otherwise to its last row.
    pub async fn get(&self, filters: Params) -> Result<Entity<A>> {
        let identity = filters
            .get_str(IDENTITY)
            .or_else(|| filters.get_str("id"))
            .map(str::to_string);
        let described = self.scope.filters().merge(filters.clone()).describe();
        let reply = self
            .service
            .invoke(A::GET_OPERATION, self.request(filters))
            .await?;
        match reply.select(identity.as_deref()) {
            Some(record) => self.load(record),
            None => Err(Error::NotFound {
                kind: A::SCHEMA.kind,
                filters: described,
            }),
        }
    }

    /// Fetches one resource by the kind's natural key.
    pub async fn get_by(&self, key: &str) -> Result<Entity<A>> {
        self.get(A::identity_filter(key)).await
    }

    /// Wraps one remote row as a persisted entity.
    pub fn load(&self, record: Record) -> Result<Entity<A>> {
        Ok(Entity::from_remote(
            self.service.clone(),
            self.scope.clone(),
            A::from_record(record)?,
        ))
    }

    /// Builds an unpersisted entity; scope values fill whatever the caller left unset.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(&self, attributes: A) -> Entity<A> {
        Entity::new(self.service.clone(), self.scope.clone(), attributes)
    }

    /// Builds and saves a new entity.
    pub async fn create(&self, attributes: A) -> Result<Entity<A>> {
        let mut entity = self.new(attributes);
        entity.save().await?;
        Ok(entity)
    }
}
