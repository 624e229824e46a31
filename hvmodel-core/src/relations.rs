//! Cached relationship handles.
//!
//! Relationships are never serialised and never invalidated: once a lookup
//! has run, its outcome (including "nothing found") sticks for the lifetime of
//! the entity holding it.

use crate::error::Result;
use crate::models::{Cluster, Host, NetworkAdapter, Server, Switch};

/// Outcome of resolving one relationship.
#[derive(Debug, Clone, Default)]
pub enum Link<T> {
    #[default]
    Unresolved,
    Resolved(Option<Box<T>>),
}

impl<T> Link<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Link::Resolved(_))
    }

    /// True when a lookup ran and produced an entity.
    pub fn is_present(&self) -> bool {
        matches!(self, Link::Resolved(Some(_)))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Link::Resolved(Some(value)) => Some(value),
            _ => None,
        }
    }

    pub fn set(&mut self, value: Option<T>) {
        *self = Link::Resolved(value.map(Box::new));
    }
}

/// Relationship caches carried by every entity.
#[derive(Debug, Clone, Default)]
pub struct Relations {
    pub interface: Link<NetworkAdapter>,
    pub vm: Link<Server>,
    pub computer: Link<Host>,
    pub cluster: Link<Cluster>,
    pub switch: Link<Switch>,
}

/// Logical owner of an entity.
#[derive(Debug, Clone, Copy)]
pub enum ParentRef<'a> {
    Interface(&'a NetworkAdapter),
    Vm(&'a Server),
    Computer(&'a Host),
    Cluster(&'a Cluster),
}

impl ParentRef<'_> {
    pub fn name(&self) -> Option<&str> {
        match self {
            ParentRef::Interface(adapter) => adapter.attributes().name.as_deref(),
            ParentRef::Vm(vm) => vm.attributes().name.as_deref(),
            ParentRef::Computer(host) => host.attributes().name.as_deref(),
            ParentRef::Cluster(cluster) => cluster.attributes().name.as_deref(),
        }
    }
}

/// Turns a failed lookup into "nothing there" when the remote side simply
/// found no match; other failures propagate.
pub(crate) fn found<T>(lookup: Result<T>) -> Result<Option<T>> {
    match lookup {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn link_lifecycle() {
        let mut link: Link<u32> = Link::default();
        assert!(!link.is_resolved());
        assert!(link.get().is_none());

        link.set(None);
        assert!(link.is_resolved());
        assert!(!link.is_present());

        link.set(Some(7));
        assert!(link.is_present());
        assert_eq!(link.get(), Some(&7));
    }

    #[test]
    fn found_maps_not_found_to_none() {
        let missing: Result<u32> = Err(Error::NotFound {
            kind: "virtual machine",
            filters: "name=VM1".into(),
        });
        assert!(found(missing).unwrap().is_none());
        assert_eq!(found(Ok(3)).unwrap(), Some(3));

        let failed: Result<u32> = Err(Error::Transport("broken pipe".into()));
        assert!(found(failed).is_err());
    }
}
