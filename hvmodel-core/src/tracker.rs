//! Snapshots and change tracking.
//!
//! A [`Tracked`] value pairs the live attribute record with an optional
//! [`Snapshot`] taken the last time the record was confirmed by the remote
//! side. Presence of the snapshot is what makes a resource persisted.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::Result;
use crate::invoker::Record;
use crate::schema::Attributes;

/// Immutable copy of an attribute record at a persisted point.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<A> {
    attributes: A,
}

impl<A: Attributes> Snapshot<A> {
    pub fn capture(attributes: &A) -> Self {
        Self {
            attributes: attributes.clone(),
        }
    }

    pub fn attributes(&self) -> &A {
        &self.attributes
    }
}

/// Live attributes plus their diff baseline.
#[derive(Debug, Clone)]
pub struct Tracked<A> {
    current: A,
    snapshot: Option<Snapshot<A>>,
}

impl<A: Attributes> Tracked<A> {
    /// A record nothing on the remote side knows about yet.
    pub fn new(attributes: A) -> Self {
        Self {
            current: attributes,
            snapshot: None,
        }
    }

    /// A record read from the remote side; baseline equals the record.
    pub fn persisted(attributes: A) -> Self {
        let snapshot = Some(Snapshot::capture(&attributes));
        Self {
            current: attributes,
            snapshot,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn get(&self) -> &A {
        &self.current
    }

    pub fn get_mut(&mut self) -> &mut A {
        &mut self.current
    }

    pub fn snapshot(&self) -> Option<&Snapshot<A>> {
        self.snapshot.as_ref()
    }

    pub fn into_current(self) -> A {
        self.current
    }

    /// Names of tracked attributes whose value differs from the baseline.
    ///
    /// Without a baseline every tracked attribute holding a value is new.
    pub fn dirty(&self) -> BTreeSet<&'static str> {
        let current = self.current.to_record();
        let tracked = A::SCHEMA.tracked_names().into_iter();
        match &self.snapshot {
            None => tracked
                .filter(|name| current.get(*name).is_some_and(|v| !v.is_null()))
                .collect(),
            Some(snapshot) => {
                let base = snapshot.attributes.to_record();
                tracked
                    .filter(|name| {
                        current.get(*name).unwrap_or(&Value::Null)
                            != base.get(*name).unwrap_or(&Value::Null)
                    })
                    .collect()
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    pub fn changed(&self, name: &str) -> bool {
        self.dirty().contains(name)
    }

    /// Current value of `name` if it changed, absent otherwise.
    ///
    /// An attribute changed to null yields `Some(Value::Null)`.
    pub fn changed_value(&self, name: &str) -> Option<Value> {
        if !self.changed(name) {
            return None;
        }
        Some(
            self.current
                .to_record()
                .remove(name)
                .unwrap_or(Value::Null),
        )
    }

    /// Overlays remote fields onto the live record; the remote side wins.
    ///
    /// Fields outside the schema and lazy fields are ignored.
    pub fn merge(&mut self, record: Record) -> Result<()> {
        let mut merged = self.current.to_record();
        for (key, value) in record {
            if A::SCHEMA.contains(&key) && !A::SCHEMA.is_lazy(&key) {
                merged.insert(key, value);
            }
        }
        self.current = A::from_record(merged)?;
        Ok(())
    }

    /// Makes the live record the new baseline.
    pub fn rebaseline(&mut self) {
        self.snapshot = Some(Snapshot::capture(&self.current));
    }

    /// Replaces the baseline with an independently fetched record.
    pub fn replace_snapshot(&mut self, attributes: A) {
        self.snapshot = Some(Snapshot { attributes });
    }
}
