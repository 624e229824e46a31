//! Hyper-V resource kinds.

pub mod cluster;
pub mod drive;
pub mod host;
pub mod network_adapter;
pub mod server;
pub mod switch;
pub mod vlan;

pub use cluster::{Cluster, ClusterAttrs};
pub use drive::{DvdDrive, DvdDriveAttrs, HardDrive, HardDriveAttrs};
pub use host::{Host, HostAttrs};
pub use network_adapter::{AdapterLazy, NetworkAdapter, NetworkAdapterAttrs};
pub use server::{Server, ServerAttrs};
pub use switch::{Switch, SwitchAttrs};
pub use vlan::{NetworkAdapterVlan, NetworkAdapterVlanAttrs, VlanMode};

/// Lenient decoders for values PowerShell serialises inconsistently.
pub(crate) mod de {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Accepts strings, numbers (enum ordinals) and booleans as a string.
    pub fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(D::Error::custom(format!(
                "expected a scalar, got {}",
                other
            ))),
        }
    }

    /// Accepts a list, a single string, or `""` for an empty list.
    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
        match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(Some(Vec::new())),
            Some(Value::String(s)) => Ok(Some(vec![s])),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(D::Error::custom(format!(
                        "expected a string list item, got {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(D::Error::custom(format!(
                "expected a string list, got {}",
                other
            ))),
        }
    }

}
