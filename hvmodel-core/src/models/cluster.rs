//! Failover clusters. Read only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Resource};
use crate::invoker::Params;
use crate::schema::{AttributeDef, Attributes, Schema};

const GET_CLUSTER: &str = "get_cluster";

pub type Cluster = Entity<ClusterAttrs>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterAttrs {
    pub id: Option<String>,
    pub name: Option<String>,
    pub domain: Option<String>,
}

impl Attributes for ClusterAttrs {
    const SCHEMA: &'static Schema = &Schema {
        kind: "cluster",
        attributes: &[
            AttributeDef::string("id"),
            AttributeDef::string("name"),
            AttributeDef::string("domain"),
            AttributeDef::list("nodes").lazy(),
        ],
    };

    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[async_trait]
impl Resource for ClusterAttrs {
    const GET_OPERATION: &'static str = GET_CLUSTER;
    type Lazy = ();

    fn reload_filters(attributes: &Self) -> Params {
        Params::new().with_opt("name", attributes.name.clone())
    }
}
