//! Service configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by every collection of a [`Service`](crate::Service).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Host injected as scope into host-level collections.
    pub computer_name: Option<String>,
    /// Nesting depth requested for replies.
    pub json_depth: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            computer_name: None,
            json_depth: 1,
        }
    }
}

impl ServiceConfig {
    pub fn with_computer(mut self, computer_name: impl Into<String>) -> Self {
        self.computer_name = Some(computer_name.into());
        self
    }
}
