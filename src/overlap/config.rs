use serde::{Deserialize, Serialize};

use crate::models::log_types;

/// Tunables for the overlap filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    /// Log types whose entries are checked for overlaps. Everything else
    /// passes through untouched.
    pub scrutinized_log_types: Vec<String>,

    /// Treat each source as its own stream instead of reconciling all
    /// sources of a log type against each other.
    pub per_source: bool,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            scrutinized_log_types: vec![log_types::ACTIVITY.to_string()],
            per_source: false,
        }
    }
}

impl OverlapConfig {
    pub fn is_scrutinized(&self, log_type: &str) -> bool {
        self.scrutinized_log_types.iter().any(|t| t == log_type)
    }
}
