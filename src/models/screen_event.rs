use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// One screen lock or unlock transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenEvent {
    pub id: i64,
    pub locked: bool,
    pub occurred_at: Timestamp,
}
