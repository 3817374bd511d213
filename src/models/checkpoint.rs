use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Last confirmed-successful timestamp for one record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub record_type: String,
    pub last_successful_at: Timestamp,
}
