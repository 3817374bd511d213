use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{anyhow, bail, Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::Timestamp;

/// Source value when no origin metadata is available.
pub const UNKNOWN_SOURCE: &str = "UNKNOWN";
/// Source value when more than one origin contributed to an aggregate.
pub const MIXED_SOURCE: &str = "mixed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMethod {
    #[default]
    Unknown,
    AutomaticallyRecorded,
    ActivelyRecorded,
    ManualEntry,
}

impl RecordingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingMethod::Unknown => "unknown",
            RecordingMethod::AutomaticallyRecorded => "automatically_recorded",
            RecordingMethod::ActivelyRecorded => "actively_recorded",
            RecordingMethod::ManualEntry => "manual_entry",
        }
    }
}

impl fmt::Display for RecordingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordingMethod {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "unknown" => Ok(RecordingMethod::Unknown),
            "automatically_recorded" => Ok(RecordingMethod::AutomaticallyRecorded),
            "actively_recorded" => Ok(RecordingMethod::ActivelyRecorded),
            "manual_entry" => Ok(RecordingMethod::ManualEntry),
            other => Err(anyhow!("unknown recording method '{other}'")),
        }
    }
}

/// One normalised observation. Serialised as the camelCase JSON object the
/// backend accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLogEntry {
    pub id: String,
    pub log_type: String,
    pub data_type: String,
    pub value: f64,
    pub source: String,
    pub start_date_time: Timestamp,
    pub end_date_time: Timestamp,
    pub unit: String,
    pub recording_method: RecordingMethod,
    pub device_id: Option<String>,
    pub device_type: Option<String>,
    /// Lookup-only back reference to the session entry this row was cut from.
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_properties: BTreeMap<String, serde_json::Value>,
    /// Every post attempt, oldest first. Append-only.
    #[serde(default)]
    pub post_date_times: Vec<Timestamp>,
}

impl DataLogEntry {
    pub fn new(
        log_type: impl Into<String>,
        data_type: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        start_date_time: Timestamp,
        end_date_time: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            log_type: log_type.into(),
            data_type: data_type.into(),
            value,
            source: UNKNOWN_SOURCE.to_string(),
            start_date_time,
            end_date_time,
            unit: unit.into(),
            recording_method: RecordingMethod::Unknown,
            device_id: None,
            device_type: None,
            parent_id: None,
            additional_properties: BTreeMap::new(),
            post_date_times: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            bail!("data log has an empty id");
        }
        if self.start_date_time > self.end_date_time {
            bail!(
                "data log {} starts after it ends ({} > {})",
                self.id,
                self.start_date_time,
                self.end_date_time
            );
        }
        if !self.value.is_finite() {
            bail!("data log {} has a non-finite value", self.id);
        }
        Ok(())
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end_date_time - self.start_date_time).num_milliseconds()
    }

    pub fn record_post_attempt(&mut self, at: Timestamp) {
        self.post_date_times.push(at);
    }
}
