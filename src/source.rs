//! The platform health store, seen as an external data source.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{RecordingMethod, SensorType};
use crate::time::Timestamp;

/// A child interval of a session-style record (a sleep stage, an exercise
/// lap).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSegment {
    pub data_type: String,
    pub value: f64,
    pub unit: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// One record as the health store reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// The store's own id for the record, when it has one.
    pub source_id: Option<String>,
    pub data_type: String,
    pub value: f64,
    pub unit: String,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Package name of the app that wrote the record.
    pub origin: Option<String>,
    pub last_modified: Timestamp,
    pub recording_method: RecordingMethod,
    pub device_id: Option<String>,
    pub device_type: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub segments: Vec<RecordSegment>,
}

impl RawRecord {
    pub fn new(
        data_type: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        start: Timestamp,
        end: Timestamp,
    ) -> Self {
        Self {
            source_id: None,
            data_type: data_type.into(),
            value,
            unit: unit.into(),
            start,
            end,
            origin: None,
            last_modified: end,
            recording_method: RecordingMethod::Unknown,
            device_id: None,
            device_type: None,
            metadata: BTreeMap::new(),
            segments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPeriod {
    Hour,
    Day,
}

impl AggregationPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationPeriod::Hour => "hour",
            AggregationPeriod::Day => "day",
        }
    }
}

impl fmt::Display for AggregationPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pre-aggregated value over one period.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBucket {
    pub data_type: String,
    pub value: f64,
    pub unit: String,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Every origin that contributed to the bucket.
    pub origins: Vec<String>,
}

#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Records modified strictly after `since`.
    async fn query_records(&self, sensor: SensorType, since: Timestamp) -> Result<Vec<RawRecord>>;

    async fn query_aggregates(
        &self,
        sensor: SensorType,
        period: AggregationPeriod,
        since: Timestamp,
    ) -> Result<Vec<AggregateBucket>>;
}
