use std::collections::BTreeMap;

use anyhow::{Context, Result};

use crate::models::RecordingMethod;
use crate::time::{parse_iso, Timestamp};

pub fn parse_datetime(value: &str, field: &str) -> Result<Timestamp> {
    parse_iso(value).with_context(|| format!("failed to parse {field}"))
}

pub fn parse_recording_method(value: &str) -> Result<RecordingMethod> {
    value.parse().context("failed to parse recording_method")
}

pub fn parse_properties(value: &str) -> Result<BTreeMap<String, serde_json::Value>> {
    serde_json::from_str(value).context("failed to parse additional_properties")
}

pub fn parse_post_date_times(value: &str) -> Result<Vec<Timestamp>> {
    let raw: Vec<String> =
        serde_json::from_str(value).context("failed to parse post_date_times")?;
    raw.iter()
        .map(|item| parse_datetime(item, "post_date_times"))
        .collect()
}

pub fn encode_post_date_times(values: &[Timestamp]) -> Result<String> {
    let raw: Vec<String> = values.iter().map(crate::time::to_iso).collect();
    serde_json::to_string(&raw).context("failed to encode post_date_times")
}

/// `?, ?, ...` for an `IN (...)` clause with `count` parameters.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
