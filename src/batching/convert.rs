use std::collections::BTreeSet;

use uuid::Uuid;

use crate::models::{DataLogEntry, SensorType, MIXED_SOURCE, UNKNOWN_SOURCE};
use crate::source::{AggregateBucket, AggregationPeriod, RawRecord};

/// Namespace for ids derived from health-store record ids.
const ENTRY_NAMESPACE: Uuid = Uuid::from_u128(0x6a0f_4c2e_9b1d_4e57_a3c8_51d2_f0e7_b914);

pub const AGGREGATION_PROPERTY: &str = "aggregation";

/// One origin gives its name, several give `mixed`, none gives `UNKNOWN`.
pub fn resolve_source<'a, I>(origins: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut distinct: BTreeSet<&str> = origins
        .into_iter()
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .collect();

    if distinct.len() > 1 {
        return MIXED_SOURCE.to_string();
    }
    distinct
        .pop_first()
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string()
}

pub fn stable_id(key: &str) -> String {
    Uuid::new_v5(&ENTRY_NAMESPACE, key.as_bytes()).to_string()
}

/// Identity of a record across reads: the store's id when it has one,
/// otherwise its origin and time span.
fn record_key(sensor: SensorType, record: &RawRecord) -> String {
    match &record.source_id {
        Some(source_id) => format!("{sensor}:{}:{source_id}", record.data_type),
        None => format!(
            "{sensor}:{}:{}:{}:{}",
            record.data_type,
            record.origin.as_deref().unwrap_or(UNKNOWN_SOURCE),
            record.start.timestamp_millis(),
            record.end.timestamp_millis()
        ),
    }
}

/// Flatten a record into its own row followed by one row per segment.
pub fn record_to_entries(sensor: SensorType, record: &RawRecord) -> Vec<DataLogEntry> {
    let mut parent = DataLogEntry::new(
        sensor.log_type(),
        record.data_type.clone(),
        record.value,
        record.unit.clone(),
        record.start,
        record.end,
    );
    parent.id = stable_id(&record_key(sensor, record));
    parent.source = resolve_source(record.origin.as_deref());
    parent.recording_method = record.recording_method;
    parent.device_id = record.device_id.clone();
    parent.device_type = record.device_type.clone();
    parent.additional_properties = record.metadata.clone();

    let children = record
        .segments
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            let mut child = DataLogEntry::new(
                sensor.log_type(),
                segment.data_type.clone(),
                segment.value,
                segment.unit.clone(),
                segment.start,
                segment.end,
            );
            child.id = stable_id(&format!("{}:segment:{index}", parent.id));
            child.parent_id = Some(parent.id.clone());
            child.source = parent.source.clone();
            child.recording_method = parent.recording_method;
            child.device_id = parent.device_id.clone();
            child.device_type = parent.device_type.clone();
            child
        })
        .collect::<Vec<_>>();

    let mut entries = Vec::with_capacity(children.len() + 1);
    entries.push(parent);
    entries.extend(children);
    entries
}

pub fn bucket_to_entry(
    sensor: SensorType,
    period: AggregationPeriod,
    bucket: &AggregateBucket,
) -> DataLogEntry {
    let mut entry = DataLogEntry::new(
        sensor.log_type(),
        bucket.data_type.clone(),
        bucket.value,
        bucket.unit.clone(),
        bucket.start,
        bucket.end,
    );
    entry.id = stable_id(&format!(
        "{sensor}:{}:{period}:{}",
        bucket.data_type,
        bucket.start.timestamp_millis()
    ));
    entry.source = resolve_source(bucket.origins.iter().map(String::as_str));
    entry
        .additional_properties
        .insert(AGGREGATION_PROPERTY.to_string(), period.as_str().into());
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::log_types;
    use crate::source::RecordSegment;
    use crate::time::parse_iso;

    fn sleep_record() -> RawRecord {
        let mut record = RawRecord::new(
            "sleep_session",
            480.0,
            "minute",
            parse_iso("2024-05-01T22:00:00.000+10:00").unwrap(),
            parse_iso("2024-05-02T06:00:00.000+10:00").unwrap(),
        );
        record.source_id = Some("hc-123".into());
        record.origin = Some("com.example.sleep".into());
        record.segments = vec![
            RecordSegment {
                data_type: "sleep_stage_light".into(),
                value: 200.0,
                unit: "minute".into(),
                start: parse_iso("2024-05-01T22:00:00.000+10:00").unwrap(),
                end: parse_iso("2024-05-02T01:20:00.000+10:00").unwrap(),
            },
            RecordSegment {
                data_type: "sleep_stage_deep".into(),
                value: 280.0,
                unit: "minute".into(),
                start: parse_iso("2024-05-02T01:20:00.000+10:00").unwrap(),
                end: parse_iso("2024-05-02T06:00:00.000+10:00").unwrap(),
            },
        ];
        record
    }

    #[test]
    fn source_resolution() {
        assert_eq!(resolve_source(Vec::<&str>::new()), UNKNOWN_SOURCE);
        assert_eq!(resolve_source(["", "  "]), UNKNOWN_SOURCE);
        assert_eq!(resolve_source(["com.a", "com.a"]), "com.a");
        assert_eq!(resolve_source(["com.a", "com.b"]), MIXED_SOURCE);
    }

    #[test]
    fn sessions_flatten_into_parent_and_linked_children() {
        let entries = record_to_entries(SensorType::Sleep, &sleep_record());
        assert_eq!(entries.len(), 3);

        let parent = &entries[0];
        assert_eq!(parent.log_type, log_types::SLEEP);
        assert_eq!(parent.source, "com.example.sleep");
        assert!(parent.parent_id.is_none());

        for child in &entries[1..] {
            assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
            assert_eq!(child.source, parent.source);
        }
        assert_eq!(entries[2].data_type, "sleep_stage_deep");
    }

    fn ids(entries: &[DataLogEntry]) -> Vec<String> {
        entries.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn ids_are_stable_for_records_with_store_ids() {
        let first = record_to_entries(SensorType::Sleep, &sleep_record());
        let second = record_to_entries(SensorType::Sleep, &sleep_record());
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn records_without_store_ids_are_keyed_by_content() {
        let mut anonymous = sleep_record();
        anonymous.source_id = None;
        let a = record_to_entries(SensorType::Sleep, &anonymous);
        let b = record_to_entries(SensorType::Sleep, &anonymous);
        assert_eq!(ids(&a), ids(&b));
        assert_ne!(a[0].id, record_to_entries(SensorType::Sleep, &sleep_record())[0].id);

        let mut shifted = anonymous.clone();
        shifted.end = shifted.end + chrono::Duration::minutes(1);
        assert_ne!(record_to_entries(SensorType::Sleep, &shifted)[0].id, a[0].id);

        let mut other_origin = anonymous.clone();
        other_origin.origin = Some("com.other.app".into());
        assert_ne!(record_to_entries(SensorType::Sleep, &other_origin)[0].id, a[0].id);
    }

    #[test]
    fn buckets_record_period_and_mixed_source() {
        let bucket = AggregateBucket {
            data_type: "step_count".into(),
            value: 1200.0,
            unit: "count".into(),
            start: parse_iso("2024-05-01T10:00:00.000+00:00").unwrap(),
            end: parse_iso("2024-05-01T11:00:00.000+00:00").unwrap(),
            origins: vec!["com.watch".into(), "com.phone".into()],
        };
        let entry = bucket_to_entry(SensorType::Steps, AggregationPeriod::Hour, &bucket);
        assert_eq!(entry.source, MIXED_SOURCE);
        assert_eq!(entry.log_type, log_types::ACTIVITY);
        assert_eq!(
            entry.additional_properties.get(AGGREGATION_PROPERTY),
            Some(&serde_json::json!("hour"))
        );
    }
}
