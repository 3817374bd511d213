use std::collections::HashMap;

use log::debug;

use crate::models::DataLogEntry;
use crate::overlap::config::OverlapConfig;
use crate::time::Timestamp;

/// Drop entries that overlap an earlier-accepted entry of the same stream.
///
/// Within a stream, entries are walked in `(start, end)` order (stable, so
/// ties keep input order). A candidate is accepted when it starts at or after
/// the end of the last accepted entry; otherwise the earlier entry wins.
/// Kept entries are returned in their input order, so a set with no
/// overlaps comes back unchanged.
pub fn filter_overlaps(entries: Vec<DataLogEntry>, config: &OverlapConfig) -> Vec<DataLogEntry> {
    if entries.len() < 2 {
        return entries;
    }

    let dropped = mark_shadowed(&entries, config);

    let dropped_count = dropped.iter().filter(|d| **d).count();
    if dropped_count > 0 {
        debug!("overlap filter dropped {dropped_count} of {} entries", entries.len());
    }

    entries
        .into_iter()
        .zip(dropped)
        .filter_map(|(entry, dropped)| (!dropped).then_some(entry))
        .collect()
}

fn mark_shadowed(entries: &[DataLogEntry], config: &OverlapConfig) -> Vec<bool> {
    let mut streams: HashMap<(&str, Option<&str>), Vec<usize>> = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        if !config.is_scrutinized(&entry.log_type) {
            continue;
        }
        let source = config.per_source.then_some(entry.source.as_str());
        streams
            .entry((entry.log_type.as_str(), source))
            .or_default()
            .push(index);
    }

    let mut dropped = vec![false; entries.len()];
    for indices in streams.values_mut() {
        indices.sort_by(|&a, &b| {
            let (a, b) = (&entries[a], &entries[b]);
            a.start_date_time
                .cmp(&b.start_date_time)
                .then(a.end_date_time.cmp(&b.end_date_time))
        });

        let mut accepted_end: Option<Timestamp> = None;
        for &index in indices.iter() {
            let candidate = &entries[index];
            match accepted_end {
                Some(end) if candidate.start_date_time < end => dropped[index] = true,
                _ => accepted_end = Some(candidate.end_date_time),
            }
        }
    }

    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::log_types;
    use crate::time::parse_iso;

    fn log(log_type: &str, source: &str, start: &str, end: &str) -> DataLogEntry {
        let mut entry = DataLogEntry::new(
            log_type,
            "steps",
            100.0,
            "count",
            parse_iso(&format!("2024-05-01T{start}:00.000+00:00")).unwrap(),
            parse_iso(&format!("2024-05-01T{end}:00.000+00:00")).unwrap(),
        );
        entry.source = source.to_string();
        entry
    }

    fn steps(start: &str, end: &str) -> DataLogEntry {
        log(log_types::ACTIVITY, "com.example.steps", start, end)
    }

    fn ids(entries: &[DataLogEntry]) -> Vec<String> {
        entries.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn adjacent_boundaries_are_both_kept() {
        let input = vec![steps("10:00", "10:01"), steps("10:01", "10:02")];
        let output = filter_overlaps(input.clone(), &OverlapConfig::default());
        assert_eq!(output.len(), 2);
        assert_eq!(output, input);
    }

    #[test]
    fn overlapping_candidate_loses_to_earlier_entry() {
        let first = steps("00:00", "09:30");
        let shadowed = steps("09:00", "09:40");
        let after = steps("09:30", "09:45");
        let output = filter_overlaps(
            vec![first.clone(), shadowed, after.clone()],
            &OverlapConfig::default(),
        );
        assert_eq!(ids(&output), ids(&[first, after]));
    }

    #[test]
    fn contained_entry_is_dropped() {
        let outer = steps("13:00", "14:00");
        let inner = steps("13:15", "13:30");
        let output = filter_overlaps(vec![inner, outer.clone()], &OverlapConfig::default());
        assert_eq!(ids(&output), ids(&[outer]));
    }

    #[test]
    fn non_activity_types_pass_through() {
        let step = steps("00:00", "09:30");
        let sleep = log(log_types::SLEEP, "com.example.sleep", "00:00", "09:30");
        let sleep_overlap = log(log_types::SLEEP, "com.example.sleep", "01:00", "02:00");
        let input = vec![step, sleep, sleep_overlap];
        let output = filter_overlaps(input.clone(), &OverlapConfig::default());
        assert_eq!(output, input);
    }

    #[test]
    fn unsorted_disjoint_input_is_returned_unchanged() {
        let input = vec![
            steps("13:00", "14:00"),
            steps("00:00", "09:30"),
            steps("09:30", "09:45"),
        ];
        let output = filter_overlaps(input.clone(), &OverlapConfig::default());
        assert_eq!(output, input);
    }

    #[test]
    fn filtering_twice_changes_nothing() {
        let input = vec![
            steps("08:00", "09:00"),
            steps("08:30", "08:45"),
            steps("08:59", "10:00"),
            steps("09:00", "09:10"),
            steps("12:00", "12:00"),
            steps("12:00", "12:30"),
            steps("11:00", "12:10"),
        ];
        let config = OverlapConfig::default();
        let once = filter_overlaps(input, &config);
        let twice = filter_overlaps(once.clone(), &config);
        assert_eq!(once, twice);
    }

    #[test]
    fn ties_keep_first_in_input_order() {
        let a = steps("10:00", "10:05");
        let b = steps("10:00", "10:05");
        let output = filter_overlaps(vec![a.clone(), b], &OverlapConfig::default());
        assert_eq!(ids(&output), ids(&[a]));
    }

    #[test]
    fn zero_duration_inside_another_entry_is_dropped() {
        let outer = steps("10:00", "11:00");
        let point = steps("10:30", "10:30");
        let boundary = steps("11:00", "11:00");
        let output = filter_overlaps(
            vec![outer.clone(), point, boundary.clone()],
            &OverlapConfig::default(),
        );
        assert_eq!(ids(&output), ids(&[outer, boundary]));
    }

    #[test]
    fn per_source_streams_do_not_shadow_each_other() {
        let watch = log(log_types::ACTIVITY, "com.example.watch", "10:00", "11:00");
        let phone = log(log_types::ACTIVITY, "com.example.phone", "10:30", "11:30");
        let input = vec![watch.clone(), phone.clone()];

        let merged = filter_overlaps(input.clone(), &OverlapConfig::default());
        assert_eq!(ids(&merged), ids(&[watch]));

        let config = OverlapConfig {
            per_source: true,
            ..OverlapConfig::default()
        };
        assert_eq!(filter_overlaps(input.clone(), &config), input);
    }

    #[test]
    fn empty_and_single_inputs_are_untouched() {
        let config = OverlapConfig::default();
        assert!(filter_overlaps(Vec::new(), &config).is_empty());
        let single = vec![steps("10:00", "10:01")];
        assert_eq!(filter_overlaps(single.clone(), &config), single);
    }
}
