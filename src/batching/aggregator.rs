use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::batching::convert::{bucket_to_entry, record_to_entries};
use crate::models::{DataLogEntry, SensorType};
use crate::overlap::{filter_overlaps, OverlapConfig};
use crate::source::{AggregationPeriod, HealthSource};
use crate::store::{BatchStore, CheckpointStore};
use crate::time::{self, Timestamp};

/// Pulls new records from the health source into the local batch store.
///
/// Checkpoints are only read here. They move forward when a post is
/// confirmed, so anything batched but not yet posted is read again on the
/// next run and upserted by id.
pub struct BatchAggregator {
    source: Arc<dyn HealthSource>,
    batches: Arc<dyn BatchStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    overlap: OverlapConfig,
    lookback: chrono::Duration,
}

impl BatchAggregator {
    pub fn new(
        source: Arc<dyn HealthSource>,
        batches: Arc<dyn BatchStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        overlap: OverlapConfig,
        lookback: chrono::Duration,
    ) -> Self {
        Self {
            source,
            batches,
            checkpoints,
            overlap,
            lookback,
        }
    }

    /// Start of the incremental window: the checkpoint, or the lookback
    /// window when the sensor has never posted.
    pub async fn query_window_start(&self, sensor: SensorType) -> Result<Timestamp> {
        let checkpoint = self
            .checkpoints
            .get_checkpoint(sensor.record_type())
            .await
            .with_context(|| format!("failed to read checkpoint for {sensor}"))?;
        Ok(checkpoint.unwrap_or_else(|| time::now() - self.lookback))
    }

    /// Returns the number of entries written to the batch store.
    pub async fn batch_data_logs(&self, sensor: SensorType) -> Result<usize> {
        let since = self.query_window_start(sensor).await?;
        let records = self
            .source
            .query_records(sensor, since)
            .await
            .with_context(|| format!("failed to query {sensor} records"))?;

        let mut entries = Vec::new();
        for record in records.iter().filter(|r| r.last_modified > since) {
            entries.extend(record_to_entries(sensor, record));
        }

        let entries = self.reconcile(sensor, entries);
        if entries.is_empty() {
            debug!("no new {sensor} records since {since}");
            return Ok(0);
        }

        let saved = self.batches.save_batched_data(sensor, &entries).await?;
        info!("batched {saved} {sensor} entries");
        Ok(saved)
    }

    pub async fn batch_aggregate_logs(
        &self,
        sensor: SensorType,
        period: AggregationPeriod,
    ) -> Result<usize> {
        let since = self.query_window_start(sensor).await?;
        let buckets = self
            .source
            .query_aggregates(sensor, period, since)
            .await
            .with_context(|| format!("failed to query {sensor} aggregates"))?;

        let entries = buckets
            .iter()
            .map(|bucket| bucket_to_entry(sensor, period, bucket))
            .collect::<Vec<_>>();
        let entries = self.reconcile(sensor, entries);
        if entries.is_empty() {
            return Ok(0);
        }

        let saved = self.batches.save_batched_data(sensor, &entries).await?;
        info!("batched {saved} {sensor} {period} aggregates");
        Ok(saved)
    }

    /// Drop malformed entries, then overlapping top-level entries together
    /// with their segments.
    fn reconcile(&self, sensor: SensorType, entries: Vec<DataLogEntry>) -> Vec<DataLogEntry> {
        let (valid, invalid): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|entry| entry.validate().is_ok());
        if !invalid.is_empty() {
            warn!("skipping {} malformed {sensor} records", invalid.len());
        }

        let (children, parents): (Vec<_>, Vec<_>) =
            valid.into_iter().partition(|entry| entry.parent_id.is_some());

        let parents = filter_overlaps(parents, &self.overlap);
        let kept: HashSet<&str> = parents.iter().map(|entry| entry.id.as_str()).collect();
        let children = children
            .into_iter()
            .filter(|child| {
                child
                    .parent_id
                    .as_deref()
                    .is_some_and(|parent| kept.contains(parent))
            })
            .collect::<Vec<_>>();

        let mut reconciled = parents;
        reconciled.extend(children);
        reconciled
    }
}
