use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Row};

use crate::db::{
    connection::Database,
    helpers::{
        encode_post_date_times, parse_datetime, parse_post_date_times, parse_properties,
        parse_recording_method, placeholders,
    },
};
use crate::models::{DataLogEntry, SensorType};
use crate::store::BatchStore;
use crate::time::{now_iso, to_iso, Timestamp};

// SQLite's default host-parameter ceiling is 999; stay well below it.
const DELETE_BATCH: usize = 500;

const SELECT_COLUMNS: &str = "id, log_type, data_type, value, source, start_date_time, \
     end_date_time, unit, recording_method, device_id, device_type, parent_id, \
     additional_properties, post_date_times";

fn row_to_entry(row: &Row) -> Result<DataLogEntry> {
    let start: String = row.get("start_date_time")?;
    let end: String = row.get("end_date_time")?;
    let method: String = row.get("recording_method")?;
    let properties: String = row.get("additional_properties")?;
    let post_times: String = row.get("post_date_times")?;

    Ok(DataLogEntry {
        id: row.get("id")?,
        log_type: row.get("log_type")?,
        data_type: row.get("data_type")?,
        value: row.get("value")?,
        source: row.get("source")?,
        start_date_time: parse_datetime(&start, "start_date_time")?,
        end_date_time: parse_datetime(&end, "end_date_time")?,
        unit: row.get("unit")?,
        recording_method: parse_recording_method(&method)?,
        device_id: row.get("device_id")?,
        device_type: row.get("device_type")?,
        parent_id: row.get("parent_id")?,
        additional_properties: parse_properties(&properties)?,
        post_date_times: parse_post_date_times(&post_times)?,
    })
}

#[async_trait]
impl BatchStore for Database {
    async fn save_batched_data(
        &self,
        sensor: SensorType,
        entries: &[DataLogEntry],
    ) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let records = entries.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let created_at = now_iso();
            {
                // An upsert keeps the audit trail of earlier post attempts.
                let mut stmt = tx.prepare(
                    "INSERT INTO batched_data (id, sensor, log_type, data_type, value, source,
                        start_date_time, end_date_time, start_epoch_ms, end_epoch_ms, unit,
                        recording_method, device_id, device_type, parent_id,
                        additional_properties, post_date_times, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                     ON CONFLICT(id) DO UPDATE SET
                        sensor = excluded.sensor,
                        log_type = excluded.log_type,
                        data_type = excluded.data_type,
                        value = excluded.value,
                        source = excluded.source,
                        start_date_time = excluded.start_date_time,
                        end_date_time = excluded.end_date_time,
                        start_epoch_ms = excluded.start_epoch_ms,
                        end_epoch_ms = excluded.end_epoch_ms,
                        unit = excluded.unit,
                        recording_method = excluded.recording_method,
                        device_id = excluded.device_id,
                        device_type = excluded.device_type,
                        parent_id = excluded.parent_id,
                        additional_properties = excluded.additional_properties",
                )?;

                for record in &records {
                    record.validate()?;
                    let properties = serde_json::to_string(&record.additional_properties)
                        .context("failed to encode additional_properties")?;
                    stmt.execute(params![
                        record.id,
                        sensor.as_str(),
                        record.log_type,
                        record.data_type,
                        record.value,
                        record.source,
                        to_iso(&record.start_date_time),
                        to_iso(&record.end_date_time),
                        record.start_date_time.timestamp_millis(),
                        record.end_date_time.timestamp_millis(),
                        record.unit,
                        record.recording_method.as_str(),
                        record.device_id,
                        record.device_type,
                        record.parent_id,
                        properties,
                        encode_post_date_times(&record.post_date_times)?,
                        created_at,
                    ])
                    .with_context(|| format!("failed to save batched entry {}", record.id))?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })
        .await
    }

    async fn get_batched_data(&self, sensor: SensorType) -> Result<Vec<DataLogEntry>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS}
                 FROM batched_data
                 WHERE sensor = ?1
                 ORDER BY start_epoch_ms ASC, end_epoch_ms ASC, rowid ASC"
            ))?;

            let mut rows = stmt.query(params![sensor.as_str()])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    async fn delete_batched_data(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            for batch in ids.chunks(DELETE_BATCH) {
                let sql = format!(
                    "DELETE FROM batched_data WHERE id IN ({})",
                    placeholders(batch.len())
                );
                deleted += tx
                    .execute(&sql, params_from_iter(batch.iter()))
                    .context("failed to delete batched entries")?;
            }
            tx.commit()?;
            Ok(deleted)
        })
        .await
    }

    async fn delete_all_batched_data(&self) -> Result<usize> {
        self.execute(|conn| {
            conn.execute("DELETE FROM batched_data", [])
                .context("failed to clear batched data")
        })
        .await
    }

    async fn append_post_date_time(&self, ids: &[String], at: Timestamp) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut select =
                    tx.prepare("SELECT post_date_times FROM batched_data WHERE id = ?1")?;
                let mut update =
                    tx.prepare("UPDATE batched_data SET post_date_times = ?1 WHERE id = ?2")?;
                for id in &ids {
                    let mut rows = select.query(params![id])?;
                    let Some(row) = rows.next()? else {
                        continue;
                    };
                    let raw: String = row.get(0)?;
                    let mut times = parse_post_date_times(&raw)?;
                    times.push(at);
                    update.execute(params![encode_post_date_times(&times)?, id])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

impl Database {
    pub async fn count_batched_data(&self, sensor: SensorType) -> Result<usize> {
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM batched_data WHERE sensor = ?1",
                params![sensor.as_str()],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }
}
