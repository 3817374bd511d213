use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, placeholders},
};
use crate::models::ScreenEvent;
use crate::time::{to_iso, Timestamp};

fn row_to_event(row: &Row) -> Result<ScreenEvent> {
    let occurred_at: String = row.get("occurred_at")?;
    let locked: i64 = row.get("locked")?;
    Ok(ScreenEvent {
        id: row.get("id")?,
        locked: locked != 0,
        occurred_at: parse_datetime(&occurred_at, "occurred_at")?,
    })
}

impl Database {
    pub async fn insert_screen_event(&self, locked: bool, at: Timestamp) -> Result<i64> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO screen_events (locked, occurred_at, occurred_epoch_ms)
                 VALUES (?1, ?2, ?3)",
                params![locked as i64, to_iso(&at), at.timestamp_millis()],
            )
            .context("failed to insert screen event")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Unconsumed events, oldest first.
    pub async fn get_pending_screen_events(&self) -> Result<Vec<ScreenEvent>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, locked, occurred_at
                 FROM screen_events
                 WHERE consumed = 0
                 ORDER BY occurred_epoch_ms ASC, id ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(row_to_event(row)?);
            }
            Ok(events)
        })
        .await
    }

    pub async fn mark_screen_events_consumed(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.execute(move |conn| {
            let sql = format!(
                "UPDATE screen_events SET consumed = 1 WHERE id IN ({})",
                placeholders(ids.len())
            );
            conn.execute(&sql, params_from_iter(ids.iter()))
                .context("failed to mark screen events consumed")
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_iso;
    use tempfile::TempDir;

    #[tokio::test]
    async fn consumed_events_are_not_pending() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("test.db")).unwrap();

        let lock_at = parse_iso("2024-05-01T22:00:00.000+00:00").unwrap();
        let unlock_at = parse_iso("2024-05-02T06:30:00.000+00:00").unwrap();
        // Inserted out of order on purpose.
        let unlock = db.insert_screen_event(false, unlock_at).await.unwrap();
        let lock = db.insert_screen_event(true, lock_at).await.unwrap();

        let pending = db.get_pending_screen_events().await.unwrap();
        assert_eq!(pending.iter().map(|e| e.id).collect::<Vec<_>>(), vec![lock, unlock]);
        assert!(pending[0].locked);

        assert_eq!(db.mark_screen_events_consumed(&[lock]).await.unwrap(), 1);
        let pending = db.get_pending_screen_events().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, unlock);
    }
}
