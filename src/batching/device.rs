use anyhow::Result;
use log::info;

use crate::batching::convert::stable_id;
use crate::db::Database;
use crate::models::{log_types, DataLogEntry, RecordingMethod, ScreenEvent, SensorType};
use crate::store::BatchStore;
use crate::time::Timestamp;

pub const DEVICE_LOCK_DATA_TYPE: &str = "device_lock";

/// A completed lock → unlock interval.
#[derive(Debug, Clone, PartialEq)]
pub struct LockSession {
    pub lock_event_id: i64,
    pub unlock_event_id: i64,
    pub locked_at: Timestamp,
    pub unlocked_at: Timestamp,
}

impl LockSession {
    pub fn locked_minutes(&self) -> f64 {
        (self.unlocked_at - self.locked_at).num_milliseconds() as f64 / 60_000.0
    }

    pub fn to_entry(&self) -> DataLogEntry {
        let mut entry = DataLogEntry::new(
            log_types::DEVICE,
            DEVICE_LOCK_DATA_TYPE,
            self.locked_minutes(),
            "minute",
            self.locked_at,
            self.unlocked_at,
        );
        entry.id = stable_id(&format!(
            "device_lock:{}:{}",
            self.lock_event_id, self.unlock_event_id
        ));
        entry.recording_method = RecordingMethod::AutomaticallyRecorded;
        entry
    }
}

/// Pair events (oldest first) into sessions.
///
/// Repeated locks keep the earliest one; an unlock with no open lock is
/// noise. Returns the sessions and the ids of every event they consumed.
/// A trailing open lock is left unconsumed for the next run.
pub fn pair_lock_sessions(events: &[ScreenEvent]) -> (Vec<LockSession>, Vec<i64>) {
    let mut sessions = Vec::new();
    let mut consumed = Vec::new();
    let mut pending: Vec<i64> = Vec::new();
    let mut open: Option<&ScreenEvent> = None;

    for event in events {
        pending.push(event.id);
        match (event.locked, open) {
            (true, None) => open = Some(event),
            (true, Some(_)) => {}
            (false, Some(lock)) => {
                sessions.push(LockSession {
                    lock_event_id: lock.id,
                    unlock_event_id: event.id,
                    locked_at: lock.occurred_at,
                    unlocked_at: event.occurred_at,
                });
                consumed.append(&mut pending);
                open = None;
            }
            (false, None) => consumed.append(&mut pending),
        }
    }

    (sessions, consumed)
}

/// Records screen lock state and turns it into `device` entries.
#[derive(Clone)]
pub struct DeviceLockRecorder {
    db: Database,
}

impl DeviceLockRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn record_screen_state(&self, locked: bool, at: Timestamp) -> Result<i64> {
        self.db.insert_screen_event(locked, at).await
    }

    /// Batch every completed lock session. Entries are saved before their
    /// events are marked consumed, so a crash in between only re-saves the
    /// same ids.
    pub async fn batch_device_sessions(&self) -> Result<usize> {
        let events = self.db.get_pending_screen_events().await?;
        let (sessions, consumed) = pair_lock_sessions(&events);

        let entries = sessions
            .iter()
            .map(LockSession::to_entry)
            .collect::<Vec<_>>();
        let saved = self
            .db
            .save_batched_data(SensorType::Device, &entries)
            .await?;
        self.db.mark_screen_events_consumed(&consumed).await?;

        if saved > 0 {
            info!("batched {saved} device lock sessions");
        }
        Ok(saved)
    }
}
