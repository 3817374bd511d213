#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use healthsync::models::log_types;
use healthsync::remote::{ApiResponse, RemoteApi};
use healthsync::store::BatchStore;
use healthsync::time::{self, parse_iso, Timestamp};
use healthsync::{
    AggregateBucket, AggregationPeriod, DataLogEntry, Database, ErrorLogger, HealthSource,
    HealthSync, RawRecord, RemoteError, SdkSettings, SensorType, TokenPair,
};
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

pub struct TestDb {
    _dir: TempDir, // keep alive for the life of the test
    pub db: Database,
}

pub fn setup_db() -> TestDb {
    let dir = TempDir::new().expect("tempdir");
    let db = Database::new(dir.path().join("healthsync.db")).expect("database");
    TestDb { _dir: dir, db }
}

/// One recorded `post_batch` call.
#[derive(Debug, Clone)]
pub struct PostCall {
    pub bearer: String,
    pub ids: Vec<String>,
    pub log_type: String,
}

/// Remote that answers from a script, then 200 once the script runs out.
#[derive(Default)]
pub struct ScriptedRemote {
    script: Mutex<VecDeque<u16>>,
    by_log_type: Mutex<HashMap<String, u16>>,
    calls: Mutex<Vec<PostCall>>,
    refreshes: AtomicUsize,
    gate: Option<Semaphore>,
    pub entered: Notify,
    panic_on_post: AtomicBool,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(statuses: &[u16]) -> Arc<Self> {
        let remote = Self::default();
        remote.script.lock().unwrap().extend(statuses.iter().copied());
        Arc::new(remote)
    }

    /// Every post blocks until [`ScriptedRemote::open_gate`].
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn fail_log_type(&self, log_type: &str, status: u16) {
        self.by_log_type
            .lock()
            .unwrap()
            .insert(log_type.to_string(), status);
    }

    pub fn panic_on_post(&self) {
        self.panic_on_post.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn post_batch(
        &self,
        bearer_token: &str,
        entries: &[DataLogEntry],
    ) -> Result<ApiResponse, RemoteError> {
        if self.panic_on_post.load(Ordering::SeqCst) {
            panic!("remote exploded");
        }

        let log_type = entries
            .first()
            .map(|e| e.log_type.clone())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(PostCall {
            bearer: bearer_token.to_string(),
            ids: entries.iter().map(|e| e.id.clone()).collect(),
            log_type: log_type.clone(),
        });
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let status = self
            .by_log_type
            .lock()
            .unwrap()
            .get(&log_type)
            .copied()
            .or_else(|| self.script.lock().unwrap().pop_front())
            .unwrap_or(200);
        Ok(ApiResponse::new(status, format!("status {status}")))
    }

    async fn post_refresh_token(&self, _refresh_token: &str) -> Result<TokenPair, RemoteError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenPair::new(format!("profile-{n}"), format!("refresh-{n}")))
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    pub application: Mutex<Vec<String>>,
    pub api: Mutex<Vec<(u16, String)>>,
}

impl ErrorLogger for RecordingLogger {
    fn application(&self, message: &str, _path: &str, _method: &str, _body: Option<&str>) {
        self.application.lock().unwrap().push(message.to_string());
    }

    fn api(&self, status: u16, message: &str, _path: &str) {
        self.api.lock().unwrap().push((status, message.to_string()));
    }
}

/// Health source backed by in-memory records.
#[derive(Default)]
pub struct FakeSource {
    records: Mutex<HashMap<SensorType, Vec<RawRecord>>>,
    aggregates: Mutex<Vec<AggregateBucket>>,
    pub last_since: Mutex<Option<Timestamp>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_record(&self, sensor: SensorType, record: RawRecord) {
        self.records
            .lock()
            .unwrap()
            .entry(sensor)
            .or_default()
            .push(record);
    }

    pub fn add_aggregate(&self, bucket: AggregateBucket) {
        self.aggregates.lock().unwrap().push(bucket);
    }
}

#[async_trait]
impl HealthSource for FakeSource {
    async fn query_records(
        &self,
        sensor: SensorType,
        since: Timestamp,
    ) -> anyhow::Result<Vec<RawRecord>> {
        *self.last_since.lock().unwrap() = Some(since);
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&sensor)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_aggregates(
        &self,
        _sensor: SensorType,
        _period: AggregationPeriod,
        since: Timestamp,
    ) -> anyhow::Result<Vec<AggregateBucket>> {
        *self.last_since.lock().unwrap() = Some(since);
        Ok(self.aggregates.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub test_db: TestDb,
    pub sdk: Arc<HealthSync>,
    pub remote: Arc<ScriptedRemote>,
    pub source: Arc<FakeSource>,
    pub logger: Arc<RecordingLogger>,
}

impl Harness {
    pub fn db(&self) -> &Database {
        &self.test_db.db
    }

    pub async fn batch(&self, sensor: SensorType, entries: &[DataLogEntry]) {
        self.db()
            .save_batched_data(sensor, entries)
            .await
            .expect("save batched data");
    }

    pub async fn stored(&self, sensor: SensorType) -> Vec<DataLogEntry> {
        self.db().get_batched_data(sensor).await.expect("load batched data")
    }
}

pub async fn harness(settings: SdkSettings, remote: Arc<ScriptedRemote>) -> Harness {
    healthsync::init_logging();
    let test_db = setup_db();
    let source = FakeSource::new();
    let logger = Arc::new(RecordingLogger::default());
    let sdk = HealthSync::new(
        settings,
        test_db.db.clone(),
        source.clone(),
        remote.clone(),
        logger.clone(),
    )
    .expect("sdk");

    let outcome = sdk.authenticate("profile-0", "refresh-0").await;
    assert!(outcome.successful, "{outcome:?}");

    Harness {
        test_db,
        sdk: Arc::new(sdk),
        remote,
        source,
        logger,
    }
}

pub fn ts(value: &str) -> Timestamp {
    parse_iso(value).expect("timestamp")
}

/// `count` same-size one-minute step entries starting at 10:00 UTC.
pub fn step_entries(count: usize) -> Vec<DataLogEntry> {
    let base = ts("2024-05-01T10:00:00.000+00:00");
    (0..count)
        .map(|i| {
            let start = base + ChronoDuration::minutes(i as i64);
            DataLogEntry::new(
                log_types::ACTIVITY,
                "step_count",
                12.0,
                "count",
                start,
                start + ChronoDuration::minutes(1),
            )
        })
        .collect()
}

pub fn sleep_entry(start: &str, end: &str) -> DataLogEntry {
    DataLogEntry::new(log_types::SLEEP, "sleep_session", 60.0, "minute", ts(start), ts(end))
}

pub fn hours_ago(hours: i64) -> Timestamp {
    time::now() - ChronoDuration::hours(hours)
}

pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
