use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinError;

use crate::auth::TokenStore;
use crate::batching::{BatchAggregator, DeviceLockRecorder};
use crate::config::SdkSettings;
use crate::db::Database;
use crate::errors::{ErrorLogger, PostError};
use crate::models::{DataLogEntry, PostOutcome, SensorType, TokenPair};
use crate::posting::{PostCoordinator, PostOptions, PostReport, PostState};
use crate::remote::{HttpRemoteApi, RemoteApi};
use crate::source::{AggregationPeriod, HealthSource};
use crate::store::{BatchStore, CheckpointStore};
use crate::time::Timestamp;
use crate::worker::{BackgroundController, SyncTask};

const LOG_PATH: &str = "sdk";

/// The SDK context. Build one at startup and share it; there is no global
/// instance.
///
/// Logging goes through the `log` facade. The host installs the logger,
/// either its own or [`crate::init_logging`].
pub struct HealthSync {
    settings: SdkSettings,
    database: Database,
    tokens: Arc<TokenStore>,
    aggregator: Arc<BatchAggregator>,
    devices: DeviceLockRecorder,
    coordinator: Arc<PostCoordinator>,
    error_logger: Arc<dyn ErrorLogger>,
    background: Mutex<BackgroundController>,
}

impl HealthSync {
    pub fn new(
        settings: SdkSettings,
        database: Database,
        source: Arc<dyn HealthSource>,
        remote: Arc<dyn RemoteApi>,
        error_logger: Arc<dyn ErrorLogger>,
    ) -> Result<Self> {
        settings.validate().context("invalid sdk settings")?;

        let store = Arc::new(database.clone());
        let tokens = Arc::new(TokenStore::new(store.clone(), remote.clone()));
        let aggregator = Arc::new(BatchAggregator::new(
            source,
            store.clone(),
            store.clone(),
            settings.overlap.clone(),
            settings.lookback(),
        ));
        let coordinator = Arc::new(PostCoordinator::new(
            store.clone(),
            store,
            tokens.clone(),
            remote,
            error_logger.clone(),
            PostOptions::from(&settings),
        ));

        info!(
            "healthsync ready ({:?}, {} sensors)",
            settings.environment,
            settings.sensors.len()
        );

        Ok(Self {
            settings,
            devices: DeviceLockRecorder::new(database.clone()),
            database,
            tokens,
            aggregator,
            coordinator,
            error_logger,
            background: Mutex::new(BackgroundController::new()),
        })
    }

    /// Same as [`HealthSync::new`] with the HTTP client for the configured
    /// environment.
    pub fn with_http(
        settings: SdkSettings,
        database: Database,
        source: Arc<dyn HealthSource>,
        error_logger: Arc<dyn ErrorLogger>,
    ) -> Result<Self> {
        let remote = HttpRemoteApi::new(&settings).context("failed to build http client")?;
        Self::new(settings, database, source, Arc::new(remote), error_logger)
    }

    pub fn settings(&self) -> &SdkSettings {
        &self.settings
    }

    pub async fn authenticate(&self, profile_token: &str, refresh_token: &str) -> PostOutcome {
        let result = self
            .tokens
            .save(&TokenPair::new(profile_token, refresh_token))
            .await;
        if let Err(err) = &result {
            warn!("authentication rejected: {err}");
        }
        PostOutcome::from_result(result)
    }

    pub async fn deauthenticate(&self) -> PostOutcome {
        PostOutcome::from_result(self.tokens.clear().await)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated().await
    }

    /// Pull new records for `sensor` into the batch store. Device data comes
    /// from recorded screen events rather than the health source.
    pub async fn batch_data_logs(&self, sensor: SensorType) -> Result<usize> {
        match sensor {
            SensorType::Device => self.devices.batch_device_sessions().await,
            _ => self.aggregator.batch_data_logs(sensor).await,
        }
    }

    pub async fn batch_aggregate_logs(
        &self,
        sensor: SensorType,
        period: AggregationPeriod,
    ) -> Result<usize> {
        self.aggregator.batch_aggregate_logs(sensor, period).await
    }

    pub async fn record_screen_state(&self, locked: bool, at: Timestamp) -> Result<()> {
        self.devices.record_screen_state(locked, at).await.map(|_| ())
    }

    pub async fn batch_device_sessions(&self) -> Result<usize> {
        self.devices.batch_device_sessions().await
    }

    /// Post one sensor. Reports "no local data" when nothing is batched.
    pub async fn post_sensor(&self, sensor: SensorType) -> PostOutcome {
        match self.spawn_post(sensor).await {
            Ok(Ok(_)) => PostOutcome::success(),
            Ok(Err(err)) => PostOutcome::failure(err.to_string()),
            Err(message) => PostOutcome::failure(message),
        }
    }

    /// Post each listed sensor concurrently. Sensors with nothing batched
    /// are skipped; every failure gets one line in the error summary.
    pub async fn post_sensor_data(&self, sensors: &[SensorType]) -> PostOutcome {
        if sensors.is_empty() {
            return PostOutcome::failure(PostError::NoSensors.to_string());
        }
        if !self.tokens.is_authenticated().await {
            return PostOutcome::failure(PostError::NoToken.to_string());
        }

        let sensors: BTreeSet<SensorType> = sensors.iter().copied().collect();
        let mut posts = Vec::with_capacity(sensors.len());
        for &sensor in &sensors {
            let coordinator = self.coordinator.clone();
            let handle = tokio::spawn(async move { coordinator.post_sensor(sensor).await });
            posts.push((sensor, handle));
        }

        let mut failures = Vec::new();
        for (sensor, handle) in posts {
            match handle.await {
                Ok(Ok(_)) | Ok(Err(PostError::NoLocalData(_))) => {}
                Ok(Err(err)) => failures.push(summary_line(sensor, &err)),
                Err(join_err) => {
                    failures.push(format!("{sensor}: {}", self.report_join_error(sensor, join_err)))
                }
            }
        }

        if failures.is_empty() {
            PostOutcome::success()
        } else {
            PostOutcome::failure(failures.join("\n"))
        }
    }

    pub async fn post_all_sensor_data(&self) -> PostOutcome {
        self.post_sensor_data(&self.settings.sensors).await
    }

    pub async fn start_background_tasks(&self) -> Result<()> {
        let task = Arc::new(SyncTask {
            aggregator: self.aggregator.clone(),
            devices: self.devices.clone(),
            coordinator: self.coordinator.clone(),
            sensors: self.settings.sensors.clone(),
        });
        self.background
            .lock()
            .await
            .start(task, self.settings.worker_interval())
    }

    pub async fn stop_background_tasks(&self) -> Result<()> {
        self.background.lock().await.stop().await
    }

    pub async fn background_tasks_running(&self) -> bool {
        self.background.lock().await.is_running()
    }

    pub async fn clear_all_checkpoints(&self) -> Result<()> {
        self.database.clear_all_checkpoints().await
    }

    pub async fn clear_batched_data(&self) -> Result<usize> {
        self.database.delete_all_batched_data().await
    }

    pub async fn get_batched_data(&self, sensor: SensorType) -> Result<Vec<DataLogEntry>> {
        self.database.get_batched_data(sensor).await
    }

    pub async fn get_checkpoint(&self, sensor: SensorType) -> Result<Option<Timestamp>> {
        self.database.get_checkpoint(sensor.record_type()).await
    }

    pub fn posted_chunk_count(&self) -> usize {
        self.coordinator.posted_chunk_count()
    }

    pub fn post_state(&self, sensor: SensorType) -> PostState {
        self.coordinator.state(sensor)
    }

    /// Run the post on its own task so a panic inside it comes back as a
    /// message instead of unwinding into the caller.
    async fn spawn_post(
        &self,
        sensor: SensorType,
    ) -> Result<Result<PostReport, PostError>, String> {
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move { coordinator.post_sensor(sensor).await })
            .await
            .map_err(|join_err| self.report_join_error(sensor, join_err))
    }

    fn report_join_error(&self, sensor: SensorType, join_err: JoinError) -> String {
        let message = if join_err.is_panic() {
            format!("unexpected failure: {}", panic_message(join_err.into_panic()))
        } else {
            "post task cancelled".to_string()
        };
        self.error_logger
            .application(&message, LOG_PATH, "post_sensor", Some(sensor.as_str()));
        message
    }
}

fn summary_line(sensor: SensorType, err: &PostError) -> String {
    match err {
        PostError::Chunk { .. } | PostError::InProgress(_) | PostError::NoLocalData(_) => {
            err.to_string()
        }
        _ => format!("{sensor}: {err}"),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
