use std::sync::Arc;

use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::batching::{BatchAggregator, DeviceLockRecorder};
use crate::errors::PostError;
use crate::models::SensorType;
use crate::posting::PostCoordinator;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Everything one background iteration needs.
pub struct SyncTask {
    pub aggregator: Arc<BatchAggregator>,
    pub devices: DeviceLockRecorder,
    pub coordinator: Arc<PostCoordinator>,
    pub sensors: Vec<SensorType>,
}

impl SyncTask {
    /// Batch then post every configured sensor. Returns how many sensors
    /// posted successfully.
    pub async fn run_once(&self) -> usize {
        let mut posted = 0;
        for &sensor in &self.sensors {
            let batched = match sensor {
                SensorType::Device => self.devices.batch_device_sessions().await,
                _ => self.aggregator.batch_data_logs(sensor).await,
            };
            if let Err(err) = batched {
                log_error!("background batching failed for {sensor}: {err:#}");
            }

            match self.coordinator.post_sensor(sensor).await {
                Ok(report) => {
                    posted += 1;
                    log_info!(
                        "background post for {sensor}: {} entries in {} chunks",
                        report.entries_posted,
                        report.chunks_posted
                    );
                }
                Err(PostError::NoLocalData(_)) => {}
                Err(err @ PostError::InProgress(_)) => log_info!("background post skipped: {err}"),
                Err(err) => log_warn!("background post for {sensor} failed: {err}"),
            }
        }
        posted
    }
}

pub async fn sync_loop(task: Arc<SyncTask>, period: Duration, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Detached, so a timeout stops waiting without aborting a chunk mid-write.
                let run = tokio::spawn({
                    let task = task.clone();
                    async move { task.run_once().await }
                });
                match tokio::time::timeout(period, run).await {
                    Ok(Ok(posted)) => log_info!("background sync finished, {posted} sensors posted"),
                    Ok(Err(err)) => log_error!("background sync task failed: {err}"),
                    Err(_) => log_warn!("background sync timeout (> {}s)", period.as_secs()),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("background sync loop shutting down");
                break;
            }
        }
    }
}
