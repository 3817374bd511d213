use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use crate::auth::TokenStore;
use crate::config::{ChunkStrategy, SdkSettings};
use crate::errors::{AuthError, ErrorLogger, PostError};
use crate::models::{DataLogEntry, SensorType};
use crate::posting::chunk::{Chunk, ChunkPlanner};
use crate::posting::state::{PostState, PostStateTracker};
use crate::remote::{
    ApiResponse, RemoteApi, STATUS_GONE, STATUS_PAYLOAD_TOO_LARGE, STATUS_UNAUTHORIZED,
};
use crate::store::{BatchStore, CheckpointStore};
use crate::time;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const LOG_PATH: &str = "posting::coordinator";

#[derive(Debug, Clone, Copy)]
pub struct PostOptions {
    pub chunk_limit_bytes: usize,
    pub chunk_strategy: ChunkStrategy,
    pub timeout: Duration,
}

impl From<&SdkSettings> for PostOptions {
    fn from(settings: &SdkSettings) -> Self {
        Self {
            chunk_limit_bytes: settings.chunk_limit_bytes,
            chunk_strategy: settings.chunk_strategy,
            timeout: settings.post_timeout(),
        }
    }
}

/// What one successful invocation posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostReport {
    pub sensor: SensorType,
    pub chunks_posted: usize,
    pub entries_posted: usize,
}

/// Posts batched entries with at most one invocation in flight per sensor.
///
/// Each sensor has its own mutex, taken with `try_lock`: a second caller for
/// a sensor that is already posting fails straight away with
/// [`PostError::InProgress`]. Chunks go out strictly in order. A chunk's
/// entries are deleted and the sensor's checkpoint advanced only after the
/// backend accepts it, and nothing already accepted is rolled back when a
/// later chunk fails.
pub struct PostCoordinator {
    batches: Arc<dyn BatchStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    tokens: Arc<TokenStore>,
    remote: Arc<dyn RemoteApi>,
    error_logger: Arc<dyn ErrorLogger>,
    planner: ChunkPlanner,
    states: PostStateTracker,
    locks: HashMap<SensorType, Mutex<()>>,
    options: PostOptions,
}

impl PostCoordinator {
    pub fn new(
        batches: Arc<dyn BatchStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        tokens: Arc<TokenStore>,
        remote: Arc<dyn RemoteApi>,
        error_logger: Arc<dyn ErrorLogger>,
        options: PostOptions,
    ) -> Self {
        let locks = SensorType::ALL
            .iter()
            .map(|sensor| (*sensor, Mutex::new(())))
            .collect();

        Self {
            batches,
            checkpoints,
            tokens,
            remote,
            error_logger,
            planner: ChunkPlanner::new(),
            states: PostStateTracker::new(),
            locks,
            options,
        }
    }

    pub fn posted_chunk_count(&self) -> usize {
        self.planner.posted_chunk_count()
    }

    pub fn state(&self, sensor: SensorType) -> PostState {
        self.states.get(sensor)
    }

    pub async fn post_sensor(&self, sensor: SensorType) -> Result<PostReport, PostError> {
        let mut bearer = match self.tokens.bearer().await {
            Ok(token) => token,
            Err(AuthError::NotAuthenticated) => return Err(PostError::NoToken),
            Err(err) => return Err(err.into()),
        };

        let Some(_guard) = self
            .locks
            .get(&sensor)
            .and_then(|lock| lock.try_lock().ok())
        else {
            log_warn!("{sensor} post rejected: already in progress");
            return Err(PostError::InProgress(sensor));
        };

        let entries = self.batches.get_batched_data(sensor).await?;
        if entries.is_empty() {
            self.states.reset(sensor);
            return Err(PostError::NoLocalData(sensor));
        }

        let entry_count = entries.len();
        let chunks = self.planner.plan(
            entries,
            self.options.chunk_limit_bytes,
            self.options.chunk_strategy,
        );
        let total = chunks.len();
        self.states.begin(sensor, total);
        log_info!("posting {entry_count} {sensor} entries in {total} chunks");

        for (index, chunk) in chunks.iter().enumerate() {
            if let Err(err) = self.post_chunk(sensor, &mut bearer, chunk).await {
                let err = PostError::Chunk {
                    sensor,
                    number: index + 1,
                    total,
                    source: Box::new(err),
                };
                log_warn!("{err}");
                self.states.finish(sensor, Some(err.to_string()));
                return Err(err);
            }
            self.states.chunk_posted(sensor);
        }

        self.states.finish(sensor, None);
        log_info!("posted all {total} {sensor} chunks");
        Ok(PostReport {
            sensor,
            chunks_posted: total,
            entries_posted: entry_count,
        })
    }

    /// Post one chunk, halving it on 413 until the parts fit.
    async fn post_chunk(
        &self,
        sensor: SensorType,
        bearer: &mut SecretString,
        chunk: &Chunk,
    ) -> Result<(), PostError> {
        let mut pending = VecDeque::from([chunk.clone()]);

        while let Some(part) = pending.pop_front() {
            let response = self.send_with_refresh(sensor, bearer, &part.entries).await?;
            if response.is_success() {
                self.acknowledge(sensor, &part).await?;
                continue;
            }

            match response.status {
                STATUS_PAYLOAD_TOO_LARGE if part.len() > 1 => {
                    log_warn!(
                        "{sensor} payload of {} entries too large, splitting",
                        part.len()
                    );
                    let (left, right) = part.split_in_half();
                    pending.push_front(right);
                    pending.push_front(left);
                }
                STATUS_UNAUTHORIZED => {
                    self.error_logger
                        .api(response.status, &response.body, LOG_PATH);
                    return Err(PostError::Unauthorized);
                }
                STATUS_GONE => {
                    self.error_logger
                        .api(response.status, &response.body, LOG_PATH);
                    self.tokens.clear().await?;
                    return Err(PostError::AccountRemoved);
                }
                status => {
                    self.error_logger.api(status, &response.body, LOG_PATH);
                    return Err(PostError::Http {
                        status,
                        body: response.body,
                    });
                }
            }
        }

        Ok(())
    }

    /// One attempt, plus one replay with a refreshed token after a 401.
    async fn send_with_refresh(
        &self,
        sensor: SensorType,
        bearer: &mut SecretString,
        entries: &[DataLogEntry],
    ) -> Result<ApiResponse, PostError> {
        let response = self.send(bearer, entries).await?;
        if response.status != STATUS_UNAUTHORIZED {
            return Ok(response);
        }

        self.states.retrying(sensor);
        log_info!("{sensor} post unauthorized, refreshing token");
        *bearer = self.tokens.refresh(&*bearer).await?;
        self.send(bearer, entries).await
    }

    async fn send(
        &self,
        bearer: &SecretString,
        entries: &[DataLogEntry],
    ) -> Result<ApiResponse, PostError> {
        let ids = entry_ids(entries);
        self.batches
            .append_post_date_time(&ids, time::now())
            .await?;

        let timeout = self.options.timeout;
        match tokio::time::timeout(
            timeout,
            self.remote.post_batch(bearer.expose_secret(), entries),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(PostError::Timeout(timeout)),
        }
    }

    async fn acknowledge(&self, sensor: SensorType, chunk: &Chunk) -> Result<(), PostError> {
        self.batches
            .delete_batched_data(&entry_ids(&chunk.entries))
            .await?;

        if let Some(chunk_end) = chunk.max_end() {
            let current = self.checkpoints.get_checkpoint(sensor.record_type()).await?;
            let next = current.map_or(chunk_end, |current| current.max(chunk_end));
            self.checkpoints
                .save_checkpoint(sensor.record_type(), next)
                .await?;
        }

        let posted = self.planner.acknowledge();
        log_info!("{sensor} chunk acknowledged ({posted} posted so far)");
        Ok(())
    }
}

fn entry_ids(entries: &[DataLogEntry]) -> Vec<String> {
    entries.iter().map(|entry| entry.id.clone()).collect()
}
