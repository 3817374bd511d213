use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{sync_loop, SyncTask};

/// Owns the periodic sync task. Manual posts never go through here; they
/// meet the worker only at the per-sensor mutex.
#[derive(Default)]
pub struct BackgroundController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl BackgroundController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, task: Arc<SyncTask>, period: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("background tasks already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sync_loop(task, period, cancel_token.clone()));

        info!("background sync started, every {}s", period.as_secs());
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancel and wait for the loop. An iteration already posting finishes
    /// its current `select!` arm first.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("background sync task failed to join")?;
            info!("background sync stopped");
        }
        Ok(())
    }
}
