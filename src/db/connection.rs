use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::db::migrations::run_migrations;

const THREAD_NAME: &str = "healthsync-db";

/// The worker and the host app (or a second SDK instance) may share the file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failures of the actor itself, as opposed to SQL errors from a task.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("database thread is not running")]
    Closed,
    #[error("database task panicked: {0}")]
    TaskPanicked(String),
}

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

struct Actor {
    mailbox: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Actor {
    fn drop(&mut self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };

        // A send failure means the thread is already gone; joining still reaps it.
        let _ = self.mailbox.send(Message::Stop);
        if handle.join().is_err() {
            error!("{THREAD_NAME} thread panicked during shutdown");
        }
    }
}

/// Handle to the SQLite connection owned by a dedicated thread. Cloning is
/// cheap; the thread exits when the last clone drops.
#[derive(Clone)]
pub struct Database {
    actor: Arc<Actor>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (mailbox, inbox) = mpsc::channel::<Message>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let path = db_path.clone();

        let thread = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                let mut conn = match open_connection(&path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                serve(&mut conn, inbox);
            })
            .context("failed to spawn database thread")?;

        ready_rx
            .recv()
            .context("database thread exited before it was ready")??;
        info!("database ready at {}", db_path.display());

        Ok(Self {
            actor: Arc::new(Actor {
                mailbox,
                thread: Mutex::new(Some(thread)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Run `task` on the database thread and await its result. A task that
    /// panics fails with [`ActorError::TaskPanicked`] and leaves the thread
    /// serving later tasks.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();

        let job: Job = Box::new(move |conn| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| task(conn)))
                .unwrap_or_else(|payload| {
                    Err(ActorError::TaskPanicked(panic_text(&*payload)).into())
                });
            // The caller may have stopped waiting (timeout, cancelled post).
            let _ = reply_tx.send(result);
        });

        self.actor
            .mailbox
            .send(Message::Run(job))
            .map_err(|_| ActorError::Closed)?;

        reply_rx.await.map_err(|_| ActorError::Closed)?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL mode unavailable, using the default journal: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous mode")?;

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

fn serve(conn: &mut Connection, inbox: mpsc::Receiver<Message>) {
    let mut served: u64 = 0;
    while let Ok(message) = inbox.recv() {
        match message {
            Message::Run(job) => {
                job(conn);
                served += 1;
            }
            Message::Stop => break,
        }
    }
    info!("{THREAD_NAME} stopping after {served} tasks");
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
