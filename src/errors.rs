use std::time::Duration;

use log::error;
use thiserror::Error;

use crate::models::SensorType;

/// Failures of the remote API collaborator itself (the request never
/// produced a usable HTTP status, or the body could not be decoded).
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request rejected with http {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("the profile token was empty")]
    EmptyProfileToken,

    #[error("the refresh token was empty")]
    EmptyRefreshToken,

    #[error("no token")]
    NotAuthenticated,

    #[error("token refresh failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("token storage failed: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PostError {
    #[error("no sensors selected")]
    NoSensors,

    #[error("no token")]
    NoToken,

    #[error("no local data for {0}")]
    NoLocalData(SensorType),

    #[error("posting already in progress for {0}")]
    InProgress(SensorType),

    #[error("unauthorized after token refresh")]
    Unauthorized,

    #[error("account removed, tokens cleared")]
    AccountRemoved,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("post timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("{sensor} chunk {number} of {total} failed: {source}")]
    Chunk {
        sensor: SensorType,
        number: usize,
        total: usize,
        #[source]
        source: Box<PostError>,
    },
}

impl PostError {
    /// Rejected before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PostError::NoSensors | PostError::NoToken | PostError::NoLocalData(_)
        )
    }

    pub fn is_contention(&self) -> bool {
        matches!(self, PostError::InProgress(_))
    }
}

/// Sink for failures that should reach the backend's error log.
pub trait ErrorLogger: Send + Sync {
    fn application(&self, message: &str, path: &str, method: &str, body: Option<&str>);

    fn api(&self, status: u16, message: &str, path: &str);
}

/// Default sink: writes through the `log` facade only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorLogger;

impl ErrorLogger for LogErrorLogger {
    fn application(&self, message: &str, path: &str, method: &str, body: Option<&str>) {
        match body {
            Some(body) => error!("[{path}::{method}] {message} (body: {body})"),
            None => error!("[{path}::{method}] {message}"),
        }
    }

    fn api(&self, status: u16, message: &str, path: &str) {
        error!("[{path}] api responded {status}: {message}");
    }
}
