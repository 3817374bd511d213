//! The remote analytics backend, seen as a sink that accepts batches.

use async_trait::async_trait;

use crate::errors::RemoteError;
use crate::models::{DataLogEntry, TokenPair};

pub mod http;

pub use http::HttpRemoteApi;

pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_GONE: u16 = 410;
pub const STATUS_PAYLOAD_TOO_LARGE: u16 = 413;

/// Status and raw body of a batch post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Post one chunk. Any HTTP status comes back as `Ok`; `Err` means no
    /// status was obtained.
    async fn post_batch(
        &self,
        bearer_token: &str,
        entries: &[DataLogEntry],
    ) -> Result<ApiResponse, RemoteError>;

    async fn post_refresh_token(&self, refresh_token: &str) -> Result<TokenPair, RemoteError>;
}
