use async_trait::async_trait;
use log::debug;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SdkSettings;
use crate::errors::RemoteError;
use crate::models::{DataLogEntry, TokenPair};
use crate::remote::{ApiResponse, RemoteApi};

const DATA_LOG_PATH: &str = "/api/v1/profile/data/log";
const REFRESH_TOKEN_PATH: &str = "/api/v1/oauth/profile/refreshToken";

// Header names are case-insensitive on the wire; `http` wants them lowercase.
const APP_ID_HEADER: &str = "appid";
const APP_SECRET_HEADER: &str = "appsecret";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    profile_token: String,
    refresh_token: Option<String>,
}

/// `reqwest` implementation of [`RemoteApi`].
pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
}

impl HttpRemoteApi {
    pub fn new(settings: &SdkSettings) -> Result<Self, RemoteError> {
        Self::with_base_url(settings, settings.environment.base_url())
    }

    pub fn with_base_url(settings: &SdkSettings, base_url: &str) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert(APP_ID_HEADER, header_value(&settings.app_id)?);
        headers.insert(APP_SECRET_HEADER, header_value(&settings.app_secret)?);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(settings.post_timeout_ms))
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, RemoteError> {
    HeaderValue::from_str(value)
        .map_err(|err| RemoteError::Transport(format!("invalid header value: {err}")))
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn post_batch(
        &self,
        bearer_token: &str,
        entries: &[DataLogEntry],
    ) -> Result<ApiResponse, RemoteError> {
        let url = self.url(DATA_LOG_PATH);
        debug!("posting {} entries to {url}", entries.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer_token)
            .json(entries)
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))?;

        Ok(ApiResponse::new(status, body))
    }

    async fn post_refresh_token(&self, refresh_token: &str) -> Result<TokenPair, RemoteError> {
        let response = self
            .client
            .post(self.url(REFRESH_TOKEN_PATH))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: RefreshResponse = response
            .json()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))?;

        // The backend may keep the refresh token and omit it from the reply.
        let refresh = tokens
            .refresh_token
            .unwrap_or_else(|| refresh_token.to_string());
        Ok(TokenPair::new(tokens.profile_token, refresh))
    }
}
