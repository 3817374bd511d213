//! Profile/refresh token pair with a single-flight refresh path.

use std::sync::Arc;

use log::{info, warn};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use crate::errors::AuthError;
use crate::models::TokenPair;
use crate::remote::RemoteApi;
use crate::store::SecretStore;

pub struct TokenStore {
    secrets: Arc<dyn SecretStore>,
    remote: Arc<dyn RemoteApi>,
    refresh_lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(secrets: Arc<dyn SecretStore>, remote: Arc<dyn RemoteApi>) -> Self {
        Self {
            secrets,
            remote,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Store both tokens in one write. Empty tokens are refused and leave the
    /// stored pair untouched.
    pub async fn save(&self, tokens: &TokenPair) -> Result<(), AuthError> {
        if tokens.profile_token.expose_secret().is_empty() {
            return Err(AuthError::EmptyProfileToken);
        }
        if tokens.refresh_token.expose_secret().is_empty() {
            return Err(AuthError::EmptyRefreshToken);
        }
        self.secrets.save_tokens(tokens).await?;
        Ok(())
    }

    /// The stored pair, only when both halves are present and non-empty.
    pub async fn tokens(&self) -> Result<Option<TokenPair>, AuthError> {
        let profile = self.secrets.get_token().await?;
        let refresh = self.secrets.get_refresh_token().await?;
        let pair = match (profile, refresh) {
            (Some(profile), Some(refresh)) => TokenPair::new(profile, refresh),
            _ => return Ok(None),
        };
        Ok(pair.is_complete().then_some(pair))
    }

    pub async fn is_authenticated(&self) -> bool {
        match self.tokens().await {
            Ok(tokens) => tokens.is_some(),
            Err(err) => {
                warn!("failed to read tokens: {err}");
                false
            }
        }
    }

    pub async fn bearer(&self) -> Result<SecretString, AuthError> {
        self.tokens()
            .await?
            .map(|pair| pair.profile_token)
            .ok_or(AuthError::NotAuthenticated)
    }

    pub async fn clear(&self) -> Result<(), AuthError> {
        self.secrets.clear_tokens().await?;
        Ok(())
    }

    /// Exchange the refresh token for a new pair after `rejected` drew a 401.
    ///
    /// Concurrent callers queue on one lock. A caller that finds the stored
    /// profile token already differs from `rejected` takes that token instead
    /// of refreshing again.
    pub async fn refresh(&self, rejected: &SecretString) -> Result<SecretString, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.tokens().await?.ok_or(AuthError::NotAuthenticated)?;
        if current.profile_token.expose_secret() != rejected.expose_secret() {
            info!("token already refreshed by another caller");
            return Ok(current.profile_token);
        }

        let renewed = self
            .remote
            .post_refresh_token(current.refresh_token.expose_secret())
            .await?;
        self.save(&renewed).await?;
        info!("profile token refreshed");
        Ok(renewed.profile_token)
    }
}
