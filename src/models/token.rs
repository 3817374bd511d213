use secrecy::{ExposeSecret, SecretString};

/// Profile access token plus the refresh token used to renew it.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub profile_token: SecretString,
    pub refresh_token: SecretString,
}

impl TokenPair {
    pub fn new(profile_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            profile_token: SecretString::from(profile_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
        }
    }

    /// Both tokens present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.profile_token.expose_secret().is_empty()
            && !self.refresh_token.expose_secret().is_empty()
    }
}
