use std::fmt::Display;

use serde::Serialize;

/// The `(error, successful)` pair every public post operation reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostOutcome {
    pub error: Option<String>,
    pub successful: bool,
}

impl PostOutcome {
    pub fn success() -> Self {
        Self {
            error: None,
            successful: true,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            successful: false,
        }
    }

    pub fn from_result<T, E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::success(),
            Err(err) => Self::failure(err.to_string()),
        }
    }
}
