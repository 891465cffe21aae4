use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error codes returned by Donelog billing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    ValidationError,
    InvalidSignature,
    NotFound,
    Unauthorized,
    UpgradeRequired,
    DatabaseError,
    Timeout,
    ProviderError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::UpgradeRequired => "UPGRADE_REQUIRED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while decoding feature values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("Invalid limit {0}: must be -1 (unlimited) or a non-negative integer")]
    InvalidLimit(i64),

    #[error("Unknown feature key: {0}")]
    UnknownKey(String),
}
