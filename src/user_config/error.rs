//! Config resolver error taxonomy (spec §4.4, §7).

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("configuration {0} not found")]
    NotFound(String),

    #[error("ownership mismatch")]
    OwnershipMismatch,

    #[error("failed to decrypt stored credential")]
    DecryptionFailed,

    #[error("config store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("session invalid or revoked")]
    InvalidSession,

    #[error("session expired")]
    SessionExpired,
}

impl ConfigError {
    pub fn status_code(&self) -> u16 {
        match self {
            ConfigError::NotFound(_) => 404,
            ConfigError::OwnershipMismatch => 403,
            ConfigError::DecryptionFailed => 500,
            ConfigError::Store(_) => 500,
            ConfigError::Invalid(_) => 400,
            ConfigError::InvalidSession => 401,
            ConfigError::SessionExpired => 401,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "CONFIG_NOT_FOUND",
            ConfigError::OwnershipMismatch => "OWNERSHIP_MISMATCH",
            ConfigError::DecryptionFailed => "CREDENTIAL_DECRYPTION_FAILED",
            ConfigError::Store(_) => "CONFIG_STORE_ERROR",
            ConfigError::Invalid(_) => "VALIDATION_ERROR",
            ConfigError::InvalidSession => "INVALID_SESSION",
            ConfigError::SessionExpired => "SESSION_EXPIRED",
        }
    }
}
