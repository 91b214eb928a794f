//! Relay Error Types
//!
//! One taxonomy for everything a scan cycle can raise. The failure
//! classifier decides continue/stop purely from the variant and the
//! retry metadata carried on contract errors.

use thiserror::Error;

/// Relay error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    // === Chain query ===
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    // === Contract calls ===
    /// Contract call rejected by the signer or the chain.
    ///
    /// `max_retries = None` means unlimited consecutive failures are tolerated.
    #[error("Contract call failed: {message}")]
    TransactContract {
        message: String,
        retry: bool,
        max_retries: Option<u32>,
    },

    /// CPU/NET billing rejection that is usually a false positive.
    #[error("Contract call temporarily rejected: {message}")]
    TransientContract { message: String },

    // === Fatal ===
    #[error("Signer session expired: {0}")]
    SessionExpired(String),

    #[error("Unrecoverable error: {0}")]
    Unrecoverable(String),

    // === System ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal system error: {0}")]
    System(String),
}

impl RelayError {
    /// Stable code for structured log fields
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Network(_) => "NETWORK",
            RelayError::Parse(_) => "PARSE",
            RelayError::TransactContract { .. } => "TRANSACT_CONTRACT",
            RelayError::TransientContract { .. } => "TRANSIENT_CONTRACT",
            RelayError::SessionExpired(_) => "SESSION_EXPIRED",
            RelayError::Unrecoverable(_) => "UNRECOVERABLE",
            RelayError::Config(_) => "CONFIG",
            RelayError::System(_) => "SYSTEM",
        }
    }

    /// Contract-level failure (counts toward the consecutive error counter)
    #[inline]
    pub fn is_contract(&self) -> bool {
        matches!(
            self,
            RelayError::TransactContract { .. } | RelayError::TransientContract { .. }
        )
    }

    /// Whether another cycle may be attempted after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::TransactContract { retry, .. } => *retry,
            RelayError::SessionExpired(_) | RelayError::Unrecoverable(_) => false,
            _ => true,
        }
    }

    /// Consecutive-failure ceiling carried by the error; `None` is unlimited.
    pub fn max_retries(&self) -> Option<u32> {
        match self {
            RelayError::TransactContract { max_retries, .. } => *max_retries,
            _ => None,
        }
    }
}

impl From<anyhow::Error> for RelayError {
    fn from(e: anyhow::Error) -> Self {
        RelayError::System(e.to_string())
    }
}

impl From<serde_yaml::Error> for RelayError {
    fn from(e: serde_yaml::Error) -> Self {
        RelayError::Config(e.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Config(e.to_string())
    }
}
