//! Error types for keystore rotation and signing-key access

use crate::key::KeyStatus;
use thiserror::Error;

/// Result type for keystore operations
pub type RotationResult<T> = Result<T, RotationError>;

/// Errors raised by the keystore, the rotation manager and the read paths
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RotationError {
    /// The cryptographic primitive could not produce a key pair
    #[error("Key generation failed: {0}")]
    Generation(String),

    /// A sign request arrived before the first rotation completed
    #[error("No active signing key: rotation has not completed yet")]
    NoActiveKey,

    /// The request kind is not one the provider serves
    #[error("Unsupported JWT request kind ({kind})")]
    UnsupportedRequestKind {
        /// Raw kind value supplied by the caller
        kind: u32,
    },

    /// Algorithm outside the ES256/ES384/ES512 allow-list
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Curve does not belong to the requested algorithm
    #[error("Curve {curve} cannot be used with {algorithm}")]
    CurveMismatch {
        /// Requested algorithm
        algorithm: String,
        /// Requested curve
        curve: String,
    },

    /// Key status change outside Active -> Retiring -> Removed
    #[error("Illegal key transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Status before the change
        from: KeyStatus,
        /// Requested status
        to: KeyStatus,
    },

    /// Key material could not be parsed or encoded
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Token is not a well-formed compact JWS
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Signature did not verify
    #[error("Invalid signature")]
    InvalidSignature,

    /// No exported key carries this id
    #[error("Unknown key id: {0}")]
    UnknownKeyId(String),

    /// JSON encoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration value missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// No Tokio runtime available to host deferred removals
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// The rotation manager has been shut down
    #[error("Rotation manager has been shut down")]
    ShutDown,
}

impl RotationError {
    /// Create a key generation error
    #[inline]
    #[must_use]
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Create an invalid key error
    #[inline]
    #[must_use]
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create an invalid token error
    #[inline]
    #[must_use]
    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::InvalidToken(msg.into())
    }

    /// Create a configuration error
    #[inline]
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a serialization error
    #[inline]
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// True for failures that only affect the current request and clear up
    /// once a rotation has completed.
    #[must_use]
    pub fn is_retryable_after_rotation(&self) -> bool {
        matches!(self, Self::NoActiveKey)
    }
}

impl From<serde_json::Error> for RotationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_kind_names_the_value() {
        let err = RotationError::UnsupportedRequestKind { kind: 7 };
        assert_eq!(err.to_string(), "Unsupported JWT request kind (7)");
    }

    #[test]
    fn only_missing_key_clears_after_rotation() {
        assert!(RotationError::NoActiveKey.is_retryable_after_rotation());
        assert!(!RotationError::generation("rng").is_retryable_after_rotation());
        assert!(!RotationError::UnsupportedRequestKind { kind: 1 }.is_retryable_after_rotation());
    }
}
