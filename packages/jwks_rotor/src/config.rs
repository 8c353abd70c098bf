//! Signing configuration

use crate::{
    algorithm::{Algorithm, VERIFICATION_ALGORITHMS},
    error::{RotationError, RotationResult},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Token lifetime in seconds
pub const ENV_TOKEN_EXPIRATION: &str = "TOKEN_EXPIRATION";
/// Expected `aud` claim
pub const ENV_TOKEN_AUDIENCE: &str = "TOKEN_AUDIENCE";
/// `iss` claim
pub const ENV_TOKEN_ISSUER: &str = "TOKEN_ISSUER";
/// Signing algorithm name
pub const ENV_TOKEN_ALGORITHM: &str = "TOKEN_ALGORITHM";

/// Upper bound for the token lifetime and the rotation interval (ten years)
pub const MAX_PERIOD_SECONDS: u64 = 10 * 366 * 24 * 3600;

/// Settings for token signing and key rotation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Lifetime of issued tokens, and therefore the grace period of a
    /// retiring key
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_seconds: u64,
    /// `aud` claim for issued tokens
    #[serde(default)]
    pub audience: Option<String>,
    /// `iss` claim, also required on verification
    #[serde(default)]
    pub issuer: Option<String>,
    /// Algorithm of newly generated keys
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Period of [`IntervalTrigger`](crate::trigger::IntervalTrigger)
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_seconds: u64,
}

fn default_token_lifetime() -> u64 {
    3600 // 1 hour
}

fn default_rotation_interval() -> u64 {
    30 * 24 * 3600 // 30 days
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            token_lifetime_seconds: default_token_lifetime(),
            audience: None,
            issuer: None,
            algorithm: Algorithm::default(),
            rotation_interval_seconds: default_rotation_interval(),
        }
    }
}

impl SigningConfig {
    /// Build from `TOKEN_*` environment variables, falling back to defaults
    /// for anything unset.
    ///
    /// # Errors
    /// Returns `RotationError::Config` for unparsable values.
    pub fn from_env() -> RotationResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    ///
    /// # Errors
    /// Returns `RotationError::Config` for unparsable values.
    pub fn from_lookup<F>(lookup: F) -> RotationResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_TOKEN_EXPIRATION) {
            config.token_lifetime_seconds = raw.trim().parse().map_err(|_| {
                RotationError::config(format!(
                    "{ENV_TOKEN_EXPIRATION} must be a number of seconds, got {raw:?}"
                ))
            })?;
        }
        if let Some(raw) = lookup(ENV_TOKEN_ALGORITHM) {
            config.algorithm = raw
                .trim()
                .parse()
                .map_err(|e| RotationError::config(format!("{ENV_TOKEN_ALGORITHM}: {e}")))?;
        }
        config.audience = lookup(ENV_TOKEN_AUDIENCE).filter(|v| !v.is_empty());
        config.issuer = lookup(ENV_TOKEN_ISSUER).filter(|v| !v.is_empty());

        debug!(
            lifetime_secs = config.token_lifetime_seconds,
            algorithm = %config.algorithm,
            "Loaded signing configuration"
        );
        config.validate()?;
        Ok(config)
    }

    /// Check invariants not expressible in the types
    ///
    /// # Errors
    /// Returns `RotationError::Config` when the token lifetime or the
    /// rotation interval is zero or exceeds [`MAX_PERIOD_SECONDS`].
    pub fn validate(&self) -> RotationResult<()> {
        check_period("token lifetime", self.token_lifetime_seconds)?;
        check_period("rotation interval", self.rotation_interval_seconds)
    }

    /// Token lifetime as a duration
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.token_lifetime_seconds)
    }

    /// Period between scheduled rotations
    #[must_use]
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_seconds)
    }

    /// Algorithms accepted when verifying tokens
    #[must_use]
    pub fn verification_algorithms(&self) -> &'static [Algorithm] {
        &VERIFICATION_ALGORITHMS
    }
}

fn check_period(name: &str, seconds: u64) -> RotationResult<()> {
    if seconds == 0 {
        return Err(RotationError::config(format!("{name} must be positive")));
    }
    if seconds > MAX_PERIOD_SECONDS {
        return Err(RotationError::config(format!(
            "{name} of {seconds}s exceeds the {MAX_PERIOD_SECONDS}s limit"
        )));
    }
    Ok(())
}
