//! Process-level facade wiring keystore, rotation and read paths together.
//!
//! ```no_run
//! # async fn demo() -> jwks_rotor::RotationResult<()> {
//! use jwks_rotor::{JwtKeyService, SigningConfig};
//!
//! let service = JwtKeyService::start(SigningConfig::from_env()?)?;
//! let token = service.sign(br#"{"sub":"alice"}"#)?;
//! let claims = service.verify(&token)?;
//! # let _ = claims;
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::{
    algorithm::KeySpec,
    config::SigningConfig,
    crypto::jws,
    error::RotationResult,
    exporter::PublicKeySetExporter,
    jwk::PublicKeySet,
    key::KeyId,
    keystore::Keystore,
    options::{SignOptions, TokenOptions, VerifyOptions},
    provider::{RequestKind, SigningKeyProvider, SigningMaterial},
    rotation::{RotationManager, RotationOutcome},
    trigger::{IntervalTrigger, RotationTrigger},
};
use std::{sync::Arc, time::Duration};
use tracing::info;

/// Owns one keystore and everything that reads or writes it.
#[derive(Debug)]
pub struct JwtKeyService {
    config: SigningConfig,
    manager: RotationManager,
    provider: SigningKeyProvider,
    exporter: PublicKeySetExporter,
}

impl JwtKeyService {
    /// Validate `config`, build an empty keystore and run the first rotation
    /// so that signing works as soon as this returns.
    ///
    /// # Errors
    /// - `RotationError::Config` for an invalid configuration
    /// - `RotationError::Runtime` outside a Tokio runtime
    /// - `RotationError::Generation` if the first key cannot be produced
    pub fn start(config: SigningConfig) -> RotationResult<Self> {
        Self::start_with_keystore(config, Keystore::new())
    }

    /// Same as [`start`](Self::start) over a caller-built keystore, e.g. one
    /// with a custom key generator.
    ///
    /// # Errors
    /// See [`start`](Self::start).
    pub fn start_with_keystore(config: SigningConfig, keystore: Keystore) -> RotationResult<Self> {
        config.validate()?;
        let keystore = Arc::new(keystore);
        let manager = RotationManager::new(
            Arc::clone(&keystore),
            KeySpec::signing(config.algorithm),
            config.lifetime(),
        )?;
        let outcome = manager.rotate()?;
        info!(
            kid = %outcome.active.id(),
            lifetime_secs = config.token_lifetime_seconds,
            "JWT key service started"
        );

        Ok(Self {
            provider: SigningKeyProvider::new(Arc::clone(&keystore)),
            exporter: PublicKeySetExporter::new(keystore),
            manager,
            config,
        })
    }

    /// Public keys for the JWKS endpoint
    #[must_use]
    pub fn public_keys(&self) -> PublicKeySet {
        self.exporter.export()
    }

    /// Public keys as a JWKS document
    ///
    /// # Errors
    /// Returns `RotationError::Serialization` if encoding fails.
    pub fn public_keys_json(&self) -> RotationResult<String> {
        self.exporter.to_json()
    }

    /// Token lifetime
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.config.lifetime()
    }

    /// Id of the active key
    ///
    /// # Errors
    /// Returns `RotationError::NoActiveKey` if no key is active.
    pub fn signing_key_id(&self) -> RotationResult<KeyId> {
        self.provider.signing_key_id()
    }

    /// Key callback for the token framework: private material for signing.
    ///
    /// # Errors
    /// See [`SigningKeyProvider::current_signing_material`].
    pub fn secret_or_key_provider(
        &self,
        kind: impl Into<RequestKind>,
    ) -> RotationResult<SigningMaterial> {
        self.provider.current_signing_material(kind)
    }

    /// Sign and verify options reflecting the active key
    ///
    /// # Errors
    /// Returns `RotationError::NoActiveKey` if no key is active.
    pub fn token_options(&self) -> RotationResult<TokenOptions> {
        Ok(TokenOptions {
            sign: SignOptions {
                algorithm: self.config.algorithm,
                key_id: self.signing_key_id()?,
                expires_in_seconds: self.config.token_lifetime_seconds,
                audience: self.config.audience.clone(),
                issuer: self.config.issuer.clone(),
            },
            verify: VerifyOptions {
                algorithms: self.config.verification_algorithms().to_vec(),
                issuer: self.config.issuer.clone(),
            },
        })
    }

    /// Sign `payload` with the active key
    ///
    /// # Errors
    /// Returns `RotationError::NoActiveKey` if no key is active, or a key
    /// error if the material cannot be used.
    pub fn sign(&self, payload: &[u8]) -> RotationResult<String> {
        let material = self.provider.current_signing_material(RequestKind::Sign)?;
        jws::sign(&material, payload)
    }

    /// Verify `token` against the currently exported keys and return its
    /// payload.
    ///
    /// # Errors
    /// See [`jws::verify`].
    pub fn verify(&self, token: &str) -> RotationResult<Vec<u8>> {
        jws::verify(&self.exporter.export(), token)
    }

    /// Rotate now
    ///
    /// # Errors
    /// See [`RotationManager::rotate`].
    pub fn rotate(&self) -> RotationResult<RotationOutcome> {
        self.manager.rotate()
    }

    /// Rotate on every tick of `trigger` until it ends or the service shuts
    /// down
    pub async fn run<T: RotationTrigger>(&self, trigger: T) {
        self.manager.run(trigger).await;
    }

    /// Rotate every `rotation_interval_seconds`
    ///
    /// # Errors
    /// Returns `RotationError::Config` if the interval cannot be scheduled.
    pub async fn run_on_interval(&self) -> RotationResult<()> {
        let trigger = IntervalTrigger::new(self.config.rotation_interval())?;
        self.run(trigger).await;
        Ok(())
    }

    /// The rotation manager
    #[must_use]
    pub fn manager(&self) -> &RotationManager {
        &self.manager
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    /// Cancel pending removals and stop rotating. Returns the number of
    /// removals cancelled.
    pub async fn shutdown(&self) -> usize {
        self.manager.shutdown().await
    }
}
