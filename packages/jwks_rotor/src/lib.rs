//! Rotating ECDSA signing keys for JWT issuance
//!
//! This crate provides:
//! - An in-memory keystore with at most one active signing key
//! - Rotation that retires the previous key instead of deleting it
//! - Deferred removal once every token signed by a retired key has expired
//! - A JWKS export of all keys still valid for verification
//! - ES256, ES384 and ES512 compact JWS helpers
//!
//! Key lifecycle:
//!
//! ```text
//! Active --rotate--> Retiring --token lifetime elapsed--> Removed (purged)
//! ```

pub mod algorithm;
pub mod config;
pub mod crypto;
mod error;
pub mod exporter;
pub mod jwk;
pub mod key;
pub mod keystore;
pub mod options;
pub mod provider;
pub mod rotation;
mod scheduler;
pub mod service;
pub mod trigger;

pub use algorithm::{Algorithm, Curve, KeySpec, KeyUse, VERIFICATION_ALGORITHMS};
pub use config::SigningConfig;
pub use crypto::{jws, KeyGenerator, KeyMaterial, OsKeyGenerator};
pub use error::*;
pub use exporter::PublicKeySetExporter;
pub use jwk::{PublicJwk, PublicKeySet};
pub use key::{Key, KeyId, KeyStatus};
pub use keystore::{Generated, KeyEntry, KeySet, Keystore, RemovedKey, RetiredKey};
pub use options::{SignOptions, TokenOptions, VerifyOptions};
pub use provider::{RequestKind, SigningKeyProvider, SigningMaterial};
pub use rotation::{RotationManager, RotationOutcome, ScheduledRemoval};
pub use scheduler::{PendingRemoval, RemovalQueue};
pub use service::JwtKeyService;
pub use trigger::{IntervalTrigger, RotationTrigger};
