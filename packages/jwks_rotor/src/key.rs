//! Key value object, key identifiers and the key status lifecycle

use crate::{
    algorithm::{Algorithm, Curve, KeySpec, KeyUse},
    crypto::KeyMaterial,
    error::{RotationError, RotationResult},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Key identifier (`kid`)
///
/// Derived from the RFC 7638 thumbprint of the public key, so two distinct
/// key pairs never share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// RFC 7638 SHA-256 thumbprint of an EC public key
    #[must_use]
    pub fn thumbprint(curve: Curve, x: &[u8], y: &[u8]) -> Self {
        // Members in lexicographic order, no whitespace.
        let canonical = format!(
            r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
            curve.as_str(),
            URL_SAFE_NO_PAD.encode(x),
            URL_SAFE_NO_PAD.encode(y),
        );
        Self(URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle status of a key inside the keystore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyStatus {
    /// Signs new tokens. At most one key is active.
    Active,
    /// Verification only, awaiting removal after the grace period.
    Retiring,
    /// Purged from the keystore. Terminal.
    Removed,
}

impl KeyStatus {
    /// Whether `self -> next` is part of `Active -> Retiring -> Removed`
    #[must_use]
    pub const fn can_transition_to(self, next: KeyStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Retiring) | (Self::Retiring, Self::Removed)
        )
    }

    /// Move to `next`
    ///
    /// # Errors
    /// Returns `RotationError::IllegalTransition` for any other change.
    pub fn transition(self, next: KeyStatus) -> RotationResult<KeyStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(RotationError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Public half of an EC key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicComponent {
    point: Vec<u8>,
    pem: String,
}

impl PublicComponent {
    pub(crate) fn new(point: Vec<u8>, pem: String) -> Self {
        Self { point, pem }
    }

    /// SEC1 uncompressed point (`0x04 || x || y`)
    #[must_use]
    pub fn sec1(&self) -> &[u8] {
        &self.point
    }

    /// Affine x coordinate
    #[must_use]
    pub fn x(&self) -> &[u8] {
        let n = self.coordinate_len();
        &self.point[1..1 + n]
    }

    /// Affine y coordinate
    #[must_use]
    pub fn y(&self) -> &[u8] {
        let n = self.coordinate_len();
        &self.point[1 + n..]
    }

    /// SubjectPublicKeyInfo PEM
    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }

    fn coordinate_len(&self) -> usize {
        self.point.len().saturating_sub(1) / 2
    }
}

/// Private half of an EC key pair, PKCS#8 PEM encoded
#[derive(Clone)]
pub struct PrivateComponent {
    pem: Zeroizing<String>,
}

impl PrivateComponent {
    pub(crate) fn new(pem: Zeroizing<String>) -> Self {
        Self { pem }
    }

    /// PKCS#8 PEM text
    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }
}

impl fmt::Debug for PrivateComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateComponent(<redacted>)")
    }
}

/// One asymmetric key pair plus its immutable metadata.
///
/// Status is tracked by the keystore, not by the key itself, so a `Key`
/// can be shared across snapshots without copying.
#[derive(Debug, Clone)]
pub struct Key {
    id: KeyId,
    algorithm: Algorithm,
    curve: Curve,
    usage: KeyUse,
    public: PublicComponent,
    private: PrivateComponent,
    created_at: DateTime<Utc>,
}

impl Key {
    /// Assemble a key from freshly generated material
    ///
    /// # Errors
    /// Returns `RotationError::Generation` if the material's curve does not
    /// match the spec or the public point is malformed.
    pub fn from_material(spec: &KeySpec, material: KeyMaterial) -> RotationResult<Self> {
        let KeyMaterial {
            curve,
            public_point,
            public_pem,
            private_pem,
        } = material;

        if curve != spec.curve() {
            return Err(RotationError::generation(format!(
                "generator produced a {curve} key for a {} spec",
                spec.curve()
            )));
        }
        if public_point.len() != 1 + 2 * curve.field_size() || public_point[0] != 0x04 {
            return Err(RotationError::generation(
                "public point is not an uncompressed SEC1 encoding",
            ));
        }

        let public = PublicComponent::new(public_point, public_pem);
        let id = KeyId::thumbprint(curve, public.x(), public.y());

        Ok(Self {
            id,
            algorithm: spec.algorithm(),
            curve,
            usage: spec.usage(),
            public,
            private: PrivateComponent::new(private_pem),
            created_at: Utc::now(),
        })
    }

    /// Key id
    #[must_use]
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    /// Algorithm
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Curve
    #[must_use]
    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Intended use
    #[must_use]
    pub fn usage(&self) -> KeyUse {
        self.usage
    }

    /// Public component
    #[must_use]
    pub fn public(&self) -> &PublicComponent {
        &self.public
    }

    /// Private component. Only the signing path reads this.
    #[must_use]
    pub(crate) fn private(&self) -> &PrivateComponent {
        &self.private
    }

    /// Wall-clock generation time
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
