//! Read path used by the token issuer to fetch the active private key

use crate::{
    algorithm::Algorithm,
    error::{RotationError, RotationResult},
    key::{Key, KeyId},
    keystore::Keystore,
};
use std::{fmt, sync::Arc};
use tracing::{error, warn};
use zeroize::Zeroizing;

/// Kind of key request made by the token framework.
///
/// Raw values follow the framework's numbering: `0` sign, `1` verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Material for signing a new token
    Sign,
    /// Material for verifying a token
    Verify,
    /// Any value the framework may add later
    Other(u32),
}

impl RequestKind {
    /// Raw numeric value
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::Sign => 0,
            Self::Verify => 1,
            Self::Other(raw) => raw,
        }
    }
}

impl From<u32> for RequestKind {
    fn from(raw: u32) -> Self {
        match raw {
            0 => Self::Sign,
            1 => Self::Verify,
            other => Self::Other(other),
        }
    }
}

/// Private key handed to the signer
#[derive(Clone)]
pub struct SigningMaterial {
    key_id: KeyId,
    algorithm: Algorithm,
    pem: Zeroizing<String>,
}

impl SigningMaterial {
    pub(crate) fn from_key(key: &Key) -> Self {
        Self {
            key_id: key.id().clone(),
            algorithm: key.algorithm(),
            pem: Zeroizing::new(key.private().pem().to_string()),
        }
    }

    /// Id to place in the token header
    #[must_use]
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// Algorithm the key signs with
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// PKCS#8 PEM private key
    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }
}

impl fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("pem", &"<redacted>")
            .finish()
    }
}

/// Hands out the active key's private material.
#[derive(Debug, Clone)]
pub struct SigningKeyProvider {
    keystore: Arc<Keystore>,
}

impl SigningKeyProvider {
    /// Provider reading from `keystore`
    #[must_use]
    pub fn new(keystore: Arc<Keystore>) -> Self {
        Self { keystore }
    }

    /// Private key material for `kind`.
    ///
    /// Only [`RequestKind::Sign`] yields material. Every other kind is logged
    /// and answered with `UnsupportedRequestKind`, which callers must keep
    /// apart from `NoActiveKey`.
    ///
    /// # Errors
    /// - `RotationError::NoActiveKey` before the first rotation
    /// - `RotationError::UnsupportedRequestKind` for any kind other than sign
    pub fn current_signing_material(
        &self,
        kind: impl Into<RequestKind>,
    ) -> RotationResult<SigningMaterial> {
        match kind.into() {
            RequestKind::Sign => {
                let Some(key) = self.keystore.active() else {
                    warn!("Sign request received before the first key rotation");
                    return Err(RotationError::NoActiveKey);
                };
                Ok(SigningMaterial::from_key(&key))
            }
            other => {
                let kind = other.raw();
                error!(kind, "Unknown JWT request type ({kind})");
                Err(RotationError::UnsupportedRequestKind { kind })
            }
        }
    }

    /// Id of the active key, for token headers
    ///
    /// # Errors
    /// Returns `RotationError::NoActiveKey` before the first rotation.
    pub fn signing_key_id(&self) -> RotationResult<KeyId> {
        self.keystore
            .active()
            .map(|key| key.id().clone())
            .ok_or(RotationError::NoActiveKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::KeySpec;

    #[test]
    fn raw_values_round_trip() {
        assert_eq!(RequestKind::from(0), RequestKind::Sign);
        assert_eq!(RequestKind::from(1), RequestKind::Verify);
        assert_eq!(RequestKind::from(7), RequestKind::Other(7));
        assert_eq!(RequestKind::Other(7).raw(), 7);
    }

    #[test]
    fn sign_before_rotation_is_no_active_key() {
        let provider = SigningKeyProvider::new(Arc::new(Keystore::new()));
        assert_eq!(
            provider.current_signing_material(RequestKind::Sign).unwrap_err(),
            RotationError::NoActiveKey
        );
        assert_eq!(provider.signing_key_id(), Err(RotationError::NoActiveKey));
    }

    #[test]
    fn verify_kind_yields_no_material() {
        let keystore = Arc::new(Keystore::new());
        keystore.generate(&KeySpec::default()).unwrap();
        let provider = SigningKeyProvider::new(keystore);
        assert_eq!(
            provider.current_signing_material(RequestKind::Verify).unwrap_err(),
            RotationError::UnsupportedRequestKind { kind: 1 }
        );
    }

    #[test]
    fn material_debug_hides_pem() {
        let keystore = Arc::new(Keystore::new());
        keystore.generate(&KeySpec::default()).unwrap();
        let material = SigningKeyProvider::new(keystore)
            .current_signing_material(RequestKind::Sign)
            .unwrap();
        assert!(!format!("{material:?}").contains("PRIVATE KEY"));
    }
}
