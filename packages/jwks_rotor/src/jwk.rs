//! JWKS representation of the exported public keys

use crate::{
    algorithm::{Algorithm, Curve, KeyUse},
    error::{RotationError, RotationResult},
    key::{Key, KeyId},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

/// Public EC key in JWK form. The type has no field for private material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    /// Key type, always `EC`
    pub kty: String,
    /// Key id
    pub kid: KeyId,
    /// Intended use
    #[serde(rename = "use")]
    pub key_use: KeyUse,
    /// Signing algorithm
    pub alg: Algorithm,
    /// Curve name
    pub crv: Curve,
    /// base64url affine x coordinate
    pub x: String,
    /// base64url affine y coordinate
    pub y: String,
}

impl PublicJwk {
    /// Public JWK for `key`
    #[must_use]
    pub fn from_key(key: &Key) -> Self {
        Self {
            kty: "EC".to_string(),
            kid: key.id().clone(),
            key_use: key.usage(),
            alg: key.algorithm(),
            crv: key.curve(),
            x: URL_SAFE_NO_PAD.encode(key.public().x()),
            y: URL_SAFE_NO_PAD.encode(key.public().y()),
        }
    }

    /// Rebuild the SEC1 uncompressed point from `x` and `y`
    ///
    /// # Errors
    /// Returns `RotationError::InvalidKey` when a coordinate is not valid
    /// base64url or has the wrong length for the curve.
    pub fn sec1_point(&self) -> RotationResult<Vec<u8>> {
        let size = self.crv.field_size();
        let x = decode_coordinate(&self.x, size)?;
        let y = decode_coordinate(&self.y, size)?;

        let mut point = Vec::with_capacity(1 + 2 * size);
        point.push(0x04);
        point.extend_from_slice(&x);
        point.extend_from_slice(&y);
        Ok(point)
    }
}

fn decode_coordinate(encoded: &str, size: usize) -> RotationResult<Vec<u8>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| RotationError::invalid_key("coordinate is not base64url"))?;
    if bytes.len() != size {
        return Err(RotationError::invalid_key(format!(
            "coordinate must be {size} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// JSON Web Key Set served to token verifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeySet {
    /// Keys in keystore insertion order
    pub keys: Vec<PublicJwk>,
}

impl PublicKeySet {
    /// Key with the given id
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&PublicJwk> {
        self.keys.iter().find(|k| k.kid.as_str() == kid)
    }

    /// Ids in order
    pub fn ids(&self) -> impl Iterator<Item = &KeyId> {
        self.keys.iter().map(|k| &k.kid)
    }

    /// Number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no key is exported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Serialize as a JWKS document
    ///
    /// # Errors
    /// Returns `RotationError::Serialization` if encoding fails.
    pub fn to_json(&self) -> RotationResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
