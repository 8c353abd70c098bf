//! Signing algorithms, curves and key specifications
//!
//! Only the elliptic-curve JWS algorithms are supported. Each algorithm is
//! bound to exactly one curve and hash strength:
//!
//! | alg   | crv   | hash    | scalar bytes |
//! |-------|-------|---------|--------------|
//! | ES256 | P-256 | SHA-256 | 32           |
//! | ES384 | P-384 | SHA-384 | 48           |
//! | ES512 | P-521 | SHA-512 | 66           |

use crate::error::{RotationError, RotationResult};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Algorithms accepted when verifying tokens.
pub const VERIFICATION_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::Es256, Algorithm::Es384, Algorithm::Es512];

/// JWS elliptic-curve signature algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// ECDSA over P-256 with SHA-256
    #[default]
    #[serde(rename = "ES256")]
    Es256,
    /// ECDSA over P-384 with SHA-384
    #[serde(rename = "ES384")]
    Es384,
    /// ECDSA over P-521 with SHA-512
    #[serde(rename = "ES512")]
    Es512,
}

impl Algorithm {
    /// Header `alg` value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
        }
    }

    /// The only curve this algorithm signs with
    #[must_use]
    pub const fn curve(self) -> Curve {
        match self {
            Self::Es256 => Curve::P256,
            Self::Es384 => Curve::P384,
            Self::Es512 => Curve::P521,
        }
    }

    /// Whether verifiers accept this algorithm
    #[must_use]
    pub fn is_verification_allowed(self) -> bool {
        VERIFICATION_ALGORITHMS.contains(&self)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ES256" => Ok(Self::Es256),
            "ES384" => Ok(Self::Es384),
            "ES512" => Ok(Self::Es512),
            other => Err(RotationError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// NIST prime curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Curve {
    /// secp256r1
    #[serde(rename = "P-256")]
    P256,
    /// secp384r1
    #[serde(rename = "P-384")]
    P384,
    /// secp521r1
    #[serde(rename = "P-521")]
    P521,
}

impl Curve {
    /// JWK `crv` value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Length of a private scalar and of each affine coordinate
    #[must_use]
    pub const fn field_size(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWK `use` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyUse {
    /// Signature keys
    #[default]
    #[serde(rename = "sig")]
    Signing,
}

/// Parameters a key is generated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySpec {
    algorithm: Algorithm,
    curve: Curve,
    usage: KeyUse,
}

impl KeySpec {
    /// Build a spec, rejecting a curve that does not belong to `algorithm`.
    ///
    /// # Errors
    /// Returns `RotationError::CurveMismatch` for pairings such as ES256 on P-384.
    pub fn new(algorithm: Algorithm, curve: Curve, usage: KeyUse) -> RotationResult<Self> {
        if algorithm.curve() != curve {
            return Err(RotationError::CurveMismatch {
                algorithm: algorithm.to_string(),
                curve: curve.to_string(),
            });
        }
        Ok(Self {
            algorithm,
            curve,
            usage,
        })
    }

    /// Signing spec for `algorithm` on its own curve
    #[must_use]
    pub const fn signing(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            curve: algorithm.curve(),
            usage: KeyUse::Signing,
        }
    }

    /// Algorithm
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Curve
    #[must_use]
    pub const fn curve(&self) -> Curve {
        self.curve
    }

    /// Intended use
    #[must_use]
    pub const fn usage(&self) -> KeyUse {
        self.usage
    }
}

impl Default for KeySpec {
    fn default() -> Self {
        Self::signing(Algorithm::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_must_match_algorithm() {
        assert!(KeySpec::new(Algorithm::Es256, Curve::P256, KeyUse::Signing).is_ok());
        let err = KeySpec::new(Algorithm::Es256, Curve::P384, KeyUse::Signing).unwrap_err();
        assert_eq!(
            err,
            RotationError::CurveMismatch {
                algorithm: "ES256".into(),
                curve: "P-384".into()
            }
        );
    }

    #[test]
    fn parses_allow_listed_names_only() {
        assert_eq!("ES512".parse::<Algorithm>().unwrap(), Algorithm::Es512);
        assert!(matches!(
            "RS256".parse::<Algorithm>(),
            Err(RotationError::UnsupportedAlgorithm(alg)) if alg == "RS256"
        ));
    }

    #[test]
    fn serializes_jose_names() {
        assert_eq!(serde_json::to_string(&Algorithm::Es384).unwrap(), "\"ES384\"");
        assert_eq!(serde_json::to_string(&Curve::P521).unwrap(), "\"P-521\"");
        assert_eq!(serde_json::to_string(&KeyUse::Signing).unwrap(), "\"sig\"");
    }

    #[test]
    fn every_algorithm_is_verifiable() {
        for alg in VERIFICATION_ALGORITHMS {
            assert!(alg.is_verification_allowed());
            assert_eq!(KeySpec::signing(alg).curve(), alg.curve());
        }
    }
}
