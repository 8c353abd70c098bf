//! Compact JWS signing and verification against the exported key set.
//!
//! Signatures use the fixed-width `r || s` encoding JWS requires for the
//! ES* algorithms. Payloads are opaque bytes; claims are not interpreted.

use crate::{
    algorithm::Algorithm,
    error::{RotationError, RotationResult},
    jwk::PublicKeySet,
    provider::SigningMaterial,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use elliptic_curve::pkcs8::DecodePrivateKey;
use serde::{Deserialize, Serialize};

/// Protected header of a compact JWS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    /// Algorithm name as found in the token
    pub alg: String,
    /// Media type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Key id selecting the verification key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

macro_rules! ecdsa_sign {
    ($curve:ident, $pem:expr, $input:expr) => {{
        use $curve::ecdsa::{signature::Signer as _, Signature, SigningKey};
        let secret = $curve::SecretKey::from_pkcs8_pem($pem)
            .map_err(|e| RotationError::invalid_key(format!("invalid PKCS#8 private key: {e}")))?;
        let signing_key = SigningKey::from_bytes(&secret.to_bytes())
            .map_err(|e| RotationError::invalid_key(format!("invalid signing scalar: {e}")))?;
        let signature: Signature = signing_key.sign($input);
        signature.to_bytes().to_vec()
    }};
}

macro_rules! ecdsa_verify {
    ($curve:ident, $sec1:expr, $input:expr, $signature:expr) => {{
        use $curve::ecdsa::{signature::Verifier as _, Signature, VerifyingKey};
        let verifying_key = VerifyingKey::from_sec1_bytes($sec1)
            .map_err(|_| RotationError::invalid_key("invalid SEC1 public key"))?;
        let signature =
            Signature::from_slice($signature).map_err(|_| RotationError::InvalidSignature)?;
        verifying_key
            .verify($input, &signature)
            .map_err(|_| RotationError::InvalidSignature)?;
    }};
}

/// Sign `payload` with the active key, producing `header.payload.signature`.
///
/// # Errors
/// Returns `RotationError::InvalidKey` if the PEM cannot be parsed and
/// `RotationError::Serialization` if the header cannot be encoded.
pub fn sign(material: &SigningMaterial, payload: &[u8]) -> RotationResult<String> {
    let header = JwsHeader {
        alg: material.algorithm().as_str().to_string(),
        typ: Some("JWT".to_string()),
        kid: Some(material.key_id().to_string()),
    };
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);

    let mut signing_input = String::with_capacity(header_b64.len() + 1 + payload_b64.len());
    signing_input.push_str(&header_b64);
    signing_input.push('.');
    signing_input.push_str(&payload_b64);

    let input = signing_input.as_bytes();
    let signature = match material.algorithm() {
        Algorithm::Es256 => ecdsa_sign!(p256, material.pem(), input),
        Algorithm::Es384 => ecdsa_sign!(p384, material.pem(), input),
        Algorithm::Es512 => ecdsa_sign!(p521, material.pem(), input),
    };
    let signature_b64 = URL_SAFE_NO_PAD.encode(signature);

    let mut token = String::with_capacity(signing_input.len() + 1 + signature_b64.len());
    token.push_str(&signing_input);
    token.push('.');
    token.push_str(&signature_b64);
    Ok(token)
}

/// Decode the protected header without verifying anything
///
/// # Errors
/// Returns `RotationError::InvalidToken` for malformed input.
pub fn decode_header(token: &str) -> RotationResult<JwsHeader> {
    let (header_b64, _, _) = split(token)?;
    let header_json = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| RotationError::invalid_token("header is not base64url"))?;
    serde_json::from_slice(&header_json)
        .map_err(|e| RotationError::invalid_token(format!("header is not valid JSON: {e}")))
}

/// Verify `token` against `keys` and return its payload.
///
/// The header's `alg` must be on the verification allow-list and must match
/// the algorithm of the key its `kid` selects.
///
/// # Errors
/// - `RotationError::InvalidToken` for malformed tokens or a missing `kid`
/// - `RotationError::UnsupportedAlgorithm` for algorithms outside the allow-list
/// - `RotationError::UnknownKeyId` when no exported key carries the `kid`
/// - `RotationError::InvalidSignature` when the signature does not verify
pub fn verify(keys: &PublicKeySet, token: &str) -> RotationResult<Vec<u8>> {
    let header = decode_header(token)?;
    let algorithm: Algorithm = header.alg.parse()?;
    if !algorithm.is_verification_allowed() {
        return Err(RotationError::UnsupportedAlgorithm(header.alg));
    }

    let kid = header
        .kid
        .ok_or_else(|| RotationError::invalid_token("missing kid"))?;
    let jwk = keys
        .find(&kid)
        .ok_or_else(|| RotationError::UnknownKeyId(kid.clone()))?;
    if jwk.alg != algorithm {
        return Err(RotationError::invalid_token(format!(
            "token algorithm {algorithm} does not match key algorithm {}",
            jwk.alg
        )));
    }

    let (header_b64, payload_b64, signature_b64) = split(token)?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| RotationError::InvalidSignature)?;
    let sec1 = jwk.sec1_point()?;
    let input_len = header_b64.len() + 1 + payload_b64.len();
    let input = &token.as_bytes()[..input_len];

    match algorithm {
        Algorithm::Es256 => ecdsa_verify!(p256, &sec1, input, &signature),
        Algorithm::Es384 => ecdsa_verify!(p384, &sec1, input, &signature),
        Algorithm::Es512 => ecdsa_verify!(p521, &sec1, input, &signature),
    }

    URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| RotationError::invalid_token("payload is not base64url"))
}

fn split(token: &str) -> RotationResult<(&str, &str, &str)> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !s.is_empty() => Ok((h, p, s)),
        _ => Err(RotationError::invalid_token(
            "expected three dot-separated segments",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithm::{KeySpec, VERIFICATION_ALGORITHMS},
        keystore::Keystore,
        provider::{RequestKind, SigningKeyProvider},
    };
    use std::sync::Arc;

    fn signer_for(alg: Algorithm) -> (Arc<Keystore>, SigningMaterial) {
        let keystore = Arc::new(Keystore::new());
        keystore.generate(&KeySpec::signing(alg)).unwrap();
        let material = SigningKeyProvider::new(Arc::clone(&keystore))
            .current_signing_material(RequestKind::Sign)
            .unwrap();
        (keystore, material)
    }

    #[test]
    fn signs_and_verifies_every_algorithm() {
        for alg in VERIFICATION_ALGORITHMS {
            let (keystore, material) = signer_for(alg);
            let token = sign(&material, b"{\"sub\":\"alice\"}").unwrap();

            let header = decode_header(&token).unwrap();
            assert_eq!(header.alg, alg.as_str());
            assert_eq!(header.kid.as_deref(), Some(material.key_id().as_str()));

            let payload = verify(&keystore.export_public_set(), &token).unwrap();
            assert_eq!(payload, b"{\"sub\":\"alice\"}");
        }
    }

    #[test]
    fn tampered_payload_fails() {
        let (keystore, material) = signer_for(Algorithm::Es256);
        let token = sign(&material, b"original").unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(b"forged");
        parts[1] = &forged;
        let forged_token = parts.join(".");
        assert_eq!(
            verify(&keystore.export_public_set(), &forged_token),
            Err(RotationError::InvalidSignature)
        );
    }

    #[test]
    fn unknown_kid_is_reported() {
        let (_, material) = signer_for(Algorithm::Es256);
        let token = sign(&material, b"x").unwrap();
        let (other, _) = signer_for(Algorithm::Es256);
        assert!(matches!(
            verify(&other.export_public_set(), &token),
            Err(RotationError::UnknownKeyId(kid)) if kid == material.key_id().as_str()
        ));
    }

    #[test]
    fn rejects_algorithms_outside_the_allow_list() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","kid":"k"}"#);
        let token = format!("{header}.e30.c2ln");
        assert!(matches!(
            verify(&PublicKeySet::default(), &token),
            Err(RotationError::UnsupportedAlgorithm(alg)) if alg == "none"
        ));
    }

    #[test]
    fn rejects_malformed_tokens() {
        for token in ["", "a.b", "a.b.c.d", ".b.c"] {
            assert!(matches!(
                verify(&PublicKeySet::default(), token),
                Err(RotationError::InvalidToken(_))
            ));
        }
    }
}
