//! EC key pair generation for ES256, ES384 and ES512

use crate::{
    algorithm::{Curve, KeySpec},
    error::{RotationError, RotationResult},
};
use elliptic_curve::{
    pkcs8::{AssociatedOid, EncodePrivateKey, EncodePublicKey, LineEnding},
    sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint},
    AffinePoint, CurveArithmetic, FieldBytesSize, SecretKey,
};
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

/// Random scalars drawn before giving up on a key pair.
const MAX_SCALAR_DRAWS: usize = 8;

/// Encoded output of one key pair generation
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    /// Curve the pair lives on
    pub curve: Curve,
    /// SEC1 uncompressed public point
    pub public_point: Vec<u8>,
    /// SubjectPublicKeyInfo PEM
    pub public_pem: String,
    /// PKCS#8 PEM private key
    pub private_pem: Zeroizing<String>,
}

/// Source of fresh key pairs.
///
/// The keystore calls this once per rotation; any error aborts that rotation.
pub trait KeyGenerator: Send + Sync + 'static {
    /// Produce a key pair for `spec`
    ///
    /// # Errors
    /// Returns `RotationError::Generation` when no key pair can be produced.
    fn generate(&self, spec: &KeySpec) -> RotationResult<KeyMaterial>;
}

/// Generator backed by the operating system's entropy source
#[derive(Debug, Default, Clone, Copy)]
pub struct OsKeyGenerator;

impl KeyGenerator for OsKeyGenerator {
    fn generate(&self, spec: &KeySpec) -> RotationResult<KeyMaterial> {
        let curve = spec.curve();
        for _ in 0..MAX_SCALAR_DRAWS {
            let scalar = draw_scalar(curve)?;
            let material = match curve {
                Curve::P256 => material_from_scalar::<p256::NistP256>(curve, &scalar)?,
                Curve::P384 => material_from_scalar::<p384::NistP384>(curve, &scalar)?,
                Curve::P521 => material_from_scalar::<p521::NistP521>(curve, &scalar)?,
            };
            if let Some(material) = material {
                return Ok(material);
            }
        }
        Err(RotationError::generation(format!(
            "no valid {curve} scalar after {MAX_SCALAR_DRAWS} draws"
        )))
    }
}

fn draw_scalar(curve: Curve) -> RotationResult<Zeroizing<Vec<u8>>> {
    let mut bytes = Zeroizing::new(vec![0u8; curve.field_size()]);
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| RotationError::generation(format!("entropy source failed: {e}")))?;
    if curve == Curve::P521 {
        // 66 bytes carry 528 bits; the group order is just under 2^521.
        bytes[0] &= 0x01;
    }
    Ok(bytes)
}

/// `Ok(None)` means the scalar was zero or out of range and should be redrawn.
fn material_from_scalar<C>(curve: Curve, scalar: &[u8]) -> RotationResult<Option<KeyMaterial>>
where
    C: CurveArithmetic + AssociatedOid,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    FieldBytesSize<C>: ModulusSize,
{
    let Ok(secret) = SecretKey::<C>::from_slice(scalar) else {
        return Ok(None);
    };

    let private_pem = secret
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| RotationError::generation(format!("PKCS#8 encoding failed: {e}")))?;

    let public = secret.public_key();
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| RotationError::generation(format!("SPKI encoding failed: {e}")))?;
    let public_point = public.to_encoded_point(false).as_bytes().to_vec();

    Ok(Some(KeyMaterial {
        curve,
        public_point,
        public_pem,
        private_pem,
    }))
}
