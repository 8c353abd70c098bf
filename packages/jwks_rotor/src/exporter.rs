//! Read-through JWKS endpoint source

use crate::{error::RotationResult, jwk::PublicKeySet, keystore::Keystore};
use std::sync::Arc;

/// Publishes the public half of every key the keystore still holds.
///
/// Each call reads the current snapshot; nothing is cached, so a purged key
/// disappears from the next export.
#[derive(Debug, Clone)]
pub struct PublicKeySetExporter {
    keystore: Arc<Keystore>,
}

impl PublicKeySetExporter {
    /// Exporter over `keystore`
    #[must_use]
    pub fn new(keystore: Arc<Keystore>) -> Self {
        Self { keystore }
    }

    /// Current public key set
    #[must_use]
    pub fn export(&self) -> PublicKeySet {
        self.keystore.export_public_set()
    }

    /// Current public key set as a JWKS document
    ///
    /// # Errors
    /// Returns `RotationError::Serialization` if encoding fails.
    pub fn to_json(&self) -> RotationResult<String> {
        self.export().to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::KeySpec;

    #[test]
    fn reflects_keystore_without_caching() {
        let keystore = Arc::new(Keystore::new());
        let exporter = PublicKeySetExporter::new(Arc::clone(&keystore));
        assert!(exporter.export().is_empty());

        let k1 = keystore.generate(&KeySpec::default()).unwrap().key;
        let k2 = keystore.generate(&KeySpec::default()).unwrap().key;
        assert_eq!(exporter.export().len(), 2);

        keystore.remove(k1.id()).unwrap();
        let ids: Vec<_> = exporter.export().ids().cloned().collect();
        assert_eq!(ids, vec![k2.id().clone()]);
    }

    #[test]
    fn json_has_no_private_member() {
        let keystore = Arc::new(Keystore::new());
        keystore.generate(&KeySpec::default()).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&PublicKeySetExporter::new(keystore).to_json().unwrap()).unwrap();
        let keys = json["keys"].as_array().unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].get("d").is_none());
    }
}
