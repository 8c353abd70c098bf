//! Options handed to a JWT library when issuing and checking tokens

use crate::{algorithm::Algorithm, key::KeyId};
use serde::Serialize;

/// Options for issuing a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOptions {
    /// Algorithm of the active key
    pub algorithm: Algorithm,
    /// Header `kid`
    pub key_id: KeyId,
    /// Token lifetime
    pub expires_in_seconds: u64,
    /// `aud` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// `iss` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

/// Options for verifying a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyOptions {
    /// Accepted algorithms
    pub algorithms: Vec<Algorithm>,
    /// Required issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

/// Sign and verify options in one bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenOptions {
    /// Issuing side
    pub sign: SignOptions,
    /// Verifying side
    pub verify: VerifyOptions,
}
