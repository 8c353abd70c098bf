//! Key pair generation and compact JWS operations

pub mod generator;
pub mod jws;

pub use generator::{KeyGenerator, KeyMaterial, OsKeyGenerator};
