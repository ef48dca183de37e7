use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::serialization::{cbor_serialize, CborError};

pub fn sha256(bytes: &[u8]) -> Vec<u8> {
    Sha256::digest(bytes).to_vec()
}

/// Computes the SHA256 of the CBOR encoding of the argument.
pub fn cbor_digest<T: Serialize>(val: &T) -> Result<Vec<u8>, CborError> {
    Ok(sha256(cbor_serialize(val)?.as_ref()))
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
