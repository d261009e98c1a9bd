//! Content digests for artifacts and uploads.

use md5::{Digest as _, Md5};
use sha2::Sha256;

/// Returns the lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Returns the lowercase hex MD5 of `bytes`.
///
/// Only used because the legacy upload API still asks for it.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}
