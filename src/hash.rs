//! Content digests.
//!
//! MD5 is the hash of record: the remote service keys file revisions by it and
//! the `_files` cache stores it. SHA-256 is only used as a second, independent
//! integrity check attached to commit payloads.

use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};

/// Prefix the remote service expects on the secondary hash attribute
pub const SHA256_PREFIX: &str = "sha256:";

const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the MD5 digest of content as lowercase hex
pub fn md5_hex(content: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Compute the SHA-256 digest of content as lowercase hex
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// SHA-256 digest in the `sha256:<hex>` form used in commit payloads
pub fn transfer_hash(content: &[u8]) -> String {
    format!("{}{}", SHA256_PREFIX, sha256_hex(content))
}

/// Compute the MD5 of a file on disk without loading it into memory at once.
pub async fn md5_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::io(path, e))?;

    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf).await.map_err(|e| Error::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
