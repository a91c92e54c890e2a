use std::path::Path;

use anyhow::Result;
use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::ots::{Error, Op};

/// Compute the digest of a file's contents under a hash op.
/// This is the canonical implementation used throughout the codebase.
pub async fn hash_file(path: &Path, op: &Op) -> Result<Vec<u8>> {
    let file = fs::File::open(path).await?;
    match op {
        Op::Sha1 => stream_hash::<Sha1>(file).await,
        Op::Ripemd160 => stream_hash::<Ripemd160>(file).await,
        Op::Sha256 => stream_hash::<Sha256>(file).await,
        Op::Keccak256 => stream_hash::<Keccak256>(file).await,
        other => Err(Error::BadHashOp(other.tag()).into()),
    }
}

/// Compute the digest of in-memory bytes under a hash op.
///
/// Unlike [`Op::apply`] this accepts inputs of any length; it is for
/// hashing documents, not proof-internal digests.
pub fn hash_bytes(data: &[u8], op: &Op) -> Result<Vec<u8>> {
    match op {
        Op::Sha1 => Ok(Sha1::digest(data).to_vec()),
        Op::Ripemd160 => Ok(Ripemd160::digest(data).to_vec()),
        Op::Sha256 => Ok(Sha256::digest(data).to_vec()),
        Op::Keccak256 => Ok(Keccak256::digest(data).to_vec()),
        other => Err(Error::BadHashOp(other.tag()).into()),
    }
}

async fn stream_hash<D: Digest>(mut file: fs::File) -> Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_vec())
}
