//! Proof walking and verification
//!
//! The walk itself is pure: digests are recomputed from the root and
//! every attestation is yielded with the digest at its position. Only
//! the final comparison against a block header touches the oracle.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use log::{debug, info, warn};
use thiserror::Error;

use crate::oracle::{BlockHeaderOracle, Chain};
use crate::ots::{Attestation, DetachedTimestampFile, Timestamp};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("proof commits to digest {expected}, but the target hashes to {found}")]
    DigestMismatch { expected: String, found: String },

    #[error("digest does not match the merkle root of {chain} block {height}")]
    AttestationMismatch { chain: Chain, height: u64 },

    #[error("no attestation in this proof can be checked against a blockchain")]
    NoVerifiableAttestation,
}

/// One block-header attestation that checked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMatch {
    pub chain: Chain,
    pub height: u64,
    /// Block timestamp, seconds since the epoch
    pub time: u32,
}

impl BlockMatch {
    pub fn time_rfc3339(&self) -> String {
        match Utc.timestamp_opt(i64::from(self.time), 0).single() {
            Some(t) => t.to_rfc3339(),
            None => format!("{} (unrepresentable)", self.time),
        }
    }
}

/// User-visible verification outcome.
#[derive(Debug)]
pub enum Outcome {
    /// At least one block-header attestation; `matches` is ordered by
    /// ascending block time and is empty only when no oracle was
    /// consulted
    Complete { matches: Vec<BlockMatch> },
    /// Only pending attestations; the named calendars still owe a
    /// block commitment
    Pending { uris: Vec<String> },
}

fn chain_of(attestation: &Attestation) -> Option<(Chain, u64)> {
    match attestation {
        Attestation::Bitcoin { height } => Some((Chain::Bitcoin, *height)),
        Attestation::Litecoin { height } => Some((Chain::Litecoin, *height)),
        Attestation::Ethereum { height } => Some((Chain::Ethereum, *height)),
        _ => None,
    }
}

/// Verify a detached proof against the digest of the target file.
///
/// `file_digest` is the digest of the document under the proof's hash
/// op; pass `None` to skip the binding check. `oracle` is `None` when
/// blockchain checks are disabled.
pub async fn verify_detached(
    proof: &DetachedTimestampFile,
    file_digest: Option<&[u8]>,
    oracle: Option<&dyn BlockHeaderOracle>,
) -> Result<Outcome> {
    if let Some(digest) = file_digest {
        if digest != proof.file_digest() {
            return Err(VerifyError::DigestMismatch {
                expected: hex::encode(proof.file_digest()),
                found: hex::encode(digest),
            }
            .into());
        }
    }
    verify_timestamp(&proof.timestamp, oracle).await
}

/// Verify a bare proof tree; see [`verify_detached`].
pub async fn verify_timestamp(
    timestamp: &Timestamp,
    oracle: Option<&dyn BlockHeaderOracle>,
) -> Result<Outcome> {
    timestamp.validate()?;

    let mut matches = Vec::new();
    let mut mismatch: Option<VerifyError> = None;
    let mut pending_uris = Vec::new();
    let mut has_block_attestation = false;

    for (digest, attestation) in timestamp.all_attestations() {
        match attestation {
            Attestation::Pending { uri } => {
                if !pending_uris.contains(uri) {
                    pending_uris.push(uri.clone());
                }
            }
            Attestation::Unknown { .. } => {
                info!("skipping {attestation}");
            }
            _ => {
                let Some((chain, height)) = chain_of(attestation) else {
                    continue;
                };
                has_block_attestation = true;
                let Some(oracle) = oracle else { continue };
                match oracle.block_header(chain, height).await {
                    Ok(header) => {
                        if digest == header.merkle_root {
                            debug!("{chain} block {height} matches");
                            matches.push(BlockMatch {
                                chain,
                                height,
                                time: header.time,
                            });
                        } else {
                            warn!(
                                "{chain} block {height}: proof digest {} does not equal merkle root {}",
                                hex::encode(digest),
                                hex::encode(header.merkle_root)
                            );
                            mismatch.get_or_insert(VerifyError::AttestationMismatch { chain, height });
                        }
                    }
                    Err(e) => warn!("could not fetch {chain} header at {height}: {e}"),
                }
            }
        }
    }

    if !matches.is_empty() {
        matches.sort_by_key(|m| (m.time, m.height));
        return Ok(Outcome::Complete { matches });
    }
    if let Some(mismatch) = mismatch {
        return Err(mismatch.into());
    }
    if has_block_attestation && oracle.is_none() {
        // complete proof, blockchain checks disabled
        return Ok(Outcome::Complete { matches: Vec::new() });
    }
    if !pending_uris.is_empty() {
        return Ok(Outcome::Pending { uris: pending_uris });
    }
    Err(VerifyError::NoVerifiableAttestation.into())
}
