//! Block-header oracle
//!
//! Verification needs one fact per attestation: the merkle root and
//! timestamp of the block at a given height. The oracle trait keeps
//! the source of that fact injectable; the shipped implementation
//! talks to an Esplora-compatible block explorer.

use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;

pub const DEFAULT_ESPLORA_URL: &str = "https://blockstream.info/api";

/// Which blockchain an attestation points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Bitcoin,
    Litecoin,
    Ethereum,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Bitcoin => f.write_str("Bitcoin"),
            Chain::Litecoin => f.write_str("Litecoin"),
            Chain::Ethereum => f.write_str("Ethereum"),
        }
    }
}

/// The header fields verification cares about.
///
/// `merkle_root` is in on-wire byte order (little-endian), the same
/// order proof digests are committed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub merkle_root: [u8; 32],
    pub time: u32,
}

#[async_trait]
pub trait BlockHeaderOracle: Send + Sync {
    async fn block_header(&self, chain: Chain, height: u64) -> Result<BlockHeader>;
}

/// Esplora block metadata, as served by blockstream.info and friends
#[derive(Debug, Deserialize)]
struct EsploraBlock {
    timestamp: u32,
    merkle_root: String,
}

/// Oracle backed by an Esplora-compatible REST API. Bitcoin only.
pub struct EsploraOracle {
    base_url: String,
    client: reqwest::Client,
}

impl EsploraOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl BlockHeaderOracle for EsploraOracle {
    async fn block_header(&self, chain: Chain, height: u64) -> Result<BlockHeader> {
        if chain != Chain::Bitcoin {
            bail!("{chain} headers are not available from an Esplora endpoint");
        }

        let url = format!("{}/block-height/{height}", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            bail!("block explorer returned {} for height {height}", response.status());
        }
        let block_hash = response.text().await?;

        let url = format!("{}/block/{}", self.base_url, block_hash.trim());
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            bail!("block explorer returned {} for block {block_hash}", response.status());
        }
        let block: EsploraBlock = response.json().await?;

        Ok(BlockHeader {
            merkle_root: wire_order_root(&block.merkle_root)?,
            time: block.timestamp,
        })
    }
}

/// Esplora serves the merkle root as display hex; proofs commit to the
/// on-wire byte order, so the decoded bytes are reversed.
fn wire_order_root(display_hex: &str) -> Result<[u8; 32]> {
    let mut bytes: Vec<u8> = hex::decode(display_hex)
        .map_err(|e| anyhow!("bad merkle root hex from explorer: {e}"))?;
    if bytes.len() != 32 {
        bail!("merkle root is {} bytes, expected 32", bytes.len());
    }
    bytes.reverse();
    let mut root = [0u8; 32];
    root.copy_from_slice(&bytes);
    Ok(root)
}
