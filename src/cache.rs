//! Content-addressed proof cache
//!
//! One file per commitment digest, named by its lowercase hex, holding
//! the raw proof fragment. Writes go through a temp file and a rename
//! so a crashed process never leaves a half-written proof behind.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use tokio::fs;
use uuid::Uuid;

use crate::ots::Timestamp;

pub struct ProofCache {
    dir: PathBuf,
}

impl ProofCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, commitment: &[u8]) -> PathBuf {
        self.dir.join(hex::encode(commitment))
    }

    /// Fetch the cached fragment rooted at `commitment`, if any.
    ///
    /// A cache entry that no longer parses is treated as a miss rather
    /// than an error; the next successful fetch overwrites it.
    pub async fn get(&self, commitment: &[u8]) -> Result<Option<Timestamp>> {
        let path = self.path_for(commitment);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        match Timestamp::from_bytes(&bytes, commitment.to_vec()) {
            Ok(timestamp) => Ok(Some(timestamp)),
            Err(e) => {
                warn!("discarding corrupt cache entry {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    /// Store a fragment under its commitment. Idempotent: the same key
    /// always maps to content-identical bytes.
    pub async fn put(&self, commitment: &[u8], timestamp: &Timestamp) -> Result<()> {
        let bytes = timestamp.to_vec()?;
        let path = self.path_for(commitment);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", hex::encode(commitment), Uuid::new_v4()));
        fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }
}
