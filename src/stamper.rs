//! Stamping: create a new proof for a document
//!
//! The document digest is never shown to a calendar. A random nonce is
//! appended and hashed first, and only that commitment leaves the
//! machine. Submissions fan out to every configured calendar and the
//! stamp succeeds once enough of them reply.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::stream::{FuturesUnordered, StreamExt};
use log::{info, warn};
use rand::Rng;
use thiserror::Error;
use tokio::fs;

use crate::calendar::Calendar;
use crate::file_utils::hash_file;
use crate::ots::{DetachedTimestampFile, Op, Timestamp};

#[derive(Debug, Error)]
pub enum StampError {
    #[error("only {received} of the required {required} calendars replied before the deadline")]
    InsufficientCalendars { received: usize, required: usize },
}

#[derive(Debug, Clone)]
pub struct StampOptions {
    /// Hash op applied to the document
    pub digest_op: Op,
    /// How many calendar replies make a stamp; `None` means
    /// min(2, number of calendars)
    pub threshold: Option<usize>,
    /// Budget for each individual submission
    pub per_call_timeout: Duration,
    /// Budget for the whole fan-out
    pub deadline: Duration,
}

impl Default for StampOptions {
    fn default() -> Self {
        Self {
            digest_op: Op::Sha256,
            threshold: None,
            per_call_timeout: Duration::from_secs(5),
            deadline: Duration::from_secs(5),
        }
    }
}

/// Stamp a document digest, returning the proof rooted at it.
pub async fn stamp_digest(
    digest: Vec<u8>,
    calendars: &[Box<dyn Calendar>],
    options: &StampOptions,
) -> Result<Timestamp> {
    if calendars.is_empty() {
        bail!("no calendars configured");
    }
    let required = options.threshold.unwrap_or_else(|| calendars.len().min(2));
    if required == 0 || required > calendars.len() {
        bail!(
            "threshold {required} is not satisfiable with {} calendars",
            calendars.len()
        );
    }

    // Nonce protection: calendars only ever see sha256(digest || nonce)
    let nonce: [u8; 16] = rand::thread_rng().gen();
    let append_op = Op::Append(nonce.to_vec());
    let appended = append_op.apply(&digest)?;
    let commitment = Op::Sha256.apply(&appended)?;

    let fragments = collect_fragments(&commitment, calendars, required, options).await?;

    let mut commitment_node = Timestamp::new(commitment);
    for fragment in fragments {
        commitment_node.merge(fragment)?;
    }
    let mut appended_node = Timestamp::new(appended);
    appended_node.ops.insert(Op::Sha256, commitment_node);
    let mut root = Timestamp::new(digest);
    root.ops.insert(append_op, appended_node);
    Ok(root)
}

/// Fan the commitment out and gather replies until `required` are in
/// or the deadline passes. Outstanding requests are dropped as soon as
/// the join resolves.
async fn collect_fragments(
    commitment: &[u8],
    calendars: &[Box<dyn Calendar>],
    required: usize,
    options: &StampOptions,
) -> Result<Vec<Timestamp>> {
    let mut submissions = FuturesUnordered::new();
    for calendar in calendars {
        let commitment = commitment.to_vec();
        let per_call = options.per_call_timeout;
        submissions.push(async move {
            let outcome = tokio::time::timeout(per_call, calendar.submit(&commitment)).await;
            let outcome = match outcome {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!(
                    "timed out after {}s",
                    per_call.as_secs()
                )),
            };
            (calendar.url().to_string(), outcome)
        });
    }

    let deadline = tokio::time::sleep(options.deadline);
    tokio::pin!(deadline);

    let mut fragments = Vec::new();
    loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!("stamping deadline reached with {} of {required} replies", fragments.len());
                break;
            }
            next = submissions.next() => match next {
                None => break,
                Some((url, Ok(fragment))) => {
                    info!("calendar {url} accepted the submission");
                    fragments.push(fragment);
                    if fragments.len() >= required {
                        break;
                    }
                }
                Some((url, Err(e))) => warn!("calendar {url}: {e:#}"),
            }
        }
    }
    drop(submissions);

    if fragments.len() < required {
        return Err(StampError::InsufficientCalendars {
            received: fragments.len(),
            required,
        }
        .into());
    }
    Ok(fragments)
}

/// Stamp a file on disk, writing `<file>.ots` next to it.
pub async fn stamp_file(
    path: &Path,
    calendars: &[Box<dyn Calendar>],
    options: &StampOptions,
) -> Result<PathBuf> {
    let proof_path = PathBuf::from(format!("{}.ots", path.display()));
    if fs::try_exists(&proof_path).await? {
        bail!("{} already exists", proof_path.display());
    }

    let digest = hash_file(path, &options.digest_op)
        .await
        .with_context(|| format!("hashing {}", path.display()))?;
    info!("file {} digest {}", path.display(), hex::encode(&digest));

    let timestamp = stamp_digest(digest, calendars, options).await?;
    let proof = DetachedTimestampFile::new(options.digest_op.clone(), timestamp);
    fs::write(&proof_path, proof.to_vec()?)
        .await
        .with_context(|| format!("writing {}", proof_path.display()))?;
    Ok(proof_path)
}
