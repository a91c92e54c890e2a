//! Upgrading: replace pending attestations with completed sub-proofs
//!
//! Each pending leaf names the calendar that owes a block commitment.
//! Once the calendar's batch is buried in a block it serves the merkle
//! path from our commitment to the block's merkle root, and that
//! fragment is merged into the proof. Failures leave the pending leaf
//! in place; nothing here is fatal to the proof itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::fs;

use crate::cache::ProofCache;
use crate::calendar::{Calendar, CalendarResponse, RemoteCalendar};
use crate::ots::{DetachedTimestampFile, Timestamp};

/// What an upgrade attempt did to a proof file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// New attestations were merged in
    Upgraded,
    /// The proof already carried a block attestation
    AlreadyComplete,
    /// The calendars owe us still
    StillPending,
}

#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    /// Calendars we are willing to contact
    pub whitelist: Vec<String>,
    /// Per-request budget
    pub timeout: Duration,
    /// Check availability without rewriting the file
    pub dry_run: bool,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            whitelist: crate::calendar::DEFAULT_CALENDAR_WHITELIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout: Duration::from_secs(5),
            dry_run: false,
        }
    }
}

fn whitelisted(uri: &str, whitelist: &[String]) -> bool {
    let uri = uri.trim_end_matches('/');
    whitelist.iter().any(|entry| entry.trim_end_matches('/') == uri)
}

/// Upgrade a proof in place, dialing calendars with `dial`.
///
/// Returns whether anything was merged. Idempotent: a complete proof
/// is returned untouched.
pub async fn upgrade_timestamp_with<F>(
    timestamp: &mut Timestamp,
    whitelist: &[String],
    cache: Option<&ProofCache>,
    mut dial: F,
) -> Result<bool>
where
    F: FnMut(&str) -> Result<Box<dyn Calendar>>,
{
    if timestamp.is_complete() {
        debug!("proof already carries a block attestation");
        return Ok(false);
    }

    let mut changed = false;
    for (commitment, uri) in timestamp.pending() {
        if !whitelisted(&uri, whitelist) {
            warn!("ignoring calendar {uri}: not in the whitelist");
            continue;
        }

        if let Some(cache) = cache {
            if let Some(fragment) = cache.get(&commitment).await? {
                info!("using cached proof for {}", hex::encode(&commitment));
                if merge_fragment(timestamp, &commitment, fragment)? {
                    changed = true;
                }
                continue;
            }
        }

        let calendar = match dial(&uri) {
            Ok(calendar) => calendar,
            Err(e) => {
                warn!("cannot reach calendar {uri}: {e:#}");
                continue;
            }
        };
        match calendar.get_timestamp(&commitment).await {
            Ok(CalendarResponse::Complete(fragment)) => {
                info!("calendar {uri} completed {}", hex::encode(&commitment));
                if let Some(cache) = cache {
                    if let Err(e) = cache.put(&commitment, &fragment).await {
                        warn!("could not cache proof: {e:#}");
                    }
                }
                if merge_fragment(timestamp, &commitment, fragment)? {
                    changed = true;
                }
            }
            Ok(CalendarResponse::Pending) => {
                debug!("calendar {uri}: commitment not yet in a block");
            }
            Ok(CalendarResponse::NotFound) => {
                warn!(
                    "calendar {uri} does not know commitment {}",
                    hex::encode(&commitment)
                );
            }
            Err(e) => warn!("calendar {uri}: {e:#}"),
        }
    }
    Ok(changed)
}

fn merge_fragment(
    timestamp: &mut Timestamp,
    commitment: &[u8],
    fragment: Timestamp,
) -> Result<bool> {
    match timestamp.find_node_mut(commitment) {
        Some(node) => {
            node.merge(fragment)?;
            Ok(true)
        }
        None => {
            // the pending leaf was collected from this very tree
            warn!("commitment {} vanished from the proof", hex::encode(commitment));
            Ok(false)
        }
    }
}

/// Upgrade a proof using real HTTPS calendars.
pub async fn upgrade_timestamp(
    timestamp: &mut Timestamp,
    whitelist: &[String],
    cache: Option<&ProofCache>,
    timeout: Duration,
) -> Result<bool> {
    upgrade_timestamp_with(timestamp, whitelist, cache, |uri| {
        Ok(Box::new(RemoteCalendar::new(uri, timeout)?))
    })
    .await
}

/// Upgrade a `.ots` file in place, backing the original up to `.bak`.
pub async fn upgrade_file(
    path: &Path,
    cache: Option<&ProofCache>,
    options: &UpgradeOptions,
) -> Result<UpgradeOutcome> {
    let timeout = options.timeout;
    upgrade_file_with(path, cache, options, |uri| {
        Ok(Box::new(RemoteCalendar::new(uri, timeout)?))
    })
    .await
}

/// File-level upgrade with an injectable calendar dialer.
pub async fn upgrade_file_with<F>(
    path: &Path,
    cache: Option<&ProofCache>,
    options: &UpgradeOptions,
    dial: F,
) -> Result<UpgradeOutcome>
where
    F: FnMut(&str) -> Result<Box<dyn Calendar>>,
{
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let mut proof = DetachedTimestampFile::from_reader(&bytes[..])?;

    let changed =
        upgrade_timestamp_with(&mut proof.timestamp, &options.whitelist, cache, dial).await?;

    if !changed {
        info!("{}: nothing to upgrade", path.display());
        return Ok(if proof.timestamp.is_complete() {
            UpgradeOutcome::AlreadyComplete
        } else {
            UpgradeOutcome::StillPending
        });
    }
    if options.dry_run {
        info!("{}: upgrade available, not saved (dry run)", path.display());
        return Ok(UpgradeOutcome::Upgraded);
    }

    let backup = PathBuf::from(format!("{}.bak", path.display()));
    if fs::try_exists(&backup).await? {
        warn!("backup {} already exists, skipping backup", backup.display());
    } else {
        fs::copy(path, &backup).await?;
        debug!("backed up to {}", backup.display());
    }
    fs::write(path, proof.to_vec()?)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!("{} upgraded", path.display());
    Ok(UpgradeOutcome::Upgraded)
}
