mod args;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::LevelFilter;
use serde::Serialize;

use otskit::calendar::{Calendar, RemoteCalendar, DEFAULT_AGGREGATORS, DEFAULT_CALENDAR_WHITELIST};
use otskit::cache::ProofCache;
use otskit::config::Config;
use otskit::file_utils::hash_file;
use otskit::oracle::{BlockHeaderOracle, EsploraOracle, DEFAULT_ESPLORA_URL};
use otskit::ots::{Attestation, DetachedTimestampFile, Op};
use otskit::stamper::{stamp_file, StampOptions};
use otskit::upgrader::{upgrade_file, UpgradeOptions, UpgradeOutcome};
use otskit::verifier::{verify_detached, Outcome};
use otskit::{armor, ots};

use args::{Cli, Command};

const EXIT_VERIFY_FAILURE: u8 = 1;
const EXIT_IO_ERROR: u8 = 3;

/// Deadline used for the stamping fan-out when `--wait` is given
const WAIT_DEADLINE: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .filter_module("otskit", level)
        .init();
}

/// Verification failures exit 1, I/O failures 3, everything else 1;
/// clap already exits 2 on usage errors.
fn exit_code_for(error: &anyhow::Error) -> u8 {
    let is_io = error
        .chain()
        .any(|cause| cause.downcast_ref::<std::io::Error>().is_some());
    if is_io {
        return EXIT_IO_ERROR;
    }
    if let Some(ots::Error::Io(_)) = error.downcast_ref::<ots::Error>() {
        return EXIT_IO_ERROR;
    }
    EXIT_VERIFY_FAILURE
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Stamp {
            files,
            calendars,
            threshold,
            wait,
            hash,
            timeout,
        } => {
            let digest_op = Op::from_hash_name(&hash)
                .ok_or_else(|| anyhow!("unsupported hash {hash:?}"))?;
            let per_call = resolve_timeout(timeout, &config);
            let options = StampOptions {
                digest_op,
                threshold,
                per_call_timeout: per_call,
                deadline: if wait { WAIT_DEADLINE } else { per_call },
            };
            let calendars = build_calendars(calendars, &config, per_call)?;

            for path in &files {
                let proof_path = stamp_file(path, &calendars, &options).await?;
                println!("Created {}", proof_path.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Upgrade {
            files,
            dry_run,
            whitelist,
            no_default_whitelist,
            timeout,
        } => {
            let options = UpgradeOptions {
                whitelist: build_whitelist(whitelist, no_default_whitelist, &config),
                timeout: resolve_timeout(timeout, &config),
                dry_run,
            };
            let cache = open_cache(&config);

            let mut upgraded = 0usize;
            let mut still_pending = 0usize;
            for path in &files {
                match upgrade_file(path, cache.as_ref(), &options).await? {
                    UpgradeOutcome::Upgraded => {
                        upgraded += 1;
                        println!("{}: upgraded", path.display());
                    }
                    UpgradeOutcome::AlreadyComplete => {
                        println!("{}: already complete", path.display());
                    }
                    UpgradeOutcome::StillPending => {
                        still_pending += 1;
                        println!("{}: still pending", path.display());
                    }
                }
            }
            if upgraded == 0 && still_pending > 0 {
                return Ok(ExitCode::from(EXIT_VERIFY_FAILURE));
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify {
            proof,
            target,
            digest,
            no_bitcoin,
            esplora,
            timeout,
        } => {
            let proof_file = read_proof(&proof)?;
            let file_digest = resolve_target_digest(&proof, &proof_file, target, digest).await?;

            let oracle: Option<Box<dyn BlockHeaderOracle>> = if no_bitcoin {
                None
            } else {
                let url = esplora
                    .or_else(|| config.esplora_url.clone())
                    .unwrap_or_else(|| DEFAULT_ESPLORA_URL.to_string());
                Some(Box::new(EsploraOracle::new(
                    &url,
                    resolve_timeout(timeout, &config),
                )?))
            };

            let outcome =
                verify_detached(&proof_file, file_digest.as_deref(), oracle.as_deref()).await?;
            match outcome {
                Outcome::Complete { matches } if matches.is_empty() => {
                    println!("Proof is complete; blockchain checks were skipped");
                    Ok(ExitCode::SUCCESS)
                }
                Outcome::Complete { matches } => {
                    let earliest = &matches[0];
                    println!(
                        "Success! {} block {} attests existence as of {}",
                        earliest.chain,
                        earliest.height,
                        earliest.time_rfc3339()
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Outcome::Pending { uris } => {
                    println!("Pending confirmation, still owed by:");
                    for uri in uris {
                        println!("  {uri}");
                    }
                    Ok(ExitCode::from(EXIT_VERIFY_FAILURE))
                }
            }
        }

        Command::Info { proof, json } => {
            let proof_file = read_proof(&proof)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summarize(&proof_file))?);
            } else {
                print!("{proof_file}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::GitExtract { commit, output } => {
            let text = std::fs::read_to_string(&commit)
                .with_context(|| format!("reading {}", commit.display()))?;
            let (cleaned, timestamp) = armor::split_armored_text(&text)?;
            let proof = DetachedTimestampFile::new(Op::Sha256, timestamp);

            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.ots", commit.display())));
            std::fs::write(&output, proof.to_vec()?)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Extracted proof for {} bytes of commit text (digest {}) to {}",
                cleaned.len(),
                hex::encode(proof.file_digest()),
                output.display()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_timeout(flag: Option<u64>, config: &Config) -> Duration {
    Duration::from_secs(flag.or(config.timeout_secs).unwrap_or(5))
}

fn build_calendars(
    flags: Vec<String>,
    config: &Config,
    timeout: Duration,
) -> Result<Vec<Box<dyn Calendar>>> {
    let urls: Vec<String> = if !flags.is_empty() {
        flags
    } else if !config.calendars.is_empty() {
        config.calendars.clone()
    } else {
        DEFAULT_AGGREGATORS.iter().map(|s| s.to_string()).collect()
    };
    urls.into_iter()
        .map(|url| {
            let calendar = RemoteCalendar::new(&url, timeout)?;
            Ok(Box::new(calendar) as Box<dyn Calendar>)
        })
        .collect()
}

fn build_whitelist(flags: Vec<String>, no_default: bool, config: &Config) -> Vec<String> {
    let mut whitelist: Vec<String> = if no_default {
        Vec::new()
    } else {
        DEFAULT_CALENDAR_WHITELIST
            .iter()
            .map(|s| s.to_string())
            .collect()
    };
    whitelist.extend(config.whitelist.iter().cloned());
    whitelist.extend(flags);
    whitelist
}

fn open_cache(config: &Config) -> Option<ProofCache> {
    let dir = config.cache_dir()?;
    match ProofCache::new(&dir) {
        Ok(cache) => Some(cache),
        Err(e) => {
            log::warn!("proof cache disabled: {e:#}");
            None
        }
    }
}

fn read_proof(path: &Path) -> Result<DetachedTimestampFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    DetachedTimestampFile::from_reader(&bytes[..])
        .with_context(|| format!("parsing {}", path.display()))
}

/// Work out the digest the proof must be bound to: an explicit hex
/// digest, an explicit file, or the proof path with `.ots` dropped.
async fn resolve_target_digest(
    proof_path: &Path,
    proof: &DetachedTimestampFile,
    target: Option<PathBuf>,
    digest: Option<String>,
) -> Result<Option<Vec<u8>>> {
    if let Some(hex_digest) = digest {
        let digest = hex::decode(hex_digest.trim()).context("digest is not valid hex")?;
        return Ok(Some(digest));
    }

    let target = match target {
        Some(target) => target,
        None => {
            let name = proof_path.to_string_lossy();
            match name.strip_suffix(".ots") {
                Some(stem) => PathBuf::from(stem),
                None => bail!(
                    "{} does not end in .ots; pass the original file with -f",
                    proof_path.display()
                ),
            }
        }
    };
    let digest = hash_file(&target, &proof.digest_op)
        .await
        .with_context(|| format!("hashing {}", target.display()))?;
    Ok(Some(digest))
}

#[derive(Serialize)]
struct ProofSummary {
    digest_op: String,
    file_digest: String,
    complete: bool,
    attestations: Vec<AttestationSummary>,
}

#[derive(Serialize)]
struct AttestationSummary {
    digest: String,
    kind: &'static str,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
}

fn summarize(proof: &DetachedTimestampFile) -> ProofSummary {
    let attestations = proof
        .timestamp
        .all_attestations()
        .map(|(digest, attestation)| {
            let (kind, height, uri) = match attestation {
                Attestation::Pending { uri } => ("pending", None, Some(uri.clone())),
                Attestation::Bitcoin { height } => ("bitcoin", Some(*height), None),
                Attestation::Litecoin { height } => ("litecoin", Some(*height), None),
                Attestation::Ethereum { height } => ("ethereum", Some(*height), None),
                Attestation::Unknown { .. } => ("unknown", None, None),
            };
            AttestationSummary {
                digest: hex::encode(digest),
                kind,
                description: attestation.to_string(),
                height,
                uri,
            }
        })
        .collect();
    ProofSummary {
        digest_op: proof.digest_op.to_string(),
        file_digest: hex::encode(proof.file_digest()),
        complete: proof.timestamp.is_complete(),
        attestations,
    }
}
