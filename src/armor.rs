//! Armored timestamps embedded in git commits and tags
//!
//! The proof body is Base64-encoded between PGP-style delimiters and
//! appended to the commit message. The proof is rooted at the SHA-256
//! of the commit text with the armor block removed.

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;

use crate::file_utils::hash_bytes;
use crate::ots::{Op, Timestamp};

pub const BEGIN_MARKER: &str = "-----BEGIN OPENTIMESTAMPS GIT TIMESTAMP-----";
pub const END_MARKER: &str = "-----END OPENTIMESTAMPS GIT TIMESTAMP-----";

const WRAP_COLUMNS: usize = 64;

/// Wrap a proof body in the armor delimiters
pub fn armor(timestamp: &Timestamp) -> Result<String> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(timestamp.to_vec()?);
    let mut out = String::new();
    out.push_str(BEGIN_MARKER);
    out.push('\n');
    for chunk in encoded.as_bytes().chunks(WRAP_COLUMNS) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 is ascii"));
        out.push('\n');
    }
    out.push_str(END_MARKER);
    out.push('\n');
    Ok(out)
}

/// Split armored commit text into the cleaned text and the embedded
/// proof, which is rooted at the SHA-256 of the cleaned text.
pub fn split_armored_text(text: &str) -> Result<(String, Timestamp)> {
    let begin = text
        .find(BEGIN_MARKER)
        .ok_or_else(|| anyhow!("no {BEGIN_MARKER} block found"))?;
    let end = text
        .find(END_MARKER)
        .ok_or_else(|| anyhow!("unterminated timestamp block"))?;
    if end < begin {
        bail!("timestamp block delimiters out of order");
    }

    let mut cleaned = String::new();
    cleaned.push_str(&text[..begin]);
    let after = &text[end + END_MARKER.len()..];
    cleaned.push_str(after.strip_prefix('\n').unwrap_or(after));

    let body: String = text[begin + BEGIN_MARKER.len()..end]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let proof_bytes = base64::engine::general_purpose::STANDARD
        .decode(body)
        .context("timestamp block is not valid base64")?;

    let digest = hash_bytes(cleaned.as_bytes(), &Op::Sha256)?;
    let timestamp =
        Timestamp::from_bytes(&proof_bytes, digest).context("embedded proof failed to parse")?;
    Ok((cleaned, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ots::Attestation;

    fn proof_for(text: &str) -> Timestamp {
        let mut timestamp = Timestamp::new(hash_bytes(text.as_bytes(), &Op::Sha256).unwrap());
        timestamp.add_attestation(Attestation::Bitcoin { height: 700_000 });
        timestamp
    }

    #[test]
    fn test_armor_roundtrip() {
        let commit = "tree 0123\nauthor someone\n\nfix the thing\n";
        let timestamp = proof_for(commit);

        let mut armored_commit = commit.to_string();
        armored_commit.push_str(&armor(&timestamp).unwrap());

        let (cleaned, recovered) = split_armored_text(&armored_commit).unwrap();
        assert_eq!(cleaned, commit);
        assert_eq!(recovered, timestamp);
    }

    #[test]
    fn test_missing_block() {
        assert!(split_armored_text("no block here").is_err());
    }

    #[test]
    fn test_unterminated_block() {
        let text = format!("msg\n{BEGIN_MARKER}\nAAAA\n");
        assert!(split_armored_text(&text).is_err());
    }

    #[test]
    fn test_proof_must_root_at_cleaned_text() {
        let commit = "original text\n";
        let timestamp = proof_for("different text\n");
        let mut armored_commit = commit.to_string();
        armored_commit.push_str(&armor(&timestamp).unwrap());

        // decode succeeds structurally but the digest differs
        let (cleaned, recovered) = split_armored_text(&armored_commit).unwrap();
        assert_eq!(cleaned, commit);
        assert_ne!(recovered.msg, timestamp.msg);
    }
}
