//! Error types for timestamp proof parsing and manipulation

use thiserror::Error;

/// Maximum nesting depth accepted when decoding a timestamp tree
pub const RECURSION_LIMIT: usize = 128;

/// Maximum number of attestations accepted in a single proof
pub const MAX_ATTESTATIONS: usize = 10_000;

/// Maximum length of a binary op immediate, and of any op input or output
pub const MAX_OP_LENGTH: usize = 4096;

/// Maximum length of an attestation payload
pub const MAX_PAYLOAD_LENGTH: usize = 8192;

/// Maximum length of a pending attestation URI
pub const MAX_URI_LENGTH: usize = 1024;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while decoding, validating or merging
/// a timestamp proof.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of stream at byte {0}")]
    Truncated(usize),

    #[error("varint exceeds 63 bits at byte {0}")]
    VarintOverflow(usize),

    #[error("timestamp tree deeper than {RECURSION_LIMIT} levels at byte {0}")]
    DeepRecursion(usize),

    #[error("{what}: length {len} outside allowed range {min}..={max} at byte {offset}")]
    SizeLimit {
        what: &'static str,
        len: usize,
        min: usize,
        max: usize,
        offset: usize,
    },

    #[error("unknown operation tag {tag:#04x} at byte {offset}")]
    UnknownOp { tag: u8, offset: usize },

    #[error("legacy operation tag {tag:#04x} rejected in strict mode at byte {offset}")]
    LegacyOp { tag: u8, offset: usize },

    #[error("unknown attestation {0} rejected in strict mode")]
    UnknownAttestation(String),

    #[error("attestation payload has {0} unparsed trailing bytes")]
    TrailingBytes(usize),

    #[error("trailing garbage after timestamp body at byte {0}")]
    TrailingGarbage(usize),

    #[error("not an OpenTimestamps proof file (bad magic)")]
    BadMagic,

    #[error("unsupported proof version {0}")]
    UnsupportedVersion(u64),

    #[error("tag {0:#04x} is not a hash operation")]
    BadHashOp(u8),

    #[error("invalid character {0:?} in calendar URI")]
    InvalidUriChar(char),

    #[error("calendar URI is not valid UTF-8")]
    InvalidUri,

    #[error("digest mismatch after {op}: expected {expected}, found {found}")]
    CorruptProof {
        op: String,
        expected: String,
        found: String,
    },

    #[error("cannot merge timestamps over different digests")]
    MergeMismatch,

    #[error("an empty timestamp cannot be serialized")]
    EmptyTimestamp,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
