//! Commitment operations
//!
//! An op is a pure function from one digest to another. Chains of ops
//! are what link a document digest to the merkle root recorded in a
//! block header.

use std::cmp::Ordering;
use std::fmt;
use std::io::{Read, Write};

use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use super::error::{Error, Result, MAX_OP_LENGTH};
use super::ser::{Deserializer, ParseMode, Serializer};

/// A single commitment operation.
///
/// Binary ops carry an immediate byte string of 1 to 4096 bytes; hash
/// ops and the legacy unary ops take no argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    Append(Vec<u8>),
    Prepend(Vec<u8>),
    Reverse,
    Hexlify,
    Sha1,
    Ripemd160,
    Sha256,
    Keccak256,
}

impl Op {
    /// The wire tag identifying this op
    pub fn tag(&self) -> u8 {
        match self {
            Op::Append(_) => 0xf0,
            Op::Prepend(_) => 0xf1,
            Op::Reverse => 0xf2,
            Op::Hexlify => 0xf3,
            Op::Sha1 => 0x02,
            Op::Ripemd160 => 0x03,
            Op::Sha256 => 0x08,
            Op::Keccak256 => 0x67,
        }
    }

    /// The immediate argument, empty for unary and hash ops
    fn immediate(&self) -> &[u8] {
        match self {
            Op::Append(arg) | Op::Prepend(arg) => arg,
            _ => &[],
        }
    }

    /// Whether this op is a cryptographic hash
    pub fn is_hash(&self) -> bool {
        matches!(self, Op::Sha1 | Op::Ripemd160 | Op::Sha256 | Op::Keccak256)
    }

    /// Output length of a hash op, `None` for the rest
    pub fn digest_len(&self) -> Option<usize> {
        match self {
            Op::Sha1 | Op::Ripemd160 => Some(20),
            Op::Sha256 | Op::Keccak256 => Some(32),
            _ => None,
        }
    }

    /// Look up a hash op by its conventional lowercase name
    pub fn from_hash_name(name: &str) -> Option<Op> {
        match name {
            "sha1" => Some(Op::Sha1),
            "ripemd160" => Some(Op::Ripemd160),
            "sha256" => Some(Op::Sha256),
            "keccak256" => Some(Op::Keccak256),
            _ => None,
        }
    }

    /// Apply the op to a message, producing the successor digest.
    ///
    /// Inputs and outputs are capped at 4096 bytes so an adversarial
    /// chain of appends cannot balloon memory.
    pub fn apply(&self, msg: &[u8]) -> Result<Vec<u8>> {
        if msg.len() > MAX_OP_LENGTH {
            return Err(Error::SizeLimit {
                what: "op input",
                len: msg.len(),
                min: 0,
                max: MAX_OP_LENGTH,
                offset: 0,
            });
        }
        let result = match self {
            Op::Append(arg) => {
                let mut out = msg.to_vec();
                out.extend_from_slice(arg);
                out
            }
            Op::Prepend(arg) => {
                let mut out = arg.clone();
                out.extend_from_slice(msg);
                out
            }
            Op::Reverse => msg.iter().rev().copied().collect(),
            Op::Hexlify => hex::encode(msg).into_bytes(),
            Op::Sha1 => Sha1::digest(msg).to_vec(),
            Op::Ripemd160 => Ripemd160::digest(msg).to_vec(),
            Op::Sha256 => Sha256::digest(msg).to_vec(),
            Op::Keccak256 => Keccak256::digest(msg).to_vec(),
        };
        if result.len() > MAX_OP_LENGTH {
            return Err(Error::SizeLimit {
                what: "op output",
                len: result.len(),
                min: 0,
                max: MAX_OP_LENGTH,
                offset: 0,
            });
        }
        Ok(result)
    }

    /// Serialize as tag byte plus, for binary ops, the varbytes immediate
    pub fn serialize<W: Write>(&self, ser: &mut Serializer<W>) -> Result<()> {
        ser.write_byte(self.tag())?;
        match self {
            Op::Append(arg) | Op::Prepend(arg) => ser.write_bytes(arg),
            _ => Ok(()),
        }
    }

    /// Deserialize the remainder of an op whose tag byte has already
    /// been consumed
    pub fn deserialize_with_tag<R: Read>(deser: &mut Deserializer<R>, tag: u8) -> Result<Op> {
        match tag {
            0xf0 => Ok(Op::Append(deser.read_bytes(1, MAX_OP_LENGTH, "op immediate")?)),
            0xf1 => Ok(Op::Prepend(deser.read_bytes(1, MAX_OP_LENGTH, "op immediate")?)),
            0xf2 | 0xf3 => {
                if deser.mode() == ParseMode::Strict {
                    return Err(Error::LegacyOp {
                        tag,
                        offset: deser.offset(),
                    });
                }
                Ok(if tag == 0xf2 { Op::Reverse } else { Op::Hexlify })
            }
            0x02 => Ok(Op::Sha1),
            0x03 => Ok(Op::Ripemd160),
            0x08 => Ok(Op::Sha256),
            0x67 => Ok(Op::Keccak256),
            tag => Err(Error::UnknownOp {
                tag,
                offset: deser.offset(),
            }),
        }
    }
}

// Total order by wire tag, then immediate bytes. This fixes the
// canonical sibling order used during serialization.
impl Ord for Op {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag()
            .cmp(&other.tag())
            .then_with(|| self.immediate().cmp(other.immediate()))
    }
}

impl PartialOrd for Op {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Append(arg) => write!(f, "append {}", hex::encode(arg)),
            Op::Prepend(arg) => write!(f, "prepend {}", hex::encode(arg)),
            Op::Reverse => f.write_str("reverse"),
            Op::Hexlify => f.write_str("hexlify"),
            Op::Sha1 => f.write_str("sha1"),
            Op::Ripemd160 => f.write_str("ripemd160"),
            Op::Sha256 => f.write_str("sha256"),
            Op::Keccak256 => f.write_str("keccak256"),
        }
    }
}
