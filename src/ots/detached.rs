//! Detached `.ots` proof files
//!
//! A detached file carries the hash op to apply to the original
//! document plus the proof tree rooted at that document's digest.

use std::fmt;
use std::io::{Read, Write};

use super::error::{Error, Result};
use super::op::Op;
use super::ser::{Deserializer, ParseMode, Serializer};
use super::timestamp::Timestamp;

/// Magic bytes opening every detached proof file
pub const MAGIC: [u8; 31] = [
    0x00, 0x4f, 0x70, 0x65, 0x6e, 0x54, 0x69, 0x6d, 0x65, 0x73, 0x74, 0x61, 0x6d, 0x70, 0x73,
    0x00, 0x00, 0x50, 0x72, 0x6f, 0x6f, 0x66, 0x00, 0xbf, 0x89, 0xe2, 0xe8, 0x84, 0xe8, 0x92,
    0x94,
];

/// The only proof version this client understands
pub const VERSION: u64 = 1;

/// A proof for an external document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedTimestampFile {
    /// Hash op applied to the document to obtain the root digest
    pub digest_op: Op,
    pub timestamp: Timestamp,
}

impl DetachedTimestampFile {
    pub fn new(digest_op: Op, timestamp: Timestamp) -> Self {
        Self {
            digest_op,
            timestamp,
        }
    }

    /// The document digest the proof is rooted at
    pub fn file_digest(&self) -> &[u8] {
        &self.timestamp.msg
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_deserializer(&mut Deserializer::new(reader))
    }

    pub fn from_reader_strict<R: Read>(reader: R) -> Result<Self> {
        Self::from_deserializer(&mut Deserializer::with_mode(reader, ParseMode::Strict))
    }

    fn from_deserializer<R: Read>(deser: &mut Deserializer<R>) -> Result<Self> {
        let magic = deser.read_fixed_bytes(MAGIC.len())?;
        if magic != MAGIC {
            return Err(Error::BadMagic);
        }
        let version = deser.read_uint()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let tag = deser.read_byte()?;
        let digest_op = Op::deserialize_with_tag(deser, tag)?;
        let digest_len = digest_op.digest_len().ok_or(Error::BadHashOp(tag))?;
        let digest = deser.read_fixed_bytes(digest_len)?;
        let timestamp = Timestamp::deserialize(deser, digest)?;
        deser.assert_eof()?;
        Ok(Self {
            digest_op,
            timestamp,
        })
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let digest_len = self
            .digest_op
            .digest_len()
            .ok_or_else(|| Error::BadHashOp(self.digest_op.tag()))?;
        debug_assert_eq!(self.timestamp.msg.len(), digest_len);

        let mut ser = Serializer::new(writer);
        ser.write_fixed_bytes(&MAGIC)?;
        ser.write_uint(VERSION)?;
        self.digest_op.serialize(&mut ser)?;
        ser.write_fixed_bytes(&self.timestamp.msg)?;
        self.timestamp.serialize(&mut ser)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_writer(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Display for DetachedTimestampFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "file {} hash {}",
            self.digest_op,
            hex::encode(&self.timestamp.msg)
        )?;
        self.timestamp.fmt_tree(f, 0)
    }
}
