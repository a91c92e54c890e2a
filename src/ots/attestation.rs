//! Attestations
//!
//! An attestation is a leaf claim about the digest at its position in
//! the proof tree: either "calendar X will commit this digest" or
//! "this digest is the merkle root of block H on chain C". Unknown
//! attestation kinds are carried verbatim so newer proofs survive a
//! round trip through an older client.

use std::cmp::Ordering;
use std::fmt;
use std::io::{Read, Write};

use super::error::{Error, Result, MAX_PAYLOAD_LENGTH, MAX_URI_LENGTH};
use super::ser::{Deserializer, ParseMode, Serializer};

/// Size of the magic identifying the attestation kind
pub const TAG_SIZE: usize = 8;

pub const PENDING_TAG: [u8; TAG_SIZE] = [0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];
pub const BITCOIN_TAG: [u8; TAG_SIZE] = [0x05, 0x88, 0x96, 0x0d, 0x73, 0xd7, 0x19, 0x01];
pub const LITECOIN_TAG: [u8; TAG_SIZE] = [0x06, 0x86, 0x9a, 0x0d, 0x73, 0xd7, 0x1b, 0x45];
pub const ETHEREUM_TAG: [u8; TAG_SIZE] = [0x30, 0xfe, 0x80, 0x87, 0xb5, 0xc7, 0xea, 0xd7];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Attestation {
    /// A calendar has seen the digest and will extend the proof once
    /// its batch is committed to a block
    Pending { uri: String },
    /// The digest equals the merkle root of the Bitcoin block at this
    /// height
    Bitcoin { height: u64 },
    Litecoin { height: u64 },
    Ethereum { height: u64 },
    /// Preserved verbatim for forward compatibility; never verifiable
    Unknown { tag: [u8; TAG_SIZE], payload: Vec<u8> },
}

impl Attestation {
    pub fn tag(&self) -> [u8; TAG_SIZE] {
        match self {
            Attestation::Pending { .. } => PENDING_TAG,
            Attestation::Bitcoin { .. } => BITCOIN_TAG,
            Attestation::Litecoin { .. } => LITECOIN_TAG,
            Attestation::Ethereum { .. } => ETHEREUM_TAG,
            Attestation::Unknown { tag, .. } => *tag,
        }
    }

    /// Whether this attestation names a block header
    pub fn is_block_header(&self) -> bool {
        matches!(
            self,
            Attestation::Bitcoin { .. } | Attestation::Litecoin { .. } | Attestation::Ethereum { .. }
        )
    }

    /// Deserialize one attestation frame: 8-byte magic, varuint payload
    /// length, payload. Known kinds must consume the payload exactly.
    pub fn deserialize<R: Read>(deser: &mut Deserializer<R>) -> Result<Attestation> {
        let tag_bytes = deser.read_fixed_bytes(TAG_SIZE)?;
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&tag_bytes);

        let payload = deser.read_bytes(0, MAX_PAYLOAD_LENGTH, "attestation payload")?;

        let attestation = match tag {
            PENDING_TAG => {
                let mut inner = Deserializer::new(&payload[..]);
                let uri_bytes = inner.read_bytes(0, MAX_URI_LENGTH, "calendar URI")?;
                check_consumed(&payload, inner.offset())?;
                let uri = String::from_utf8(uri_bytes).map_err(|_| Error::InvalidUri)?;
                validate_uri(&uri)?;
                Attestation::Pending { uri }
            }
            BITCOIN_TAG | LITECOIN_TAG | ETHEREUM_TAG => {
                let mut inner = Deserializer::new(&payload[..]);
                let height = inner.read_uint()?;
                check_consumed(&payload, inner.offset())?;
                match tag {
                    BITCOIN_TAG => Attestation::Bitcoin { height },
                    LITECOIN_TAG => Attestation::Litecoin { height },
                    _ => Attestation::Ethereum { height },
                }
            }
            tag => {
                if deser.mode() == ParseMode::Strict {
                    return Err(Error::UnknownAttestation(hex::encode(tag)));
                }
                Attestation::Unknown { tag, payload }
            }
        };
        Ok(attestation)
    }

    /// Serialize as magic plus varbytes payload
    pub fn serialize<W: Write>(&self, ser: &mut Serializer<W>) -> Result<()> {
        ser.write_fixed_bytes(&self.tag())?;
        ser.write_bytes(&self.payload())
    }

    /// The frame payload, without magic or length prefix
    fn payload(&self) -> Vec<u8> {
        let mut inner = Serializer::new(Vec::new());
        match self {
            Attestation::Pending { uri } => {
                inner.write_bytes(uri.as_bytes()).expect("write to Vec");
            }
            Attestation::Bitcoin { height }
            | Attestation::Litecoin { height }
            | Attestation::Ethereum { height } => {
                inner.write_uint(*height).expect("write to Vec");
            }
            Attestation::Unknown { payload, .. } => {
                return payload.clone();
            }
        }
        inner.into_inner()
    }
}

fn check_consumed(payload: &[u8], consumed: usize) -> Result<()> {
    if consumed < payload.len() {
        return Err(Error::TrailingBytes(payload.len() - consumed));
    }
    Ok(())
}

/// Reject URIs that could smuggle anything beyond a plain calendar
/// address; the charset follows the deployed clients.
fn validate_uri(uri: &str) -> Result<()> {
    for ch in uri.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' | '/' | ':' => {}
            ch => return Err(Error::InvalidUriChar(ch)),
        }
    }
    Ok(())
}

// Canonical order: magic bytes first, then the variant payload.
impl Ord for Attestation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag().cmp(&other.tag()).then_with(|| match (self, other) {
            (Attestation::Pending { uri: a }, Attestation::Pending { uri: b }) => a.cmp(b),
            (Attestation::Bitcoin { height: a }, Attestation::Bitcoin { height: b })
            | (Attestation::Litecoin { height: a }, Attestation::Litecoin { height: b })
            | (Attestation::Ethereum { height: a }, Attestation::Ethereum { height: b }) => {
                a.cmp(b)
            }
            (Attestation::Unknown { payload: a, .. }, Attestation::Unknown { payload: b, .. }) => {
                a.cmp(b)
            }
            // distinct magics never reach here
            _ => Ordering::Equal,
        })
    }
}

impl PartialOrd for Attestation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attestation::Pending { uri } => write!(f, "pending: update via {uri}"),
            Attestation::Bitcoin { height } => write!(f, "Bitcoin block {height}"),
            Attestation::Litecoin { height } => write!(f, "Litecoin block {height}"),
            Attestation::Ethereum { height } => write!(f, "Ethereum block {height}"),
            Attestation::Unknown { tag, payload } => write!(
                f,
                "unrecognised attestation {} ({} bytes)",
                hex::encode(tag),
                payload.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(attestation: &Attestation) -> Attestation {
        let mut buf = Vec::new();
        attestation.serialize(&mut Serializer::new(&mut buf)).unwrap();
        Attestation::deserialize(&mut Deserializer::new(&buf[..])).unwrap()
    }

    #[test]
    fn test_roundtrips() {
        for attestation in [
            Attestation::Pending {
                uri: "https://alice.btc.calendar.opentimestamps.org".into(),
            },
            Attestation::Bitcoin { height: 358391 },
            Attestation::Litecoin { height: 1 },
            Attestation::Ethereum { height: 9_000_000 },
            Attestation::Unknown {
                tag: [1, 2, 3, 4, 5, 6, 7, 8],
                payload: vec![0xde, 0xad, 0xbe, 0xef],
            },
        ] {
            assert_eq!(roundtrip(&attestation), attestation);
        }
    }

    #[test]
    fn test_unknown_preserved_bit_identically() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0x99; 8]);
        buf.push(3);
        buf.extend_from_slice(&[0xaa, 0xbb, 0xcc]);

        let attestation = Attestation::deserialize(&mut Deserializer::new(&buf[..])).unwrap();
        assert!(matches!(attestation, Attestation::Unknown { .. }));

        let mut out = Vec::new();
        attestation.serialize(&mut Serializer::new(&mut out)).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn test_strict_mode_rejects_unknown() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0x99; 8]);
        buf.push(0);

        let err = Attestation::deserialize(&mut Deserializer::with_mode(&buf[..], ParseMode::Strict))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAttestation(_)));
    }

    #[test]
    fn test_trailing_payload_bytes() {
        // bitcoin frame with one byte after the height varuint
        let mut buf = Vec::new();
        buf.extend_from_slice(&BITCOIN_TAG);
        buf.push(2);
        buf.push(42);
        buf.push(0x00);

        let err = Attestation::deserialize(&mut Deserializer::new(&buf[..])).unwrap_err();
        assert!(matches!(err, Error::TrailingBytes(1)));
    }

    #[test]
    fn test_uri_charset() {
        let mut buf = Vec::new();
        Attestation::Pending {
            uri: "https://cal.example?x=1".into(),
        }
        .serialize(&mut Serializer::new(&mut buf))
        .unwrap();

        let err = Attestation::deserialize(&mut Deserializer::new(&buf[..])).unwrap_err();
        assert!(matches!(err, Error::InvalidUriChar('?')));
    }

    #[test]
    fn test_payload_size_limit() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0x99; 8]);
        let mut ser = Serializer::new(&mut buf);
        ser.write_bytes(&vec![0u8; MAX_PAYLOAD_LENGTH + 1]).unwrap();

        let err = Attestation::deserialize(&mut Deserializer::new(&buf[..])).unwrap_err();
        assert!(matches!(err, Error::SizeLimit { .. }));
    }

    #[test]
    fn test_ordering_groups_by_tag() {
        let mut attestations = vec![
            Attestation::Pending { uri: "https://b".into() },
            Attestation::Bitcoin { height: 9 },
            Attestation::Pending { uri: "https://a".into() },
            Attestation::Bitcoin { height: 3 },
        ];
        attestations.sort();
        assert_eq!(
            attestations,
            vec![
                Attestation::Bitcoin { height: 3 },
                Attestation::Bitcoin { height: 9 },
                Attestation::Pending { uri: "https://a".into() },
                Attestation::Pending { uri: "https://b".into() },
            ]
        );
    }
}
