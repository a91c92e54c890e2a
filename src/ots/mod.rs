//! Timestamp proof core: wire codec, op and attestation vocabularies,
//! and the proof tree itself. Everything here is synchronous and pure;
//! the network only appears in the collaborator modules.

mod attestation;
mod detached;
mod error;
mod op;
mod ser;
mod timestamp;

pub use attestation::{
    Attestation, BITCOIN_TAG, ETHEREUM_TAG, LITECOIN_TAG, PENDING_TAG, TAG_SIZE,
};
pub use detached::{DetachedTimestampFile, MAGIC, VERSION};
pub use error::{
    Error, Result, MAX_ATTESTATIONS, MAX_OP_LENGTH, MAX_PAYLOAD_LENGTH, MAX_URI_LENGTH,
    RECURSION_LIMIT,
};
pub use op::Op;
pub use ser::{Deserializer, ParseMode, Serializer};
pub use timestamp::{AllAttestations, Timestamp};
