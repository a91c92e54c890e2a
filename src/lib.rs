//! OpenTimestamps client library
//!
//! The `ots` module holds the proof core: the wire codec, the op and
//! attestation vocabularies, and the timestamp tree. The remaining
//! modules are the collaborators around it: calendar client, block
//! header oracle, proof cache, and the stamping, upgrading and
//! verification flows built on top.

pub mod armor;
pub mod cache;
pub mod calendar;
pub mod config;
pub mod file_utils;
pub mod oracle;
pub mod ots;
pub mod stamper;
pub mod upgrader;
pub mod verifier;
