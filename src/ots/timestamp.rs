//! The timestamp proof tree
//!
//! A `Timestamp` maps its input digest to a set of attestations plus a
//! set of op edges, each leading to the child proof for the op's
//! output. Children are keyed by the op itself in canonical order, so
//! two semantically equal trees always serialize to identical bytes.

use std::collections::btree_map::Entry;
use std::collections::{btree_map, btree_set, BTreeMap, BTreeSet};
use std::fmt;
use std::io::{Read, Write};

use super::attestation::Attestation;
use super::error::{Error, Result, MAX_ATTESTATIONS, RECURSION_LIMIT};
use super::op::Op;
use super::ser::{Deserializer, Serializer};

/// A timestamp proof rooted at a specific digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    /// The digest this node commits to
    pub msg: Vec<u8>,
    /// Claims about `msg` itself
    pub attestations: BTreeSet<Attestation>,
    /// Outgoing op edges; `child.msg == op.apply(msg)` for every entry
    pub ops: BTreeMap<Op, Timestamp>,
}

impl Timestamp {
    pub fn new(msg: Vec<u8>) -> Self {
        Self {
            msg,
            attestations: BTreeSet::new(),
            ops: BTreeMap::new(),
        }
    }

    /// Add an op edge, returning the child node. Adding an edge that
    /// already exists returns the existing child.
    pub fn add_op(&mut self, op: Op) -> Result<&mut Timestamp> {
        match self.ops.entry(op) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let msg = entry.key().apply(&self.msg)?;
                Ok(entry.insert(Timestamp::new(msg)))
            }
        }
    }

    /// Add an attestation; returns false if it was already present
    pub fn add_attestation(&mut self, attestation: Attestation) -> bool {
        self.attestations.insert(attestation)
    }

    /// Union another proof over the same digest into this one.
    ///
    /// Commutative, associative and idempotent; the other proof's
    /// attestations and edges are absorbed recursively.
    pub fn merge(&mut self, other: Timestamp) -> Result<()> {
        if self.msg != other.msg {
            return Err(Error::MergeMismatch);
        }
        self.attestations.extend(other.attestations);
        for (op, child) in other.ops {
            match self.ops.entry(op) {
                Entry::Occupied(mut entry) => entry.get_mut().merge(child)?,
                Entry::Vacant(entry) => {
                    entry.insert(child);
                }
            }
        }
        Ok(())
    }

    /// Lazy pre-order traversal over `(digest, attestation)` pairs.
    ///
    /// At each node attestations come before op edges, both in
    /// canonical order, so the sequence is deterministic.
    pub fn all_attestations(&self) -> AllAttestations<'_> {
        AllAttestations {
            stack: vec![Frame::new(self)],
        }
    }

    /// Whether some leaf is a block-header attestation
    pub fn is_complete(&self) -> bool {
        self.all_attestations().any(|(_, a)| a.is_block_header())
    }

    /// Digest/URI pairs for every pending attestation
    pub fn pending(&self) -> Vec<(Vec<u8>, String)> {
        self.all_attestations()
            .filter_map(|(digest, attestation)| match attestation {
                Attestation::Pending { uri } => Some((digest.to_vec(), uri.clone())),
                _ => None,
            })
            .collect()
    }

    /// Find the node committing to `msg`, if any
    pub fn find_node_mut(&mut self, msg: &[u8]) -> Option<&mut Timestamp> {
        if self.msg == msg {
            return Some(self);
        }
        for child in self.ops.values_mut() {
            if let Some(found) = child.find_node_mut(msg) {
                return Some(found);
            }
        }
        None
    }

    /// Recompute every edge and check it reproduces the stored child
    /// digest
    pub fn validate(&self) -> Result<()> {
        for (op, child) in &self.ops {
            let expected = op.apply(&self.msg)?;
            if expected != child.msg {
                return Err(Error::CorruptProof {
                    op: op.to_string(),
                    expected: hex::encode(&expected),
                    found: hex::encode(&child.msg),
                });
            }
            child.validate()?;
        }
        Ok(())
    }

    /// Serialize this node and its subtree.
    ///
    /// Every item (attestation or op edge) except the last is preceded
    /// by the continuation marker `0xff`; attestation items carry the
    /// `0x00` tag. Attestations serialize before op edges.
    pub fn serialize<W: Write>(&self, ser: &mut Serializer<W>) -> Result<()> {
        let total = self.attestations.len() + self.ops.len();
        if total == 0 {
            return Err(Error::EmptyTimestamp);
        }
        let mut written = 0;
        for attestation in &self.attestations {
            written += 1;
            if written < total {
                ser.write_byte(0xff)?;
            }
            ser.write_byte(0x00)?;
            attestation.serialize(ser)?;
        }
        for (op, child) in &self.ops {
            written += 1;
            if written < total {
                ser.write_byte(0xff)?;
            }
            op.serialize(ser)?;
            child.serialize(ser)?;
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut ser = Serializer::new(Vec::new());
        self.serialize(&mut ser)?;
        Ok(ser.into_inner())
    }

    /// Deserialize the proof for a known starting digest
    pub fn deserialize<R: Read>(deser: &mut Deserializer<R>, msg: Vec<u8>) -> Result<Self> {
        let mut attestation_count = 0;
        Self::deserialize_recurse(deser, msg, 0, &mut attestation_count)
    }

    /// Deserialize a complete byte string, rejecting trailing garbage
    pub fn from_bytes(bytes: &[u8], msg: Vec<u8>) -> Result<Self> {
        let mut deser = Deserializer::new(bytes);
        let timestamp = Self::deserialize(&mut deser, msg)?;
        deser.assert_eof()?;
        Ok(timestamp)
    }

    fn deserialize_recurse<R: Read>(
        deser: &mut Deserializer<R>,
        msg: Vec<u8>,
        depth: usize,
        attestation_count: &mut usize,
    ) -> Result<Self> {
        if depth > RECURSION_LIMIT {
            return Err(Error::DeepRecursion(deser.offset()));
        }
        let mut node = Timestamp::new(msg);
        loop {
            let tag = deser.read_byte()?;
            if tag == 0xff {
                let tag = deser.read_byte()?;
                node.deserialize_item(deser, tag, depth, attestation_count)?;
            } else {
                node.deserialize_item(deser, tag, depth, attestation_count)?;
                return Ok(node);
            }
        }
    }

    fn deserialize_item<R: Read>(
        &mut self,
        deser: &mut Deserializer<R>,
        tag: u8,
        depth: usize,
        attestation_count: &mut usize,
    ) -> Result<()> {
        if tag == 0x00 {
            *attestation_count += 1;
            if *attestation_count > MAX_ATTESTATIONS {
                return Err(Error::SizeLimit {
                    what: "attestations per proof",
                    len: *attestation_count,
                    min: 0,
                    max: MAX_ATTESTATIONS,
                    offset: deser.offset(),
                });
            }
            let attestation = Attestation::deserialize(deser)?;
            self.attestations.insert(attestation);
        } else {
            let op = Op::deserialize_with_tag(deser, tag)?;
            let child_msg = op.apply(&self.msg)?;
            let child = Self::deserialize_recurse(deser, child_msg, depth + 1, attestation_count)?;
            match self.ops.entry(op) {
                Entry::Occupied(mut entry) => entry.get_mut().merge(child)?,
                Entry::Vacant(entry) => {
                    entry.insert(child);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth);
        for attestation in &self.attestations {
            writeln!(f, "{pad}verify {attestation}")?;
        }
        let fork = self.attestations.len() + self.ops.len() > 1;
        for (op, child) in &self.ops {
            writeln!(f, "{pad}{op}")?;
            writeln!(f, "{pad}  = {}", hex::encode(&child.msg))?;
            child.fmt_tree(f, if fork { depth + 1 } else { depth })?;
        }
        Ok(())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digest {}", hex::encode(&self.msg))?;
        self.fmt_tree(f, 0)
    }
}

pub struct AllAttestations<'a> {
    stack: Vec<Frame<'a>>,
}

struct Frame<'a> {
    msg: &'a [u8],
    attestations: btree_set::Iter<'a, Attestation>,
    ops: btree_map::Iter<'a, Op, Timestamp>,
}

impl<'a> Frame<'a> {
    fn new(node: &'a Timestamp) -> Self {
        Self {
            msg: &node.msg,
            attestations: node.attestations.iter(),
            ops: node.ops.iter(),
        }
    }
}

impl<'a> Iterator for AllAttestations<'a> {
    type Item = (&'a [u8], &'a Attestation);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            if let Some(attestation) = frame.attestations.next() {
                return Some((frame.msg, attestation));
            }
            match frame.ops.next().map(|(_, child)| child) {
                Some(child) => self.stack.push(Frame::new(child)),
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ots::attestation::BITCOIN_TAG;

    fn pending(uri: &str) -> Attestation {
        Attestation::Pending { uri: uri.into() }
    }

    fn sample_tree() -> Timestamp {
        let mut root = Timestamp::new(b"hello".to_vec());
        root.add_attestation(Attestation::Bitcoin { height: 100 });
        let child = root.add_op(Op::Sha256).unwrap();
        child.add_attestation(pending("https://cal.example"));
        root.add_op(Op::Append(vec![0xaa]))
            .unwrap()
            .add_op(Op::Sha256)
            .unwrap()
            .add_attestation(Attestation::Bitcoin { height: 200 });
        root
    }

    #[test]
    fn test_add_op_invariant() {
        let mut root = Timestamp::new(b"msg".to_vec());
        let child = root.add_op(Op::Sha256).unwrap();
        assert_eq!(child.msg, Op::Sha256.apply(b"msg").unwrap());

        // re-adding the same edge returns the existing child
        root.add_op(Op::Sha256)
            .unwrap()
            .add_attestation(Attestation::Bitcoin { height: 1 });
        assert_eq!(root.ops.len(), 1);
        assert!(root.validate().is_ok());
    }

    #[test]
    fn test_roundtrip() {
        let tree = sample_tree();
        let bytes = tree.to_vec().unwrap();
        let decoded = Timestamp::from_bytes(&bytes, tree.msg.clone()).unwrap();
        assert_eq!(decoded, tree);
        assert!(decoded.validate().is_ok());

        // canonically-ordered bytes re-encode identically
        assert_eq!(decoded.to_vec().unwrap(), bytes);
    }

    #[test]
    fn test_deterministic_encoding() {
        // same tree, different insertion order
        let mut a = Timestamp::new(b"m".to_vec());
        a.add_op(Op::Prepend(vec![2])).unwrap();
        a.add_op(Op::Append(vec![1])).unwrap();
        a.add_attestation(Attestation::Bitcoin { height: 7 });
        a.ops
            .values_mut()
            .for_each(|child| {
                child.add_attestation(pending("https://cal.example"));
            });

        let mut b = Timestamp::new(b"m".to_vec());
        b.add_attestation(Attestation::Bitcoin { height: 7 });
        b.add_op(Op::Append(vec![1])).unwrap();
        b.add_op(Op::Prepend(vec![2])).unwrap();
        b.ops
            .values_mut()
            .for_each(|child| {
                child.add_attestation(pending("https://cal.example"));
            });

        assert_eq!(a.to_vec().unwrap(), b.to_vec().unwrap());
    }

    #[test]
    fn test_empty_timestamp_rejected() {
        let empty = Timestamp::new(b"m".to_vec());
        assert!(matches!(empty.to_vec().unwrap_err(), Error::EmptyTimestamp));
    }

    #[test]
    fn test_merge_laws() {
        let base = b"root".to_vec();
        let mut a = Timestamp::new(base.clone());
        a.add_op(Op::Sha256)
            .unwrap()
            .add_attestation(pending("https://a.example"));
        let mut b = Timestamp::new(base.clone());
        b.add_op(Op::Sha256)
            .unwrap()
            .add_attestation(Attestation::Bitcoin { height: 4 });
        let mut c = Timestamp::new(base.clone());
        c.add_attestation(Attestation::Bitcoin { height: 5 });

        // commutativity
        let mut ab = a.clone();
        ab.merge(b.clone()).unwrap();
        let mut ba = b.clone();
        ba.merge(a.clone()).unwrap();
        assert_eq!(ab, ba);

        // associativity
        let mut ab_c = ab.clone();
        ab_c.merge(c.clone()).unwrap();
        let mut bc = b.clone();
        bc.merge(c.clone()).unwrap();
        let mut a_bc = a.clone();
        a_bc.merge(bc).unwrap();
        assert_eq!(ab_c, a_bc);

        // idempotence
        let mut aa = a.clone();
        aa.merge(a.clone()).unwrap();
        assert_eq!(aa, a);
    }

    #[test]
    fn test_merge_requires_same_digest() {
        let mut a = Timestamp::new(b"one".to_vec());
        let b = Timestamp::new(b"two".to_vec());
        assert!(matches!(a.merge(b).unwrap_err(), Error::MergeMismatch));
    }

    #[test]
    fn test_all_attestations_order() {
        let tree = sample_tree();
        let collected: Vec<String> = tree
            .all_attestations()
            .map(|(_, a)| a.to_string())
            .collect();
        // node attestations first, then children in ascending op-tag order
        assert_eq!(
            collected,
            vec![
                "Bitcoin block 100",
                "pending: update via https://cal.example",
                "Bitcoin block 200",
            ]
        );
    }

    #[test]
    fn test_is_complete_and_pending() {
        let mut incomplete = Timestamp::new(b"m".to_vec());
        let child = incomplete.add_op(Op::Sha256).unwrap();
        child.add_attestation(pending("https://cal.example"));
        let child_digest = child.msg.clone();
        assert!(!incomplete.is_complete());
        assert_eq!(
            incomplete.pending(),
            vec![(child_digest, "https://cal.example".to_string())]
        );

        let complete = sample_tree();
        assert!(complete.is_complete());
    }

    #[test]
    fn test_corrupt_proof_detected() {
        let mut tree = sample_tree();
        // break an edge by rewriting a child digest
        let child = tree.ops.values_mut().next().unwrap();
        child.msg[0] ^= 0xff;
        assert!(matches!(
            tree.validate().unwrap_err(),
            Error::CorruptProof { .. }
        ));
    }

    fn op_chain_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0x08; len];
        bytes.push(0x00);
        bytes.extend_from_slice(&BITCOIN_TAG);
        bytes.push(1);
        bytes.push(42);
        bytes
    }

    #[test]
    fn test_recursion_limit_boundary() {
        let ok = Timestamp::from_bytes(&op_chain_bytes(RECURSION_LIMIT), b"m".to_vec()).unwrap();
        assert!(ok.is_complete());

        let err =
            Timestamp::from_bytes(&op_chain_bytes(RECURSION_LIMIT + 1), b"m".to_vec()).unwrap_err();
        assert!(matches!(err, Error::DeepRecursion(_)));
    }

    #[test]
    fn test_attestation_count_limit() {
        let mut frame = Vec::new();
        frame.push(0x00);
        frame.extend_from_slice(&BITCOIN_TAG);
        frame.push(1);
        frame.push(42);

        let mut bytes = Vec::new();
        for _ in 0..MAX_ATTESTATIONS {
            bytes.push(0xff);
            bytes.extend_from_slice(&frame);
        }
        bytes.extend_from_slice(&frame);

        let err = Timestamp::from_bytes(&bytes, b"m".to_vec()).unwrap_err();
        assert!(matches!(
            err,
            Error::SizeLimit {
                what: "attestations per proof",
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_edges_merge_on_decode() {
        // two forks over the same sha256 edge collapse into one child
        let mut bytes = Vec::new();
        bytes.push(0xff);
        bytes.push(0x08);
        bytes.push(0x00);
        bytes.extend_from_slice(&BITCOIN_TAG);
        bytes.push(1);
        bytes.push(1);
        bytes.push(0x08);
        bytes.push(0x00);
        bytes.extend_from_slice(&BITCOIN_TAG);
        bytes.push(1);
        bytes.push(2);

        let decoded = Timestamp::from_bytes(&bytes, b"m".to_vec()).unwrap();
        assert_eq!(decoded.ops.len(), 1);
        let child = decoded.ops.values().next().unwrap();
        assert_eq!(child.attestations.len(), 2);
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let tree = sample_tree();
        let mut bytes = tree.to_vec().unwrap();
        bytes.push(0x00);
        let err = Timestamp::from_bytes(&bytes, tree.msg.clone()).unwrap_err();
        assert!(matches!(err, Error::TrailingGarbage(_)));
    }
}
