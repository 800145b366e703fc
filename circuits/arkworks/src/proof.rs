//! Proof trees
//!
//! A `Proof` is an arena of nodes. Leaves carry a create-circuit SNARK,
//! internal nodes a merge-circuit SNARK plus references to their two
//! children inside the same arena. The root is always the last node.
//!
//! ```text
//!            [4] Merge(2, 3) -> {1400, 1000}
//!           /                \
//!   [2] Merge(0, 1)        [3] Leaf {700, 1000}
//!    /          \
//! [0] Leaf     [1] Leaf
//! {300, 1000}  {400, 1000}
//! ```
//!
//! # Structural invariants
//! - the arena is non-empty
//! - every child index is smaller than its parent's index
//! - every node except the root is referenced exactly once
//!
//! Verification checks every node's SNARK against the public inputs
//! implied by its own output and its children's outputs, so a verified root
//! output is backed by verified leaves all the way down.

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::create::CreateCircuit;
use crate::error::{CircuitError, CircuitResult};
use crate::keys::{CircuitKind, Scalar, VerificationKeys};
use crate::merge::MergeCircuit;
use crate::value::AddValue;

/// Index of a node inside its proof's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofRef(u32);

impl ProofRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn shifted(self, offset: usize) -> Self {
        ProofRef(self.0 + offset as u32)
    }
}

impl From<usize> for ProofRef {
    fn from(index: usize) -> Self {
        ProofRef(index as u32)
    }
}

/// One node of a proof tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProofNode {
    Leaf {
        output: AddValue,
        #[serde(with = "hex_bytes")]
        snark: Vec<u8>,
    },
    Merge {
        left: ProofRef,
        right: ProofRef,
        output: AddValue,
        #[serde(with = "hex_bytes")]
        snark: Vec<u8>,
    },
}

impl ProofNode {
    pub fn output(&self) -> AddValue {
        match self {
            ProofNode::Leaf { output, .. } | ProofNode::Merge { output, .. } => *output,
        }
    }

    fn shifted(&self, offset: usize) -> Self {
        match self {
            ProofNode::Leaf { .. } => self.clone(),
            ProofNode::Merge {
                left,
                right,
                output,
                snark,
            } => ProofNode::Merge {
                left: left.shifted(offset),
                right: right.shifted(offset),
                output: *output,
                snark: snark.clone(),
            },
        }
    }
}

/// Self-contained proof tree with an `AddValue` public output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProof")]
pub struct Proof {
    nodes: Vec<ProofNode>,
}

#[derive(Deserialize)]
struct RawProof {
    nodes: Vec<ProofNode>,
}

impl TryFrom<RawProof> for Proof {
    type Error = CircuitError;

    fn try_from(raw: RawProof) -> Result<Self, Self::Error> {
        check_structure(&raw.nodes)?;
        Ok(Proof { nodes: raw.nodes })
    }
}

impl Proof {
    pub(crate) fn leaf(output: AddValue, snark: Vec<u8>) -> Self {
        Self {
            nodes: vec![ProofNode::Leaf { output, snark }],
        }
    }

    /// Graft two trees under a new root: left nodes keep their indices,
    /// right nodes are shifted past them.
    pub(crate) fn merged(left: &Proof, right: &Proof, output: AddValue, snark: Vec<u8>) -> Self {
        let offset = left.nodes.len();

        let mut nodes = Vec::with_capacity(left.nodes.len() + right.nodes.len() + 1);
        nodes.extend(left.nodes.iter().cloned());
        nodes.extend(right.nodes.iter().map(|node| node.shifted(offset)));
        nodes.push(ProofNode::Merge {
            left: left.root(),
            right: right.root().shifted(offset),
            output,
            snark,
        });

        Self { nodes }
    }

    pub fn root(&self) -> ProofRef {
        ProofRef::from(self.nodes.len() - 1)
    }

    /// The aggregate `AddValue` this proof attests to (unverified)
    pub fn public_output(&self) -> AddValue {
        self.nodes[self.nodes.len() - 1].output()
    }

    pub fn node(&self, at: ProofRef) -> Option<&ProofNode> {
        self.nodes.get(at.index())
    }

    pub fn nodes(&self) -> &[ProofNode] {
        &self.nodes
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, ProofNode::Leaf { .. }))
            .count()
    }

    /// Longest root-to-leaf path, counting nodes
    pub fn depth(&self) -> usize {
        let mut depths: Vec<usize> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let depth = match node {
                ProofNode::Leaf { .. } => 1,
                ProofNode::Merge { left, right, .. } => {
                    1 + depths[left.index()].max(depths[right.index()])
                }
            };
            depths.push(depth);
        }
        depths.last().copied().unwrap_or(0)
    }

    /// Cryptographically verify every node; returns the root output
    pub fn verify(&self, keys: &VerificationKeys) -> CircuitResult<AddValue> {
        check_structure(&self.nodes)?;

        for node in &self.nodes {
            match node {
                ProofNode::Leaf { output, snark } => {
                    let inputs = CreateCircuit::<Scalar>::public_inputs(output);
                    keys.verify_snark(CircuitKind::Create, &inputs, snark)?;
                }
                ProofNode::Merge {
                    left,
                    right,
                    output,
                    snark,
                } => {
                    let left = self.nodes[left.index()].output();
                    let right = self.nodes[right.index()].output();
                    let inputs = MergeCircuit::<Scalar>::public_inputs(&left, &right, output);
                    keys.verify_snark(CircuitKind::Merge, &inputs, snark)?;
                }
            }
        }

        let output = self.public_output();
        tracing::debug!(
            value = output.value,
            limit = output.limit,
            leaves = self.leaf_count(),
            "Proof tree verified"
        );
        Ok(output)
    }

    pub fn to_bytes(&self) -> CircuitResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> CircuitResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn malformed(reason: String) -> CircuitError {
    CircuitError::verification(format!("malformed proof tree: {}", reason))
}

fn check_structure(nodes: &[ProofNode]) -> CircuitResult<()> {
    if nodes.is_empty() {
        return Err(malformed("no nodes".to_string()));
    }

    let mut references = vec![0u32; nodes.len()];
    for (index, node) in nodes.iter().enumerate() {
        if let ProofNode::Merge { left, right, .. } = node {
            for child in [left, right] {
                if child.index() >= index {
                    return Err(malformed(format!(
                        "node {} references node {} which is not below it",
                        index,
                        child.index()
                    )));
                }
                references[child.index()] += 1;
            }
        }
    }

    let root = nodes.len() - 1;
    for (index, count) in references.iter().enumerate() {
        let expected = if index == root { 0 } else { 1 };
        if *count != expected {
            return Err(malformed(format!(
                "node {} referenced {} times",
                index, count
            )));
        }
    }
    Ok(())
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(value: u64) -> Proof {
        Proof::leaf(AddValue::new(value, 1000), vec![value as u8])
    }

    fn node(left: &Proof, right: &Proof) -> Proof {
        let output = AddValue::new(
            left.public_output().value + right.public_output().value,
            1000,
        );
        Proof::merged(left, right, output, vec![0xff])
    }

    #[test]
    fn test_graft_reindexes_right_subtree() {
        let left = node(&leaf(1), &leaf(2));
        let right = node(&leaf(3), &leaf(4));
        let root = node(&left, &right);

        assert_eq!(root.nodes().len(), 7);
        assert_eq!(root.root(), ProofRef::from(6));
        assert_eq!(root.public_output(), AddValue::new(10, 1000));

        match root.node(root.root()).unwrap() {
            ProofNode::Merge { left, right, .. } => {
                assert_eq!(*left, ProofRef::from(2));
                assert_eq!(*right, ProofRef::from(5));
            }
            other => panic!("expected merge root, got {:?}", other),
        }
        // Right subtree's internal node points at its shifted leaves
        match root.node(ProofRef::from(5)).unwrap() {
            ProofNode::Merge { left, right, .. } => {
                assert_eq!(*left, ProofRef::from(3));
                assert_eq!(*right, ProofRef::from(4));
            }
            other => panic!("expected merge node, got {:?}", other),
        }
        assert!(check_structure(root.nodes()).is_ok());
    }

    #[test]
    fn test_shape_metrics() {
        let unbalanced = node(&node(&node(&leaf(1), &leaf(2)), &leaf(3)), &leaf(4));
        assert_eq!(unbalanced.leaf_count(), 4);
        assert_eq!(unbalanced.depth(), 4);

        let balanced = node(&node(&leaf(1), &leaf(2)), &node(&leaf(3), &leaf(4)));
        assert_eq!(balanced.leaf_count(), 4);
        assert_eq!(balanced.depth(), 3);

        assert_eq!(leaf(1).depth(), 1);
    }

    #[test]
    fn test_bytes_roundtrip_keeps_tree() {
        let proof = node(&leaf(5), &leaf(6));
        let restored = Proof::from_bytes(&proof.to_bytes().unwrap()).unwrap();
        assert_eq!(proof, restored);
    }

    #[test]
    fn test_rejects_shared_child() {
        let json = serde_json::json!({
            "nodes": [
                { "kind": "leaf", "output": { "value": 1, "limit": 10 }, "snark": "00" },
                { "kind": "merge", "left": 0, "right": 0,
                  "output": { "value": 2, "limit": 10 }, "snark": "00" }
            ]
        });
        let err = Proof::from_bytes(json.to_string().as_bytes()).unwrap_err();
        assert!(err.to_string().contains("referenced 2 times"), "{}", err);
    }

    #[test]
    fn test_rejects_forward_reference() {
        let json = serde_json::json!({
            "nodes": [
                { "kind": "merge", "left": 1, "right": 2,
                  "output": { "value": 2, "limit": 10 }, "snark": "00" },
                { "kind": "leaf", "output": { "value": 1, "limit": 10 }, "snark": "00" },
                { "kind": "leaf", "output": { "value": 1, "limit": 10 }, "snark": "00" }
            ]
        });
        assert!(Proof::from_bytes(json.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_rejects_empty_and_orphans() {
        let empty = serde_json::json!({ "nodes": [] });
        assert!(Proof::from_bytes(empty.to_string().as_bytes()).is_err());

        // Two leaves and no root joining them
        let orphan = serde_json::json!({
            "nodes": [
                { "kind": "leaf", "output": { "value": 1, "limit": 10 }, "snark": "00" },
                { "kind": "leaf", "output": { "value": 1, "limit": 10 }, "snark": "00" }
            ]
        });
        assert!(Proof::from_bytes(orphan.to_string().as_bytes()).is_err());
    }
}
