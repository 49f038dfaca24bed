// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Merkle aggregation of validated entitlements.
//!
//! Leaf encoding is on-chain observable and must stay bit-exact:
//! `keccak256(address_bytes ‖ amount_as_ascii_decimal)` over the 20-byte
//! address and the decimal-string amount. Internal nodes hash the
//! concatenation of the sorted pair, so proofs verify without position
//! indices; an odd node is promoted to the next level unchanged. Leaf
//! order is the first-seen order of the address aggregation.

use crate::error::{RefundError, RefundResult};
use crate::store::RefundStore;
use crate::types::{parse_amount, RefundChainId};
use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use gas_refund_schema::models::{NewParticipation, StoredRefundTransaction};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

/// One `(address, amount)` entitlement; `amount` is an integer PSP string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleEntry {
    pub address: Address,
    pub amount: String,
}

pub fn leaf_hash(address: &Address, amount: &str) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(20 + amount.len());
    preimage.extend_from_slice(address.as_bytes());
    preimage.extend_from_slice(amount.as_bytes());
    keccak256(preimage)
}

fn combine(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(lo);
    preimage[32..].copy_from_slice(hi);
    keccak256(preimage)
}

/// Fixed tree over an ordered entry list.
pub struct RefundMerkleTree {
    entries: Vec<MerkleEntry>,
    // levels[0] is the leaf level, last level holds the root alone.
    levels: Vec<Vec<[u8; 32]>>,
}

impl RefundMerkleTree {
    pub fn build(entries: Vec<MerkleEntry>) -> Self {
        let leaves: Vec<[u8; 32]> = entries
            .iter()
            .map(|e| leaf_hash(&e.address, &e.amount))
            .collect();

        let mut levels = vec![leaves];
        while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let current = levels.last().unwrap();
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                if pair.len() == 2 {
                    next.push(combine(&pair[0], &pair[1]));
                } else {
                    // Odd node: promoted unchanged.
                    next.push(pair[0]);
                }
            }
            levels.push(next);
        }

        Self { entries, levels }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MerkleEntry] {
        &self.entries
    }

    /// Root of the tree; the empty tree roots to zero.
    pub fn root(&self) -> H256 {
        self.levels
            .last()
            .and_then(|l| l.first())
            .map(|h| H256::from_slice(h))
            .unwrap_or_else(H256::zero)
    }

    /// Sibling path for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Vec<H256> {
        let mut proof = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            let sibling = idx ^ 1;
            if sibling < level.len() {
                proof.push(H256::from_slice(&level[sibling]));
            }
            idx /= 2;
        }
        proof
    }
}

/// Check a leaf against a root using the sorted-pair convention.
pub fn verify_proof(leaf: [u8; 32], proof: &[H256], root: H256) -> bool {
    let mut acc = leaf;
    for sibling in proof {
        acc = combine(&acc, &sibling.to_fixed_bytes());
    }
    H256::from_slice(&acc) == root
}

/// The sealed artifact of one `(chain, epoch)`: root, total and per-address
/// proofs.
pub struct EpochDistribution {
    pub chain_id: RefundChainId,
    pub epoch: u64,
    pub merkle_root: H256,
    pub total_psp: Decimal,
    pub tree: RefundMerkleTree,
}

/// Aggregate validated rows per address (first-seen order) and build the
/// epoch tree.
pub fn build_epoch_distribution(
    chain_id: RefundChainId,
    epoch: u64,
    rows: &[StoredRefundTransaction],
) -> RefundResult<EpochDistribution> {
    let mut order: Vec<Address> = Vec::new();
    let mut amounts: HashMap<Address, Decimal> = HashMap::new();

    for row in rows {
        let address: Address = row
            .address
            .parse()
            .map_err(|e| RefundError::Storage(format!("bad address {:?}: {e}", row.address)))?;
        let amount =
            parse_amount(&row.refunded_amount_psp).map_err(|e| RefundError::Storage(e.to_string()))?;
        match amounts.entry(address) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(amount);
                order.push(address);
            }
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                *entry.get_mut() += amount;
            }
        }
    }

    let mut total_psp = Decimal::ZERO;
    let entries: Vec<MerkleEntry> = order
        .into_iter()
        .map(|address| {
            let amount = amounts[&address];
            total_psp += amount;
            MerkleEntry {
                address,
                amount: amount.normalize().to_string(),
            }
        })
        .collect();

    let tree = RefundMerkleTree::build(entries);
    Ok(EpochDistribution {
        chain_id,
        epoch,
        merkle_root: tree.root(),
        total_psp,
        tree,
    })
}

/// Builds and persists distributions for every `(chain, epoch)` whose
/// transactions are fully classified.
pub struct MerkleSealer<'a> {
    store: &'a dyn RefundStore,
}

impl<'a> MerkleSealer<'a> {
    pub fn new(store: &'a dyn RefundStore) -> Self {
        Self { store }
    }

    /// Seal one epoch: aggregate, build the tree, persist the distribution
    /// and participations atomically.
    pub async fn seal_epoch(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> RefundResult<EpochDistribution> {
        let rows = self
            .store
            .validated_transactions(chain_id, epoch)
            .await
            .map_err(|e| RefundError::Storage(e.to_string()))?;
        let distribution = build_epoch_distribution(chain_id, epoch, &rows)?;

        let participations = distribution
            .tree
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let proofs: Vec<String> = distribution
                    .tree
                    .proof(i)
                    .iter()
                    .map(|h| format!("{h:#x}"))
                    .collect();
                NewParticipation {
                    chain_id: chain_id.as_u64() as i64,
                    epoch: epoch as i64,
                    address: crate::types::format_address(&entry.address),
                    refunded_amount_psp: entry.amount.clone(),
                    merkle_proofs: serde_json::json!(proofs),
                    is_completed: true,
                }
            })
            .collect();

        self.store
            .seal_distribution(
                chain_id,
                epoch,
                format!("{:#x}", distribution.merkle_root),
                distribution.total_psp.normalize().to_string(),
                participations,
            )
            .await
            .map_err(|e| RefundError::Storage(e.to_string()))?;

        info!(
            "[{}] Sealed epoch {}: root {:#x}, total {} PSP ({} addresses)",
            chain_id,
            epoch,
            distribution.merkle_root,
            distribution.total_psp,
            distribution.tree.entries().len()
        );
        Ok(distribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{row, MemoryStore};
    use crate::types::RefundTxStatus;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn entry(n: u64, amount: &str) -> MerkleEntry {
        MerkleEntry {
            address: addr(n),
            amount: amount.to_string(),
        }
    }

    #[test]
    fn test_leaf_encoding_is_address_bytes_then_ascii_amount() {
        let address = addr(0xab);
        let amount = "1000000000000000000";
        let mut preimage = address.as_bytes().to_vec();
        preimage.extend_from_slice(amount.as_bytes());
        assert_eq!(leaf_hash(&address, amount), keccak256(preimage));
    }

    #[test]
    fn test_empty_tree_roots_to_zero() {
        let tree = RefundMerkleTree::build(vec![]);
        assert_eq!(tree.root(), H256::zero());
    }

    #[test]
    fn test_single_leaf_root_is_the_leaf() {
        let e = entry(1, "42");
        let tree = RefundMerkleTree::build(vec![e.clone()]);
        assert_eq!(
            tree.root(),
            H256::from_slice(&leaf_hash(&e.address, &e.amount))
        );
        assert!(tree.proof(0).is_empty());
        assert!(verify_proof(
            leaf_hash(&e.address, &e.amount),
            &[],
            tree.root()
        ));
    }

    #[test]
    fn test_pair_hash_is_order_independent() {
        let a = leaf_hash(&addr(1), "1");
        let b = leaf_hash(&addr(2), "2");
        assert_eq!(combine(&a, &b), combine(&b, &a));
    }

    /// Property 6: every proof validates against the published root, for
    /// even and odd leaf counts.
    #[test]
    fn test_all_proofs_verify() {
        for count in 1..=9u64 {
            let entries: Vec<_> = (0..count)
                .map(|i| entry(i + 1, &format!("{}", (i + 1) * 1000)))
                .collect();
            let tree = RefundMerkleTree::build(entries.clone());
            for (i, e) in entries.iter().enumerate() {
                let leaf = leaf_hash(&e.address, &e.amount);
                let proof = tree.proof(i);
                assert!(
                    verify_proof(leaf, &proof, tree.root()),
                    "proof {i} of {count} leaves failed"
                );
            }
        }
    }

    #[test]
    fn test_tampered_amount_fails_verification() {
        let entries = vec![entry(1, "100"), entry(2, "200"), entry(3, "300")];
        let tree = RefundMerkleTree::build(entries);
        let forged = leaf_hash(&addr(2), "2000");
        assert!(!verify_proof(forged, &tree.proof(1), tree.root()));
    }

    #[test]
    fn test_root_depends_on_leaf_order() {
        let a = RefundMerkleTree::build(vec![entry(1, "100"), entry(2, "200")]);
        let b = RefundMerkleTree::build(vec![entry(2, "200"), entry(1, "100")]);
        // Leaf order is first-seen insertion order and is part of the
        // published artifact.
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn test_aggregation_first_seen_order_and_sums() {
        let rows = vec![
            row(1, 20, 100, 0x01, &addr(7), "5000", "10"),
            row(1, 20, 200, 0x02, &addr(8), "5000", "20"),
            row(1, 20, 300, 0x03, &addr(7), "5000", "30"),
        ];
        let dist =
            build_epoch_distribution(RefundChainId::Mainnet, 20, &rows).unwrap();
        let entries = dist.tree.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].address, addr(7));
        assert_eq!(entries[1].address, addr(8));
        // 10 + 30 PSP-equivalent rows at unit prices: amounts are summed
        // from the persisted integer strings.
        let e0: Decimal = entries[0].amount.parse().unwrap();
        let e1: Decimal = entries[1].amount.parse().unwrap();
        assert_eq!(e0 + e1, dist.total_psp);
    }

    #[tokio::test]
    async fn test_sealer_persists_distribution_and_participations() {
        let mut r1 = row(1, 20, 100, 0x01, &addr(7), "5000", "10");
        r1.status = RefundTxStatus::Validated.as_str().to_string();
        let mut r2 = row(1, 20, 200, 0x02, &addr(8), "5000", "20");
        r2.status = RefundTxStatus::Validated.as_str().to_string();
        // Rejected rows do not participate.
        let r3 = row(1, 20, 300, 0x03, &addr(9), "5000", "30");
        let store = MemoryStore::new(vec![r1, r2, r3]);

        let sealer = MerkleSealer::new(&store);
        let dist = sealer
            .seal_epoch(RefundChainId::Mainnet, 20)
            .await
            .unwrap();

        let distributions = store.distributions();
        assert_eq!(distributions.len(), 1);
        assert_eq!(distributions[0].merkle_root, format!("{:#x}", dist.merkle_root));

        let participations = store.participations();
        assert_eq!(participations.len(), 2);
        assert!(participations.iter().all(|p| p.is_completed));

        // Each persisted proof list re-verifies against the sealed root.
        for (i, p) in participations.iter().enumerate() {
            let proofs: Vec<String> =
                serde_json::from_value(p.merkle_proofs.clone()).unwrap();
            let proof: Vec<H256> = proofs.iter().map(|s| s.parse().unwrap()).collect();
            let entry = &dist.tree.entries()[i];
            assert!(verify_proof(
                leaf_hash(&entry.address, &entry.amount),
                &proof,
                dist.merkle_root
            ));
        }
    }
}
