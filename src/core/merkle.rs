use crate::core::Transaction;
use crate::error::Result;
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;

/// Merkle root computation over an ordered transaction set.
///
/// Leaves are SHA-256 digests of each transaction's canonical bytes, in
/// the given order. Levels combine adjacent pairs as `SHA256(left ‖
/// right)`; an unpaired last node is carried up unchanged rather than
/// duplicated. An empty input yields `SHA256("")`.
pub struct MerkleTree;

impl MerkleTree {
    pub fn calculate_root(transactions: &[Transaction]) -> Result<String> {
        if transactions.is_empty() {
            return Ok(HEXLOWER.encode(&sha256_digest(b"")));
        }

        let mut level: Vec<Vec<u8>> = Vec::with_capacity(transactions.len());
        for tx in transactions {
            level.push(sha256_digest(&tx.canonical_bytes()?));
        }

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut pairs = level.chunks_exact(2);
            for pair in pairs.by_ref() {
                let mut combined = pair[0].clone();
                combined.extend_from_slice(&pair[1]);
                next.push(sha256_digest(&combined));
            }
            // Odd node carried up as-is
            if let [last] = pairs.remainder() {
                next.push(last.clone());
            }
            level = next;
        }

        Ok(HEXLOWER.encode(&level[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn sample_transactions(count: usize) -> Vec<Transaction> {
        let wallet = Wallet::new().unwrap();
        (0..count)
            .map(|i| Transaction::new(&wallet, "receiver-addr", (i as u64) + 1, 1, None).unwrap())
            .collect()
    }

    #[test]
    fn test_empty_input_is_defined() {
        let root = MerkleTree::calculate_root(&[]).unwrap();
        // SHA256 of the empty string
        assert_eq!(
            root,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_single_transaction_root_is_its_leaf() {
        let txs = sample_transactions(1);
        let root = MerkleTree::calculate_root(&txs).unwrap();
        let leaf = HEXLOWER.encode(&sha256_digest(&txs[0].canonical_bytes().unwrap()));
        assert_eq!(root, leaf);
    }

    #[test]
    fn test_root_is_deterministic() {
        let txs = sample_transactions(4);
        let a = MerkleTree::calculate_root(&txs).unwrap();
        let b = MerkleTree::calculate_root(&txs).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reordering_changes_root() {
        let mut txs = sample_transactions(3);
        let original = MerkleTree::calculate_root(&txs).unwrap();
        txs.swap(0, 2);
        let reordered = MerkleTree::calculate_root(&txs).unwrap();
        assert_ne!(original, reordered);
    }

    #[test]
    fn test_odd_node_carried_up_unchanged() {
        // With three leaves [a, b, c] the root must be
        // SHA256(SHA256(a ‖ b) ‖ c): c rises one level untouched.
        let txs = sample_transactions(3);
        let leaves: Vec<Vec<u8>> = txs
            .iter()
            .map(|tx| sha256_digest(&tx.canonical_bytes().unwrap()))
            .collect();

        let mut ab = leaves[0].clone();
        ab.extend_from_slice(&leaves[1]);
        let ab = sha256_digest(&ab);

        let mut ab_c = ab.clone();
        ab_c.extend_from_slice(&leaves[2]);
        let expected = HEXLOWER.encode(&sha256_digest(&ab_c));

        assert_eq!(MerkleTree::calculate_root(&txs).unwrap(), expected);
    }
}
