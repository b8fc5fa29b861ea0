use crate::core::Transaction;
use log::warn;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;
use uuid::Uuid;

/// Heap entry ordered by fee, ties broken by admission order (earliest
/// first). The entry never outlives its map twin: both structures mutate
/// under the same lock.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PoolEntry {
    fee: u64,
    seq: u64,
    id: Uuid,
}

impl Ord for PoolEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fee
            .cmp(&other.fee)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PoolEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct PoolInner {
    txs: HashMap<Uuid, Transaction>,
    queue: BinaryHeap<PoolEntry>,
    next_seq: u64,
}

/// Staging area for not-yet-mined transactions: an id-keyed set paired
/// with a max-fee priority queue, safe under concurrent producers and a
/// draining consumer.
pub struct TransactionPool {
    inner: Mutex<PoolInner>,
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionPool {
    pub fn new() -> TransactionPool {
        TransactionPool {
            inner: Mutex::new(PoolInner {
                txs: HashMap::new(),
                queue: BinaryHeap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Admit a transaction. Returns `false` (and logs) when the id is
    /// already pooled.
    pub fn add(&self, tx: Transaction) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => {
                log::error!("Failed to acquire lock on transaction pool");
                return false;
            }
        };

        let id = tx.id();
        if inner.txs.contains_key(&id) {
            warn!("Rejecting duplicate transaction {id}");
            return false;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.push(PoolEntry {
            fee: tx.fee(),
            seq,
            id,
        });
        inner.txs.insert(id, tx);
        true
    }

    /// Atomically remove and return the highest-fee transaction.
    pub fn take_highest_fee(&self) -> Option<Transaction> {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => {
                log::error!("Failed to acquire lock on transaction pool");
                return None;
            }
        };

        let entry = inner.queue.pop()?;
        inner.txs.remove(&entry.id)
    }

    /// Remove a specific transaction, e.g. one confirmed by a peer block.
    pub fn remove(&self, id: &Uuid) -> Option<Transaction> {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => {
                log::error!("Failed to acquire lock on transaction pool");
                return None;
            }
        };

        let removed = inner.txs.remove(id)?;
        inner.queue.retain(|entry| entry.id != *id);
        Some(removed)
    }

    pub fn count(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.txs.len(),
            Err(_) => {
                log::error!("Failed to acquire lock on transaction pool");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        match self.inner.lock() {
            Ok(inner) => inner.txs.contains_key(id),
            Err(_) => {
                log::error!("Failed to acquire lock on transaction pool");
                false
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Transaction> {
        match self.inner.lock() {
            Ok(inner) => inner.txs.get(id).cloned(),
            Err(_) => {
                log::error!("Failed to acquire lock on transaction pool");
                None
            }
        }
    }

    pub fn transaction_ids(&self) -> Vec<Uuid> {
        match self.inner.lock() {
            Ok(inner) => inner.txs.keys().copied().collect(),
            Err(_) => {
                log::error!("Failed to acquire lock on transaction pool");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn transaction_with_fee(wallet: &Wallet, fee: u64) -> Transaction {
        Transaction::new(wallet, "receiver-addr", 10, fee, None).unwrap()
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let wallet = Wallet::new().unwrap();
        let pool = TransactionPool::new();
        let tx = transaction_with_fee(&wallet, 1);

        assert!(pool.add(tx.clone()));
        assert!(!pool.add(tx));
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn test_max_fee_ordering() {
        let wallet = Wallet::new().unwrap();
        let pool = TransactionPool::new();
        for fee in [1, 5, 3] {
            assert!(pool.add(transaction_with_fee(&wallet, fee)));
        }

        let fees: Vec<u64> = (0..3)
            .map(|_| pool.take_highest_fee().unwrap().fee())
            .collect();
        assert_eq!(fees, vec![5, 3, 1]);
        assert!(pool.take_highest_fee().is_none());
    }

    #[test]
    fn test_fee_ties_break_by_admission_order() {
        let wallet = Wallet::new().unwrap();
        let pool = TransactionPool::new();
        let first = transaction_with_fee(&wallet, 2);
        let second = transaction_with_fee(&wallet, 2);
        let first_id = first.id();

        pool.add(first);
        pool.add(second);
        assert_eq!(pool.take_highest_fee().unwrap().id(), first_id);
    }

    #[test]
    fn test_remove_keeps_structures_aligned() {
        let wallet = Wallet::new().unwrap();
        let pool = TransactionPool::new();
        let keep = transaction_with_fee(&wallet, 9);
        let drop = transaction_with_fee(&wallet, 5);
        let drop_id = drop.id();

        pool.add(keep.clone());
        pool.add(drop);

        assert!(pool.remove(&drop_id).is_some());
        assert!(pool.remove(&drop_id).is_none());
        assert_eq!(pool.count(), 1);
        assert_eq!(pool.take_highest_fee().unwrap().id(), keep.id());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_contains_and_ids() {
        let wallet = Wallet::new().unwrap();
        let pool = TransactionPool::new();
        let tx = transaction_with_fee(&wallet, 1);
        let id = tx.id();

        pool.add(tx);
        assert!(pool.contains(&id));
        assert_eq!(pool.transaction_ids(), vec![id]);
        assert_eq!(pool.get(&id).unwrap().id(), id);
    }
}
