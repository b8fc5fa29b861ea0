use crate::core::{Block, Blockchain, Transaction};
use crate::error::{ChainError, NodeError, Result, ValidationError};
use crate::utils::current_timestamp;
use log::warn;
use uuid::Uuid;

/// Tolerated forward clock skew when checking block timestamps
const MAX_CLOCK_SKEW_MS: i64 = 2 * 60 * 1000;

/// Validates transactions at admission time: structure, then spendable
/// balance, then signature, fail-fast in that order.
pub struct TransactionValidator {
    chain: Blockchain,
}

impl TransactionValidator {
    pub fn new(chain: Blockchain) -> TransactionValidator {
        TransactionValidator { chain }
    }

    pub fn validate(&self, tx: &Transaction) -> Result<()> {
        self.check_structure(tx)?;
        self.check_balance(tx)?;
        self.check_signature(tx)?;
        Ok(())
    }

    fn check_structure(&self, tx: &Transaction) -> Result<()> {
        if tx.id() == Uuid::nil() {
            return Err(NodeError::Validation(ValidationError::InvalidStructure(
                "transaction id missing".to_string(),
            )));
        }
        if tx.sender().is_empty() {
            return Err(NodeError::Validation(ValidationError::InvalidStructure(
                "sender missing".to_string(),
            )));
        }
        if tx.receiver().is_empty() {
            return Err(NodeError::Validation(ValidationError::InvalidStructure(
                "receiver missing".to_string(),
            )));
        }
        if tx.amount() == 0 {
            return Err(NodeError::Validation(ValidationError::InvalidStructure(
                "amount must be positive".to_string(),
            )));
        }
        if tx.signature().is_empty() {
            return Err(NodeError::Validation(ValidationError::InvalidStructure(
                "signature missing".to_string(),
            )));
        }
        Ok(())
    }

    fn check_balance(&self, tx: &Transaction) -> Result<()> {
        let required = tx.amount().saturating_add(tx.fee());
        let available = self.chain.balance_of(tx.sender());
        if available < required {
            return Err(NodeError::Validation(ValidationError::InsufficientBalance {
                required,
                available,
            }));
        }
        Ok(())
    }

    fn check_signature(&self, tx: &Transaction) -> Result<()> {
        if !tx.verify_signature() {
            return Err(NodeError::Validation(ValidationError::InvalidSignature));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub max_block_size: u32,
    /// Index the genesis block is required to carry. The builder mints
    /// genesis at index 1 while the inherited validation rule expects 0;
    /// both behaviors are kept selectable rather than silently merged.
    pub expected_genesis_index: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_block_size: 1_000_000,
            expected_genesis_index: 0,
        }
    }
}

/// Chain validation seam: the sync engine takes this as a trait object so
/// tests can observe and substitute the validation step.
pub trait ChainValidation: Send + Sync {
    fn validate_chain(&self, blocks: &[Block]) -> bool;
}

/// Structural and linkage validation for blocks and whole chains.
pub struct ChainValidator {
    config: ValidatorConfig,
}

impl Default for ChainValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl ChainValidator {
    pub fn new(config: ValidatorConfig) -> ChainValidator {
        ChainValidator { config }
    }

    /// Intrinsic block checks: id present, size limit, stored hash equals
    /// the recomputed header hash.
    pub fn validate_block(&self, block: &Block) -> Result<()> {
        if block.id() == Uuid::nil() {
            return Err(NodeError::Chain(ChainError::HashMismatch(
                "block id missing".to_string(),
            )));
        }
        if block.size_bytes() > self.config.max_block_size {
            return Err(NodeError::Chain(ChainError::SizeExceeded {
                size: block.size_bytes(),
                max: self.config.max_block_size,
            }));
        }
        let recomputed = block.recompute_hash();
        if recomputed != block.hash() {
            return Err(NodeError::Chain(ChainError::HashMismatch(format!(
                "stored {} recomputed {}",
                block.hash(),
                recomputed
            ))));
        }
        Ok(())
    }

    /// Linkage between adjacent blocks: index increment, hash chaining,
    /// and timestamp monotonicity within the skew tolerance.
    pub fn validate_link(&self, prev: &Block, curr: &Block) -> Result<()> {
        if curr.index() != prev.index() + 1 {
            return Err(NodeError::Chain(ChainError::LinkMismatch(format!(
                "index {} does not follow {}",
                curr.index(),
                prev.index()
            ))));
        }
        if curr.previous_hash() != prev.hash() {
            return Err(NodeError::Chain(ChainError::LinkMismatch(format!(
                "previous hash {} does not match {}",
                curr.previous_hash(),
                prev.hash()
            ))));
        }
        if curr.timestamp() <= prev.timestamp() {
            return Err(NodeError::Chain(ChainError::LinkMismatch(format!(
                "timestamp {} not after {}",
                curr.timestamp(),
                prev.timestamp()
            ))));
        }
        let now = current_timestamp()?;
        if curr.timestamp() > now + MAX_CLOCK_SKEW_MS {
            return Err(NodeError::Chain(ChainError::LinkMismatch(format!(
                "timestamp {} too far in the future",
                curr.timestamp()
            ))));
        }
        Ok(())
    }

    pub fn validate_genesis(&self, block: &Block) -> Result<()> {
        self.validate_block(block)?;
        if block.index() != self.config.expected_genesis_index {
            return Err(NodeError::Chain(ChainError::GenesisInvalid(format!(
                "expected index {}, got {}",
                self.config.expected_genesis_index,
                block.index()
            ))));
        }
        Ok(())
    }

    /// Whole-chain verdict: binary valid/invalid, first failure logged.
    pub fn validate_chain(&self, blocks: &[Block]) -> bool {
        let Some(genesis) = blocks.first() else {
            warn!("Chain validation failed: chain is empty");
            return false;
        };

        if let Err(e) = self.validate_genesis(genesis) {
            warn!("Chain validation failed: {e}");
            return false;
        }

        for pair in blocks.windows(2) {
            if let Err(e) = self.validate_block(&pair[1]) {
                warn!("Chain validation failed at height {}: {e}", pair[1].index());
                return false;
            }
            if let Err(e) = self.validate_link(&pair[0], &pair[1]) {
                warn!("Chain validation failed at height {}: {e}", pair[1].index());
                return false;
            }
        }
        true
    }
}

impl ChainValidation for ChainValidator {
    fn validate_chain(&self, blocks: &[Block]) -> bool {
        ChainValidator::validate_chain(self, blocks)
    }
}
