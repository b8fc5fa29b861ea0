mod block;
mod blockchain;
mod builder;
mod merkle;
mod pool;
mod transaction;
mod validator;

pub use block::{Block, BLOCK_HEADER_BYTES, GENESIS_INDEX, GENESIS_PREVIOUS_HASH};
pub use blockchain::Blockchain;
pub use builder::{BlockBuilder, BuilderConfig, BuilderState};
pub use merkle::MerkleTree;
pub use pool::TransactionPool;
pub use transaction::{Transaction, TransactionStatus};
pub use validator::{
    ChainValidation, ChainValidator, TransactionValidator, ValidatorConfig,
};
