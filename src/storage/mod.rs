mod memory;
mod sled_store;
mod store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use store::{
    block_from_record, block_record, load_chain, save_block, transaction_from_record,
    transaction_record, EntityKind, Record, RecordStore,
};
