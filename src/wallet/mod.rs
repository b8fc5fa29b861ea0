mod keystore;
#[allow(clippy::module_inception)]
mod wallet;

pub use keystore::{
    identity_from_record, identity_record, open_identity, seal_identity, EncryptedIdentity,
    IDENTITY_RECORD_ID,
};
pub use wallet::{derive_address, validate_address, Wallet, ADDRESS_CHECK_SUM_LEN};
