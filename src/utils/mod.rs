mod crypto;
mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, ecdsa_sign, ecdsa_verify, new_key_pair,
    public_key_from_pkcs8, sha256_digest, sha256_hex,
};
pub use serialization::{deserialize, serialize};
