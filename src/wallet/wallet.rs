use crate::error::Result;
use crate::utils::{
    base58_decode, base58_encode, ecdsa_sign, new_key_pair, public_key_from_pkcs8, sha256_digest,
};
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

/// Node signing identity: an ECDSA P-256 key pair with a derived address.
#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = new_key_pair()?;
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<Wallet> {
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn address(&self) -> String {
        derive_address(&self.public_key)
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn pkcs8(&self) -> &[u8] {
        &self.pkcs8
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        ecdsa_sign(&self.pkcs8, message)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish()
    }
}

/// Derive an address from a public key:
/// `hash160 = SHA256(SHA256(pubkey))`, checksum = first four bytes of
/// `SHA256(SHA256(hash160))`, address = Base58(hash160 ‖ checksum).
pub fn derive_address(public_key: &[u8]) -> String {
    let hash160 = sha256_digest(&sha256_digest(public_key));
    let mut payload = hash160.clone();
    payload.extend(checksum(&hash160));
    base58_encode(&payload)
}

fn checksum(hash160: &[u8]) -> Vec<u8> {
    let double_sha = sha256_digest(&sha256_digest(hash160));
    double_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// Check the Base58 shape and the embedded checksum of an address.
pub fn validate_address(address: &str) -> bool {
    let payload = match base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() <= ADDRESS_CHECK_SUM_LEN {
        return false;
    }

    let hash160 = &payload[..payload.len() - ADDRESS_CHECK_SUM_LEN];
    let actual_checksum = &payload[payload.len() - ADDRESS_CHECK_SUM_LEN..];
    checksum(hash160).as_slice() == actual_checksum
}
