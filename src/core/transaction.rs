use crate::error::{NodeError, Result, ValidationError};
use crate::utils::{current_timestamp, ecdsa_verify, serialize, sha256_digest};
use crate::wallet::Wallet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a transaction: unconfirmed while pooled, confirmed once it
/// is included in a mined block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Unconfirmed,
    Confirmed,
}

/// A signed value transfer. Immutable once signed, except for `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    id: Uuid,
    sender: String,
    receiver: String,
    amount: u64,
    fee: u64,
    timestamp: i64,
    signature: Vec<u8>,
    public_key: Vec<u8>,
    payload: Option<Vec<u8>>,
    status: TransactionStatus,
}

/// Canonical signing payload. Field order is fixed; the signature covers
/// the SHA-256 digest of this view serialized as JSON.
#[derive(Serialize)]
struct SigningView<'a> {
    sender: &'a str,
    receiver: &'a str,
    amount: u64,
    timestamp: i64,
    fee: u64,
    payload: &'a Option<Vec<u8>>,
}

/// Stable byte view used for merkle leaves and size accounting. The
/// mutable `status` field is deliberately excluded so confirmation does
/// not shift a block's merkle root.
#[derive(Serialize)]
struct CanonicalView<'a> {
    id: &'a Uuid,
    sender: &'a str,
    receiver: &'a str,
    amount: u64,
    fee: u64,
    timestamp: i64,
    signature: &'a [u8],
    public_key: &'a [u8],
    payload: &'a Option<Vec<u8>>,
}

impl Transaction {
    /// Build and sign a new transfer from the given wallet.
    pub fn new(
        wallet: &Wallet,
        receiver: &str,
        amount: u64,
        fee: u64,
        payload: Option<Vec<u8>>,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(NodeError::Validation(ValidationError::InvalidStructure(
                "amount must be positive".to_string(),
            )));
        }
        if receiver.is_empty() {
            return Err(NodeError::Validation(ValidationError::InvalidStructure(
                "receiver must not be empty".to_string(),
            )));
        }

        let sender = wallet.address();
        let timestamp = current_timestamp()?;
        let digest = signing_digest(&sender, receiver, amount, timestamp, fee, &payload)?;
        let signature = wallet.sign(&digest)?;

        Ok(Transaction {
            id: Uuid::new_v4(),
            sender,
            receiver: receiver.to_string(),
            amount,
            fee,
            timestamp,
            signature,
            public_key: wallet.public_key().to_vec(),
            payload,
            status: TransactionStatus::Unconfirmed,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn mark_confirmed(&mut self) {
        self.status = TransactionStatus::Confirmed;
    }

    /// Recompute the digest the signature must cover.
    pub fn signing_digest(&self) -> Result<Vec<u8>> {
        signing_digest(
            &self.sender,
            &self.receiver,
            self.amount,
            self.timestamp,
            self.fee,
            &self.payload,
        )
    }

    /// Verify the embedded signature against the canonical payload.
    /// Returns `false` on any mismatch; never errors on bad signatures.
    pub fn verify_signature(&self) -> bool {
        match self.signing_digest() {
            Ok(digest) => ecdsa_verify(&self.public_key, &self.signature, &digest),
            Err(_) => false,
        }
    }

    /// Stable serialized form: merkle leaf input and the unit of block
    /// size accounting.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        serialize(&CanonicalView {
            id: &self.id,
            sender: &self.sender,
            receiver: &self.receiver,
            amount: self.amount,
            fee: self.fee,
            timestamp: self.timestamp,
            signature: &self.signature,
            public_key: &self.public_key,
            payload: &self.payload,
        })
    }

    pub fn byte_size(&self) -> Result<u32> {
        Ok(self.canonical_bytes()?.len() as u32)
    }

    /// Assemble a transaction from raw parts, bypassing signing. Tests use
    /// this to produce structurally broken or mis-signed transactions.
    #[cfg(test)]
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: Uuid,
        sender: &str,
        receiver: &str,
        amount: u64,
        fee: u64,
        timestamp: i64,
        signature: Vec<u8>,
        public_key: Vec<u8>,
    ) -> Transaction {
        Transaction {
            id,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            fee,
            timestamp,
            signature,
            public_key,
            payload: None,
            status: TransactionStatus::Unconfirmed,
        }
    }
}

fn signing_digest(
    sender: &str,
    receiver: &str,
    amount: u64,
    timestamp: i64,
    fee: u64,
    payload: &Option<Vec<u8>>,
) -> Result<Vec<u8>> {
    let view = SigningView {
        sender,
        receiver,
        amount,
        timestamp,
        fee,
        payload,
    };
    let bytes = serde_json::to_vec(&view)?;
    Ok(sha256_digest(&bytes))
}
