use crate::error::{NodeError, Result, SyncError};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use uuid::Uuid;

pub const PROTOCOL_VERSION: u32 = 1;
const DEFAULT_TTL: u32 = 7;

/// Direction of an exchange: ask for data, or deliver it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Request,
    Push,
}

/// Chain and pool summary exchanged during info sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub blocks_count: u64,
    pub last_block_hash: String,
    pub last_block_timestamp: i64,
    /// Unconfirmed (pooled) transactions
    pub transactions_count: u64,
    pub transaction_ids: Vec<Uuid>,
}

/// Session-encrypted opaque payload: a random nonce prefixed to the
/// ciphertext, producible and readable only with the peer's session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob(pub Vec<u8>);

/// The finite set of message kinds the protocol speaks, matched
/// exhaustively at every dispatch site. Info-sync and key-exchange
/// payloads travel in the clear; transaction and block transfers are
/// encrypted blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePayload {
    InfoSync(ChainSummary),
    KeyExchange { public_key: Vec<u8> },
    /// Encrypted `Vec<Transaction>`
    Transaction(EncryptedBlob),
    /// Encrypted `Vec<Block>` (full-chain transfer)
    Block(EncryptedBlob),
}

impl MessagePayload {
    pub fn message_type(&self) -> &'static str {
        match self {
            MessagePayload::InfoSync(_) => "InfoSync",
            MessagePayload::KeyExchange { .. } => "KeyExchange",
            MessagePayload::Transaction(_) => "Transaction",
            MessagePayload::Block(_) => "Block",
        }
    }
}

/// Wire envelope wrapping every protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol_version: u32,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub route: Vec<Uuid>,
    pub ttl: u32,
    pub method: Method,
    pub payload: MessagePayload,
}

impl Envelope {
    pub fn new(
        sender_id: Uuid,
        recipient_id: Option<Uuid>,
        method: Method,
        payload: MessagePayload,
    ) -> Envelope {
        Envelope {
            protocol_version: PROTOCOL_VERSION,
            sender_id,
            recipient_id,
            route: Vec::new(),
            ttl: DEFAULT_TTL,
            method,
            payload,
        }
    }
}

/// Write one envelope as a JSON text message.
pub fn write_envelope<W: Write>(writer: &mut W, envelope: &Envelope) -> Result<()> {
    serde_json::to_writer(&mut *writer, envelope)?;
    writer.flush()?;
    Ok(())
}

/// Read the next whole JSON message. `Ok(None)` means the stream closed.
pub fn read_envelope<R: BufRead>(reader: &mut R) -> Result<Option<Envelope>> {
    let mut stream = serde_json::Deserializer::from_reader(reader).into_iter::<Envelope>();
    match stream.next() {
        None => Ok(None),
        Some(Ok(envelope)) => Ok(Some(envelope)),
        Some(Err(e)) if e.is_eof() => Ok(None),
        Some(Err(e)) => Err(NodeError::Sync(SyncError::ReconciliationFailure(format!(
            "malformed message: {e}"
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn test_envelope_round_trip_over_a_buffer() {
        let envelope = Envelope::new(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            Method::Push,
            MessagePayload::InfoSync(ChainSummary {
                blocks_count: 3,
                last_block_hash: "00abc".to_string(),
                last_block_timestamp: 1_700_000_000_000,
                transactions_count: 1,
                transaction_ids: vec![Uuid::new_v4()],
            }),
        );

        let mut buffer = Vec::new();
        write_envelope(&mut buffer, &envelope).unwrap();
        write_envelope(&mut buffer, &envelope).unwrap();

        let mut reader = BufReader::new(buffer.as_slice());
        let first = read_envelope(&mut reader).unwrap().unwrap();
        let second = read_envelope(&mut reader).unwrap().unwrap();
        assert_eq!(first.payload, envelope.payload);
        assert_eq!(second.sender_id, envelope.sender_id);
        assert!(read_envelope(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_message_type_names() {
        let blob = MessagePayload::Transaction(EncryptedBlob(vec![1, 2, 3]));
        assert_eq!(blob.message_type(), "Transaction");
        let kx = MessagePayload::KeyExchange {
            public_key: vec![4],
        };
        assert_eq!(kx.message_type(), "KeyExchange");
    }

    #[test]
    fn test_malformed_message_is_an_error() {
        let mut reader = BufReader::new(&b"{\"not\": \"an envelope\"}"[..]);
        assert!(read_envelope(&mut reader).is_err());
    }
}
