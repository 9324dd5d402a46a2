//! Wire shape for the primary/follower replication stream. Framed with
//! the same length-delimited codec as the DNS/AXFR transports, carrying
//! `bincode`-encoded messages instead of DNS wire bytes since there's no
//! protocol to interoperate with here -- this link only ever talks to
//! another instance of this server.

use crate::error::NsblastError;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// First message either side sends: the follower's
    /// last-applied trxid from this primary, so the primary knows where
    /// to resume the catch-up stream.
    Hello { last_trxid: u64 },
    /// The net effect of one committed transaction: every key it
    /// touched, with its resulting value (`None` means the key was
    /// removed).
    Batch { trxid: u64, changes: Vec<KeyChange> },
    /// Sent when the primary has nothing new, so the follower's
    /// `AckTimer` resets instead of timing out a healthy idle link.
    Keepalive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyChange {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

pub type ReplicationStream = Framed<TcpStream, LengthDelimitedCodec>;

pub fn frame(stream: TcpStream) -> ReplicationStream {
    let codec = LengthDelimitedCodec::builder().length_field_length(4).big_endian().new_codec();
    Framed::new(stream, codec)
}

pub async fn send_message(stream: &mut ReplicationStream, msg: &ReplicationMessage) -> Result<(), NsblastError> {
    let bytes = bincode::serde::encode_to_vec(msg, bincode::config::standard())
        .map_err(|e| NsblastError::Internal(format!("failed to encode replication message: {e}")))?;
    stream.send(Bytes::from(bytes)).await?;
    Ok(())
}

pub async fn recv_message(stream: &mut ReplicationStream) -> Result<ReplicationMessage, NsblastError> {
    let frame = stream
        .next()
        .await
        .ok_or_else(|| NsblastError::Timeout("replication peer closed the connection".into()))??;
    let (msg, _) = bincode::serde::decode_from_slice(&frame, bincode::config::standard())
        .map_err(|e| NsblastError::Malformed(format!("bad replication message: {e}")))?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_message_roundtrips_through_bincode() {
        let msg = ReplicationMessage::Batch {
            trxid: 9,
            changes: vec![
                KeyChange { key: vec![1, 2, 3], value: Some(vec![4, 5]) },
                KeyChange { key: vec![9], value: None },
            ],
        };
        let encoded = bincode::serde::encode_to_vec(&msg, bincode::config::standard()).unwrap();
        let (decoded, _): (ReplicationMessage, usize) =
            bincode::serde::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        match decoded {
            ReplicationMessage::Batch { trxid, changes } => {
                assert_eq!(trxid, 9);
                assert_eq!(changes.len(), 2);
                assert_eq!(changes[1].value, None);
            }
            other => panic!("expected Batch, got {other:?}"),
        }
    }
}
