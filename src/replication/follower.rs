//! The follower side of replication: connects to a primary, announces
//! its last-applied cursor, then applies each batch it's streamed.
//! Shares its keepalive/retry schedule with the NOTIFY sender via
//! [`crate::ack_timer`].

use crate::ack_timer::{AckTimer, AckTimerConfig};
use crate::error::NsblastError;
use crate::replication::proto::{self, KeyChange, ReplicationMessage};
use crate::storage::engine::{Category, Engine};
use crate::storage::key;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

pub struct ReplicationFollower {
    engine: Arc<Engine>,
    ack_timer_config: AckTimerConfig,
}

impl ReplicationFollower {
    pub fn new(engine: Arc<Engine>, ack_timer_config: AckTimerConfig) -> Self {
        ReplicationFollower { engine, ack_timer_config }
    }

    fn cursor_key(&self, primary: SocketAddr) -> Vec<u8> {
        key::repl_cursor_key(&primary.to_string())
    }

    fn last_applied(&self, primary: SocketAddr) -> Result<u64, NsblastError> {
        let txn = self.engine.begin();
        match txn.read(&self.cursor_key(primary), Category::Default)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes[..8].try_into().map_err(|_| NsblastError::Internal("corrupt replication cursor".into()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Connect to `primary`, catch up from the last-applied trxid, then
    /// tail live batches until the connection drops or the keepalive
    /// deadline passes with nothing received.
    #[instrument(skip(self), fields(%primary))]
    pub async fn run(&self, primary: SocketAddr) -> Result<(), NsblastError> {
        let stream = TcpStream::connect(primary).await?;
        let mut framed = proto::frame(stream);

        let last_applied = self.last_applied(primary)?;
        proto::send_message(&mut framed, &ReplicationMessage::Hello { last_trxid: last_applied }).await?;

        let mut timer = AckTimer::new(self.ack_timer_config.clone());
        loop {
            let wait = timer
                .next_backoff()
                .ok_or_else(|| NsblastError::Timeout(format!("no data from primary {primary}")))?;

            match tokio::time::timeout(wait, proto::recv_message(&mut framed)).await {
                Ok(Ok(ReplicationMessage::Batch { trxid, changes })) => {
                    self.apply_batch(primary, trxid, changes)?;
                    timer.reset();
                }
                Ok(Ok(ReplicationMessage::Keepalive)) => timer.reset(),
                Ok(Ok(ReplicationMessage::Hello { .. })) => {
                    warn!(%primary, "unexpected Hello mid-stream from primary, ignoring");
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => warn!(%primary, attempt = timer.attempt(), "replication keepalive timed out, retrying wait"),
            }
        }
    }

    fn apply_batch(&self, primary: SocketAddr, trxid: u64, changes: Vec<KeyChange>) -> Result<(), NsblastError> {
        let txn = self.engine.begin();
        for change in changes {
            match change.value {
                Some(value) => txn.write(&change.key, &value, false, Category::Entry)?,
                None => txn.remove(&change.key, Category::Entry)?,
            }
        }
        let cursor_key = self.cursor_key(primary);
        txn.write(&cursor_key, &trxid.to_be_bytes(), false, Category::Default)?;

        // This engine has trxlog disabled (it's a follower's own store),
        // so commit never mints a local trxid for this batch -- the only
        // trxid that matters here is the primary's, already persisted in
        // the cursor key above.
        txn.commit()?;
        debug!(source_trxid = trxid, "applied replication batch");
        Ok(())
    }
}
