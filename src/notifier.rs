//! RFC 1996 NOTIFY sender: tells secondaries a zone changed, retrying
//! with backoff until one acknowledges or the retry budget is spent.
//! Shares its backoff schedule with the replication follower's
//! keepalive logic via [`crate::ack_timer`].

use crate::ack_timer::{AckTimer, AckTimerConfig};
use crate::enums::{OpCode, PacketType, RecordClass, RecordType};
use crate::error::NsblastError;
use crate::wire::header::Header;
use crate::wire::rr::Question;
use crate::wire::Message;
use futures::future::join_all;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{info, warn};

pub struct Notifier {
    config: AckTimerConfig,
}

impl Notifier {
    pub fn new(config: AckTimerConfig) -> Self {
        Notifier { config }
    }

    /// Notify every target concurrently; a slow or unreachable secondary
    /// never blocks the others. Returns one result per target, in order.
    pub async fn notify_all(&self, targets: &[SocketAddr], zone_apex: &str) -> Vec<Result<(), NsblastError>> {
        join_all(targets.iter().map(|&target| self.notify(target, zone_apex))).await
    }

    /// Send NOTIFY for `zone_apex` to `target`, retrying with
    /// exponential backoff until an acknowledging reply arrives or the
    /// retry budget is exhausted.
    pub async fn notify(&self, target: SocketAddr, zone_apex: &str) -> Result<(), NsblastError> {
        let bind_addr: SocketAddr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }.parse().unwrap();
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(target).await?;

        let request_id: u16 = rand::random();
        let mut timer = AckTimer::new(self.config.clone());

        loop {
            let message = build_notify(request_id, zone_apex);
            let bytes = message.to_bytes_truncating(512)?;
            socket.send(&bytes).await?;

            let wait = timer
                .next_backoff()
                .ok_or_else(|| NsblastError::Timeout(format!("no NOTIFY ack from {target} for {zone_apex}")))?;

            let mut buf = [0u8; 512];
            match timeout(wait, socket.recv(&mut buf)).await {
                Ok(Ok(len)) => {
                    if let Ok(reply) = Message::parse(&buf[..len]) {
                        if reply.header.id == request_id && reply.header.qr == PacketType::Answer {
                            info!(%target, zone_apex, "NOTIFY acknowledged");
                            return Ok(());
                        }
                    }
                }
                Ok(Err(err)) => warn!(%target, %err, "NOTIFY socket error, retrying"),
                Err(_) => warn!(%target, zone_apex, attempt = timer.attempt(), "NOTIFY ack timed out, retrying"),
            }
        }
    }
}

fn build_notify(id: u16, zone_apex: &str) -> Message {
    let header = Header { id, opcode: OpCode::Notify, authoritative: true, qdcount: 1, ..Header::default() };
    Message {
        header,
        questions: vec![Question { qname: zone_apex.to_string(), qtype: RecordType::SOA, qclass: RecordClass::Internet }],
        ..Message::default()
    }
}
