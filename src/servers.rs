//! UDP and TCP DNS transport. Adapted from the teacher's `servers.rs`,
//! which ran a single UDP loop over a shared `Arc<RwLock<...>>`
//! datastore; this keeps the bind-loop-spawn shape but adds the TCP
//! listener (length-prefixed per RFC 1035 §4.2.2, via
//! `tokio_util::codec::LengthDelimitedCodec`) and routes both
//! transports through the same `resolver::resolve` call.

use crate::enums::{AnyResponseMode, OpCode, Rcode};
use crate::error::NsblastError;
use crate::resolver;
use crate::storage::Engine;
use crate::wire::rr::Question;
use crate::wire::{Message, MAX_UDP_PAYLOAD};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, instrument, warn};

#[derive(Clone)]
pub struct DnsServer {
    engine: Arc<Engine>,
    any_mode: AnyResponseMode,
    /// Woken with a zone apex whenever a NOTIFY arrives for it, so the
    /// slave zone sync client (elsewhere) can schedule an IXFR/AXFR
    /// check without the transport loop blocking on it.
    notify_tx: Option<UnboundedSender<String>>,
}

impl DnsServer {
    pub fn new(engine: Arc<Engine>, any_mode: AnyResponseMode) -> Self {
        DnsServer { engine, any_mode, notify_tx: None }
    }

    pub fn with_notify_channel(mut self, tx: UnboundedSender<String>) -> Self {
        self.notify_tx = Some(tx);
        self
    }

    #[instrument(skip(self), fields(%addr))]
    pub async fn run_udp(&self, addr: SocketAddr) -> Result<(), NsblastError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("listening for UDP DNS queries");
        let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            match self.handle_datagram(&buf[..len]) {
                Ok(reply) => {
                    if let Err(err) = socket.send_to(&reply, peer).await {
                        warn!(%peer, %err, "failed to send UDP reply");
                    }
                }
                Err(err) => debug!(%peer, %err, "dropping unanswerable UDP query"),
            }
        }
    }

    #[instrument(skip(self), fields(%addr))]
    pub async fn run_tcp(&self, addr: SocketAddr) -> Result<(), NsblastError> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening for TCP DNS queries");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(err) = server.serve_tcp_connection(stream).await {
                    debug!(%peer, %err, "TCP connection ended");
                }
            });
        }
    }

    async fn serve_tcp_connection(&self, stream: TcpStream) -> Result<(), NsblastError> {
        let codec = LengthDelimitedCodec::builder().length_field_length(2).big_endian().new_codec();
        let mut framed = Framed::new(stream, codec);
        while let Some(frame) = framed.next().await {
            let frame = frame?;
            match self.handle_tcp_message(&frame) {
                Ok(reply) => framed.send(Bytes::from(reply)).await?,
                Err(err) => {
                    debug!(%err, "dropping malformed TCP query, closing connection");
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_datagram(&self, datagram: &[u8]) -> Result<Vec<u8>, NsblastError> {
        let request = Message::parse(datagram)?;
        let max_size = request.max_udp_payload();
        let reply = self.answer(&request)?;
        reply.to_bytes_truncating(max_size)
    }

    fn handle_tcp_message(&self, msg: &[u8]) -> Result<Vec<u8>, NsblastError> {
        let request = Message::parse(msg)?;
        let reply = self.answer(&request)?;
        // TCP has no UDP-style size ceiling; the codec's 2-byte length
        // prefix is itself the only real bound, at 65535 bytes.
        reply.to_bytes_truncating(u16::MAX as usize)
    }

    fn answer(&self, request: &Message) -> Result<Message, NsblastError> {
        let question = request
            .questions
            .first()
            .ok_or_else(|| NsblastError::Malformed("message carries no question".into()))?;

        match request.header.opcode {
            OpCode::Query => {
                let txn = self.engine.begin();
                resolver::resolve(&txn, request.header, question, self.any_mode)
            }
            OpCode::Notify => Ok(self.handle_notify(request, question)),
            OpCode::Status | OpCode::IQuery => Ok(Message::error_response(request.header, Rcode::NotImplemented)),
        }
    }

    /// Acknowledge a NOTIFY per RFC 1996 §3.6 (an empty NOERROR reply
    /// to the same question) and wake the slave sync client.
    fn handle_notify(&self, request: &Message, question: &Question) -> Message {
        if let Some(tx) = &self.notify_tx {
            let _ = tx.send(question.qname.clone());
        }
        let mut header = request.header.as_answer();
        header.rcode = Rcode::NoError;
        Message { header, questions: vec![question.clone()], ..Message::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::codec::EntryBuilder;
    use crate::storage::key;
    use crate::wire::header::Header;
    use crate::wire::rr::Question;
    use crate::enums::{RecordClass, RecordType};
    use std::net::Ipv4Addr;
    use tempfile::tempdir;

    fn server_with_zone() -> (tempfile::TempDir, DnsServer) {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path()).unwrap();
        let txn = engine.begin();
        txn.write(&key::zone_key("example.com"), b"1", true, crate::storage::engine::Category::MasterZone).unwrap();
        let mut builder = EntryBuilder::new("example.com");
        builder.create_a(300, Ipv4Addr::new(127, 0, 0, 1)).unwrap();
        let entry = builder.finish().unwrap();
        txn.write(&key::entry_key("example.com"), &entry.to_bytes().unwrap(), true, crate::storage::engine::Category::Entry).unwrap();
        txn.commit().unwrap();
        (dir, DnsServer::new(Arc::new(engine), AnyResponseMode::default()))
    }

    fn query_message(qname: &str) -> Message {
        let header = Header { id: 42, qdcount: 1, ..Header::default() };
        Message {
            header,
            questions: vec![Question { qname: qname.into(), qtype: RecordType::A, qclass: RecordClass::Internet }],
            ..Message::default()
        }
    }

    #[test]
    fn datagram_roundtrip_answers_a_query() {
        let (_dir, server) = server_with_zone();
        let query = query_message("example.com");
        let bytes = query.to_bytes_truncating(512).unwrap();
        let reply_bytes = server.handle_datagram(&bytes).unwrap();
        let reply = Message::parse(&reply_bytes).unwrap();
        assert_eq!(reply.header.rcode, Rcode::NoError);
        assert_eq!(reply.answers.len(), 1);
    }

    #[test]
    fn notify_triggers_channel_and_acks() {
        let (_dir, server) = server_with_zone();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let server = server.with_notify_channel(tx);

        let mut header = Header { id: 7, qdcount: 1, ..Header::default() };
        header.opcode = OpCode::Notify;
        let msg = Message {
            header,
            questions: vec![Question { qname: "example.com".into(), qtype: RecordType::SOA, qclass: RecordClass::Internet }],
            ..Message::default()
        };
        let reply = server.answer(&msg).unwrap();
        assert_eq!(reply.header.rcode, Rcode::NoError);
        assert_eq!(rx.try_recv().unwrap(), "example.com");
    }

    #[tokio::test]
    async fn udp_server_answers_a_real_socket_query() {
        let (_dir, server) = server_with_zone();
        let listen_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let socket = UdpSocket::bind(listen_addr).await.unwrap();
        let bound = socket.local_addr().unwrap();
        drop(socket);

        let server_task = tokio::spawn({
            let server = server.clone();
            async move { server.run_udp(bound).await }
        });
        // Give the listener a moment to bind before the client fires.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query = query_message("example.com").to_bytes_truncating(512).unwrap();
        client.send_to(&query, bound).await.unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = tokio::time::timeout(std::time::Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("response timed out")
            .unwrap();
        let reply = Message::parse(&buf[..len]).unwrap();
        assert_eq!(reply.header.rcode, Rcode::NoError);

        server_task.abort();
    }
}
