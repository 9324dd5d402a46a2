//! An authoritative DNS name server: wire codec, packed zone storage,
//! the query-resolution state machine, UDP/TCP transport, NOTIFY/AXFR/
//! IXFR zone transfer, and primary/follower storage replication.

pub mod ack_timer;
pub mod cli;
pub mod config;
pub mod enums;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod replication;
pub mod resolver;
pub mod servers;
pub mod slave;
pub mod storage;
pub mod web;
pub mod wire;
pub mod zones;

pub use error::{NsblastError, Result};
