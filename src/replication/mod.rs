//! Primary/follower replication: a second, storage-level sync path
//! alongside AXFR/IXFR ([`crate::slave`]). Where AXFR/IXFR mirrors one
//! zone's DNS data between any two conformant servers, this streams
//! every storage mutation (zone data, tenant/user rows, anything else
//! this server writes) between two instances of this server, keeping a
//! warm standby ready to take over entirely.

pub mod follower;
pub mod primary;
pub mod proto;

pub use follower::ReplicationFollower;
pub use primary::ReplicationPrimary;
pub use proto::{KeyChange, ReplicationMessage};
