//! Named, mutually exclusive locks: the `LockingService` contract with an in-process and a
//! cluster-wide implementation.
mod api;
mod cluster;
mod interrupt;
mod standalone;
mod table;

pub use api::HolderId;
pub use api::Interrupted;
pub use api::LockingService;
pub use cluster::ClusterLockingService;
pub use cluster::LockDenial;
pub use cluster::LockGrant;
pub use cluster::LockMessage;
pub use cluster::LockOwner;
pub use cluster::LockRelease;
pub use cluster::LockRequest;
pub use cluster::LockStateQuery;
pub use cluster::LockStateTransfer;
pub use standalone::StandaloneLockingService;
pub use table::LockRecord;
