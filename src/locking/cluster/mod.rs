mod engine;
mod messages;
mod service;

pub use messages::LockDenial;
pub use messages::LockGrant;
pub use messages::LockMessage;
pub use messages::LockOwner;
pub use messages::LockRelease;
pub use messages::LockRequest;
pub use messages::LockStateQuery;
pub use messages::LockStateTransfer;
pub use service::ClusterLockingService;
