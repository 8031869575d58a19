mod api;
mod channel;
mod dispatcher;
mod locking;
mod server;
mod grpc {
    include!("../generated/cluster.rs");
}

pub use api::ClusteringConfig;
pub use api::ClusteringCreationError;
pub use api::ClusteringOptions;
pub use api::LockingCreationError;
pub use api::LockingOptions;
pub use channel::ChannelError;
pub use channel::ChannelReceiver;
pub use channel::LocalNetwork;
pub use channel::MemberId;
pub use channel::MembershipChannel;
pub use channel::TransportConfig;
pub use channel::View;
pub use channel::ViewId;
pub use channel::ViewListener;
pub use dispatcher::ClusteringService;
pub use dispatcher::CustomPayload;
pub use dispatcher::DecodeError;
pub use dispatcher::Envelope;
pub use dispatcher::MessageConsumer;
pub use dispatcher::Payload;
pub use dispatcher::PayloadType;
pub use locking::ClusterLockingService;
pub use locking::HolderId;
pub use locking::Interrupted;
pub use locking::LockDenial;
pub use locking::LockGrant;
pub use locking::LockMessage;
pub use locking::LockOwner;
pub use locking::LockRecord;
pub use locking::LockRelease;
pub use locking::LockRequest;
pub use locking::LockStateQuery;
pub use locking::LockStateTransfer;
pub use locking::LockingService;
pub use locking::StandaloneLockingService;
pub use server::relay_shutdown_signal;
pub use server::GroupRelayServer;
pub use server::RelayShutdownHandle;
pub use server::RelayShutdownSignal;

// `crate::{root_mod}` holds no code, only `mod` and `pub use` statements. Modules are never `pub`;
// types are exported one `pub use` at a time, so each root_mod can organize its internals freely.
