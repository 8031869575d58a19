//! Group membership: views, ordered broadcast and failure detection.
mod channel;
mod error;
mod event;
mod grpc_link;
mod hub;
mod member;
mod network;

pub use channel::ChannelReceiver;
pub use channel::MembershipChannel;
pub use channel::TransportConfig;
pub use channel::ViewListener;
pub use error::ChannelError;
pub use member::MemberId;
pub use member::View;
pub use member::ViewId;
pub use network::LocalNetwork;

pub(crate) use event::ChannelEvent;
pub(crate) use event::GroupMessage;
