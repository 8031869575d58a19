//! The message dispatcher: typed pub/sub on top of a membership channel.
mod consumer;
mod payload;
mod service;

pub use consumer::MessageConsumer;
pub use payload::CustomPayload;
pub use payload::DecodeError;
pub use payload::Envelope;
pub use payload::Payload;
pub use payload::PayloadType;
pub use service::ClusteringService;

pub(crate) use service::Outbox;
