use crate::channel::MemberId;
use crate::grpc::{proto_cluster_message, ProtoClusterMessage, ProtoCustomPayload};
use crate::locking::LockMessage;
use bytes::Bytes;
use prost::Message;
use std::convert::TryFrom;

/// Payload is everything the dispatcher can carry. The variant is the discriminator consumers
/// subscribe to.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Locking(LockMessage),
    Custom(CustomPayload),
}

/// CustomPayload carries an application message of a named kind. The data is opaque to the
/// dispatcher.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CustomPayload {
    pub kind: String,
    pub data: Bytes,
}

impl CustomPayload {
    pub fn new(kind: impl Into<String>, data: impl Into<Bytes>) -> Self {
        CustomPayload {
            kind: kind.into(),
            data: data.into(),
        }
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum PayloadType {
    Locking,
    Custom(String),
}

impl PayloadType {
    pub fn custom(kind: impl Into<String>) -> Self {
        PayloadType::Custom(kind.into())
    }
}

/// Envelope is a received payload together with the member that broadcast it.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub from: MemberId,
    pub payload: Payload,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
    #[error("Field '{0}' is out of range")]
    InvalidField(&'static str),
}

impl Payload {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Payload::Locking(_) => PayloadType::Locking,
            Payload::Custom(custom) => PayloadType::Custom(custom.kind.clone()),
        }
    }

    pub(crate) fn encode(self) -> Bytes {
        let proto_message = ProtoClusterMessage::from(self);
        let mut buf = Vec::with_capacity(proto_message.encoded_len());
        proto_message
            .encode(&mut buf)
            .expect("Vec<u8> grows on demand, encoding can't run out of space");

        Bytes::from(buf)
    }

    pub(crate) fn decode(data: Bytes) -> Result<Self, DecodeError> {
        let proto_message = ProtoClusterMessage::decode(data)?;
        Payload::try_from(proto_message)
    }
}

// ------- Conversions --------

impl From<Payload> for ProtoClusterMessage {
    fn from(payload: Payload) -> Self {
        let payload = match payload {
            Payload::Locking(message) => proto_cluster_message::Payload::Locking(message.into()),
            Payload::Custom(custom) => proto_cluster_message::Payload::Custom(ProtoCustomPayload {
                kind: custom.kind,
                data: custom.data.to_vec(),
            }),
        };

        ProtoClusterMessage { payload: Some(payload) }
    }
}

impl TryFrom<ProtoClusterMessage> for Payload {
    type Error = DecodeError;

    fn try_from(proto_message: ProtoClusterMessage) -> Result<Self, Self::Error> {
        match proto_message.payload {
            Some(proto_cluster_message::Payload::Locking(message)) => Ok(Payload::Locking(LockMessage::try_from(message)?)),
            Some(proto_cluster_message::Payload::Custom(custom)) => Ok(Payload::Custom(CustomPayload {
                kind: custom.kind,
                data: Bytes::from(custom.data),
            })),
            None => Err(DecodeError::MissingField("payload")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_payload_survives_the_wire() {
        let payload = Payload::Custom(CustomPayload::new("change-set", Bytes::from_static(b"\x00\x01binary")));

        let decoded = Payload::decode(payload.clone().encode()).unwrap();

        assert_eq!(decoded, payload);
        assert_eq!(decoded.payload_type(), PayloadType::custom("change-set"));
    }

    #[test]
    fn garbage_is_rejected() {
        let result = Payload::decode(Bytes::from_static(b"\xff\xff\xff\xff"));
        assert!(result.is_err());
    }

    #[test]
    fn empty_message_has_no_payload() {
        let result = Payload::decode(Bytes::new());
        assert!(matches!(result, Err(DecodeError::MissingField("payload"))));
    }
}
