use crate::channel::member::{MemberId, View, ViewId};
use crate::grpc::{proto_channel_event, ProtoChannelEvent, ProtoGroupMessage, ProtoView};
use bytes::Bytes;
use std::convert::TryFrom;

/// An event delivered by the group to one member. All members of a view receive the same events in
/// the same order, and view changes are ordered with respect to messages.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    ViewChange(View),
    Message(GroupMessage),
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupMessage {
    pub from: MemberId,
    pub payload: Bytes,
}

// ------- Conversions --------

impl From<ChannelEvent> for ProtoChannelEvent {
    fn from(event: ChannelEvent) -> Self {
        let event = match event {
            ChannelEvent::ViewChange(view) => proto_channel_event::Event::View(ProtoView {
                view_id: view.view_id().as_u64(),
                members: view.members().iter().map(|m| m.as_str().to_string()).collect(),
            }),
            ChannelEvent::Message(message) => proto_channel_event::Event::Message(ProtoGroupMessage {
                from: message.from.into_inner(),
                payload: message.payload.to_vec(),
            }),
        };

        ProtoChannelEvent { event: Some(event) }
    }
}

impl TryFrom<ProtoChannelEvent> for ChannelEvent {
    type Error = &'static str;

    fn try_from(proto_event: ProtoChannelEvent) -> Result<Self, Self::Error> {
        match proto_event.event {
            Some(proto_channel_event::Event::View(view)) => Ok(ChannelEvent::ViewChange(View::new(
                ViewId::new(view.view_id),
                view.members.into_iter().map(MemberId::new).collect(),
            ))),
            Some(proto_channel_event::Event::Message(message)) => Ok(ChannelEvent::Message(GroupMessage {
                from: MemberId::new(message.from),
                payload: Bytes::from(message.payload),
            })),
            None => Err("ChannelEvent is missing its event variant"),
        }
    }
}
