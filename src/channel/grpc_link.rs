use crate::channel::channel::GroupLink;
use crate::channel::error::ChannelError;
use crate::channel::event::ChannelEvent;
use crate::channel::member::MemberId;
use crate::grpc::grpc_group_client::GrpcGroupClient;
use crate::grpc::{ProtoBroadcastReq, ProtoChannelEvent, ProtoJoinReq, ProtoLeaveReq};
use bytes::Bytes;
use std::convert::TryFrom;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};
use tonic::Streaming;

/// GrpcLink attaches a member to a group hosted by a remote `GroupRelayServer`.
pub(crate) struct GrpcLink {
    cluster_name: String,
    client: Mutex<GrpcGroupClient<Channel>>,
    event_forwarder: JoinHandle<()>,
}

impl GrpcLink {
    pub(crate) async fn connect(
        logger: slog::Logger,
        relay_addr: SocketAddr,
        cluster_name: &str,
        member: &MemberId,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChannelEvent>), ChannelError> {
        let url = format!("http://{}", relay_addr);
        slog::info!(logger, "Connecting to relay {} ...", url);
        let endpoint = Endpoint::from_shared(url).map_err(|e| ChannelError::Transport(e.to_string()))?;
        let connection = endpoint.connect().await?;
        let mut client = GrpcGroupClient::new(connection);

        let events = client
            .join(ProtoJoinReq {
                cluster_name: cluster_name.to_string(),
                member_id: member.as_str().to_string(),
            })
            .await?
            .into_inner();

        let (tx, rx) = mpsc::unbounded_channel();
        let event_forwarder = tokio::spawn(forward_events(logger, events, tx));

        let link = GrpcLink {
            cluster_name: cluster_name.to_string(),
            client: Mutex::new(client),
            event_forwarder,
        };
        Ok((link, rx))
    }

    fn client(&self) -> GrpcGroupClient<Channel> {
        self.client.lock().expect("GrpcLink.client() mutex guard poison").clone()
    }
}

#[async_trait::async_trait]
impl GroupLink for GrpcLink {
    async fn broadcast(&self, from: &MemberId, payload: Bytes) -> Result<bool, ChannelError> {
        let mut client = self.client();
        let reply = client
            .broadcast(ProtoBroadcastReq {
                cluster_name: self.cluster_name.clone(),
                member_id: from.as_str().to_string(),
                payload: payload.to_vec(),
            })
            .await?;

        Ok(reply.into_inner().delivered)
    }

    async fn leave(&self, member: &MemberId) -> Result<bool, ChannelError> {
        let mut client = self.client();
        let reply = client
            .leave(ProtoLeaveReq {
                cluster_name: self.cluster_name.clone(),
                member_id: member.as_str().to_string(),
            })
            .await?;

        Ok(reply.into_inner().was_member)
    }

    fn abort(&self) {
        // Dropping the stream is how the relay learns we're gone.
        self.event_forwarder.abort();
    }
}

async fn forward_events(
    logger: slog::Logger,
    mut events: Streaming<ProtoChannelEvent>,
    inbox: mpsc::UnboundedSender<ChannelEvent>,
) {
    loop {
        match events.message().await {
            Ok(Some(proto_event)) => match ChannelEvent::try_from(proto_event) {
                Ok(event) => {
                    if inbox.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => slog::warn!(logger, "Dropping malformed relay event: {}", e),
            },
            Ok(None) => break,
            Err(status) => {
                slog::warn!(logger, "Relay stream failed: {:?}", status);
                break;
            }
        }
    }
    slog::debug!(logger, "Relay event stream has ended.");
}
