use crate::channel::{ChannelEvent, LocalNetwork, MemberId};
use crate::grpc::grpc_group_server::{GrpcGroup, GrpcGroupServer};
use crate::grpc::{
    ProtoBroadcastReq, ProtoBroadcastResult, ProtoChannelEvent, ProtoJoinReq, ProtoLeaveReq, ProtoLeaveResult,
};
use crate::server::RelayShutdownSignal;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

const RELAY_STREAM_BUFFER: usize = 256;

/// GroupRelayServer hosts groups on a `LocalNetwork` and exposes them to remote members over gRPC.
/// A member whose event stream goes away is reported to its group as failed.
pub struct GroupRelayServer {
    logger: slog::Logger,
    network: LocalNetwork,
}

impl GroupRelayServer {
    pub fn new(logger: slog::Logger) -> Self {
        let network = LocalNetwork::new(logger.clone());
        GroupRelayServer { logger, network }
    }

    /// Relays for a network that in-process members may use directly as well.
    pub fn with_network(logger: slog::Logger, network: LocalNetwork) -> Self {
        GroupRelayServer { logger, network }
    }

    pub async fn run(self, socket_addr: SocketAddr, shutdown_signal: RelayShutdownSignal) -> Result<(), tonic::transport::Error> {
        let logger = self.logger.clone();
        slog::info!(logger, "Relay listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcGroupServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        slog::info!(logger, "Relay run() has exited: {:?}", result);
        result
    }

    async fn handle_join(&self, rpc_request: ProtoJoinReq) -> Result<ReceiverStream<Result<ProtoChannelEvent, Status>>, Status> {
        if rpc_request.cluster_name.is_empty() || rpc_request.member_id.is_empty() {
            return Err(Status::invalid_argument("ClusterName and MemberId must be non-empty"));
        }

        let member = MemberId::new(rpc_request.member_id);
        let hub = self.network.hub(&rpc_request.cluster_name);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        hub.join(member.clone(), inbox_tx).await.map_err(|e| match e {
            crate::channel::ChannelError::DuplicateMember(_) => Status::already_exists(e.to_string()),
            _ => Status::unavailable(e.to_string()),
        })?;

        let (stream_tx, stream_rx) = mpsc::channel(RELAY_STREAM_BUFFER);
        let logger = self.logger.new(slog::o!("member" => member.to_string()));
        tokio::spawn(relay_events(logger, inbox_rx, stream_tx));

        Ok(ReceiverStream::new(stream_rx))
    }

    async fn handle_broadcast(&self, rpc_request: ProtoBroadcastReq) -> Result<ProtoBroadcastResult, Status> {
        let delivered = match self.network.existing_hub(&rpc_request.cluster_name) {
            Some(hub) => hub
                .broadcast(MemberId::new(rpc_request.member_id), Bytes::from(rpc_request.payload))
                .await
                .map_err(|e| Status::unavailable(e.to_string()))?,
            None => false,
        };

        Ok(ProtoBroadcastResult { delivered })
    }

    async fn handle_leave(&self, rpc_request: ProtoLeaveReq) -> Result<ProtoLeaveResult, Status> {
        let was_member = match self.network.existing_hub(&rpc_request.cluster_name) {
            Some(hub) => hub
                .leave(MemberId::new(rpc_request.member_id))
                .await
                .map_err(|e| Status::unavailable(e.to_string()))?,
            None => false,
        };

        Ok(ProtoLeaveResult { was_member })
    }
}

// Dropping `inbox` on exit is what the hub's failure detector picks up.
async fn relay_events(
    logger: slog::Logger,
    mut inbox: mpsc::UnboundedReceiver<ChannelEvent>,
    stream: mpsc::Sender<Result<ProtoChannelEvent, Status>>,
) {
    loop {
        tokio::select! {
            _ = stream.closed() => {
                slog::info!(logger, "Remote member disconnected.");
                break;
            }
            event = inbox.recv() => match event {
                Some(event) => {
                    if stream.send(Ok(ProtoChannelEvent::from(event))).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

#[async_trait::async_trait]
impl GrpcGroup for GroupRelayServer {
    type JoinStream = ReceiverStream<Result<ProtoChannelEvent, Status>>;

    async fn join(&self, rpc_request_wrapped: Request<ProtoJoinReq>) -> Result<Response<Self::JoinStream>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        self.handle_join(rpc_request).await.map(Response::new)
    }

    async fn broadcast(
        &self,
        rpc_request_wrapped: Request<ProtoBroadcastReq>,
    ) -> Result<Response<ProtoBroadcastResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        let rpc_result = self.handle_broadcast(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn leave(&self, rpc_request_wrapped: Request<ProtoLeaveReq>) -> Result<Response<ProtoLeaveResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_leave(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }
}
