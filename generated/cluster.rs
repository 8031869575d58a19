#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoJoinReq {
    #[prost(string, tag = "1")]
    pub cluster_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub member_id: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoChannelEvent {
    #[prost(oneof = "proto_channel_event::Event", tags = "1, 2")]
    pub event: ::core::option::Option<proto_channel_event::Event>,
}
/// Nested message and enum types in `ProtoChannelEvent`.
pub mod proto_channel_event {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "1")]
        View(super::ProtoView),
        #[prost(message, tag = "2")]
        Message(super::ProtoGroupMessage),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoView {
    #[prost(uint64, tag = "1")]
    pub view_id: u64,
    /// Join order. The first member is the coordinator.
    #[prost(string, repeated, tag = "2")]
    pub members: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoGroupMessage {
    #[prost(string, tag = "1")]
    pub from: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoBroadcastReq {
    #[prost(string, tag = "1")]
    pub cluster_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub member_id: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoBroadcastResult {
    #[prost(bool, tag = "1")]
    pub delivered: bool,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLeaveReq {
    #[prost(string, tag = "1")]
    pub cluster_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub member_id: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLeaveResult {
    #[prost(bool, tag = "1")]
    pub was_member: bool,
}
// ------- Dispatcher payloads -------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoClusterMessage {
    #[prost(oneof = "proto_cluster_message::Payload", tags = "1, 2")]
    pub payload: ::core::option::Option<proto_cluster_message::Payload>,
}
/// Nested message and enum types in `ProtoClusterMessage`.
pub mod proto_cluster_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Locking(super::ProtoLockMessage),
        #[prost(message, tag = "2")]
        Custom(super::ProtoCustomPayload),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoCustomPayload {
    #[prost(string, tag = "1")]
    pub kind: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}
// ------- Cluster locking -------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLockOwner {
    #[prost(string, tag = "1")]
    pub member_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub holder_id: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLockMessage {
    #[prost(oneof = "proto_lock_message::Kind", tags = "1, 2, 3, 4, 5, 6")]
    pub kind: ::core::option::Option<proto_lock_message::Kind>,
}
/// Nested message and enum types in `ProtoLockMessage`.
pub mod proto_lock_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Request(super::ProtoLockRequest),
        #[prost(message, tag = "2")]
        Granted(super::ProtoLockGranted),
        #[prost(message, tag = "3")]
        Denied(super::ProtoLockDenied),
        #[prost(message, tag = "4")]
        Released(super::ProtoLockReleased),
        #[prost(message, tag = "5")]
        StateTransfer(super::ProtoLockStateTransfer),
        #[prost(message, tag = "6")]
        StateQuery(super::ProtoLockStateQuery),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLockRequest {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(message, optional, tag = "2")]
    pub owner: ::core::option::Option<ProtoLockOwner>,
    #[prost(string, repeated, tag = "3")]
    pub names: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLockGranted {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(message, optional, tag = "2")]
    pub owner: ::core::option::Option<ProtoLockOwner>,
    #[prost(string, repeated, tag = "3")]
    pub names: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// Subset of `names` that the owner did not already hold when the coordinator decided.
    #[prost(string, repeated, tag = "4")]
    pub newly_granted: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLockDenied {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(message, optional, tag = "2")]
    pub owner: ::core::option::Option<ProtoLockOwner>,
    #[prost(string, repeated, tag = "3")]
    pub conflicts: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLockReleased {
    /// 0 for releases the coordinator issues on behalf of departed members.
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(message, optional, tag = "2")]
    pub owner: ::core::option::Option<ProtoLockOwner>,
    #[prost(string, repeated, tag = "3")]
    pub names: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
/// Posted by a locking engine when it starts, asking the coordinator for its table.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLockStateQuery {
    #[prost(string, tag = "1")]
    pub member_id: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLockRecord {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub owner: ::core::option::Option<ProtoLockOwner>,
    #[prost(int64, tag = "3")]
    pub granted_at_millis: i64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLockStateTransfer {
    #[prost(uint64, tag = "1")]
    pub view_id: u64,
    #[prost(message, repeated, tag = "2")]
    pub records: ::prost::alloc::vec::Vec<ProtoLockRecord>,
}
#[doc = r" Generated client implementations."]
pub mod grpc_group_client {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = " GrpcGroup exposes an in-process group bus to remote members. Joining opens a server stream that"]
    #[doc = " carries every view change and message of the group, in the group's total order."]
    pub struct GrpcGroupClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl GrpcGroupClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> GrpcGroupClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + HttpBody + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = tonic::client::Grpc::with_interceptor(inner, interceptor);
            Self { inner }
        }
        pub async fn join(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoJoinReq>,
        ) -> Result<tonic::Response<tonic::codec::Streaming<super::ProtoChannelEvent>>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/cluster.GrpcGroup/Join");
            self.inner
                .server_streaming(request.into_request(), path, codec)
                .await
        }
        pub async fn broadcast(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoBroadcastReq>,
        ) -> Result<tonic::Response<super::ProtoBroadcastResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/cluster.GrpcGroup/Broadcast");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn leave(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoLeaveReq>,
        ) -> Result<tonic::Response<super::ProtoLeaveResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/cluster.GrpcGroup/Leave");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
    impl<T: Clone> Clone for GrpcGroupClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    impl<T> std::fmt::Debug for GrpcGroupClient<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "GrpcGroupClient {{ ... }}")
        }
    }
}
#[doc = r" Generated server implementations."]
pub mod grpc_group_server {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with GrpcGroupServer."]
    #[async_trait]
    pub trait GrpcGroup: Send + Sync + 'static {
        #[doc = "Server streaming response type for the Join method."]
        type JoinStream: futures_core::Stream<Item = Result<super::ProtoChannelEvent, tonic::Status>>
            + Send
            + Sync
            + 'static;
        async fn join(
            &self,
            request: tonic::Request<super::ProtoJoinReq>,
        ) -> Result<tonic::Response<Self::JoinStream>, tonic::Status>;
        async fn broadcast(
            &self,
            request: tonic::Request<super::ProtoBroadcastReq>,
        ) -> Result<tonic::Response<super::ProtoBroadcastResult>, tonic::Status>;
        async fn leave(
            &self,
            request: tonic::Request<super::ProtoLeaveReq>,
        ) -> Result<tonic::Response<super::ProtoLeaveResult>, tonic::Status>;
    }
    #[doc = " GrpcGroup exposes an in-process group bus to remote members. Joining opens a server stream that"]
    #[doc = " carries every view change and message of the group, in the group's total order."]
    #[derive(Debug)]
    pub struct GrpcGroupServer<T: GrpcGroup> {
        inner: _Inner<T>,
    }
    struct _Inner<T>(Arc<T>, Option<tonic::Interceptor>);
    impl<T: GrpcGroup> GrpcGroupServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, None);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, Some(interceptor.into()));
            Self { inner }
        }
    }
    impl<T, B> Service<http::Request<B>> for GrpcGroupServer<T>
    where
        T: GrpcGroup,
        B: HttpBody + Send + Sync + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/cluster.GrpcGroup/Join" => {
                    #[allow(non_camel_case_types)]
                    struct JoinSvc<T: GrpcGroup>(pub Arc<T>);
                    impl<T: GrpcGroup> tonic::server::ServerStreamingService<super::ProtoJoinReq> for JoinSvc<T> {
                        type Response = super::ProtoChannelEvent;
                        type ResponseStream = T::JoinStream;
                        type Future =
                            BoxFuture<tonic::Response<Self::ResponseStream>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoJoinReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).join(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1;
                        let inner = inner.0;
                        let method = JoinSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.server_streaming(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/cluster.GrpcGroup/Broadcast" => {
                    #[allow(non_camel_case_types)]
                    struct BroadcastSvc<T: GrpcGroup>(pub Arc<T>);
                    impl<T: GrpcGroup> tonic::server::UnaryService<super::ProtoBroadcastReq> for BroadcastSvc<T> {
                        type Response = super::ProtoBroadcastResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoBroadcastReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).broadcast(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = BroadcastSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/cluster.GrpcGroup/Leave" => {
                    #[allow(non_camel_case_types)]
                    struct LeaveSvc<T: GrpcGroup>(pub Arc<T>);
                    impl<T: GrpcGroup> tonic::server::UnaryService<super::ProtoLeaveReq> for LeaveSvc<T> {
                        type Response = super::ProtoLeaveResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoLeaveReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).leave(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = LeaveSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(tonic::body::BoxBody::empty())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: GrpcGroup> Clone for GrpcGroupServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self { inner }
        }
    }
    impl<T: GrpcGroup> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone(), self.1.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: GrpcGroup> tonic::transport::NamedService for GrpcGroupServer<T> {
        const NAME: &'static str = "cluster.GrpcGroup";
    }
}
