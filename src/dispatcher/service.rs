use crate::api::{ClusteringConfig, ClusteringCreationError, ClusteringOptionsValidated};
use crate::channel::{ChannelEvent, ChannelReceiver, GroupMessage, MemberId, MembershipChannel, View};
use crate::dispatcher::consumer::MessageConsumer;
use crate::dispatcher::payload::{Envelope, Payload};
use bytes::Bytes;
use std::convert::TryFrom;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;

/// Upper bound on clock skew between members that timestamp-based features should tolerate.
const MAX_ALLOWED_CLOCK_DELAY: Duration = Duration::from_secs(10 * 60);

/// ClusteringService is the message dispatcher of one cluster member. It owns the membership
/// channel, runs the receive loop, and hands every incoming payload to the consumers registered
/// for its type.
#[derive(Clone)]
pub struct ClusteringService {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    logger: slog::Logger,
    channel: MembershipChannel,
    registry: Mutex<Registry>,
    outbox: Outbox,
    open: AtomicBool,
    locking_attached: AtomicBool,
}

struct Registry {
    view: View,
    consumers: Vec<Arc<dyn MessageConsumer>>,
}

impl ClusteringService {
    /// Connects to the cluster named in `config` and starts dispatching.
    pub async fn start_standalone(config: ClusteringConfig) -> Result<Self, ClusteringCreationError> {
        if config.cluster_name.trim().is_empty() {
            return Err(ClusteringCreationError::InvalidClusterName(config.cluster_name));
        }
        let options = ClusteringOptionsValidated::try_from(config.options)
            .map_err(|e| ClusteringCreationError::IllegalOptions(e.to_string()))?;

        let (channel, receiver) = MembershipChannel::join(
            config.logger,
            &config.cluster_name,
            &config.transport,
            options.join_timeout,
            options.leave_timeout,
        )
        .await
        .map_err(ClusteringCreationError::Join)?;

        Self::start_with_channel(channel, receiver)
    }

    /// Starts dispatching on a channel the caller joined. The service takes the channel over and
    /// leaves it on shutdown.
    pub fn start_with_channel(
        channel: MembershipChannel,
        receiver: ChannelReceiver,
    ) -> Result<Self, ClusteringCreationError> {
        if !channel.is_open() {
            return Err(ClusteringCreationError::ChannelNotConnected);
        }
        let logger = channel.logger().clone();

        let (outbox, outbound_rx) = Outbox::new();
        tokio::spawn(run_sender_loop(logger.clone(), channel.clone(), outbound_rx));

        let inner = Arc::new(DispatcherInner {
            logger,
            channel,
            registry: Mutex::new(Registry {
                view: View::empty(),
                consumers: Vec::new(),
            }),
            outbox,
            open: AtomicBool::new(true),
            locking_attached: AtomicBool::new(false),
        });
        tokio::spawn(run_dispatch_loop(inner.clone(), receiver));
        slog::info!(inner.logger, "Clustering service started on '{}'.", inner.channel.cluster_name());

        Ok(ClusteringService { inner })
    }

    /// Starts a second dispatcher on a fork of `main`, which must be connected. The fork shares
    /// the cluster name and member identity of `main` but carries its own messages and views.
    pub async fn start_forked(main: &MembershipChannel) -> Result<Self, ClusteringCreationError> {
        if !main.is_open() {
            return Err(ClusteringCreationError::ChannelNotConnected);
        }
        let (channel, receiver) = main.fork().await.map_err(ClusteringCreationError::Join)?;

        Self::start_with_channel(channel, receiver)
    }

    /// Shuts this service down and joins the same group again as a new member. Consumers are not
    /// carried over. Other clones of this handle keep referring to the shut down service.
    pub async fn restart(&mut self) -> Result<(), ClusteringCreationError> {
        self.shutdown().await;
        let (channel, receiver) = self
            .inner
            .channel
            .rejoin()
            .await
            .map_err(ClusteringCreationError::Join)?;

        *self = Self::start_with_channel(channel, receiver)?;
        Ok(())
    }

    /// Registers `consumer`. It is immediately told about the current view, then receives every
    /// later message of its type and every later view change. A consumer added after shutdown is
    /// detached right away.
    pub fn add_consumer(&self, consumer: Arc<dyn MessageConsumer>) {
        let mut registry = self.inner.registry();
        if !self.is_open() {
            drop(registry);
            consumer.detached();
            return;
        }
        // Under the registry lock, so the dispatch loop can't deliver a newer view first.
        consumer.view_accepted(&registry.view);
        registry.consumers.push(consumer);
    }

    /// Broadcasts `payload` to every member, this one included. Returns false if the service is
    /// shut down or the group did not accept the message.
    pub async fn send_message(&self, payload: Payload) -> bool {
        if !self.is_open() {
            return false;
        }
        slog::debug!(self.inner.logger, "Sending payload {:?}", payload);

        let (tx, rx) = oneshot::channel();
        if !self.inner.outbox.push(payload.encode(), Some(tx)) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// The underlying channel, for protocols layered on this dispatcher.
    pub fn get_channel(&self) -> &MembershipChannel {
        &self.inner.channel
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    pub fn cluster_name(&self) -> &str {
        self.inner.channel.cluster_name()
    }

    pub fn local_member(&self) -> &MemberId {
        self.inner.channel.local_member()
    }

    /// The view as of the last view change the receive loop dispatched.
    pub fn current_view(&self) -> View {
        self.inner.registry().view.clone()
    }

    pub fn members_in_cluster(&self) -> usize {
        self.current_view().len()
    }

    pub fn multiple_members_in_cluster(&self) -> bool {
        self.members_in_cluster() > 1
    }

    pub fn max_allowed_clock_delay(&self) -> Duration {
        MAX_ALLOWED_CLOCK_DELAY
    }

    /// Drains pending outbound messages, leaves the group and stops dispatching. Returns false if
    /// the service was already shut down.
    pub async fn shutdown(&self) -> bool {
        if !self.inner.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        slog::info!(self.inner.logger, "Shutting down clustering service...");

        self.inner.outbox.flush().await;
        self.inner.detach_consumers();
        self.inner.channel.leave().await;

        slog::info!(self.inner.logger, "Clustering service shut down.");
        true
    }

    /// Stops dispatching and drops out of the group without leaving, so the rest of the cluster
    /// sees this member fail.
    pub fn abort(&self) {
        self.inner.open.store(false, Ordering::Release);
        self.inner.detach_consumers();
        self.inner.channel.abort();
    }

    pub(crate) fn outbox(&self) -> Outbox {
        self.inner.outbox.clone()
    }

    /// Returns false if a cluster locking engine is already attached to this service.
    pub(crate) fn try_attach_locking(&self) -> bool {
        !self.inner.locking_attached.swap(true, Ordering::AcqRel)
    }
}

impl DispatcherInner {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().expect("ClusteringService registry mutex guard poison")
    }

    fn accept_view(&self, view: View) {
        slog::info!(
            self.logger,
            "Members of '{}' have changed: {:?} ({} total)",
            self.channel.cluster_name(),
            view,
            view.len()
        );
        let consumers = {
            let mut registry = self.registry();
            registry.view = view.clone();
            registry.consumers.clone()
        };

        for consumer in consumers.iter() {
            consumer.view_accepted(&view);
        }
    }

    fn dispatch(&self, message: GroupMessage) {
        let payload = match Payload::decode(message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                slog::warn!(self.logger, "Dropping undecodable message from {}: {}", message.from, e);
                return;
            }
        };
        slog::debug!(self.logger, "Received payload {:?} from {}", payload, message.from);

        let payload_type = payload.payload_type();
        let consumers: Vec<Arc<dyn MessageConsumer>> = self
            .registry()
            .consumers
            .iter()
            .filter(|c| c.payload_type() == payload_type)
            .cloned()
            .collect();

        let envelope = Envelope {
            from: message.from,
            payload,
        };
        for consumer in consumers.iter() {
            consumer.consume(&envelope);
        }
    }

    fn detach_consumers(&self) {
        let consumers = mem::take(&mut self.registry().consumers);
        for consumer in consumers.iter() {
            consumer.detached();
        }
    }
}

async fn run_dispatch_loop(inner: Arc<DispatcherInner>, mut receiver: ChannelReceiver) {
    while let Some(event) = receiver.next().await {
        match event {
            ChannelEvent::ViewChange(view) => inner.accept_view(view),
            ChannelEvent::Message(message) => inner.dispatch(message),
        }
    }
    inner.open.store(false, Ordering::Release);
    inner.detach_consumers();
    slog::info!(inner.logger, "Dispatch loop has exited.");
}

// A single sender task keeps every broadcast of this member in submission order.
async fn run_sender_loop(logger: slog::Logger, channel: MembershipChannel, mut queue: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(outbound) = queue.recv().await {
        match outbound {
            Outbound::Message(payload, ack) => {
                let delivered = channel.broadcast(payload).await;
                if !delivered {
                    slog::debug!(logger, "Outbound message was not delivered.");
                }
                if let Some(ack) = ack {
                    let _ = ack.send(delivered);
                }
            }
            Outbound::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

enum Outbound {
    Message(Bytes, Option<oneshot::Sender<bool>>),
    Flush(oneshot::Sender<()>),
}

/// Outbox is the queue in front of this member's sender task.
#[derive(Clone)]
pub(crate) struct Outbox {
    sender: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbox { sender: tx }, rx)
    }

    /// Enqueues without waiting. Safe to call from a consumer.
    pub(crate) fn post(&self, payload: Payload) -> bool {
        self.push(payload.encode(), None)
    }

    fn push(&self, data: Bytes, ack: Option<oneshot::Sender<bool>>) -> bool {
        self.sender.send(Outbound::Message(data, ack)).is_ok()
    }

    /// Resolves once everything enqueued before the call has been handed to the channel.
    async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Outbound::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}
