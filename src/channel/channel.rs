use crate::channel::error::ChannelError;
use crate::channel::event::ChannelEvent;
use crate::channel::grpc_link::GrpcLink;
use crate::channel::hub::HubClient;
use crate::channel::member::{MemberId, View};
use crate::channel::network::LocalNetwork;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;

/// TransportConfig selects the group communication transport a channel binds to.
#[derive(Clone)]
pub enum TransportConfig {
    /// In-process group bus. Members of the same cluster must share the same `LocalNetwork`.
    Local(LocalNetwork),
    /// Remote group bus hosted by a `GroupRelayServer`.
    Grpc { relay_addr: SocketAddr },
}

/// GroupLink is one member's attachment to a group transport.
#[async_trait::async_trait]
pub(crate) trait GroupLink: Send + Sync {
    async fn broadcast(&self, from: &MemberId, payload: Bytes) -> Result<bool, ChannelError>;
    async fn leave(&self, member: &MemberId) -> Result<bool, ChannelError>;

    /// Detach without announcing departure. The group has to detect the failure.
    fn abort(&self);
}

struct LocalLink {
    hub: HubClient,
}

#[async_trait::async_trait]
impl GroupLink for LocalLink {
    async fn broadcast(&self, from: &MemberId, payload: Bytes) -> Result<bool, ChannelError> {
        self.hub.broadcast(from.clone(), payload).await
    }

    async fn leave(&self, member: &MemberId) -> Result<bool, ChannelError> {
        self.hub.leave(member.clone()).await
    }

    fn abort(&self) {
        // Closing the inbox (see `ChannelReceiver`) is what the hub notices.
    }
}

/// MembershipChannel is this process's handle on a group: it knows the local member, the latest
/// view the receive loop has accepted, and can broadcast to every member of that view.
#[derive(Clone)]
pub struct MembershipChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    logger: slog::Logger,
    cluster_name: String,
    // Key of the group on the transport. Differs from the cluster name for forks.
    group: String,
    local_member: MemberId,
    link: Box<dyn GroupLink>,
    open: AtomicBool,
    view: watch::Receiver<View>,
    views: Arc<Mutex<ViewPublisher>>,
    abort: CancellationToken,
    settings: JoinSettings,
    forked_from: Option<MembershipChannel>,
}

#[derive(Clone)]
struct JoinSettings {
    logger: slog::Logger,
    transport: TransportConfig,
    join_timeout: Duration,
    leave_timeout: Duration,
}

const FORK_GROUP_SUFFIX: &str = "#fork";

impl MembershipChannel {
    /// Joins `cluster_name` over `transport` as a freshly generated member.
    pub async fn join(
        logger: slog::Logger,
        cluster_name: &str,
        transport: &TransportConfig,
        join_timeout: Duration,
        leave_timeout: Duration,
    ) -> Result<(MembershipChannel, ChannelReceiver), ChannelError> {
        let settings = JoinSettings {
            logger,
            transport: transport.clone(),
            join_timeout,
            leave_timeout,
        };
        let member = MemberId::generate(cluster_name);
        Self::attach(settings, cluster_name, cluster_name.to_string(), member, None).await
    }

    /// Opens a second, independent message stream beside this channel. The fork has the same
    /// cluster name and local member, but only sees members that forked too, and only their
    /// messages. Aborting this channel aborts the fork as well.
    pub async fn fork(&self) -> Result<(MembershipChannel, ChannelReceiver), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed(self.inner.cluster_name.clone()));
        }
        let group = format!("{}{}", self.inner.group, FORK_GROUP_SUFFIX);
        Self::attach(
            self.inner.settings.clone(),
            &self.inner.cluster_name,
            group,
            self.inner.local_member.clone(),
            Some(self.clone()),
        )
        .await
    }

    /// Joins the same group again over the same transport, as a new member. A fork is forked
    /// again from its main channel.
    pub async fn rejoin(&self) -> Result<(MembershipChannel, ChannelReceiver), ChannelError> {
        match &self.inner.forked_from {
            Some(main) => main.fork().await,
            None => {
                let member = MemberId::generate(&self.inner.cluster_name);
                let settings = self.inner.settings.clone();
                Self::attach(settings, &self.inner.cluster_name, self.inner.group.clone(), member, None).await
            }
        }
    }

    async fn attach(
        settings: JoinSettings,
        cluster_name: &str,
        group: String,
        local_member: MemberId,
        forked_from: Option<MembershipChannel>,
    ) -> Result<(MembershipChannel, ChannelReceiver), ChannelError> {
        let logger = settings.logger.new(slog::o!("member" => local_member.to_string()));
        let join_timeout = settings.join_timeout;

        let (link, inbox): (Box<dyn GroupLink>, mpsc::UnboundedReceiver<ChannelEvent>) = match &settings.transport {
            TransportConfig::Local(network) => {
                let hub = network.hub(&group);
                let (tx, rx) = mpsc::unbounded_channel();
                time::timeout(join_timeout, hub.join(local_member.clone(), tx))
                    .await
                    .map_err(|_| ChannelError::Timeout("join"))??;
                (Box::new(LocalLink { hub }), rx)
            }
            TransportConfig::Grpc { relay_addr } => {
                let (link, rx) = time::timeout(
                    join_timeout,
                    GrpcLink::connect(logger.clone(), *relay_addr, &group, &local_member),
                )
                .await
                .map_err(|_| ChannelError::Timeout("join"))??;
                (Box::new(link), rx)
            }
        };
        slog::info!(logger, "Joined group '{}'.", group);

        let (view_tx, view_rx) = watch::channel(View::empty());
        let views = Arc::new(Mutex::new(ViewPublisher {
            latest: view_tx,
            listeners: Vec::new(),
            closed: false,
        }));
        let abort = match &forked_from {
            Some(main) => main.inner.abort.child_token(),
            None => CancellationToken::new(),
        };

        let channel = MembershipChannel {
            inner: Arc::new(ChannelInner {
                logger,
                cluster_name: cluster_name.to_string(),
                group,
                local_member,
                link,
                open: AtomicBool::new(true),
                view: view_rx,
                views: views.clone(),
                abort: abort.clone(),
                settings,
                forked_from,
            }),
        };
        let receiver = ChannelReceiver { inbox, views, abort };

        Ok((channel, receiver))
    }

    pub fn cluster_name(&self) -> &str {
        &self.inner.cluster_name
    }

    pub fn local_member(&self) -> &MemberId {
        &self.inner.local_member
    }

    /// True for channels created by `fork()`.
    pub fn is_fork(&self) -> bool {
        self.inner.forked_from.is_some()
    }

    /// The most recent view accepted by this member's receive loop.
    pub fn view(&self) -> View {
        self.inner.view.borrow().clone()
    }

    /// Subscribes to view changes. The listener first gets the current view, if one has been
    /// installed, then every later view exactly once and in view id order.
    pub fn view_listener(&self) -> ViewListener {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut views = self.inner.views();
        let current = self.inner.view.borrow().clone();
        if !current.is_empty() {
            let _ = tx.send(current);
        }
        if !views.closed {
            views.listeners.push(tx);
        }

        ViewListener {
            views: rx,
            latest: self.inner.view.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    pub(crate) fn logger(&self) -> &slog::Logger {
        &self.inner.logger
    }

    /// Broadcasts `payload` to every member of the current view, this member included. Returns
    /// false if the channel is closed or the group did not accept the message.
    pub async fn broadcast(&self, payload: Bytes) -> bool {
        if !self.is_open() {
            return false;
        }

        match self.inner.link.broadcast(&self.inner.local_member, payload).await {
            Ok(delivered) => delivered,
            Err(e) => {
                slog::warn!(self.inner.logger, "Broadcast failed: {}", e);
                false
            }
        }
    }

    /// Leaves the group. By the time this returns, the group has enqueued the view without this
    /// member to every remaining member. Returns false if the channel was already closed.
    pub async fn leave(&self) -> bool {
        if !self.inner.open.swap(false, Ordering::AcqRel) {
            return false;
        }

        let member = &self.inner.local_member;
        let leave_timeout = self.inner.settings.leave_timeout;
        match time::timeout(leave_timeout, self.inner.link.leave(member)).await {
            Ok(Ok(_)) => slog::info!(self.inner.logger, "Left group '{}'.", self.inner.group),
            Ok(Err(e)) => slog::warn!(self.inner.logger, "Leave failed, relying on failure detection: {}", e),
            Err(_) => slog::warn!(self.inner.logger, "Leave timed out, relying on failure detection."),
        }
        true
    }

    /// Drops out of the group without telling anyone, as if the process had crashed.
    pub fn abort(&self) {
        self.inner.open.store(false, Ordering::Release);
        self.inner.link.abort();
        self.inner.abort.cancel();
        slog::warn!(self.inner.logger, "Channel aborted.");
    }
}

impl ChannelInner {
    fn views(&self) -> MutexGuard<'_, ViewPublisher> {
        self.views.lock().expect("MembershipChannel view publisher mutex guard poison")
    }
}

// Publishes under one lock, so a new listener can't miss or repeat a view.
struct ViewPublisher {
    latest: watch::Sender<View>,
    listeners: Vec<mpsc::UnboundedSender<View>>,
    closed: bool,
}

impl ViewPublisher {
    fn publish(&mut self, view: &View) {
        let _ = self.latest.send(view.clone());
        self.listeners.retain(|listener| listener.send(view.clone()).is_ok());
    }

    fn close(&mut self) {
        self.closed = true;
        self.listeners.clear();
    }
}

/// ChannelReceiver yields the events delivered to the local member, in group order. Hand it to
/// `ClusteringService::start_with_channel` together with its channel.
pub struct ChannelReceiver {
    inbox: mpsc::UnboundedReceiver<ChannelEvent>,
    views: Arc<Mutex<ViewPublisher>>,
    abort: CancellationToken,
}

impl ChannelReceiver {
    /// Returns None once the member has left the group or the channel was aborted.
    pub(crate) async fn next(&mut self) -> Option<ChannelEvent> {
        let event = tokio::select! {
            _ = self.abort.cancelled() => {
                self.inbox.close();
                None
            }
            event = self.inbox.recv() => event,
        };

        let mut views = self.views.lock().expect("MembershipChannel view publisher mutex guard poison");
        match &event {
            Some(ChannelEvent::ViewChange(view)) => views.publish(view),
            Some(ChannelEvent::Message(_)) => {}
            None => views.close(),
        }
        event
    }
}

/// ViewListener receives every view this member installs, exactly once and in view id order.
/// `next` returns None once the channel has stopped receiving.
pub struct ViewListener {
    views: mpsc::UnboundedReceiver<View>,
    latest: watch::Receiver<View>,
}

impl ViewListener {
    pub async fn next(&mut self) -> Option<View> {
        self.views.recv().await
    }

    /// The latest installed view, whether or not `next` has caught up with it.
    pub fn current(&self) -> View {
        self.latest.borrow().clone()
    }
}
