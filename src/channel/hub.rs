use crate::channel::error::ChannelError;
use crate::channel::event::{ChannelEvent, GroupMessage};
use crate::channel::member::{MemberId, View};
use bytes::Bytes;
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Duration};

pub(crate) type Outbox = mpsc::UnboundedSender<ChannelEvent>;

/// Spawns the hub of one group. The hub is the single sequencer of a group: every join, leave and
/// broadcast passes through its event loop, which is what gives all members the same total order
/// of messages and view changes.
pub(crate) fn spawn_hub(logger: slog::Logger, cluster_name: String, failure_detection_interval: Duration) -> HubClient {
    let (tx, rx) = mpsc::unbounded_channel();
    let hub = GroupHub {
        logger: logger.new(slog::o!("cluster" => cluster_name.clone())),
        receiver: rx,
        members: Vec::new(),
        current_view: View::empty(),
        failure_detection_interval,
    };
    tokio::spawn(hub.run_event_loop());

    HubClient {
        cluster_name,
        sender: tx,
    }
}

#[derive(Debug)]
enum Event {
    // Append member, install a new view that includes it. The new member's first event is that view.
    Join(MemberId, Outbox, Callback<Result<View, ChannelError>>),

    // Remove member, install a new view for the remaining members, then reply.
    Leave(MemberId, Callback<bool>),

    // Fan out to every member, the sender included. Dropped if the sender is not a member.
    Broadcast(MemberId, Bytes, Callback<bool>),
}

#[derive(Debug)]
struct Callback<O: Debug>(oneshot::Sender<O>);

impl<O: Debug> Callback<O> {
    fn send(self, message: O) {
        let _ = self.0.send(message);
    }
}

#[derive(Clone)]
pub(crate) struct HubClient {
    cluster_name: String,
    sender: mpsc::UnboundedSender<Event>,
}

impl HubClient {
    pub(crate) async fn join(&self, member: MemberId, outbox: Outbox) -> Result<View, ChannelError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Join(member, outbox, Callback(tx)))?;

        rx.await.map_err(|_| self.hub_exited())?
    }

    pub(crate) async fn leave(&self, member: MemberId) -> Result<bool, ChannelError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Leave(member, Callback(tx)))?;

        rx.await.map_err(|_| self.hub_exited())
    }

    pub(crate) async fn broadcast(&self, from: MemberId, payload: Bytes) -> Result<bool, ChannelError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Broadcast(from, payload, Callback(tx)))?;

        rx.await.map_err(|_| self.hub_exited())
    }

    fn send(&self, event: Event) -> Result<(), ChannelError> {
        self.sender.send(event).map_err(|_| self.hub_exited())
    }

    fn hub_exited(&self) -> ChannelError {
        ChannelError::HubExited(self.cluster_name.clone())
    }
}

struct GroupHub {
    logger: slog::Logger,
    receiver: mpsc::UnboundedReceiver<Event>,
    // Join order.
    members: Vec<(MemberId, Outbox)>,
    current_view: View,
    failure_detection_interval: Duration,
}

impl GroupHub {
    async fn run_event_loop(mut self) {
        let mut failure_sweep = time::interval(self.failure_detection_interval);
        loop {
            tokio::select! {
                event = self.receiver.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = failure_sweep.tick() => self.detect_failures(),
            }
        }
        slog::debug!(self.logger, "Group hub has exited.");
    }

    // This must NOT be async. Delivery only enqueues into member outboxes, so a slow member can
    // never stall the group.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Join(member, outbox, callback) => {
                let result = self.handle_join(member, outbox);
                callback.send(result);
            }
            Event::Leave(member, callback) => {
                let was_member = self.remove_members(&[member.clone()]);
                if was_member {
                    slog::info!(self.logger, "Member {} left the group.", member);
                }
                callback.send(was_member);
            }
            Event::Broadcast(from, payload, callback) => {
                if !self.is_member(&from) {
                    slog::debug!(self.logger, "Dropping broadcast from non-member {}.", from);
                    callback.send(false);
                    return;
                }
                self.fan_out(ChannelEvent::Message(GroupMessage { from, payload }));
                callback.send(true);
            }
        }
    }

    fn handle_join(&mut self, member: MemberId, outbox: Outbox) -> Result<View, ChannelError> {
        if self.is_member(&member) {
            return Err(ChannelError::DuplicateMember(member));
        }

        slog::info!(self.logger, "Member {} joined the group.", member);
        self.members.push((member, outbox));
        self.install_view();

        Ok(self.current_view.clone())
    }

    fn is_member(&self, member: &MemberId) -> bool {
        self.members.iter().any(|(m, _)| m == member)
    }

    fn fan_out(&mut self, event: ChannelEvent) {
        let mut failed = Vec::new();
        for (member, outbox) in self.members.iter() {
            if outbox.send(event.clone()).is_err() {
                failed.push(member.clone());
            }
        }

        if !failed.is_empty() {
            slog::warn!(self.logger, "Delivery failed, suspecting members {:?}.", failed);
            self.remove_members(&failed);
        }
    }

    fn detect_failures(&mut self) {
        let failed: Vec<MemberId> = self
            .members
            .iter()
            .filter(|(_, outbox)| outbox.is_closed())
            .map(|(m, _)| m.clone())
            .collect();

        if !failed.is_empty() {
            slog::warn!(self.logger, "Failure detector removed members {:?}.", failed);
            self.remove_members(&failed);
        }
    }

    /// Returns true if any of `departed` was a member, in which case a new view has been installed.
    fn remove_members(&mut self, departed: &[MemberId]) -> bool {
        let before = self.members.len();
        self.members.retain(|(m, _)| !departed.contains(m));

        if self.members.len() == before {
            return false;
        }
        self.install_view();
        true
    }

    fn install_view(&mut self) {
        let members = self.members.iter().map(|(m, _)| m.clone()).collect();
        self.current_view = View::new(self.current_view.view_id().next(), members);
        slog::debug!(self.logger, "Installing view {:?}.", self.current_view);

        // Recursion is bounded: each failed delivery removes at least one member.
        self.fan_out(ChannelEvent::ViewChange(self.current_view.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn hub() -> HubClient {
        spawn_hub(logger(), "test".to_string(), Duration::from_millis(20))
    }

    async fn next_view(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> View {
        match rx.recv().await {
            Some(ChannelEvent::ViewChange(view)) => view,
            other => panic!("Expected view change, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn joins_produce_views_in_join_order() {
        let hub = hub();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();

        let a_view = hub.join(MemberId::new("a"), a_tx).await.unwrap();
        let b_view = hub.join(MemberId::new("b"), b_tx).await.unwrap();

        assert_eq!(a_view.members(), &[MemberId::new("a")]);
        assert_eq!(b_view.members(), &[MemberId::new("a"), MemberId::new("b")]);
        assert!(b_view.view_id() > a_view.view_id());

        assert_eq!(next_view(&mut a_rx).await, a_view);
        assert_eq!(next_view(&mut a_rx).await, b_view);
        assert_eq!(next_view(&mut b_rx).await, b_view);
    }

    #[tokio::test]
    async fn duplicate_join_is_rejected() {
        let hub = hub();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        hub.join(MemberId::new("a"), tx1).await.unwrap();
        let result = hub.join(MemberId::new("a"), tx2).await;

        assert!(matches!(result, Err(ChannelError::DuplicateMember(_))));
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone_including_sender() {
        let hub = hub();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        hub.join(MemberId::new("a"), a_tx).await.unwrap();
        hub.join(MemberId::new("b"), b_tx).await.unwrap();

        assert!(hub.broadcast(MemberId::new("a"), Bytes::from("hello")).await.unwrap());
        assert!(!hub.broadcast(MemberId::new("zzz"), Bytes::from("nope")).await.unwrap());

        for rx in [&mut a_rx, &mut b_rx].iter_mut() {
            loop {
                match rx.recv().await.unwrap() {
                    ChannelEvent::ViewChange(_) => continue,
                    ChannelEvent::Message(m) => {
                        assert_eq!(m.from, MemberId::new("a"));
                        assert_eq!(m.payload, Bytes::from("hello"));
                        break;
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn leave_installs_view_before_replying() {
        let hub = hub();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, _b_rx) = mpsc::unbounded_channel();
        hub.join(MemberId::new("a"), a_tx).await.unwrap();
        hub.join(MemberId::new("b"), b_tx).await.unwrap();

        assert!(hub.leave(MemberId::new("b")).await.unwrap());
        assert!(!hub.leave(MemberId::new("b")).await.unwrap());

        let _ = next_view(&mut a_rx).await;
        let _ = next_view(&mut a_rx).await;
        // Already enqueued by the time leave() returned.
        match a_rx.try_recv() {
            Ok(ChannelEvent::ViewChange(view)) => assert_eq!(view.members(), &[MemberId::new("a")]),
            other => panic!("Expected view change, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropped_member_is_detected_as_failed() {
        let hub = hub();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        hub.join(MemberId::new("a"), a_tx).await.unwrap();
        hub.join(MemberId::new("b"), b_tx).await.unwrap();
        drop(b_rx);

        let _ = next_view(&mut a_rx).await;
        let _ = next_view(&mut a_rx).await;
        let view = time::timeout(Duration::from_secs(2), next_view(&mut a_rx))
            .await
            .expect("failure was not detected");

        assert_eq!(view.members(), &[MemberId::new("a")]);
    }
}
