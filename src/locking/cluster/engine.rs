use crate::channel::{MemberId, View};
use crate::dispatcher::{Envelope, MessageConsumer, Outbox, Payload, PayloadType};
use crate::locking::api::HolderId;
use crate::locking::cluster::messages::{
    LockDenial, LockGrant, LockMessage, LockOwner, LockRelease, LockRequest, LockStateQuery, LockStateTransfer,
};
use crate::locking::table::{LockNames, LockRecord, LockTable};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::{oneshot, Notify};

/// LockEngine is the per-member half of the cluster locking protocol. It runs inside the
/// dispatcher's receive loop, so it sees lock messages and view changes in the group's total
/// order.
///
/// The coordinator of the current view decides every request against its own table, which is
/// authoritative. Every other member mirrors that table from the `Granted` and `Released`
/// messages it observes.
pub(crate) struct LockEngine {
    logger: slog::Logger,
    member: MemberId,
    outbox: Outbox,
    state: Mutex<EngineState>,
    released: Notify,
    next_holder: AtomicU64,
}

#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    Granted { newly_granted: Vec<String> },
    Denied { conflicts: Vec<String> },
}

struct EngineState {
    view: View,
    table: LockTable<LockOwner>,
    pending: HashMap<u64, PendingAttempt>,
    pending_releases: HashMap<u64, oneshot::Sender<()>>,
    transfer: TransferState,
    next_request_id: u64,
    // Set once the dispatcher stops delivering. Nothing pending can be answered after that.
    detached: bool,
}

struct PendingAttempt {
    owner: LockOwner,
    names: Vec<String>,
    // Coordinator of the view the request was last sent in.
    sent_to: Option<MemberId>,
    reply: oneshot::Sender<AttemptOutcome>,
}

enum TransferState {
    /// Our state query hasn't come back around yet.
    Querying,
    /// Every grant and release seen since our query, replayed on top of the transferred table.
    Recording(Vec<TableChange>),
    Complete,
}

enum TableChange {
    Granted(LockOwner, Vec<String>),
    Released(LockOwner, Vec<String>),
}

impl LockEngine {
    pub(crate) fn new(logger: slog::Logger, member: MemberId, outbox: Outbox) -> Self {
        LockEngine {
            logger,
            member,
            outbox,
            state: Mutex::new(EngineState {
                view: View::empty(),
                table: LockTable::new(),
                pending: HashMap::new(),
                pending_releases: HashMap::new(),
                transfer: TransferState::Querying,
                next_request_id: 1,
                detached: false,
            }),
            released: Notify::new(),
            next_holder: AtomicU64::new(1),
        }
    }

    /// Asks the coordinator for the current lock table. Call once, after registering the engine
    /// as a consumer.
    pub(crate) fn start(&self) {
        self.post(LockMessage::StateQuery(LockStateQuery {
            member: self.member.clone(),
        }));
    }

    pub(crate) fn member(&self) -> &MemberId {
        &self.member
    }

    pub(crate) fn next_holder(&self) -> HolderId {
        HolderId::new(self.next_holder.fetch_add(1, Ordering::Relaxed))
    }

    /// Resolves on the next release this engine applies, including releases caused by members
    /// departing.
    pub(crate) fn release_notified(&self) -> Notified<'_> {
        self.released.notified()
    }

    pub(crate) fn holds_all(&self, names: &LockNames, owner: &LockOwner) -> bool {
        self.state().table.holds_all(names, owner)
    }

    pub(crate) fn held_among(&self, names: &LockNames, owner: &LockOwner) -> Vec<String> {
        let state = self.state();
        names
            .iter()
            .filter(|n| state.table.owner_of(n) == Some(owner))
            .cloned()
            .collect()
    }

    pub(crate) fn names_held_by(&self, owner: &LockOwner) -> Vec<String> {
        self.state().table.names_held_by(owner)
    }

    pub(crate) fn record(&self, name: &str) -> Option<LockRecord<LockOwner>> {
        self.state().table.record(name).cloned()
    }

    /// False once the dispatcher has stopped delivering to this engine.
    pub(crate) fn is_attached(&self) -> bool {
        !self.state().detached
    }

    /// True once this member's table reflects the coordinator's.
    pub(crate) fn is_synchronized(&self) -> bool {
        matches!(self.state().transfer, TransferState::Complete)
    }

    /// Sends a request for `names` to the coordinator. The receiver resolves with its decision.
    pub(crate) fn submit(&self, owner: &LockOwner, names: &LockNames) -> (u64, oneshot::Receiver<AttemptOutcome>) {
        let mut state = self.state();
        let request_id = state.next_request_id();
        let (tx, rx) = oneshot::channel();
        if state.detached {
            // Dropping the sender resolves the receiver right away.
            return (request_id, rx);
        }
        let sent_to = state.view.coordinator().cloned();
        state.pending.insert(
            request_id,
            PendingAttempt {
                owner: owner.clone(),
                names: names.to_vec(),
                sent_to,
                reply: tx,
            },
        );

        self.post(LockMessage::Request(LockRequest {
            request_id,
            owner: owner.clone(),
            names: names.to_vec(),
        }));
        (request_id, rx)
    }

    /// Forgets an attempt whose caller stopped waiting. A grant that already reached the reply
    /// channel is released again, since nobody will use it.
    pub(crate) fn abandon(&self, request_id: u64, owner: &LockOwner, mut reply: oneshot::Receiver<AttemptOutcome>) {
        let mut state = self.state();
        state.pending.remove(&request_id);
        reply.close();
        if let Ok(AttemptOutcome::Granted { newly_granted }) = reply.try_recv() {
            self.compensate(&mut state, owner, newly_granted);
        }
    }

    /// Broadcasts the release of `names`. The receiver resolves once the release has been
    /// applied here.
    pub(crate) fn release(&self, owner: &LockOwner, names: Vec<String>) -> (u64, oneshot::Receiver<()>) {
        let mut state = self.state();
        let request_id = state.next_request_id();
        let (tx, rx) = oneshot::channel();
        if state.detached {
            return (request_id, rx);
        }
        state.pending_releases.insert(request_id, tx);

        self.post(LockMessage::Released(LockRelease {
            request_id,
            owner: owner.clone(),
            names,
        }));
        (request_id, rx)
    }

    pub(crate) fn forget_release(&self, request_id: u64) {
        self.state().pending_releases.remove(&request_id);
    }

    fn state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().expect("LockEngine state mutex guard poison")
    }

    fn post(&self, message: LockMessage) {
        if !self.outbox.post(Payload::Locking(message)) {
            slog::warn!(self.logger, "Dropped outbound lock message, the sender has exited.");
        }
    }

    // Releases `names` on behalf of `owner`, except names another of its attempts still waits for.
    fn compensate(&self, state: &mut EngineState, owner: &LockOwner, names: Vec<String>) {
        let names: Vec<String> = {
            let wanted: HashSet<&String> = state
                .pending
                .values()
                .filter(|p| &p.owner == owner)
                .flat_map(|p| p.names.iter())
                .collect();
            names.into_iter().filter(|n| !wanted.contains(n)).collect()
        };
        if names.is_empty() {
            return;
        }

        slog::warn!(self.logger, "Releasing {:?} granted to {:?} after the attempt was abandoned", names, owner);
        let request_id = state.next_request_id();
        self.post(LockMessage::Released(LockRelease {
            request_id,
            owner: owner.clone(),
            names,
        }));
    }

    fn accept_view(&self, view: &View) {
        let mut state = self.state();
        let previous = mem::replace(&mut state.view, view.clone());
        let is_coordinator = view.is_coordinator(&self.member);

        if is_coordinator && !matches!(state.transfer, TransferState::Complete) {
            slog::info!(self.logger, "Coordinating {:?} without a lock table transfer.", view.view_id());
            state.transfer = TransferState::Complete;
        }

        let departed = view.departed_since(&previous);
        let purged = if departed.is_empty() {
            Vec::new()
        } else {
            state.table.release_where(|owner| departed.contains(&owner.member))
        };

        if !purged.is_empty() {
            slog::info!(self.logger, "Dropped {} locks of departed members {:?}", purged.len(), departed);
            if is_coordinator {
                let mut by_owner: BTreeMap<LockOwner, Vec<String>> = BTreeMap::new();
                for (name, owner) in purged.iter() {
                    by_owner.entry(owner.clone()).or_default().push(name.clone());
                }
                for (owner, names) in by_owner {
                    self.post(LockMessage::Released(LockRelease {
                        request_id: 0,
                        owner,
                        names,
                    }));
                }
            }
        }

        let coordinator = view.coordinator().cloned();
        let mut retries = Vec::new();
        for (request_id, attempt) in state.pending.iter_mut() {
            match (&attempt.sent_to, &coordinator) {
                (None, _) => attempt.sent_to = coordinator.clone(),
                (Some(old), Some(new)) if old != new => {
                    attempt.sent_to = coordinator.clone();
                    retries.push(LockRequest {
                        request_id: *request_id,
                        owner: attempt.owner.clone(),
                        names: attempt.names.clone(),
                    });
                }
                _ => {}
            }
        }
        for request in retries {
            slog::info!(self.logger, "Retrying request {} with new coordinator {:?}", request.request_id, coordinator);
            self.post(LockMessage::Request(request));
        }

        drop(state);
        if !purged.is_empty() {
            self.released.notify_waiters();
        }
    }

    // Resolves every waiter. Their replies and release echoes can no longer arrive.
    fn detach(&self) {
        let mut state = self.state();
        if state.detached {
            return;
        }
        state.detached = true;
        let abandoned = state.pending.len();
        state.pending.clear();
        state.pending_releases.clear();
        drop(state);

        slog::info!(self.logger, "Lock engine detached, dropped {} pending attempts.", abandoned);
        self.released.notify_waiters();
    }

    fn on_request(&self, from: &MemberId, request: LockRequest) {
        if from != &request.owner.member {
            slog::warn!(self.logger, "Ignoring request {} sent by {} for {:?}", request.request_id, from, request.owner);
            return;
        }
        let mut state = self.state();
        if !state.view.is_coordinator(&self.member) || !state.view.contains(from) {
            return;
        }

        let names = LockNames::from(request.names);
        let decision = match state.table.try_acquire_all(&names, &request.owner) {
            Ok(newly_granted) => {
                slog::debug!(self.logger, "Granting {:?} to {:?}", names, request.owner);
                LockMessage::Granted(LockGrant {
                    request_id: request.request_id,
                    owner: request.owner,
                    names: names.to_vec(),
                    newly_granted,
                })
            }
            Err(conflicts) => {
                slog::debug!(self.logger, "Denying {:?} to {:?}, held: {:?}", names, request.owner, conflicts);
                LockMessage::Denied(LockDenial {
                    request_id: request.request_id,
                    owner: request.owner,
                    conflicts,
                })
            }
        };
        self.post(decision);
    }

    fn on_granted(&self, from: &MemberId, grant: LockGrant) {
        let mut state = self.state();
        if !state.view.is_coordinator(from) {
            slog::warn!(self.logger, "Ignoring grant {} from non-coordinator {}", grant.request_id, from);
            return;
        }

        state.record_change(TableChange::Granted(grant.owner.clone(), grant.names.clone()));
        let conflicts = state.apply_grant(&grant.owner, &grant.names);
        if !conflicts.is_empty() && matches!(state.transfer, TransferState::Complete) {
            slog::error!(self.logger, "Grant to {:?} conflicts with local records for {:?}", grant.owner, conflicts);
        }
        if grant.owner.member != self.member {
            return;
        }

        let outcome = AttemptOutcome::Granted {
            newly_granted: grant.newly_granted,
        };
        let unused = match state.pending.remove(&grant.request_id) {
            Some(attempt) => attempt.reply.send(outcome).err(),
            None => Some(outcome),
        };
        if let Some(AttemptOutcome::Granted { newly_granted }) = unused {
            self.compensate(&mut state, &grant.owner, newly_granted);
        }
    }

    fn on_denied(&self, from: &MemberId, denial: LockDenial) {
        let mut state = self.state();
        if !state.view.is_coordinator(from) || denial.owner.member != self.member {
            return;
        }

        if let Some(attempt) = state.pending.remove(&denial.request_id) {
            let _ = attempt.reply.send(AttemptOutcome::Denied {
                conflicts: denial.conflicts,
            });
        }
    }

    fn on_released(&self, from: &MemberId, release: LockRelease) {
        let mut state = self.state();
        if from != &release.owner.member && !state.view.is_coordinator(from) {
            slog::warn!(self.logger, "Ignoring release of {:?} sent by {}", release.owner, from);
            return;
        }

        state.record_change(TableChange::Released(release.owner.clone(), release.names.clone()));
        let released = state.table.release(release.names.iter(), &release.owner);
        if release.owner.member == self.member {
            if let Some(echo) = state.pending_releases.remove(&release.request_id) {
                let _ = echo.send(());
            }
        }

        drop(state);
        if !released.is_empty() {
            slog::debug!(self.logger, "{:?} released {:?}", release.owner, released);
            self.released.notify_waiters();
        }
    }

    fn on_state_query(&self, from: &MemberId, query: LockStateQuery) {
        if from != &query.member {
            return;
        }
        let mut state = self.state();

        if query.member == self.member {
            if let TransferState::Querying = state.transfer {
                state.transfer = TransferState::Recording(Vec::new());
            }
            return;
        }

        if state.view.is_coordinator(&self.member) {
            slog::info!(self.logger, "Sending lock table of {} records to {}", state.table.len(), from);
            let transfer = LockStateTransfer {
                view_id: state.view.view_id(),
                records: state.table.snapshot(),
            };
            self.post(LockMessage::StateTransfer(transfer));
        }
    }

    fn on_state_transfer(&self, from: &MemberId, transfer: LockStateTransfer) {
        let mut state = self.state();
        if !state.view.is_coordinator(from) {
            return;
        }
        let changes = match mem::replace(&mut state.transfer, TransferState::Complete) {
            TransferState::Recording(changes) => changes,
            other => {
                state.transfer = other;
                return;
            }
        };

        state.table.replace_all(transfer.records);
        for change in changes {
            match change {
                TableChange::Granted(owner, names) => {
                    state.apply_grant(&owner, &names);
                }
                TableChange::Released(owner, names) => {
                    state.table.release(names.iter(), &owner);
                }
            }
        }
        let view = state.view.clone();
        state.table.release_where(|owner| !view.contains(&owner.member));

        slog::info!(
            self.logger,
            "Adopted lock table from {} as of {:?} ({} records)",
            from,
            transfer.view_id,
            state.table.len()
        );
        drop(state);
        self.released.notify_waiters();
    }
}

impl EngineState {
    fn next_request_id(&mut self) -> u64 {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        request_id
    }

    fn record_change(&mut self, change: TableChange) {
        if let TransferState::Recording(changes) = &mut self.transfer {
            changes.push(change);
        }
    }

    // Grants to departed members are skipped, and a record held by another owner is never
    // overwritten. Returns the names that conflicted.
    fn apply_grant(&mut self, owner: &LockOwner, names: &[String]) -> Vec<String> {
        if !self.view.contains(&owner.member) {
            return Vec::new();
        }

        names
            .iter()
            .filter(|name| {
                !self
                    .table
                    .insert_unless_held((*name).clone(), LockRecord::granted_now(owner.clone()))
            })
            .cloned()
            .collect()
    }
}

impl MessageConsumer for LockEngine {
    fn payload_type(&self) -> PayloadType {
        PayloadType::Locking
    }

    fn consume(&self, envelope: &Envelope) {
        let message = match &envelope.payload {
            Payload::Locking(message) => message.clone(),
            Payload::Custom(_) => return,
        };
        let from = &envelope.from;

        match message {
            LockMessage::Request(request) => self.on_request(from, request),
            LockMessage::Granted(grant) => self.on_granted(from, grant),
            LockMessage::Denied(denial) => self.on_denied(from, denial),
            LockMessage::Released(release) => self.on_released(from, release),
            LockMessage::StateQuery(query) => self.on_state_query(from, query),
            LockMessage::StateTransfer(transfer) => self.on_state_transfer(from, transfer),
        }
    }

    fn view_accepted(&self, view: &View) {
        self.accept_view(view);
    }

    fn detached(&self) {
        self.detach();
    }
}
