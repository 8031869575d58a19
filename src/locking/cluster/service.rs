use crate::api::{LockingCreationError, LockingOptions, LockingOptionsValidated};
use crate::dispatcher::ClusteringService;
use crate::locking::api::{HolderId, Interrupted, LockingService};
use crate::locking::cluster::engine::{AttemptOutcome, LockEngine};
use crate::locking::cluster::messages::LockOwner;
use crate::locking::interrupt::{self, Interrupter, WaitOutcome};
use crate::locking::table::{LockNames, LockRecord};
use std::cmp;
use std::convert::TryFrom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// ClusterLockingService makes lock names mutually exclusive across every member of a cluster.
/// It rides on a `ClusteringService`, and each value is one holder on that member. Further
/// holders come from `new_holder()`.
pub struct ClusterLockingService {
    logger: slog::Logger,
    engine: Arc<LockEngine>,
    options: LockingOptionsValidated,
    owner: LockOwner,
    lock_timeout: Mutex<Duration>,
    interrupter: Interrupter,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl ClusterLockingService {
    /// Attaches the locking protocol to `clustering`. At most one locking service can be started
    /// per clustering service.
    pub fn start(
        clustering: &ClusteringService,
        logger: slog::Logger,
        options: LockingOptions,
    ) -> Result<Self, LockingCreationError> {
        let options = LockingOptionsValidated::try_from(options)
            .map_err(|e| LockingCreationError::IllegalOptions(e.to_string()))?;
        if !clustering.is_open() {
            return Err(LockingCreationError::ClusteringClosed);
        }
        if !clustering.try_attach_locking() {
            return Err(LockingCreationError::AlreadyAttached);
        }

        let member = clustering.local_member().clone();
        let logger = logger.new(slog::o!("member" => member.to_string()));
        let engine = Arc::new(LockEngine::new(logger.clone(), member, clustering.outbox()));
        clustering.add_consumer(engine.clone());
        engine.start();
        slog::info!(logger, "Cluster locking started on '{}'.", clustering.cluster_name());

        Ok(Self::for_holder(logger, engine, options))
    }

    /// Another holder on this member, sharing its view of the cluster's locks.
    pub fn new_holder(&self) -> Self {
        let mut options = self.options.clone();
        options.default_lock_timeout = self.lock_timeout();
        Self::for_holder(self.logger.clone(), self.engine.clone(), options)
    }

    fn for_holder(logger: slog::Logger, engine: Arc<LockEngine>, options: LockingOptionsValidated) -> Self {
        let owner = LockOwner {
            member: engine.member().clone(),
            holder: engine.next_holder(),
        };
        ClusterLockingService {
            logger: logger.new(slog::o!("holder" => owner.holder.as_u64())),
            engine,
            lock_timeout: Mutex::new(options.default_lock_timeout),
            options,
            owner,
            interrupter: Interrupter::new(),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    pub fn holder(&self) -> HolderId {
        self.owner.holder
    }

    /// Names this holder holds according to this member's table, sorted.
    pub fn held_names(&self) -> Vec<String> {
        self.engine.names_held_by(&self.owner)
    }

    /// The record for `name` as this member currently sees it.
    pub fn lock_record(&self, name: &str) -> Option<LockRecord<LockOwner>> {
        self.engine.record(name)
    }

    /// Whether this member has caught up with the coordinator's lock table.
    pub fn is_synchronized(&self) -> bool {
        self.engine.is_synchronized()
    }

    fn lock_timeout(&self) -> Duration {
        *self
            .lock_timeout
            .lock()
            .expect("ClusterLockingService lock timeout mutex guard poison")
    }

    fn is_usable(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.engine.is_attached()
    }

    async fn await_release(&self, names: Vec<String>) {
        let (request_id, echo) = self.engine.release(&self.owner, names);
        if tokio::time::timeout(self.options.release_timeout, echo).await.is_err() {
            slog::warn!(self.logger, "Release {} was not observed in time.", request_id);
            self.engine.forget_release(request_id);
        }
    }
}

#[async_trait::async_trait]
impl LockingService for ClusterLockingService {
    async fn try_lock(&self, names: &[&str]) -> Result<bool, Interrupted> {
        self.try_lock_timeout(self.lock_timeout(), names).await
    }

    async fn try_lock_timeout(&self, timeout: Duration, names: &[&str]) -> Result<bool, Interrupted> {
        if !self.is_usable() {
            return Ok(false);
        }
        let names = LockNames::from(names);
        if names.is_empty() || self.engine.holds_all(&names, &self.owner) {
            return Ok(true);
        }
        let deadline = interrupt::deadline_after(timeout);
        let interrupt = self.interrupter.token();

        loop {
            let released = self.engine.release_notified();
            let (request_id, mut reply) = self.engine.submit(&self.owner, &names);

            let outcome = if Instant::now() >= deadline {
                WaitOutcome::TimedOut
            } else {
                interrupt::wait_until(&mut reply, deadline, &interrupt, &self.shutdown).await
            };
            match outcome {
                WaitOutcome::Ready(Ok(AttemptOutcome::Granted { newly_granted })) => {
                    slog::debug!(self.logger, "Acquired {:?} (new: {:?})", names, newly_granted);
                    return Ok(true);
                }
                WaitOutcome::Ready(Ok(AttemptOutcome::Denied { conflicts })) => {
                    slog::debug!(self.logger, "Locks {:?} are held elsewhere", conflicts);
                }
                WaitOutcome::Ready(Err(_)) => return Ok(false),
                WaitOutcome::TimedOut => {
                    self.engine.abandon(request_id, &self.owner, reply);
                    return Ok(false);
                }
                WaitOutcome::Interrupted => {
                    self.engine.abandon(request_id, &self.owner, reply);
                    return Err(Interrupted);
                }
                WaitOutcome::ShutDown => {
                    self.engine.abandon(request_id, &self.owner, reply);
                    return Ok(false);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let retry_at = cmp::min(deadline, now + self.options.contention_retry_interval);
            match interrupt::wait_until(released, retry_at, &interrupt, &self.shutdown).await {
                WaitOutcome::Ready(()) | WaitOutcome::TimedOut => continue,
                WaitOutcome::Interrupted => return Err(Interrupted),
                WaitOutcome::ShutDown => return Ok(false),
            }
        }
    }

    async fn unlock(&self, names: &[&str]) -> bool {
        if !self.is_usable() {
            return false;
        }
        let names = LockNames::from(names);
        let held_all = self.engine.holds_all(&names, &self.owner);
        let held = self.engine.held_among(&names, &self.owner);
        if !held.is_empty() {
            self.await_release(held).await;
        }

        held_all
    }

    async fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();

        let held = self.engine.names_held_by(&self.owner);
        let count = held.len();
        if !held.is_empty() && self.engine.is_attached() {
            self.await_release(held).await;
        }

        slog::info!(self.logger, "Locking holder shut down, released {} locks.", count);
        true
    }

    fn set_lock_timeout(&self, timeout: Duration) {
        *self
            .lock_timeout
            .lock()
            .expect("ClusterLockingService lock timeout mutex guard poison") = timeout;
    }

    fn interrupt(&self) {
        self.interrupter.interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClusteringConfig;
    use crate::channel::{LocalNetwork, TransportConfig};

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    async fn member(network: &LocalNetwork) -> (ClusteringService, ClusterLockingService) {
        let config = ClusteringConfig::new("locks", TransportConfig::Local(network.clone()), logger());
        let clustering = ClusteringService::start_standalone(config).await.unwrap();
        let locking = ClusterLockingService::start(&clustering, logger(), LockingOptions::default()).unwrap();
        (clustering, locking)
    }

    async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn only_one_engine_per_clustering_service() {
        let network = LocalNetwork::new(logger());
        let (clustering, _locking) = member(&network).await;

        let result = ClusterLockingService::start(&clustering, logger(), LockingOptions::default());

        assert!(matches!(result, Err(LockingCreationError::AlreadyAttached)));
    }

    #[tokio::test]
    async fn late_member_receives_the_lock_table() {
        let network = LocalNetwork::new(logger());
        let (_first, first_locking) = member(&network).await;
        assert_eq!(first_locking.try_lock(&["lock1"]).await, Ok(true));

        let (_second, second_locking) = member(&network).await;

        assert!(eventually(|| second_locking.is_synchronized()).await);
        let record = second_locking.lock_record("lock1").unwrap();
        assert_eq!(&record.owner, first_locking.owner());
    }

    #[tokio::test]
    async fn grants_are_mirrored_on_every_member() {
        let network = LocalNetwork::new(logger());
        let (_first, first_locking) = member(&network).await;
        let (_second, second_locking) = member(&network).await;
        assert!(eventually(|| second_locking.is_synchronized()).await);

        assert_eq!(second_locking.try_lock(&["a", "b"]).await, Ok(true));

        let owner = second_locking.owner().clone();
        assert!(eventually(|| first_locking.lock_record("b").map(|r| r.owner) == Some(owner.clone())).await);
        assert_eq!(second_locking.held_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn clustering_shutdown_disables_locking() {
        let network = LocalNetwork::new(logger());
        let (clustering, locking) = member(&network).await;

        assert!(clustering.shutdown().await);

        assert_eq!(locking.try_lock(&["a"]).await, Ok(false));
        assert!(!locking.unlock(&["a"]).await);
    }

    #[tokio::test]
    async fn huge_timeouts_do_not_overflow() {
        let network = LocalNetwork::new(logger());
        let (_clustering, locking) = member(&network).await;

        assert_eq!(locking.try_lock_timeout(Duration::MAX, &["a"]).await, Ok(true));
        locking.set_lock_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(locking.try_lock(&["b"]).await, Ok(true));
        assert_eq!(locking.held_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn clustering_abort_resolves_waiters_promptly() {
        let network = LocalNetwork::new(logger());
        let (_first, first_locking) = member(&network).await;
        let (second, second_locking) = member(&network).await;
        assert!(eventually(|| second_locking.is_synchronized()).await);
        assert_eq!(first_locking.try_lock(&["a"]).await, Ok(true));

        let second_locking = Arc::new(second_locking);
        let waiter = {
            let second_locking = second_locking.clone();
            tokio::spawn(async move { second_locking.try_lock_timeout(Duration::from_secs(60), &["a"]).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        second.abort();

        let result = tokio::time::timeout(Duration::from_secs(5), waiter).await;
        assert_eq!(result.unwrap().unwrap(), Ok(false));
        assert_eq!(second_locking.try_lock(&["b"]).await, Ok(false));
    }
}
