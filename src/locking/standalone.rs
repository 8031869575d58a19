use crate::api::{LockingCreationError, LockingOptions, LockingOptionsValidated};
use crate::locking::api::{HolderId, Interrupted, LockingService};
use crate::locking::interrupt::{self, Interrupter, WaitOutcome};
use crate::locking::table::{LockNames, LockTable};
use std::cmp;
use std::convert::TryFrom;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// StandaloneLockingService keeps its lock table in process memory. Use it when clustering is
/// disabled. Holders created with `new_holder()` contend on the same table.
pub struct StandaloneLockingService {
    logger: slog::Logger,
    shared: Arc<SharedTable>,
    options: LockingOptionsValidated,
    holder: HolderId,
    lock_timeout: Mutex<Duration>,
    interrupter: Interrupter,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

struct SharedTable {
    table: Mutex<LockTable<HolderId>>,
    released: Notify,
    next_holder: AtomicU64,
}

impl SharedTable {
    fn table(&self) -> std::sync::MutexGuard<'_, LockTable<HolderId>> {
        self.table.lock().expect("StandaloneLockingService table mutex guard poison")
    }
}

impl StandaloneLockingService {
    pub fn new(logger: slog::Logger, options: LockingOptions) -> Result<Self, LockingCreationError> {
        let options = LockingOptionsValidated::try_from(options)
            .map_err(|e| LockingCreationError::IllegalOptions(e.to_string()))?;
        let shared = Arc::new(SharedTable {
            table: Mutex::new(LockTable::new()),
            released: Notify::new(),
            next_holder: AtomicU64::new(1),
        });

        Ok(Self::for_holder(logger, shared, options))
    }

    /// Another holder on the same lock table.
    pub fn new_holder(&self) -> Self {
        let mut options = self.options.clone();
        options.default_lock_timeout = self.lock_timeout();
        Self::for_holder(self.logger.clone(), self.shared.clone(), options)
    }

    fn for_holder(logger: slog::Logger, shared: Arc<SharedTable>, options: LockingOptionsValidated) -> Self {
        let holder = HolderId::new(shared.next_holder.fetch_add(1, Ordering::Relaxed));
        StandaloneLockingService {
            logger: logger.new(slog::o!("holder" => holder.as_u64())),
            shared,
            lock_timeout: Mutex::new(options.default_lock_timeout),
            options,
            holder,
            interrupter: Interrupter::new(),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn holder(&self) -> HolderId {
        self.holder
    }

    /// Names this holder currently holds, sorted.
    pub fn held_names(&self) -> Vec<String> {
        self.shared.table().names_held_by(&self.holder)
    }

    fn lock_timeout(&self) -> Duration {
        *self
            .lock_timeout
            .lock()
            .expect("StandaloneLockingService lock timeout mutex guard poison")
    }
}

#[async_trait::async_trait]
impl LockingService for StandaloneLockingService {
    async fn try_lock(&self, names: &[&str]) -> Result<bool, Interrupted> {
        self.try_lock_timeout(self.lock_timeout(), names).await
    }

    async fn try_lock_timeout(&self, timeout: Duration, names: &[&str]) -> Result<bool, Interrupted> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }
        let names = LockNames::from(names);
        let deadline = interrupt::deadline_after(timeout);
        let interrupt = self.interrupter.token();

        loop {
            // Registered before the attempt, so a release racing with it still wakes us.
            let released = self.shared.released.notified();
            let attempt = {
                let mut table = self.shared.table();
                // Checked under the table guard so a concurrent shutdown cannot miss the claim.
                if self.closed.load(Ordering::Acquire) {
                    return Ok(false);
                }
                table.try_acquire_all(&names, &self.holder)
            };
            match attempt {
                Ok(newly_granted) => {
                    slog::debug!(self.logger, "Acquired {:?} (new: {:?})", names, newly_granted);
                    return Ok(true);
                }
                Err(conflicts) => {
                    slog::debug!(self.logger, "Locks {:?} are held by other holders", conflicts);
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
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let names = LockNames::from(names);
        let (held_all, released) = {
            let mut table = self.shared.table();
            let held_all = table.holds_all(&names, &self.holder);
            (held_all, table.release(names.iter(), &self.holder))
        };

        if !released.is_empty() {
            slog::debug!(self.logger, "Released {:?}", released);
            self.shared.released.notify_waiters();
        }
        held_all
    }

    async fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();

        let holder = self.holder;
        let released = self.shared.table().release_where(|owner| *owner == holder);
        if !released.is_empty() {
            self.shared.released.notify_waiters();
        }

        slog::info!(self.logger, "Locking service shut down, released {} locks.", released.len());
        true
    }

    fn set_lock_timeout(&self, timeout: Duration) {
        *self
            .lock_timeout
            .lock()
            .expect("StandaloneLockingService lock timeout mutex guard poison") = timeout;
    }

    fn interrupt(&self) {
        self.interrupter.interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn service() -> StandaloneLockingService {
        StandaloneLockingService::new(logger(), LockingOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn holders_are_distinct() {
        let first = service();
        let second = first.new_holder();

        assert_ne!(first.holder(), second.holder());
    }

    #[tokio::test]
    async fn empty_requests_are_vacuous() {
        let service = service();

        assert_eq!(service.try_lock(&[]).await, Ok(true));
        assert!(service.unlock(&[]).await);
        assert!(service.held_names().is_empty());
    }

    #[tokio::test]
    async fn zero_timeout_is_a_single_attempt() {
        let first = service();
        let second = first.new_holder();
        assert_eq!(first.try_lock(&["a"]).await, Ok(true));

        let started = Instant::now();
        assert_eq!(second.try_lock_timeout(Duration::from_millis(0), &["a"]).await, Ok(false));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn waiter_wakes_on_release() {
        let first = service();
        let second = Arc::new(first.new_holder());
        assert_eq!(first.try_lock(&["a"]).await, Ok(true));

        let waiter = {
            let second = second.clone();
            tokio::spawn(async move { second.try_lock_timeout(Duration::from_secs(5), &["a"]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(first.unlock(&["a"]).await);

        assert_eq!(waiter.await.unwrap(), Ok(true));
        assert_eq!(second.held_names(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn set_lock_timeout_bounds_default_try_lock() {
        let first = service();
        let second = first.new_holder();
        assert_eq!(first.try_lock(&["a"]).await, Ok(true));

        second.set_lock_timeout(Duration::from_millis(10));
        let started = Instant::now();
        assert_eq!(second.try_lock(&["a"]).await, Ok(false));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn shutdown_resolves_waiters_to_false() {
        let first = service();
        let second = Arc::new(first.new_holder());
        assert_eq!(first.try_lock(&["a"]).await, Ok(true));

        let waiter = {
            let second = second.clone();
            tokio::spawn(async move { second.try_lock_timeout(Duration::from_secs(5), &["a"]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(second.shutdown().await);

        assert_eq!(waiter.await.unwrap(), Ok(false));
        assert_eq!(second.try_lock(&["b"]).await, Ok(false));
        assert!(!second.unlock(&["b"]).await);
    }

    #[tokio::test]
    async fn huge_timeouts_wait_without_overflow() {
        let first = service();
        let second = Arc::new(first.new_holder());
        assert_eq!(first.try_lock_timeout(Duration::MAX, &["a"]).await, Ok(true));

        second.set_lock_timeout(Duration::from_secs(u64::MAX));
        let waiter = {
            let second = second.clone();
            tokio::spawn(async move { second.try_lock(&["a"]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(first.unlock(&["a"]).await);

        assert_eq!(waiter.await.unwrap(), Ok(true));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn claims_racing_shutdown_never_outlive_it() {
        let other = service();
        for _ in 0..200 {
            let holder = Arc::new(other.new_holder());
            let claim = {
                let holder = holder.clone();
                tokio::spawn(async move { holder.try_lock_timeout(Duration::from_secs(1), &["a"]).await })
            };
            tokio::task::yield_now().await;
            assert!(holder.shutdown().await);
            let _ = claim.await.unwrap();

            assert!(holder.held_names().is_empty());
            assert_eq!(other.try_lock_timeout(Duration::from_millis(0), &["a"]).await, Ok(true));
            assert!(other.unlock(&["a"]).await);
        }
    }
}
