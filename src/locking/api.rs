use std::fmt;
use tokio::time::Duration;

/// Returned when a waiting `try_lock` was interrupted through `LockingService::interrupt`. The
/// attempt leaves no lock state behind.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("Interrupted while waiting to acquire locks")]
pub struct Interrupted;

/// HolderId tells apart the holders sharing one lock table (standalone) or one member (cluster).
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct HolderId(u64);

impl HolderId {
    pub fn new(id: u64) -> Self {
        HolderId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "holder-{}", self.0)
    }
}

/// LockingService hands out named, mutually exclusive locks. Each service value is one holder:
/// locks are held by it, re-acquiring a name it already holds succeeds without waiting, and a
/// single `unlock` releases a name no matter how many times it was re-acquired.
///
/// Contention and timeouts are not errors, they make `try_lock` return `Ok(false)`. The only
/// error is `Interrupted`.
#[async_trait::async_trait]
pub trait LockingService: Send + Sync {
    /// Atomically acquires every name, waiting at most the service's default lock timeout.
    async fn try_lock(&self, names: &[&str]) -> Result<bool, Interrupted>;

    /// Atomically acquires every name, waiting at most `timeout`. Either all names end up held by
    /// this holder, or none of the ones it didn't already hold do. A zero timeout makes a single
    /// attempt.
    async fn try_lock_timeout(&self, timeout: Duration, names: &[&str]) -> Result<bool, Interrupted>;

    /// Releases the names this holder holds among `names`. Returns true only if it held all of them.
    async fn unlock(&self, names: &[&str]) -> bool;

    /// Releases everything this holder holds. In-flight and later `try_lock` calls return false.
    /// Returns false if already shut down.
    async fn shutdown(&self) -> bool;

    fn set_lock_timeout(&self, timeout: Duration);

    /// Makes every `try_lock` of this holder that is currently waiting return `Err(Interrupted)`.
    fn interrupt(&self);
}
