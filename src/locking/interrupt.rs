use std::future::Future;
use std::sync::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Interrupter is the interruption flag of one holder. Waits grab the current token when they
/// start. `interrupt` cancels that token and installs a fresh one, so only waits already in flight
/// are woken and later calls start clean.
pub(crate) struct Interrupter {
    current: Mutex<CancellationToken>,
}

impl Interrupter {
    pub(crate) fn new() -> Self {
        Interrupter {
            current: Mutex::new(CancellationToken::new()),
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.current().clone()
    }

    pub(crate) fn interrupt(&self) {
        let mut current = self.current();
        current.cancel();
        *current = CancellationToken::new();
    }

    fn current(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.current.lock().expect("Interrupter mutex guard poison")
    }
}

/// Roughly thirty years, the horizon for timeouts too large to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The instant `timeout` from now, saturating at `FAR_FUTURE` for timeouts that overflow.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

pub(crate) enum WaitOutcome<T> {
    Ready(T),
    TimedOut,
    Interrupted,
    ShutDown,
}

/// Waits for `future` until `deadline`. Shutdown takes precedence over interruption, which takes
/// precedence over completion.
pub(crate) async fn wait_until<F: Future>(
    future: F,
    deadline: Instant,
    interrupt: &CancellationToken,
    shutdown: &CancellationToken,
) -> WaitOutcome<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => WaitOutcome::ShutDown,
        _ = interrupt.cancelled() => WaitOutcome::Interrupted,
        output = future => WaitOutcome::Ready(output),
        _ = tokio::time::sleep_until(deadline) => WaitOutcome::TimedOut,
    }
}
