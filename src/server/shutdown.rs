use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Creates a linked pair: the relay server stops once the handle is triggered or dropped.
pub fn relay_shutdown_signal() -> (RelayShutdownHandle, RelayShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (RelayShutdownHandle { tx }, RelayShutdownSignal { rx })
}

pub struct RelayShutdownHandle {
    tx: oneshot::Sender<()>,
}

impl RelayShutdownHandle {
    pub fn shutdown(self) {
        let _ = self.tx.send(());
    }
}

pub struct RelayShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl Future for RelayShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Sent or dropped, either way we stop.
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}
