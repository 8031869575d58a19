mod server;
mod shutdown;

pub use server::GroupRelayServer;
pub use shutdown::relay_shutdown_signal;
pub use shutdown::RelayShutdownHandle;
pub use shutdown::RelayShutdownSignal;
