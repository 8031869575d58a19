use clusterlock::{relay_shutdown_signal, GroupRelayServer};
use slog::Drain;
use std::net::SocketAddr;

const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:7800";

#[tokio::main]
async fn main() {
    let logger = create_root_logger_for_stdout();
    let addr_arg = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_RELAY_ADDR.to_string());
    let socket_addr: SocketAddr = match addr_arg.parse() {
        Ok(addr) => addr,
        Err(e) => {
            slog::crit!(logger, "Invalid relay address '{}': {}", addr_arg, e);
            std::process::exit(2);
        }
    };

    let (shutdown_handle, shutdown_signal) = relay_shutdown_signal();
    let ctrl_c_logger = logger.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            slog::info!(ctrl_c_logger, "Received Ctrl-C, shutting down relay.");
        }
        shutdown_handle.shutdown();
    });

    let server = GroupRelayServer::new(logger.clone());
    if let Err(e) = server.run(socket_addr, shutdown_signal).await {
        slog::crit!(logger, "Relay failed: {}", e);
        std::process::exit(1);
    }
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Process" => "relay"))
}
