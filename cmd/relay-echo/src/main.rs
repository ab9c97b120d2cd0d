//! Relay Echo Server
//!
//! Echoes whatever each client sends, one chunk per readiness event,
//! served by the relay worker pool. Ctrl-C (SIGINT) or SIGTERM stops it
//! gracefully; SIGHUP is acknowledged and ignored.
//!
//! Usage:
//!     cargo build --release -p relay-echo
//!     ./target/release/relay-echo [port] [threads]
//!
//! Configuration also comes from `RELAY_*` environment variables (see
//! `ServerConfig::from_env`); positional arguments win. Log level is read
//! from `RELAY_LOG_LEVEL` (default `info`).
//!
//! Test with:
//!     echo "hello" | nc -q1 localhost 31337

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use relay_core::ShutdownContext;
use relay_server::{
    start_server, Connection, DefaultCoordinator, Outcome, RequestHandler, ServerConfig,
    ShutdownCoordinator, MAX_CHUNK,
};

struct Echo;

impl RequestHandler for Echo {
    fn handle(&self, conn: &mut Connection) -> Outcome {
        let mut buf = [0u8; MAX_CHUNK];
        let n = match conn.recv_some(&mut buf) {
            Ok(n) => n,
            Err(e) if e.is_peer_closed() => return Outcome::Close,
            Err(e) => {
                warn!("recv on socket [{}]: {}", conn.fd(), e);
                return Outcome::Close;
            }
        };
        match conn.send_all(&buf[..n]) {
            Ok(_) => Outcome::Keep,
            Err(e) => {
                warn!("send on socket [{}]: {}", conn.fd(), e);
                Outcome::Close
            }
        }
    }
}

fn config_from_args(args: &[String]) -> ServerConfig {
    let mut config = ServerConfig::from_env().handler(Echo);
    if let Some(port) = args.get(1) {
        config = config.port(port.as_str());
    }
    if let Some(threads) = args.get(2) {
        match threads.parse() {
            Ok(n) => config = config.num_threads(n),
            Err(_) => warn!("ignoring thread count {:?}", threads),
        }
    }
    config
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RELAY_LOG_LEVEL", "info")).init();

    // Before anything spawns threads: the signal-thread strategy relies on
    // every later thread inheriting its signal mask.
    let shutdown = Arc::new(ShutdownContext::new());
    let coordinator = match DefaultCoordinator::install(Arc::clone(&shutdown)) {
        Ok(c) => c,
        Err(e) => {
            error!("cannot install shutdown signals: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("relay-echo starting ({} shutdown)", coordinator.strategy());

    let args: Vec<String> = std::env::args().collect();
    let result = start_server(config_from_args(&args), shutdown);
    drop(coordinator);

    match result {
        Ok(()) => {
            info!("relay-echo stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("relay-echo: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_positional_args() {
        let config = config_from_args(&args(&["relay-echo", "4000", "6"]));
        assert_eq!(config.port, "4000");
        assert_eq!(config.num_threads, 6);
        assert!(config.client_request.is_some());
    }

    #[test]
    fn test_bad_thread_count_keeps_default() {
        let base = config_from_args(&args(&["relay-echo"]));
        let config = config_from_args(&args(&["relay-echo", "4000", "lots"]));
        assert_eq!(config.num_threads, base.num_threads);
    }
}
