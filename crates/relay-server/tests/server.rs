//! In-process end-to-end tests: a real server on a loopback port, driven
//! by plain blocking `TcpStream` clients.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use relay_core::ShutdownContext;
use relay_server::{Connection, Outcome, Result, Server, ServerConfig, SocketRegistry};

fn free_port() -> u16 {
    let l = TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Acknowledge each byte by sending it back.
fn echo_byte(conn: &mut Connection) -> Outcome {
    let mut byte = [0u8; 1];
    match conn.recv_all(&mut byte).and_then(|_| conn.send_all(&byte)) {
        Ok(_) => Outcome::Keep,
        Err(_) => Outcome::Close,
    }
}

struct Running {
    port: u16,
    registry: Arc<SocketRegistry>,
    shutdown: Arc<ShutdownContext>,
    done: mpsc::Receiver<Result<()>>,
}

fn start(config: ServerConfig) -> Running {
    let shutdown = Arc::new(ShutdownContext::new());
    let server = Server::bind(config, Arc::clone(&shutdown)).unwrap();
    let port = server.local_addr().unwrap().port();
    let registry = server.registry();

    let (tx, done) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(server.run());
    });
    Running {
        port,
        registry,
        shutdown,
        done,
    }
}

impl Running {
    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(("127.0.0.1", self.port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
    }

    fn stop(self) -> Result<()> {
        self.shutdown.request_shutdown();
        self.done
            .recv_timeout(Duration::from_secs(5))
            .expect("server did not stop after shutdown request")
    }
}

fn config(port: u16) -> ServerConfig {
    ServerConfig::new()
        .port(port.to_string())
        .num_threads(2)
        .max_clients(4)
        .timeout_ms(50)
        .handler(echo_byte)
}

#[test]
fn three_clients_one_byte_each() {
    let server = start(config(free_port()));
    let baseline = server.registry.len();
    assert_eq!(baseline, 1);

    for (i, byte) in [b'x', b'y', b'z'].into_iter().enumerate() {
        let mut client = server.connect();
        wait_until("client registered", || server.registry.len() == baseline + 1);

        client.write_all(&[byte]).unwrap();
        let mut echoed = [0u8; 1];
        client.read_exact(&mut echoed).unwrap();
        assert_eq!(echoed[0], byte, "client {i}");

        // Served connection goes back to the registry
        wait_until("connection re-registered", || server.registry.len() == baseline + 1);

        drop(client);
        wait_until("registry back to baseline", || server.registry.len() == baseline);
    }

    server.stop().unwrap();
}

#[test]
fn concurrent_clients_are_all_served() {
    let server = start(config(free_port()));

    let mut clients: Vec<TcpStream> = (0..3).map(|_| server.connect()).collect();
    wait_until("3 clients registered", || server.registry.client_count() == 3);

    for round in 0..5u8 {
        for client in clients.iter_mut() {
            client.write_all(&[round]).unwrap();
        }
        for client in clients.iter_mut() {
            let mut echoed = [0u8; 1];
            client.read_exact(&mut echoed).unwrap();
            assert_eq!(echoed[0], round);
        }
    }

    drop(clients);
    wait_until("all clients gone", || server.registry.client_count() == 0);
    server.stop().unwrap();
}

#[test]
fn shutdown_closes_idle_connections() {
    let server = start(config(free_port()));

    let mut idle = server.connect();
    wait_until("client registered", || server.registry.client_count() == 1);

    let registry = Arc::clone(&server.registry);
    server.stop().unwrap();
    assert_eq!(registry.len(), 1);

    let mut buf = [0u8; 1];
    assert_eq!(idle.read(&mut buf).unwrap(), 0, "idle client must see EOF");
}

#[test]
fn close_outcome_closes_connection() {
    let served = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&served);
    let config = config(free_port()).handler(move |conn: &mut Connection| {
        let mut byte = [0u8; 1];
        let _ = conn.recv_all(&mut byte);
        s.fetch_add(1, Ordering::SeqCst);
        Outcome::Close
    });
    let server = start(config);

    let mut client = server.connect();
    client.write_all(b"q").unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).unwrap(), 0);
    assert_eq!(served.load(Ordering::SeqCst), 1);
    assert_eq!(server.registry.len(), 1);

    server.stop().unwrap();
}

#[test]
fn port_in_use_is_reported() {
    let taken = TcpListener::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let shutdown = Arc::new(ShutdownContext::new());
    let err = Server::bind(config(port), Arc::clone(&shutdown)).unwrap_err();
    assert!(err.to_string().contains(&port.to_string()), "{err}");
    assert!(!shutdown.is_shutdown(), "failed bind must leave the context active");

    // Same context still drives a working server
    let server = Server::bind(config(free_port()), Arc::clone(&shutdown)).unwrap();
    let port = server.local_addr().unwrap().port();
    let (tx, done) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(server.run());
    });

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    client.write_all(b"b").unwrap();
    let mut echoed = [0u8; 1];
    client.read_exact(&mut echoed).unwrap();
    assert_eq!(&echoed, b"b");

    shutdown.request_shutdown();
    done.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
}

#[test]
fn shutdown_while_dispatcher_blocked_on_full_queue() {
    let slow = |conn: &mut Connection| {
        thread::sleep(Duration::from_millis(500));
        echo_byte(conn)
    };
    let server = start(config(free_port()).max_clients(8).queue_capacity(1).handler(slow));

    // Two requests busy the workers, one fills the queue, the fourth
    // parks the dispatcher in enqueue
    let mut clients: Vec<TcpStream> = (0..5).map(|_| server.connect()).collect();
    wait_until("5 clients registered", || server.registry.client_count() == 5);
    for client in clients.iter_mut() {
        client.write_all(b"!").unwrap();
    }
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    server.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    // Every connection is closed: served ones after their echo
    for client in clients.iter_mut() {
        let mut buf = [0u8; 1];
        while client.read(&mut buf).unwrap_or(0) != 0 {}
    }
}
