//! Runs the real binary, serves a few clients and stops it with SIGINT.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn free_port() -> u16 {
    let l = TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

fn spawn_server(port: u16) -> Child {
    Command::new(env!("CARGO_BIN_EXE_relay-echo"))
        .env("RELAY_PORT", port.to_string())
        .env("RELAY_THREADS", "2")
        .env("RELAY_MAX_CLIENTS", "4")
        .env("RELAY_TIMEOUT_MS", "50")
        .env("RELAY_LOG_LEVEL", "warn")
        .stdout(Stdio::null())
        .spawn()
        .expect("failed to start relay-echo")
}

fn connect(port: u16) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => {
                stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
                return stream;
            }
            Err(e) => {
                assert!(Instant::now() < deadline, "server never came up: {e}");
                thread::sleep(Duration::from_millis(20));
            }
        }
    }
}

fn wait_exit(child: &mut Child, limit: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        thread::sleep(Duration::from_millis(20));
    }
    None
}

fn interrupt(child: &Child) {
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGINT) };
    assert_eq!(rc, 0);
}

#[test]
fn serves_clients_then_exits_cleanly_on_sigint() {
    let port = free_port();
    let mut child = spawn_server(port);

    let mut clients: Vec<TcpStream> = (0..3).map(|_| connect(port)).collect();
    for (i, client) in clients.iter_mut().enumerate() {
        let byte = b'a' + i as u8;
        client.write_all(&[byte]).unwrap();
        let mut echoed = [0u8; 1];
        client.read_exact(&mut echoed).unwrap();
        assert_eq!(echoed[0], byte);
    }

    interrupt(&child);
    let status = match wait_exit(&mut child, Duration::from_secs(5)) {
        Some(status) => status,
        None => {
            let _ = child.kill();
            panic!("relay-echo did not exit after SIGINT");
        }
    };
    assert!(status.success(), "exit status {status:?}");

    // Server side is gone: every client sees EOF
    for client in clients.iter_mut() {
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap_or(0), 0);
    }
}

#[test]
fn sighup_does_not_stop_server() {
    let port = free_port();
    let mut child = spawn_server(port);
    let mut client = connect(port);

    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGHUP) };
    assert_eq!(rc, 0);
    assert!(wait_exit(&mut child, Duration::from_millis(300)).is_none());

    client.write_all(b"h").unwrap();
    let mut echoed = [0u8; 1];
    client.read_exact(&mut echoed).unwrap();
    assert_eq!(&echoed, b"h");

    interrupt(&child);
    let status = wait_exit(&mut child, Duration::from_secs(5)).expect("no exit after SIGINT");
    assert!(status.success());
}

#[test]
fn invalid_port_exits_with_failure() {
    let status = Command::new(env!("CARGO_BIN_EXE_relay-echo"))
        .arg("80")
        .env("RELAY_LOG_LEVEL", "off")
        .stdout(Stdio::null())
        .status()
        .unwrap();
    assert!(!status.success());
}

/// With the handler strategy nothing but `EINTR` can pull the dispatcher
/// out of an untimed `poll`: workers mask the signals, so SIGINT must land
/// on the dispatcher thread.
#[cfg(feature = "signal-handler")]
#[test]
fn signal_handler_build_interrupts_untimed_poll() {
    let port = free_port();
    let mut child = Command::new(env!("CARGO_BIN_EXE_relay-echo"))
        .env("RELAY_PORT", port.to_string())
        .env("RELAY_THREADS", "4")
        .env("RELAY_TIMEOUT_MS", "-1")
        .env("RELAY_LOG_LEVEL", "info")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start relay-echo");

    let mut client = connect(port);
    client.write_all(b"s").unwrap();
    let mut echoed = [0u8; 1];
    client.read_exact(&mut echoed).unwrap();
    assert_eq!(&echoed, b"s");

    interrupt(&child);
    let status = match wait_exit(&mut child, Duration::from_secs(5)) {
        Some(status) => status,
        None => {
            let _ = child.kill();
            panic!("signal-handler build did not exit after SIGINT");
        }
    };
    assert!(status.success(), "exit status {status:?}");

    let mut stdout = String::new();
    child.stdout.take().unwrap().read_to_string(&mut stdout).unwrap();
    assert!(stdout.contains("SIGINT received"), "{stdout}");

    let mut stderr = String::new();
    child.stderr.take().unwrap().read_to_string(&mut stderr).unwrap();
    assert!(stderr.contains("signal-handler shutdown"), "{stderr}");
}
