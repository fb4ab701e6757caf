//! WebSocket server for HMR clients.
//!
//! An acceptor thread hands each TCP client to its own handshake thread,
//! which registers the upgraded socket with the engine. A reader thread
//! polls registered sockets and drops the ones whose peer went away.

use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use anyhow::Result;

use crate::hmr::{HmrEngine, WsConnection};

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// How often client sockets are polled for disconnects
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Server
// =============================================================================

/// Bind the WebSocket server and start accepting clients.
///
/// Returns the bound address, which may use a later port if `base_port`
/// was taken.
pub fn start_ws_server(interface: IpAddr, base_port: u16, engine: HmrEngine) -> Result<SocketAddr> {
    let (listener, addr) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
    listener.set_nonblocking(true)?;

    let acceptor = engine.clone();
    std::thread::spawn(move || accept_loop(listener, acceptor));
    std::thread::spawn(move || reader_loop(engine));

    Ok(addr)
}

fn accept_loop(listener: TcpListener, engine: HmrEngine) {
    while !engine.is_closed() {
        match listener.accept() {
            Ok((stream, addr)) => {
                crate::debug!("serve"; "client connected: {}", addr);
                let engine = engine.clone();
                std::thread::spawn(move || register_client(stream, &engine));
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                crate::log!("serve"; "accept error: {}", e);
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

fn register_client(stream: TcpStream, engine: &HmrEngine) {
    // Handshake runs blocking, the connection switches afterwards
    let _ = stream.set_nonblocking(false);

    let connection = match WsConnection::accept(stream) {
        Ok(connection) => connection,
        Err(e) => {
            crate::log!("serve"; "handshake failed: {}", e);
            return;
        }
    };

    if let Err(e) = engine.add_connection(connection) {
        crate::log!("serve"; "client rejected: {}", e);
    }
}

fn reader_loop(engine: HmrEngine) {
    while !engine.is_closed() {
        std::thread::sleep(POLL_INTERVAL);
        engine.reap_connections();
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(
    interface: IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(TcpListener, SocketAddr)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(interface, port)) {
            Ok(listener) => {
                if offset > 0 {
                    crate::log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                let addr = listener.local_addr()?;
                return Ok((listener, addr));
            }
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        }
    }

    Err(anyhow::anyhow!(
        "Failed to bind WebSocket server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
