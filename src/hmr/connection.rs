//! Client connections.
//!
//! The engine only needs to push text frames and learn when a client is
//! gone, so any transport works behind [`Connection`]. [`WsConnection`] is
//! the tungstenite implementation used by the dev server.

use std::fmt;
use std::io::ErrorKind;
use std::net::TcpStream;

use thiserror::Error;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

/// Failure delivering a frame to one client.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection is closed")]
    Closed,

    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),
}

/// A client socket the engine can push messages to.
pub trait Connection: Send {
    /// Whether the socket still accepts frames.
    fn is_open(&self) -> bool;

    /// Send one text frame.
    fn send_text(&mut self, text: &str) -> Result<(), ConnectionError>;

    /// Drain pending inbound frames. Returns `false` once the peer is gone.
    fn poll(&mut self) -> bool {
        self.is_open()
    }

    fn close(&mut self);
}

/// Handle identifying a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registered connections, in registration order.
#[derive(Default)]
pub(super) struct ConnectionRegistry {
    entries: Vec<(ConnectionId, Box<dyn Connection>)>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn insert(&mut self, connection: Box<dyn Connection>) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, connection));
        id
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Box<dyn Connection>> {
        let index = self.entries.iter().position(|(cid, _)| *cid == id)?;
        Some(self.entries.remove(index).1)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Send every frame to every open connection. Connections that are not
    /// open are skipped; the ones whose write fails are dropped. Returns how
    /// many connections were reached.
    pub fn broadcast(&mut self, frames: &[String]) -> usize {
        let mut reached = 0;
        self.entries.retain_mut(|(id, conn)| {
            if !conn.is_open() {
                crate::debug!("hmr"; "connection {} not open, skipped", id);
                return true;
            }
            for frame in frames {
                if let Err(e) = conn.send_text(frame) {
                    crate::debug!("hmr"; "connection {} dropped: {}", id, e);
                    return false;
                }
            }
            reached += 1;
            true
        });
        reached
    }

    /// Poll every connection and drop the ones whose peer went away.
    pub fn reap(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain_mut(|(_, conn)| conn.poll());
        before - self.entries.len()
    }

    pub fn close_all(&mut self) {
        for (_, mut conn) in self.entries.drain(..) {
            conn.close();
        }
    }
}

/// WebSocket client over a plain TCP stream.
pub struct WsConnection {
    ws: WebSocket<TcpStream>,
}

impl WsConnection {
    /// Perform the server handshake on `stream`.
    ///
    /// The handshake runs blocking; the socket switches to non-blocking
    /// afterwards so [`Connection::poll`] never stalls.
    pub fn accept(stream: TcpStream) -> Result<Self, ConnectionError> {
        let ws = tungstenite::accept(stream).map_err(|e| match e {
            tungstenite::HandshakeError::Failure(err) => ConnectionError::WebSocket(err),
            tungstenite::HandshakeError::Interrupted(_) => ConnectionError::Closed,
        })?;
        let _ = ws.get_ref().set_nonblocking(true);
        Ok(Self { ws })
    }
}

impl Connection for WsConnection {
    fn is_open(&self) -> bool {
        self.ws.can_write()
    }

    fn send_text(&mut self, text: &str) -> Result<(), ConnectionError> {
        if !self.ws.can_write() {
            return Err(ConnectionError::Closed);
        }
        match self.ws.send(Message::Text(text.to_string().into())) {
            // Frame stays buffered and goes out with the next write
            Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            result => Ok(result?),
        }
    }

    fn poll(&mut self) -> bool {
        loop {
            match self.ws.read() {
                Ok(Message::Close(_)) => return false,
                // Client frames carry nothing the engine acts on
                Ok(_) => continue,
                Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => {
                    return self.ws.can_write();
                }
                Err(_) => return false,
            }
        }
    }

    fn close(&mut self) {
        let _ = self.ws.close(None);
        let _ = self.ws.flush();
    }
}
