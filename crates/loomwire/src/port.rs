//! # Port Endpoints
//!
//! A `Port` is one side of a bidirectional, order-preserving, non-duplicating
//! message pipe between two execution contexts. Built as a crossed pair of
//! unbounded mpsc channels: what one side sends, the other side receives.
//!
//! Ports are themselves payload: a `Connect` message carries the endpoint the
//! receiver will use for the new peer, and user values may embed ports when
//! listed for transfer. Ownership moves with the message, which invalidates
//! the source by construction.

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;

use crate::message::Message;

/// Strong type for port endpoint identifiers.
///
/// Tokens are process-unique and name an endpoint in transfer lists.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct PortToken(pub u64);

impl fmt::Display for PortToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    /// The other endpoint has been dropped.
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "port closed"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_token() -> PortToken {
    PortToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
}

/// One endpoint of a message pipe.
pub struct Port {
    token: PortToken,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Port {
    /// Creates a connected pair of endpoints.
    ///
    /// Messages sent on one side are received by the other, in send order,
    /// never duplicated or dropped while both sides live.
    pub fn pair() -> (Port, Port) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Port {
            token: next_token(),
            tx: tx_a,
            rx: rx_b,
        };

        let b = Port {
            token: next_token(),
            tx: tx_b,
            rx: rx_a,
        };

        (a, b)
    }

    pub fn token(&self) -> PortToken {
        self.token
    }

    /// Writes a message to the other endpoint.
    pub fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::Closed)
    }

    /// Receives the next message, or `None` once the other endpoint is gone
    /// and the pipe has drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Separates the endpoint into its send and receive halves.
    ///
    /// Registration splits every mesh port this way: the send half stays
    /// with the peer's private state, the receive half feeds its pump.
    pub fn split(self) -> (PortSender, PortReceiver) {
        let sender = PortSender {
            token: self.token,
            tx: self.tx,
        };
        let receiver = PortReceiver {
            token: self.token,
            rx: self.rx,
        };
        (sender, receiver)
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port").field("token", &self.token).finish_non_exhaustive()
    }
}

/// The write half of a split endpoint.
#[derive(Clone)]
pub struct PortSender {
    token: PortToken,
    tx: mpsc::UnboundedSender<Message>,
}

impl PortSender {
    pub fn token(&self) -> PortToken {
        self.token
    }

    pub fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::Closed)
    }
}

impl fmt::Debug for PortSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortSender").field("token", &self.token).finish_non_exhaustive()
    }
}

/// The read half of a split endpoint.
pub struct PortReceiver {
    token: PortToken,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl PortReceiver {
    pub fn token(&self) -> PortToken {
        self.token
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

impl fmt::Debug for PortReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortReceiver").field("token", &self.token).finish_non_exhaustive()
    }
}
