//! # Protocol Messages
//!
//! The closed set of message shapes exchanged over mesh channels, as a
//! tagged union with exhaustive dispatch at every consumer.
//!
//! ## Invariants
//!
//! - `Create`, `Import`, `Invoke`, `Resolve`, `Reject` and `Terminate` carry
//!   a `ResponseId` correlating them to a pending request.
//! - `Connect` and `Disconnect` carry the `ThreadId` they are about;
//!   `Connect` additionally carries the fresh endpoint for that peer.
//! - `Close` and `Disconnect` carry an exit code.

use std::fmt;

use crate::port::Port;
use crate::value::Value;

/// Strong type for thread identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl ThreadId {
    /// The distinguished hub context. Always id 0.
    pub const ROOT: ThreadId = ThreadId(0);
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread-{}", self.0)
    }
}

/// Strong type for response correlation identifiers.
///
/// Allocated from a per-context monotonic counter; unique among the
/// currently-outstanding requests of that context.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct ResponseId(pub u64);

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "response-{}", self.0)
    }
}

/// A protocol message.
///
/// No kind carries a peer-specific secret; the port an endpoint arrives on
/// is the capability that authorizes participation.
#[derive(Debug)]
pub enum Message {
    /// Spawn request, forwarded from a peer to the hub.
    Create {
        response_id: ResponseId,
        worker_data: Value,
    },
    /// Topology update: a new peer exists, talk to it on this endpoint.
    Connect {
        thread_id: ThreadId,
        port: Port,
    },
    /// Dynamic module load request.
    Import {
        response_id: ResponseId,
        module_id: String,
    },
    /// Named-function invocation request.
    Invoke {
        response_id: ResponseId,
        function_id: String,
        args: Vec<Value>,
    },
    /// Successful settlement of a pending request.
    Resolve {
        response_id: ResponseId,
        value: Value,
    },
    /// Failed settlement of a pending request.
    Reject {
        response_id: ResponseId,
        reason: Value,
    },
    /// Self-reported exit intent, sent from a peer to the hub.
    Close {
        exit_code: i32,
    },
    /// Termination request, forwarded from a peer to the hub.
    Terminate {
        response_id: ResponseId,
        thread_id: ThreadId,
    },
    /// Topology update: a peer is gone.
    Disconnect {
        thread_id: ThreadId,
        exit_code: i32,
    },
}

impl Message {
    /// The kind discriminator, for logging and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Connect { .. } => "connect",
            Self::Import { .. } => "import",
            Self::Invoke { .. } => "invoke",
            Self::Resolve { .. } => "resolve",
            Self::Reject { .. } => "reject",
            Self::Close { .. } => "close",
            Self::Terminate { .. } => "terminate",
            Self::Disconnect { .. } => "disconnect",
        }
    }
}
