//! # Spawn Seam
//!
//! The boundary to the host environment: how a new execution context comes
//! into being. The mesh coordinator hands a `WorkerInit` to a `SpawnWorker`
//! implementation and gets back a `WorkerHandle` for releasing the context
//! later. The init payload reaches the new context before any other message,
//! because the context's channel endpoints travel inside it.

use std::fmt;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use loomwire::message::ThreadId;
use loomwire::port::Port;
use loomwire::value::Value;

#[derive(Debug)]
pub enum Error {
    /// The host failed to start the execution context.
    Spawn(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(msg) => write!(f, "spawn failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Setup payload for a new context: its identity, its worker data, and one
/// channel endpoint per peer it is born knowing (the hub link is always
/// among them).
#[derive(Debug)]
pub struct WorkerInit {
    pub thread_id: ThreadId,
    pub worker_data: Value,
    pub links: Vec<(ThreadId, Port)>,
}

/// Spawns execution contexts. Implemented by the host adapter; the mesh
/// coordinator is its only caller.
pub trait SpawnWorker: Send + Sync {
    fn spawn(&self, init: WorkerInit) -> Result<WorkerHandle>;
}

/// The coordinator's grip on a spawned context.
pub struct WorkerHandle {
    cancel: CancellationToken,
    exited: oneshot::Receiver<i32>,
}

impl WorkerHandle {
    pub fn new(cancel: CancellationToken, exited: oneshot::Receiver<i32>) -> Self {
        Self { cancel, exited }
    }

    /// Asks the context to stop. Idempotent.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the context to finish and returns its exit code.
    pub async fn join(self) -> i32 {
        self.exited.await.unwrap_or(0)
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle").finish_non_exhaustive()
    }
}
