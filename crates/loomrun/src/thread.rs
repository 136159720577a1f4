//! # Thread Handle
//!
//! The public handle to a peer. Cloneable; every clone names the same peer.
//! A handle outlives its peer: after the peer exits it answers `is_online`
//! with false and still remembers the exit code, but every operation on it
//! fails with `NotConnected`.

use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::Weak;

use tokio_util::sync::CancellationToken;

use loomwire::message::Message;
use loomwire::message::ThreadId;
use loomwire::port::PortToken;
use loomwire::sendable;
use loomwire::value::Value;

use crate::context::MeshCtx;
use crate::hub;
use crate::peer;
use crate::registry::ThreadState;
use crate::rpc;
use crate::spawn;

#[derive(Debug)]
pub enum Error {
    /// The target peer has no live registry entry.
    NotConnected(ThreadId),
    /// The local context itself has closed.
    Closed,
    /// The value or transfer list cannot cross the channel boundary.
    Sendable(sendable::Error),
    /// The remote side rejected the call; carries the remote reason.
    Remote(Value),
    /// The peer disconnected while the call was outstanding.
    PeerClosed(ThreadId),
    /// The call was cancelled locally. The remote side is not told.
    Cancelled,
    /// The spawn primitive failed.
    Spawn(spawn::Error),
    /// A reply did not have the expected shape.
    Protocol(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected(id) => write!(f, "{} is not connected", id),
            Self::Closed => write!(f, "local context is closed"),
            Self::Sendable(err) => write!(f, "value cannot cross the channel: {}", err),
            Self::Remote(reason) => write!(f, "remote rejection: {:?}", reason),
            Self::PeerClosed(id) => write!(f, "{} closed while the call was pending", id),
            Self::Cancelled => write!(f, "call cancelled"),
            Self::Spawn(err) => write!(f, "{}", err),
            Self::Protocol(msg) => write!(f, "protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<sendable::Error> for Error {
    fn from(err: sendable::Error) -> Self {
        Self::Sendable(err)
    }
}

impl From<spawn::Error> for Error {
    fn from(err: spawn::Error) -> Self {
        Self::Spawn(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Options for `invoke_with`: ports to move with the arguments and a token
/// that cancels the local future.
#[derive(Default)]
pub struct CallOptions {
    pub transfer: Vec<PortToken>,
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn transfer(mut self, tokens: Vec<PortToken>) -> Self {
        self.transfer = tokens;
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

pub(crate) struct ThreadShared {
    id: ThreadId,
    ctx: Weak<MeshCtx>,
    state: Weak<ThreadState>,
    exit: OnceLock<i32>,
}

/// Handle to a peer context.
#[derive(Clone)]
pub struct Thread {
    inner: Arc<ThreadShared>,
}

impl Thread {
    pub(crate) fn new(id: ThreadId, ctx: Weak<MeshCtx>, state: Weak<ThreadState>) -> Self {
        Self {
            inner: Arc::new(ThreadShared {
                id,
                ctx,
                state,
                exit: OnceLock::new(),
            }),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.inner.id
    }

    /// True until the peer is closed. A stale handle answers false.
    pub fn is_online(&self) -> bool {
        match self.inner.ctx.upgrade() {
            Some(ctx) => ctx.registry.contains(self.inner.id),
            None => false,
        }
    }

    /// The peer's exit code, once it has exited.
    pub fn exit_code(&self) -> Option<i32> {
        self.inner.exit.get().copied()
    }

    /// Records the exit code. Returns false if the peer already exited;
    /// this is the at-most-once guard on destruction.
    pub(crate) fn mark_exited(&self, exit_code: i32) -> bool {
        self.inner.exit.set(exit_code).is_ok()
    }

    /// Calls a function exposed on the peer and settles with its result.
    pub async fn invoke(&self, function_id: impl Into<String>, args: Vec<Value>) -> Result<Value> {
        self.invoke_with(function_id, args, CallOptions::default()).await
    }

    /// Like `invoke`, with a transfer list for port arguments and an
    /// optional cancellation token. Cancelling settles the local future
    /// only; an invocation already in flight runs to completion remotely
    /// and its late reply is discarded.
    pub async fn invoke_with(
        &self,
        function_id: impl Into<String>,
        args: Vec<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        let (ctx, state) = self.live()?;
        let args = sendable::into_sendable_args(args, &options.transfer)?;
        let function_id = function_id.into();

        rpc::request(
            &ctx,
            &state,
            |response_id| Message::Invoke {
                response_id,
                function_id,
                args,
            },
            options.cancel,
        )
        .await
    }

    /// Asks the peer to load a module by identifier.
    pub async fn import(&self, module_id: impl Into<String>) -> Result<()> {
        self.import_with(module_id, None).await
    }

    pub async fn import_with(
        &self,
        module_id: impl Into<String>,
        cancel: Option<CancellationToken>,
    ) -> Result<()> {
        let (ctx, state) = self.live()?;
        let module_id = module_id.into();

        rpc::request(
            &ctx,
            &state,
            |response_id| Message::Import {
                response_id,
                module_id,
            },
            cancel,
        )
        .await
        .map(|_| ())
    }

    /// Closes the peer and resolves with its exit code. On the hub this
    /// tears the peer down directly; elsewhere the request is forwarded to
    /// the hub, which alone has kill authority.
    pub async fn terminate(&self) -> Result<i32> {
        if let Some(code) = self.exit_code() {
            return Ok(code);
        }

        let ctx = self.inner.ctx.upgrade().ok_or(Error::Closed)?;
        if ctx.is_root() {
            let state = self.state(&ctx)?;
            hub::close_peer(&ctx, &state, 0).await;
            Ok(self.exit_code().unwrap_or(0))
        } else {
            peer::terminate_via_hub(&ctx, self).await
        }
    }

    fn live(&self) -> Result<(Arc<MeshCtx>, Arc<ThreadState>)> {
        let ctx = self.inner.ctx.upgrade().ok_or(Error::Closed)?;
        let state = self.state(&ctx)?;
        Ok((ctx, state))
    }

    fn state(&self, ctx: &Arc<MeshCtx>) -> Result<Arc<ThreadState>> {
        ctx.registry.get(self.inner.id).ok_or(Error::NotConnected(self.inner.id))
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.inner.id)
            .field("exit_code", &self.exit_code())
            .finish_non_exhaustive()
    }
}

/// Handles compare by identity: two clones of one handle are equal, two
/// handles to the same id from different lookups are too (they share state).
impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || Weak::ptr_eq(&self.inner.state, &other.inner.state)
    }
}

impl Eq for Thread {}
