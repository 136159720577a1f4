//! # Thread Registry
//!
//! Tracks the live peer set of one context. The id-keyed map serves wire
//! routing and lookup; the handle-identity view is the weak link each
//! `Thread` keeps to its private state. Insertion happens only at
//! `connect`, removal only at `disconnect`, the single destruction point
//! for a peer relationship.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::Weak;

use dashmap::DashMap;
use tokio::task::AbortHandle;

use loomwire::message::Message;
use loomwire::message::ThreadId;
use loomwire::port;
use loomwire::port::Port;
use loomwire::port::PortSender;

use crate::context::MeshCtx;
use crate::dispatch;
use crate::event::MeshEvent;
use crate::rpc;
use crate::rpc::Pending;
use crate::thread::Thread;

/// Private channel state for one live peer relationship. Exclusively owned
/// by the registry; external code only ever sees the `Thread` handle.
pub(crate) struct ThreadState {
    pub(crate) thread: Thread,
    pub(crate) sender: PortSender,
    /// Outstanding requests against this peer, keyed by response id.
    pub(crate) pending: DashMap<u64, Pending>,
    pump: OnceLock<AbortHandle>,
}

impl ThreadState {
    pub(crate) fn id(&self) -> ThreadId {
        self.thread.id()
    }

    /// Writes a message to the peer. Fails once the peer is gone.
    pub(crate) fn send(&self, message: Message) -> port::Result<()> {
        if self.thread.exit_code().is_some() {
            return Err(port::Error::Closed);
        }
        self.sender.send(message)
    }
}

pub(crate) struct ThreadRegistry {
    by_id: DashMap<u64, Arc<ThreadState>>,
}

impl ThreadRegistry {
    pub(crate) fn new() -> Self {
        Self {
            by_id: DashMap::new(),
        }
    }

    /// Looks up a live peer. Absence is a normal outcome, not an error;
    /// the peer may have disconnected between lookup and use.
    pub(crate) fn get(&self, id: ThreadId) -> Option<Arc<ThreadState>> {
        self.by_id.get(&id.0).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn contains(&self, id: ThreadId) -> bool {
        self.by_id.contains_key(&id.0)
    }

    /// A copy of the live set at call time. Not stable across suspension
    /// points.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ThreadState>> {
        self.by_id.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    fn insert(&self, state: Arc<ThreadState>) {
        self.by_id.insert(state.id().0, state);
    }

    fn remove(&self, id: ThreadId) {
        self.by_id.remove(&id.0);
    }
}

/// The single insertion point: materializes private state for a peer,
/// starts its pump, registers it, and announces it. The handle is usable
/// the moment this returns.
pub(crate) fn connect(ctx: &Arc<MeshCtx>, id: ThreadId, port: Port) -> Arc<ThreadState> {
    let (sender, receiver) = port.split();
    let ctx_weak = Arc::downgrade(ctx);

    let state = Arc::new_cyclic(|state_weak: &Weak<ThreadState>| ThreadState {
        thread: Thread::new(id, ctx_weak, state_weak.clone()),
        sender,
        pending: DashMap::new(),
        pump: OnceLock::new(),
    });

    let pump = dispatch::spawn_pump(Arc::downgrade(ctx), Arc::clone(&state), receiver);
    let _ = state.pump.set(pump);

    ctx.registry.insert(Arc::clone(&state));
    ctx.emit(MeshEvent::Online {
        thread: state.thread.clone(),
    });
    tracing::debug!(peer = %id, context = %ctx.id, "peer connected");

    state
}

/// The single destruction point. Idempotent: the exit-code slot on the
/// handle is the at-most-once guard. Rejects every outstanding request,
/// detaches their cancellation links, stops the pump, removes the entry,
/// and announces the exit, in that order.
pub(crate) fn disconnect(ctx: &MeshCtx, state: &Arc<ThreadState>, exit_code: i32) -> bool {
    if !state.thread.mark_exited(exit_code) {
        return false;
    }

    rpc::reject_all(state);

    if let Some(pump) = state.pump.get() {
        pump.abort();
    }

    ctx.registry.remove(state.id());
    ctx.emit(MeshEvent::Exit {
        thread: state.thread.clone(),
        exit_code,
    });
    tracing::debug!(peer = %state.id(), context = %ctx.id, exit_code, "peer disconnected");

    true
}
