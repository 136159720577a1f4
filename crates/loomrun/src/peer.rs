//! # Context Bootstrap
//!
//! The peer half of the protocol, running in every non-root context. The
//! setup payload materializes a registry entry per (id, endpoint) pair;
//! that is how a peer learns it is linked to the root and to every
//! pre-existing peer. Later `Connect`/`Disconnect` messages keep the mesh
//! current; spawn and kill requests are forwarded to the hub, which alone
//! has that authority.

use std::sync::Arc;
use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use loomwire::message::Message;
use loomwire::message::ThreadId;
use loomwire::port::Port;
use loomwire::value::Value;

use crate::context::MeshCtx;
use crate::loader::ModuleLoader;
use crate::mesh::Mesh;
use crate::registry;
use crate::rpc;
use crate::spawn::WorkerInit;
use crate::thread;
use crate::thread::Thread;

/// Peer-only state: the cached handle to the root context.
pub(crate) struct PeerState {
    main: OnceLock<Thread>,
}

impl PeerState {
    pub(crate) fn new() -> Self {
        Self {
            main: OnceLock::new(),
        }
    }

    pub(crate) fn main_thread(&self) -> Option<Thread> {
        self.main.get().cloned()
    }
}

/// Builds a peer context from its setup payload. Every named peer is
/// registered before this returns, so the context starts fully meshed.
pub(crate) fn bootstrap(
    init: WorkerInit,
    loader: Arc<dyn ModuleLoader>,
    shutdown: CancellationToken,
) -> Mesh {
    let ctx = MeshCtx::new_peer(init.thread_id, init.worker_data, loader, shutdown);

    for (thread_id, port) in init.links {
        let state = registry::connect(&ctx, thread_id, port);
        if thread_id == ThreadId::ROOT {
            if let Some(peer) = ctx.peer() {
                let _ = peer.main.set(state.thread.clone());
            }
        }
    }

    tracing::debug!(context = %ctx.id, "peer context bootstrapped");
    Mesh::from_ctx(ctx)
}

/// A new peer joined; the endpoint in the message is ours to keep.
pub(crate) fn on_connect(ctx: &Arc<MeshCtx>, thread_id: ThreadId, port: Port) {
    if ctx.is_root() {
        tracing::warn!("connect message received on the hub");
        return;
    }
    if ctx.registry.contains(thread_id) {
        tracing::warn!(peer = %thread_id, "duplicate connect ignored");
        return;
    }

    registry::connect(ctx, thread_id, port);
}

/// A peer left. Absence of the entry is normal; this context may already
/// know through another path. The root disconnecting collapses the whole
/// process tree, so this context stops itself once the message is handled.
pub(crate) fn on_disconnect(ctx: &Arc<MeshCtx>, thread_id: ThreadId, exit_code: i32) {
    if ctx.is_root() {
        tracing::warn!("disconnect message received on the hub");
        return;
    }

    if let Some(state) = ctx.registry.get(thread_id) {
        registry::disconnect(ctx, &state, exit_code);
    }

    if thread_id == ThreadId::ROOT {
        let _ = ctx.exit_code.set(exit_code);
        ctx.shutdown.cancel();
    }
}

/// Forwards a spawn request to the hub. The hub writes our `Connect` for
/// the newcomer before it resolves, so the handle is present by the time
/// the reply settles.
pub(crate) async fn create_via_hub(ctx: &Arc<MeshCtx>, worker_data: Value) -> thread::Result<Thread> {
    let main = ctx
        .registry
        .get(ThreadId::ROOT)
        .ok_or(thread::Error::NotConnected(ThreadId::ROOT))?;

    let value = rpc::request(
        ctx,
        &main,
        |response_id| Message::Create {
            response_id,
            worker_data,
        },
        None,
    )
    .await?;

    let id = value
        .as_int()
        .ok_or_else(|| thread::Error::Protocol("create resolved without a thread id".to_string()))?;
    let thread_id = ThreadId(id as u64);

    let state = ctx
        .registry
        .get(thread_id)
        .ok_or(thread::Error::NotConnected(thread_id))?;
    Ok(state.thread.clone())
}

/// Forwards a terminate request to the hub and resolves with the exit code.
/// The hub's disconnect broadcast precedes its resolution on our channel,
/// so the local exit code is already recorded when the reply settles.
pub(crate) async fn terminate_via_hub(ctx: &Arc<MeshCtx>, thread: &Thread) -> thread::Result<i32> {
    let main = ctx
        .registry
        .get(ThreadId::ROOT)
        .ok_or(thread::Error::NotConnected(ThreadId::ROOT))?;

    let thread_id = thread.id();
    let value = rpc::request(
        ctx,
        &main,
        |response_id| Message::Terminate {
            response_id,
            thread_id,
        },
        None,
    )
    .await?;

    Ok(thread
        .exit_code()
        .or_else(|| value.as_int().map(|code| code as i32))
        .unwrap_or(0))
}

/// The close entry point for a peer: report the exit to the hub first, so
/// it always learns about voluntary exits and broadcasts the disconnect,
/// then stop this context.
pub(crate) fn close(ctx: &Arc<MeshCtx>, exit_code: i32) {
    if let Some(main) = ctx.registry.get(ThreadId::ROOT) {
        let _ = main.send(Message::Close { exit_code });
    }
    let _ = ctx.exit_code.set(exit_code);
    ctx.shutdown.cancel();
}
