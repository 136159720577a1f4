//! # Mesh Coordinator
//!
//! The hub half of the protocol, running only in the root context: the one
//! authority that admits peers into the mesh and broadcasts topology
//! changes. Admission is atomic from the creator's point of view: by the
//! time a handle is returned, a `Connect` has been written to every
//! existing peer and the setup payload has been handed to the new context,
//! so every message the newcomer might send already has a route.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

use loomwire::message::Message;
use loomwire::message::ResponseId;
use loomwire::message::ThreadId;
use loomwire::port::Port;
use loomwire::value::Value;

use crate::context::MeshCtx;
use crate::registry;
use crate::registry::ThreadState;
use crate::rpc;
use crate::spawn::SpawnWorker;
use crate::spawn::WorkerHandle;
use crate::spawn::WorkerInit;
use crate::thread;
use crate::thread::Thread;

/// Hub-only state: the spawn primitive, the grip on every spawned context,
/// and the peer-id counter (monotonic, starting above the root's own id,
/// never reclaimed).
pub(crate) struct HubState {
    spawner: Arc<dyn SpawnWorker>,
    workers: DashMap<u64, WorkerHandle>,
    next_thread_id: AtomicU64,
}

impl HubState {
    pub(crate) fn new(spawner: Arc<dyn SpawnWorker>) -> Self {
        Self {
            spawner,
            workers: DashMap::new(),
            next_thread_id: AtomicU64::new(ThreadId::ROOT.0 + 1),
        }
    }
}

/// Admits a new peer: allocate its id, mint a fresh channel pair per
/// existing peer (sending one end ahead in a `Connect`), spawn the context
/// with the collected endpoints plus the hub link, and register the
/// newcomer locally. Only after all of that is the handle returned.
pub(crate) async fn create_peer(ctx: &Arc<MeshCtx>, worker_data: Value) -> thread::Result<Thread> {
    let Some(hub) = ctx.hub() else {
        tracing::warn!(context = %ctx.id, "create requested off the hub");
        return Err(thread::Error::NotConnected(ThreadId::ROOT));
    };

    let id = ThreadId(hub.next_thread_id.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(peer = %id, "admitting peer");

    let (hub_port, worker_hub_port) = Port::pair();
    let mut links = Vec::new();
    links.push((ThreadId::ROOT, worker_hub_port));

    for peer_state in ctx.registry.snapshot() {
        let (theirs, newcomers) = Port::pair();
        if peer_state
            .send(Message::Connect {
                thread_id: id,
                port: theirs,
            })
            .is_err()
        {
            // racing a concurrent disconnect; the newcomer never learns
            // this peer, and the disconnect broadcast is already on its way
            continue;
        }
        links.push((peer_state.id(), newcomers));
    }

    let init = WorkerInit {
        thread_id: id,
        worker_data,
        links,
    };
    let handle = hub.spawner.spawn(init)?;
    hub.workers.insert(id.0, handle);

    let state = registry::connect(ctx, id, hub_port);
    Ok(state.thread.clone())
}

/// Tears one peer down: destroy its registry entry (idempotent), tell every
/// remaining peer, and release the execution context. Returns false if the
/// peer was already gone.
pub(crate) async fn close_peer(ctx: &Arc<MeshCtx>, state: &Arc<ThreadState>, exit_code: i32) -> bool {
    if !registry::disconnect(ctx, state, exit_code) {
        return false;
    }

    let thread_id = state.id();
    for peer_state in ctx.registry.snapshot() {
        let _ = peer_state.send(Message::Disconnect {
            thread_id,
            exit_code,
        });
    }

    if let Some(hub) = ctx.hub() {
        if let Some((_, worker)) = hub.workers.remove(&thread_id.0) {
            worker.request_stop();
            worker.join().await;
        }
    }

    true
}

/// The hub's own exit: every peer hears about every other peer and then
/// about the hub itself, local state is torn down, and the contexts are
/// joined. Peers stop themselves when the hub's disconnect reaches them,
/// which orders their exit after they have observed the full teardown.
pub(crate) async fn close_mesh(ctx: &Arc<MeshCtx>, exit_code: i32) {
    let Some(hub) = ctx.hub() else {
        return;
    };

    let peers = ctx.registry.snapshot();
    tracing::debug!(peers = peers.len(), exit_code, "closing mesh");

    for peer_state in &peers {
        for other in &peers {
            if other.id() != peer_state.id() {
                let _ = peer_state.send(Message::Disconnect {
                    thread_id: other.id(),
                    exit_code,
                });
            }
        }
        let _ = peer_state.send(Message::Disconnect {
            thread_id: ThreadId::ROOT,
            exit_code,
        });
    }

    for peer_state in &peers {
        registry::disconnect(ctx, peer_state, exit_code);
    }

    let ids: Vec<u64> = hub.workers.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, worker)) = hub.workers.remove(&id) {
            worker.join().await;
        }
    }

    let _ = ctx.exit_code.set(exit_code);
    ctx.shutdown.cancel();
}

/// A peer asked the hub to spawn on its behalf. The requester's `Connect`
/// for the newcomer is written during admission, so it precedes this
/// resolution on the same channel; when the create call settles, the
/// requester can already route to the new peer.
pub(crate) async fn on_create(
    ctx: Arc<MeshCtx>,
    requester: Arc<ThreadState>,
    response_id: ResponseId,
    worker_data: Value,
) {
    if ctx.hub().is_none() {
        tracing::warn!(context = %ctx.id, "create message received off the hub");
        return;
    }

    match create_peer(&ctx, worker_data).await {
        Ok(thread) => {
            let _ = requester.send(Message::Resolve {
                response_id,
                value: Value::Int(thread.id().0 as i64),
            });
        }
        Err(err) => rpc::reply_reject(&requester, response_id, Value::Text(err.to_string())),
    }
}

/// A peer asked the hub to terminate a thread. Terminating the hub itself
/// settles the caller first, then cascades.
pub(crate) async fn on_terminate(
    ctx: Arc<MeshCtx>,
    requester: Arc<ThreadState>,
    response_id: ResponseId,
    thread_id: ThreadId,
) {
    if ctx.hub().is_none() {
        tracing::warn!(context = %ctx.id, "terminate message received off the hub");
        return;
    }

    if thread_id == ThreadId::ROOT {
        let _ = requester.send(Message::Resolve {
            response_id,
            value: Value::Int(0),
        });
        close_mesh(&ctx, 0).await;
        return;
    }

    let exit_code = match ctx.registry.get(thread_id) {
        Some(target) => {
            close_peer(&ctx, &target, 0).await;
            target.thread.exit_code().unwrap_or(0)
        }
        // already gone; terminating twice is not an error
        None => 0,
    };

    let _ = requester.send(Message::Resolve {
        response_id,
        value: Value::Int(exit_code as i64),
    });
}

/// A peer reported its own exit. The teardown path is the same as for an
/// explicit terminate, guarded at-most-once by the exit-code slot.
pub(crate) async fn on_close(ctx: Arc<MeshCtx>, state: Arc<ThreadState>, exit_code: i32) {
    if ctx.hub().is_none() {
        tracing::warn!(context = %ctx.id, "close message received off the hub");
        return;
    }

    close_peer(&ctx, &state, exit_code).await;
}
