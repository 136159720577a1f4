//! # RPC Correlation Engine
//!
//! Pairs outbound asynchronous requests with their eventual Resolve/Reject.
//! A request allocates the next response id, parks a `Pending` record in
//! the owning peer's table, writes the message, and awaits settlement.
//! Settlement removes the record exactly once: on a matching reply, on
//! local cancellation, or on forced rejection when the peer disconnects.
//!
//! An inbound reply with no matching record is a duplicate, a late arrival,
//! or the tail of a cancelled call; it is discarded silently. Cancellation
//! is local-only: the remote invocation runs to completion and its reply
//! lands in that discard path.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use loomwire::message::Message;
use loomwire::message::ResponseId;
use loomwire::sendable;
use loomwire::value::Value;

use crate::context::MeshCtx;
use crate::mesh::Mesh;
use crate::registry::ThreadState;
use crate::thread;

/// One outstanding request. Owned by the peer's pending table.
pub(crate) struct Pending {
    tx: oneshot::Sender<thread::Result<Value>>,
    /// The cancellation link, detached whenever the record settles.
    watcher: Option<AbortHandle>,
}

impl Pending {
    fn settle(self, outcome: thread::Result<Value>) {
        if let Some(watcher) = self.watcher {
            watcher.abort();
        }
        let _ = self.tx.send(outcome);
    }
}

/// Sends an asynchronous request to a peer and awaits its settlement.
pub(crate) async fn request(
    ctx: &Arc<MeshCtx>,
    state: &Arc<ThreadState>,
    build: impl FnOnce(ResponseId) -> Message,
    cancel: Option<CancellationToken>,
) -> thread::Result<Value> {
    let id = ctx.next_response_id();
    let (tx, rx) = oneshot::channel();

    state.pending.insert(id.0, Pending { tx, watcher: None });

    if let Some(token) = cancel {
        let watch_state = Arc::clone(state);
        let watcher = tokio::spawn(async move {
            token.cancelled().await;
            if let Some((_, pending)) = watch_state.pending.remove(&id.0) {
                pending.settle(Err(thread::Error::Cancelled));
            }
        });
        // if the record is already gone the token fired before this line;
        // the rejection is on its way and the watcher has finished
        if let Some(mut entry) = state.pending.get_mut(&id.0) {
            entry.watcher = Some(watcher.abort_handle());
        }
    }

    if state.send(build(id)).is_err() {
        // the peer is gone; reject immediately without waiting for a reply
        if let Some((_, pending)) = state.pending.remove(&id.0) {
            pending.settle(Err(thread::Error::PeerClosed(state.id())));
        }
    }

    match rx.await {
        Ok(outcome) => outcome,
        Err(_) => Err(thread::Error::PeerClosed(state.id())),
    }
}

/// Settles the pending record matching an inbound Resolve/Reject.
pub(crate) fn settle(state: &ThreadState, id: ResponseId, outcome: std::result::Result<Value, Value>) {
    match state.pending.remove(&id.0) {
        Some((_, pending)) => pending.settle(outcome.map_err(thread::Error::Remote)),
        None => {
            tracing::trace!(peer = %state.id(), response = %id, "discarding unmatched reply");
        }
    }
}

/// Rejects every outstanding request against a departing peer.
pub(crate) fn reject_all(state: &Arc<ThreadState>) {
    let ids: Vec<u64> = state.pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, pending)) = state.pending.remove(&id) {
            pending.settle(Err(thread::Error::PeerClosed(state.id())));
        }
    }
}

/// Handles an inbound `Invoke`: look the function up, run it, reply. If the
/// resolved value itself cannot cross the boundary, a second attempt
/// re-sends a rejection carrying that error, so the caller always observes a
/// settlement.
pub(crate) async fn handle_invoke(
    ctx: Arc<MeshCtx>,
    state: Arc<ThreadState>,
    response_id: ResponseId,
    function_id: String,
    args: Vec<Value>,
) {
    let Some(callable) = ctx.functions.get(&function_id) else {
        reply_reject(
            &state,
            response_id,
            Value::Text(format!("function '{}' is not exposed", function_id)),
        );
        return;
    };

    match callable.call(args).await {
        Ok(value) => {
            let transfer = ctx.take_reply_transfer();
            match sendable::into_sendable(value, &transfer) {
                Ok(value) => {
                    let _ = state.send(Message::Resolve { response_id, value });
                }
                Err(err) => reply_reject(&state, response_id, Value::Text(err.to_string())),
            }
        }
        Err(reason) => reply_reject(&state, response_id, reason),
    }
}

/// Handles an inbound `Import` through the context's module loader.
pub(crate) async fn handle_import(
    ctx: Arc<MeshCtx>,
    state: Arc<ThreadState>,
    response_id: ResponseId,
    module_id: String,
) {
    let mesh = Mesh::from_ctx(Arc::clone(&ctx));
    match ctx.loader.load(&mesh, &module_id).await {
        Ok(()) => {
            let _ = state.send(Message::Resolve {
                response_id,
                value: Value::Unit,
            });
        }
        Err(err) => reply_reject(&state, response_id, Value::Text(err.to_string())),
    }
}

/// Writes a rejection, falling back to the boundary error as the reason if
/// the original reason itself cannot cross.
pub(crate) fn reply_reject(state: &ThreadState, response_id: ResponseId, reason: Value) {
    let reason = match sendable::into_sendable(reason, &[]) {
        Ok(reason) => reason,
        Err(err) => Value::Text(err.to_string()),
    };
    let _ = state.send(Message::Reject { response_id, reason });
}
