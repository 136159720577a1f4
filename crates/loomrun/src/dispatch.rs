//! # Message Dispatch
//!
//! One pump task per channel reads messages in arrival order and dispatches
//! on the kind tag with an exhaustive match. Settlements and topology
//! updates are handled inline; request handling (invoke, import, create,
//! terminate, close) is spawned off the pump, so a slow callee never stalls
//! its channel and a teardown triggered by a message on the torn-down
//! channel cannot abort itself mid-flight.

use std::sync::Arc;
use std::sync::Weak;

use tokio::task::AbortHandle;

use loomwire::message::Message;
use loomwire::port::PortReceiver;

use crate::context::MeshCtx;
use crate::hub;
use crate::peer;
use crate::registry::ThreadState;
use crate::rpc;

pub(crate) fn spawn_pump(
    ctx: Weak<MeshCtx>,
    state: Arc<ThreadState>,
    mut receiver: PortReceiver,
) -> AbortHandle {
    let pump = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            let Some(ctx) = ctx.upgrade() else { break };
            dispatch(&ctx, &state, message);
        }
        tracing::trace!(peer = %state.id(), "pump finished");
    });
    pump.abort_handle()
}

fn dispatch(ctx: &Arc<MeshCtx>, state: &Arc<ThreadState>, message: Message) {
    tracing::trace!(peer = %state.id(), kind = message.kind(), "dispatching");

    match message {
        Message::Create {
            response_id,
            worker_data,
        } => {
            tokio::spawn(hub::on_create(
                Arc::clone(ctx),
                Arc::clone(state),
                response_id,
                worker_data,
            ));
        }
        Message::Connect { thread_id, port } => peer::on_connect(ctx, thread_id, port),
        Message::Import {
            response_id,
            module_id,
        } => {
            tokio::spawn(rpc::handle_import(
                Arc::clone(ctx),
                Arc::clone(state),
                response_id,
                module_id,
            ));
        }
        Message::Invoke {
            response_id,
            function_id,
            args,
        } => {
            tokio::spawn(rpc::handle_invoke(
                Arc::clone(ctx),
                Arc::clone(state),
                response_id,
                function_id,
                args,
            ));
        }
        Message::Resolve { response_id, value } => rpc::settle(state, response_id, Ok(value)),
        Message::Reject { response_id, reason } => rpc::settle(state, response_id, Err(reason)),
        Message::Close { exit_code } => {
            tokio::spawn(hub::on_close(Arc::clone(ctx), Arc::clone(state), exit_code));
        }
        Message::Terminate {
            response_id,
            thread_id,
        } => {
            tokio::spawn(hub::on_terminate(
                Arc::clone(ctx),
                Arc::clone(state),
                response_id,
                thread_id,
            ));
        }
        Message::Disconnect {
            thread_id,
            exit_code,
        } => peer::on_disconnect(ctx, thread_id, exit_code),
    }
}
