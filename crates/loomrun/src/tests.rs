//! Unit tests for the registry and correlation engine, driven through two
//! directly linked peer contexts on the test runtime. No OS threads, so
//! every protocol step is observable in-process.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use loomwire::message::Message;
use loomwire::message::ResponseId;
use loomwire::message::ThreadId;
use loomwire::port::Port;
use loomwire::value::Value;

use crate::event::MeshEvent;
use crate::functions::FutureFn;
use crate::loader::NullLoader;
use crate::mesh::Mesh;
use crate::peer;
use crate::registry;
use crate::spawn::WorkerInit;
use crate::thread::CallOptions;
use crate::thread::Error;

/// Two fully linked peer contexts sharing the test runtime.
fn linked_pair() -> (Mesh, Mesh) {
    let (port_a, port_b) = Port::pair();

    let a = peer::bootstrap(
        WorkerInit {
            thread_id: ThreadId(1),
            worker_data: Value::Unit,
            links: vec![(ThreadId(2), port_a)],
        },
        Arc::new(NullLoader),
        CancellationToken::new(),
    );

    let b = peer::bootstrap(
        WorkerInit {
            thread_id: ThreadId(2),
            worker_data: Value::Int(7),
            links: vec![(ThreadId(1), port_b)],
        },
        Arc::new(NullLoader),
        CancellationToken::new(),
    );

    (a, b)
}

// ============================================================================
//  FUNCTION REGISTRY
// ============================================================================

#[tokio::test]
async fn test_expose_overwrites_and_unexpose_reports() {
    let (a, _b) = linked_pair();

    a.expose_fn("f", |_| Ok(Value::Int(1)));
    a.expose_fn("f", |_| Ok(Value::Int(2)));

    assert!(a.unexpose("f"));
    assert!(!a.unexpose("f"));
}

// ============================================================================
//  INVOCATION AND CORRELATION
// ============================================================================

#[tokio::test]
async fn test_invoke_echo_between_contexts() {
    let (a, b) = linked_pair();

    b.expose_fn("echo", |mut args| {
        if args.is_empty() {
            return Err(Value::Text("no argument".into()));
        }
        Ok(args.remove(0))
    });

    let thread = a.get_thread(ThreadId(2)).expect("peer 2 must be linked");
    let value = thread.invoke("echo", vec![Value::Int(42)]).await.expect("echo failed");
    assert_eq!(value, Value::Int(42));
}

#[tokio::test]
async fn test_invoke_unknown_function_rejects_with_id() {
    let (a, _b) = linked_pair();

    let thread = a.get_thread(ThreadId(2)).expect("peer 2 must be linked");
    let err = thread.invoke("missing", vec![]).await.unwrap_err();

    match err {
        Error::Remote(reason) => {
            let text = reason.as_text().expect("reason must be text");
            assert!(text.contains("missing"), "reason must name the id: {}", text);
        }
        other => panic!("Expected Remote, got {:?}", other),
    }
}

#[tokio::test]
async fn test_async_callable_resolves() {
    let (a, b) = linked_pair();

    b.expose("delayed", Arc::new(FutureFn(|_args| async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Value::Text("done".into()))
    })));

    let thread = a.get_thread(ThreadId(2)).expect("peer 2 must be linked");
    let value = thread.invoke("delayed", vec![]).await.expect("delayed failed");
    assert_eq!(value, Value::Text("done".into()));
}

#[tokio::test]
async fn test_rejection_reason_passes_through() {
    let (a, b) = linked_pair();

    b.expose_fn("fail", |_| Err(Value::Text("boom".into())));

    let thread = a.get_thread(ThreadId(2)).expect("peer 2 must be linked");
    let err = thread.invoke("fail", vec![]).await.unwrap_err();
    match err {
        Error::Remote(reason) => assert_eq!(reason, Value::Text("boom".into())),
        other => panic!("Expected Remote, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unmatched_reply_is_inert() {
    let (a, b) = linked_pair();

    // a raw reply nobody asked for lands in the discard path
    let state = a.ctx.registry.get(ThreadId(2)).expect("peer 2 must be linked");
    state
        .send(Message::Resolve {
            response_id: ResponseId(9999),
            value: Value::Unit,
        })
        .expect("send failed");

    // the engine stays healthy
    b.expose_fn("ping", |_| Ok(Value::Text("pong".into())));
    let thread = a.get_thread(ThreadId(2)).expect("peer 2 must be linked");
    let value = thread.invoke("ping", vec![]).await.expect("ping failed");
    assert_eq!(value, Value::Text("pong".into()));
}

// ============================================================================
//  CANCELLATION
// ============================================================================

#[tokio::test]
async fn test_cancel_rejects_locally_and_late_reply_is_discarded() {
    let (a, b) = linked_pair();

    let gate = Arc::new(tokio::sync::Notify::new());
    let release = Arc::clone(&gate);
    let completed = Arc::new(Mutex::new(false));
    let completed_remote = Arc::clone(&completed);

    b.expose(
        "slow",
        Arc::new(FutureFn(move |_args| {
            let gate = Arc::clone(&release);
            let completed = Arc::clone(&completed_remote);
            async move {
                gate.notified().await;
                *completed.lock().unwrap() = true;
                Ok(Value::Int(1))
            }
        })),
    );

    let thread = a.get_thread(ThreadId(2)).expect("peer 2 must be linked");
    let token = CancellationToken::new();

    let call = {
        let thread = thread.clone();
        let token = token.clone();
        tokio::spawn(async move {
            thread
                .invoke_with("slow", vec![], CallOptions::default().cancel(token))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let outcome = call.await.expect("join failed");
    assert!(matches!(outcome, Err(Error::Cancelled)));

    // the remote invocation was never told; it runs to completion and its
    // reply is dropped as unmatched
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(*completed.lock().unwrap(), "remote side must still complete");

    // the correlation table is clean: no record left behind by the late reply
    let state = a.ctx.registry.get(ThreadId(2)).expect("peer 2 must be linked");
    assert!(state.pending.is_empty());
}

#[tokio::test]
async fn test_cancel_after_settlement_is_noop() {
    let (a, b) = linked_pair();

    b.expose_fn("quick", |_| Ok(Value::Int(3)));

    let thread = a.get_thread(ThreadId(2)).expect("peer 2 must be linked");
    let token = CancellationToken::new();

    let value = thread
        .invoke_with("quick", vec![], CallOptions::default().cancel(token.clone()))
        .await
        .expect("quick failed");
    assert_eq!(value, Value::Int(3));

    token.cancel();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let state = a.ctx.registry.get(ThreadId(2)).expect("peer 2 must be linked");
    assert!(state.pending.is_empty(), "settled record must be gone");
}

// ============================================================================
//  DISCONNECT AND PEER LOSS
// ============================================================================

#[tokio::test]
async fn test_disconnect_rejects_pending_and_retires_handle() {
    let (a, b) = linked_pair();

    b.expose(
        "never",
        Arc::new(FutureFn(|_args| async {
            std::future::pending::<()>().await;
            Ok(Value::Unit)
        })),
    );

    let thread = a.get_thread(ThreadId(2)).expect("peer 2 must be linked");
    let call = {
        let thread = thread.clone();
        tokio::spawn(async move { thread.invoke("never", vec![]).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let state = a.ctx.registry.get(ThreadId(2)).expect("peer 2 must be linked");
    assert!(registry::disconnect(&a.ctx, &state, 5));

    let outcome = call.await.expect("join failed");
    assert!(matches!(outcome, Err(Error::PeerClosed(ThreadId(2)))));

    assert!(!thread.is_online());
    assert_eq!(thread.exit_code(), Some(5));
    assert!(a.get_thread(ThreadId(2)).is_none());
    assert!(a.all_threads().is_empty());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (a, _b) = linked_pair();

    let state = a.ctx.registry.get(ThreadId(2)).expect("peer 2 must be linked");
    assert!(registry::disconnect(&a.ctx, &state, 1));
    assert!(!registry::disconnect(&a.ctx, &state, 2));
    assert_eq!(state.thread.exit_code(), Some(1));
}

#[tokio::test]
async fn test_send_to_closed_peer_rejects_immediately() {
    let (a, _b) = linked_pair();

    let thread = a.get_thread(ThreadId(2)).expect("peer 2 must be linked");
    let state = a.ctx.registry.get(ThreadId(2)).expect("peer 2 must be linked");
    registry::disconnect(&a.ctx, &state, 0);

    // the stale handle fails eagerly, no reply awaited
    let err = thread.invoke("anything", vec![]).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected(ThreadId(2))));
}

// ============================================================================
//  TOPOLOGY EVENTS
// ============================================================================

#[tokio::test]
async fn test_connect_and_disconnect_emit_events_in_order() {
    let (a, _b) = linked_pair();
    let mut events = a.subscribe();

    let (port_here, _port_there) = Port::pair();
    peer::on_connect(&a.ctx, ThreadId(9), port_here);

    match events.try_recv() {
        Ok(MeshEvent::Online { thread }) => {
            assert_eq!(thread.id(), ThreadId(9));
            // registry mutation precedes the event
            assert!(thread.is_online());
        }
        other => panic!("Expected Online, got {:?}", other),
    }

    peer::on_disconnect(&a.ctx, ThreadId(9), 2);
    match events.try_recv() {
        Ok(MeshEvent::Exit { thread, exit_code }) => {
            assert_eq!(thread.id(), ThreadId(9));
            assert_eq!(exit_code, 2);
            assert!(!thread.is_online());
        }
        other => panic!("Expected Exit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_of_unknown_peer_is_not_an_error() {
    let (a, _b) = linked_pair();
    peer::on_disconnect(&a.ctx, ThreadId(40), 0);
    assert_eq!(a.all_threads().len(), 1);
}

#[tokio::test]
async fn test_duplicate_connect_is_ignored() {
    let (a, _b) = linked_pair();

    let (port_here, _port_there) = Port::pair();
    peer::on_connect(&a.ctx, ThreadId(2), port_here);
    assert_eq!(a.all_threads().len(), 1);
}
