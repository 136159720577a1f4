//! Call semantics over the native host: cancellation is local-only by
//! design, ports move only when listed for transfer, and a reply that
//! cannot cross the boundary falls back to a rejection instead of hanging
//! the caller.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use loomrun::functions::FutureFn;
use loomrun::mesh::Mesh;
use loomrun::mesh::MeshBuilder;
use loomrun::thread::CallOptions;
use loomrun::thread::Error;
use loomwire::message::Message;
use loomwire::message::ResponseId;
use loomwire::port::Port;
use loomwire::sendable;
use loomwire::value::Value;

const TICK: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn semantics_mesh(hook: impl Fn(Mesh) + Send + Sync + 'static) -> Mesh {
    init_tracing();
    MeshBuilder::new().on_worker_boot(hook).build()
}

// --- Test 1: Cancellation Is Local-Only, By Design ---
//
// Cancelling rejects the local future and frees the local record; the
// remote invocation is deliberately NOT told and runs to completion, its
// late reply discarded as unmatched. Expected behavior, not a bug.

#[tokio::test]
async fn test_cancelled_invoke_rejects_locally_while_remote_completes() {
    let completed = Arc::new(Mutex::new(false));

    let remote_flag = Arc::clone(&completed);
    let mesh = semantics_mesh(move |mesh| {
        mesh.expose_fn("ping", |_args| Ok(Value::Text("pong".into())));

        let flag = Arc::clone(&remote_flag);
        mesh.expose(
            "slow",
            Arc::new(FutureFn(move |_args| {
                let flag = Arc::clone(&flag);
                async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    *flag.lock().unwrap() = true;
                    Ok(Value::Int(1))
                }
            })),
        );
    });

    let thread = mesh.create(Value::Unit).await.expect("create failed");
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

    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let outcome = timeout(TICK, call).await.expect("cancel must settle promptly").expect("join failed");
    assert!(matches!(outcome, Err(Error::Cancelled)));
    assert!(!*completed.lock().unwrap(), "cancellation must not wait for the remote");

    // the remote side finishes anyway, and its late reply is silently dropped
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(*completed.lock().unwrap(), "remote invocation must run to completion");

    let value = thread.invoke("ping", vec![]).await.expect("engine must stay healthy");
    assert_eq!(value, Value::Text("pong".into()));

    mesh.close(0).await;
}

// --- Test 2: Ports Transfer Through Invocation Arguments ---

#[tokio::test]
async fn test_port_transfers_through_args() {
    let mesh = semantics_mesh(|mesh| {
        mesh.expose_fn("pipe-back", |mut args| {
            let port = args
                .remove(0)
                .into_port()
                .ok_or_else(|| Value::Text("expected a port".into()))?;
            port.send(Message::Resolve {
                response_id: ResponseId(0),
                value: Value::Int(99),
            })
            .map_err(|err| Value::Text(err.to_string()))?;
            Ok(Value::Unit)
        });
    });

    let thread = mesh.create(Value::Unit).await.expect("create failed");
    let (mut mine, yours) = Port::pair();
    let token = yours.token();

    thread
        .invoke_with(
            "pipe-back",
            vec![Value::Port(yours)],
            CallOptions::default().transfer(vec![token]),
        )
        .await
        .expect("pipe-back failed");

    match timeout(TICK, mine.recv()).await.expect("no message") {
        Some(Message::Resolve { value, .. }) => assert_eq!(value, Value::Int(99)),
        other => panic!("Expected a resolve ping, got {:?}", other),
    }

    mesh.close(0).await;
}

// --- Test 3: Unlisted Ports Reject Before Anything Is Sent ---

#[tokio::test]
async fn test_unlisted_port_rejects() {
    let mesh = semantics_mesh(|mesh| {
        mesh.expose_fn("ping", |_args| Ok(Value::Text("pong".into())));
    });

    let thread = mesh.create(Value::Unit).await.expect("create failed");
    let (_mine, yours) = Port::pair();

    let err = thread.invoke("ping", vec![Value::Port(yours)]).await.unwrap_err();
    assert!(matches!(err, Error::Sendable(sendable::Error::PortNotListed(_))));

    mesh.close(0).await;
}

#[tokio::test]
async fn test_transfer_list_must_match_args() {
    let mesh = semantics_mesh(|mesh| {
        mesh.expose_fn("ping", |_args| Ok(Value::Text("pong".into())));
    });

    let thread = mesh.create(Value::Unit).await.expect("create failed");
    let (_mine, yours) = Port::pair();
    let token = yours.token();
    drop(yours);

    let err = thread
        .invoke_with("ping", vec![Value::Int(1)], CallOptions::default().transfer(vec![token]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sendable(sendable::Error::TransferNotFound(_))));

    mesh.close(0).await;
}

// --- Test 4: Ports Transfer Back Through Replies ---

#[tokio::test]
async fn test_port_transfers_through_reply() {
    let mesh = semantics_mesh(|mesh| {
        let m = mesh.clone();
        mesh.expose_fn("make-pipe", move |_args| {
            let (mine, yours) = Port::pair();
            mine.send(Message::Resolve {
                response_id: ResponseId(0),
                value: Value::Int(5),
            })
            .map_err(|err| Value::Text(err.to_string()))?;

            m.transfer_on_reply(vec![yours.token()]);
            Ok(Value::Port(yours))
        });
    });

    let thread = mesh.create(Value::Unit).await.expect("create failed");

    let value = thread.invoke("make-pipe", vec![]).await.expect("make-pipe failed");
    let mut pipe = value.into_port().expect("reply must carry the port");

    match timeout(TICK, pipe.recv()).await.expect("no message") {
        Some(Message::Resolve { value, .. }) => assert_eq!(value, Value::Int(5)),
        other => panic!("Expected a resolve ping, got {:?}", other),
    }

    mesh.close(0).await;
}

// --- Test 5: An Unsendable Result Becomes A Rejection, Never A Hang ---

#[tokio::test]
async fn test_unsendable_result_falls_back_to_rejection() {
    let mesh = semantics_mesh(|mesh| {
        mesh.expose_fn("bad-reply", |_args| {
            let (_mine, yours) = Port::pair();
            // no transfer_on_reply: the first reply attempt cannot cross,
            // the second one carries the boundary error back
            Ok(Value::Port(yours))
        });
    });

    let thread = mesh.create(Value::Unit).await.expect("create failed");

    let err = timeout(TICK, thread.invoke("bad-reply", vec![]))
        .await
        .expect("the caller must always observe a settlement")
        .unwrap_err();

    match err {
        Error::Remote(reason) => {
            let text = reason.as_text().expect("reason must be text");
            assert!(text.contains("cannot be copied"), "unexpected reason: {}", text);
        }
        other => panic!("Expected Remote, got {:?}", other),
    }

    mesh.close(0).await;
}

// --- Test 6: Worker Data Must Be Plain Data ---

#[tokio::test]
async fn test_create_rejects_port_in_worker_data() {
    let mesh = semantics_mesh(|_mesh| {});

    let (_mine, yours) = Port::pair();
    let err = mesh.create(Value::Port(yours)).await.unwrap_err();
    assert!(matches!(err, Error::Sendable(sendable::Error::PortNotListed(_))));

    mesh.close(0).await;
}

// --- Test 7: Rejection Reasons Pass Through Verbatim ---

#[tokio::test]
async fn test_rejection_reason_passes_through() {
    let mesh = semantics_mesh(|mesh| {
        mesh.expose_fn("fail", |_args| Err(Value::Text("boom".into())));
    });

    let thread = mesh.create(Value::Unit).await.expect("create failed");

    let err = thread.invoke("fail", vec![]).await.unwrap_err();
    match err {
        Error::Remote(reason) => assert_eq!(reason, Value::Text("boom".into())),
        other => panic!("Expected Remote, got {:?}", other),
    }

    mesh.close(0).await;
}
