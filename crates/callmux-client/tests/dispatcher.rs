//! Dispatcher behavior against a scripted remote peer.
//!
//! The peer side of each test drives the raw wire protocol over an in-memory
//! duplex stream: length-prefixed JSON frames, one in-order reply per
//! request, no correlation ids.

use std::sync::Arc;
use std::time::Duration;

use callmux_client::{BootstrapCall, CallError, ClientConfig, Dispatcher};
use callmux_frame::FrameCodec;
use callmux_transport::ChannelTransport;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::Framed;

type Peer = Framed<DuplexStream, FrameCodec>;

fn pair(config: ClientConfig) -> (Arc<Dispatcher>, Peer) {
    let (near, far) = tokio::io::duplex(64 * 1024);
    let (read_half, write_half) = tokio::io::split(near);
    let dispatcher = Arc::new(Dispatcher::new(
        ChannelTransport::from_parts(read_half, write_half),
        config,
    ));
    (dispatcher, Framed::new(far, FrameCodec::default()))
}

async fn recv(peer: &mut Peer) -> Value {
    peer.next()
        .await
        .expect("peer stream should stay open")
        .expect("frame should decode")
        .to_value()
        .expect("payload should be JSON")
}

#[tokio::test]
async fn fifo_matching_resolves_each_caller_with_its_own_response() {
    let (dispatcher, mut peer) = pair(ClientConfig::default());

    // Reply to requests strictly in arrival order, echoing the name each
    // frame carried. FIFO matching must route reply i to the caller whose
    // frame arrived i-th, whatever order the tasks were scheduled in.
    let server = tokio::spawn(async move {
        for _ in 0..3 {
            let request = recv(&mut peer).await;
            let name = request["name"].clone();
            peer.send(json!({"result": {"echo": name}})).await.unwrap();
        }
        peer
    });

    let mut callers = Vec::new();
    for name in ["alpha", "beta", "gamma"] {
        let dispatcher = Arc::clone(&dispatcher);
        callers.push(tokio::spawn(async move {
            let value = dispatcher.call(name, json!({})).await.unwrap();
            assert_eq!(value["echo"], json!(name));
        }));
    }

    for caller in callers {
        caller.await.unwrap();
    }
    server.await.unwrap();
}

#[tokio::test]
async fn end_to_end_navigate_then_channel_close() {
    let (dispatcher, mut peer) = pair(ClientConfig::default());

    let server = tokio::spawn(async move {
        let request = recv(&mut peer).await;
        assert_eq!(request["name"], json!("navigate"));
        peer.send(json!({"result": {"content": "ok"}})).await.unwrap();

        // Accept the second call but never answer it; just drop the channel.
        let request = recv(&mut peer).await;
        assert_eq!(request["name"], json!("read_page"));
    });

    let value = dispatcher
        .call("navigate", json!({"url": "https://example.com"}))
        .await
        .unwrap();
    assert_eq!(value["content"], json!("ok"));

    let pending = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.call("read_page", json!({})).await })
    };
    server.await.unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, CallError::ChannelClosed(_)));
    dispatcher.closed().cancelled().await;
    assert!(dispatcher.is_closed());
}

#[tokio::test]
async fn remote_error_payload_is_forwarded() {
    let (dispatcher, mut peer) = pair(ClientConfig::default());

    let server = tokio::spawn(async move {
        let _ = recv(&mut peer).await;
        peer.send(json!({"error": {"message": "element not found"}}))
            .await
            .unwrap();
        peer
    });

    let err = dispatcher.call("click", json!({"ref": "e7"})).await.unwrap_err();
    assert!(matches!(
        err,
        CallError::Remote(v) if v == json!({"message": "element not found"})
    ));
    server.await.unwrap();
}

#[tokio::test]
async fn orphan_notification_does_not_shift_matching() {
    let (dispatcher, mut peer) = pair(ClientConfig::default());

    let server = tokio::spawn(async move {
        // Unsolicited notification before any call is pending.
        peer.send(json!({"event": "console", "text": "hello"}))
            .await
            .unwrap();
        let _ = recv(&mut peer).await;
        peer.send(json!({"result": "real"})).await.unwrap();
        peer
    });

    // Give the orphan time to arrive and be discarded.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let value = dispatcher.call("ping", json!({})).await.unwrap();
    assert_eq!(value, json!("real"));
    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn timeout_evicts_one_entry_without_shifting_neighbors() {
    let (dispatcher, mut peer) = pair(ClientConfig::default());

    // Virtual schedule (default 60 s call timeout):
    //   t=0   alpha submitted, answered immediately
    //   t=1s  beta submitted, never answered  -> times out at t=61s
    //   t=30s gamma submitted                 -> would time out at t=90s
    //   t=70s peer answers gamma; beta is already evicted, so the reply
    //         must match gamma, not beta's old slot
    let server = tokio::spawn(async move {
        let request = recv(&mut peer).await;
        assert_eq!(request["name"], json!("alpha"));
        peer.send(json!({"result": {"echo": "alpha"}})).await.unwrap();

        let request = recv(&mut peer).await;
        assert_eq!(request["name"], json!("beta"));
        let request = recv(&mut peer).await;
        assert_eq!(request["name"], json!("gamma"));

        tokio::time::sleep(Duration::from_secs(40)).await;
        peer.send(json!({"result": {"echo": "gamma"}})).await.unwrap();
        peer
    });

    let alpha = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.call("alpha", json!({})).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    let beta = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.call("beta", json!({})).await })
    };
    tokio::time::sleep(Duration::from_secs(29)).await;
    let gamma = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.call("gamma", json!({})).await })
    };

    assert_eq!(alpha.await.unwrap().unwrap()["echo"], json!("alpha"));
    assert!(matches!(
        beta.await.unwrap().unwrap_err(),
        CallError::Timeout(d) if d == Duration::from_secs(60)
    ));
    assert_eq!(gamma.await.unwrap().unwrap()["echo"], json!("gamma"));
    server.await.unwrap();
}

#[tokio::test]
async fn concurrent_callers_trigger_exactly_one_bootstrap() {
    let config = ClientConfig {
        bootstrap: Some(BootstrapCall::new("create_group", json!({"kind": "workspace"}))),
        ..ClientConfig::default()
    };
    let (dispatcher, mut peer) = pair(config);

    let server = tokio::spawn(async move {
        let mut bootstraps = 0usize;
        for _ in 0..11 {
            let request = recv(&mut peer).await;
            if request["name"] == json!("create_group") {
                bootstraps += 1;
                peer.send(json!({"result": {"group": "g1"}})).await.unwrap();
            } else {
                assert_eq!(request["name"], json!("ping"));
                peer.send(json!({"result": request["args"]["i"].clone()}))
                    .await
                    .unwrap();
            }
        }
        bootstraps
    });

    let mut callers = Vec::new();
    for i in 0..10u64 {
        let dispatcher = Arc::clone(&dispatcher);
        callers.push(tokio::spawn(async move {
            let value = dispatcher.call("ping", json!({"i": i})).await.unwrap();
            assert_eq!(value, json!(i));
        }));
    }
    for caller in callers {
        caller.await.unwrap();
    }

    assert_eq!(server.await.unwrap(), 1);
    assert_eq!(dispatcher.context(), Some(json!({"group": "g1"})));
}

#[tokio::test]
async fn bootstrap_failure_surfaces_then_retries() {
    let config = ClientConfig {
        bootstrap: Some(BootstrapCall::new("create_group", json!({}))),
        ..ClientConfig::default()
    };
    let (dispatcher, mut peer) = pair(config);

    let server = tokio::spawn(async move {
        // First attempt is rejected by the remote.
        let request = recv(&mut peer).await;
        assert_eq!(request["name"], json!("create_group"));
        peer.send(json!({"error": {"message": "denied"}})).await.unwrap();

        // The retry succeeds, then the tool call itself is served.
        let request = recv(&mut peer).await;
        assert_eq!(request["name"], json!("create_group"));
        peer.send(json!({"result": {"group": "g2"}})).await.unwrap();

        let request = recv(&mut peer).await;
        assert_eq!(request["name"], json!("ping"));
        peer.send(json!({"result": "pong"})).await.unwrap();
        peer
    });

    let err = dispatcher.call("ping", json!({})).await.unwrap_err();
    assert!(matches!(err, CallError::InitFailed(_)));
    assert_eq!(dispatcher.context(), None);

    let value = dispatcher.call("ping", json!({})).await.unwrap();
    assert_eq!(value, json!("pong"));
    assert_eq!(dispatcher.context(), Some(json!({"group": "g2"})));
    server.await.unwrap();
}

#[tokio::test]
async fn oversized_length_prefix_closes_channel_and_rejects_pending() {
    let (dispatcher, mut peer) = pair(ClientConfig::default());

    let pending = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.call("ping", json!({})).await })
    };

    let _ = recv(&mut peer).await;
    // Declared length of 2_000_000 exceeds the 1 MiB cap: fatal.
    let raw = peer.get_mut();
    raw.write_all(&2_000_000u32.to_le_bytes()).await.unwrap();
    raw.write_all(b"{\"result\":null}").await.unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, CallError::ChannelClosed(_)));

    dispatcher.closed().cancelled().await;
    let err = dispatcher.call("ping", json!({})).await.unwrap_err();
    assert!(matches!(err, CallError::ChannelClosed(_)));
}
