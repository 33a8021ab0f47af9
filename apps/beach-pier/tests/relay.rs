use std::net::SocketAddr;
use std::time::Duration;

use beach_pier::{EndpointId, PierServer, PierState, ServerConfig};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

struct TestPier {
    addr: SocketAddr,
    state: PierState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestPier {
    async fn start() -> Self {
        let config = ServerConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        };
        let server = PierServer::bind(&config, None).await.expect("bind pier");
        let addr = server.local_addr();
        let state = server.state().clone();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.run(async move {
            let _ = rx.await;
        }));
        Self {
            addr,
            state,
            shutdown: Some(tx),
        }
    }

    async fn connect(&self) -> Socket {
        let (socket, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("websocket connect");
        socket
    }

    /// Connect and register, returning once the pier has bound the identifier.
    async fn client(&self, id: &str) -> Socket {
        let mut socket = self.connect().await;
        send(&mut socket, json!({"type": "register", "userId": id})).await;
        self.wait_until(|state| state.router().registry().resolve(&EndpointId::from(id)).is_some())
            .await;
        socket
    }

    async fn wait_until(&self, condition: impl Fn(&PierState) -> bool) {
        let deadline = Instant::now() + RECV_TIMEOUT;
        while !condition(&self.state) {
            assert!(Instant::now() < deadline, "condition not reached in time");
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn wait_unregistered(&self, id: &str) {
        self.wait_until(|state| state.router().registry().resolve(&EndpointId::from(id)).is_none())
            .await;
    }
}

impl Drop for TestPier {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn send(socket: &mut Socket, value: Value) {
    socket
        .send(Message::text(value.to_string()))
        .await
        .expect("send frame");
}

async fn recv(socket: &mut Socket) -> Value {
    serde_json::from_str(&recv_text(socket).await).expect("server sent JSON")
}

async fn recv_text(socket: &mut Socket) -> String {
    loop {
        let frame = timeout(RECV_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return text.as_str().to_string();
        }
    }
}

async fn assert_quiet(socket: &mut Socket) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(QUIET_PERIOD, socket.next()).await {
        panic!("unexpected frame: {}", text.as_str());
    }
}

#[tokio::test]
async fn offer_is_forwarded_to_registered_target() {
    let pier = TestPier::start().await;
    let mut alice = pier.client("alice").await;
    let mut bob = pier.client("bob").await;

    send(
        &mut alice,
        json!({"type": "offer", "targetUserId": "bob", "callerId": "alice", "sdp": {"type": "offer", "sdp": "v=0\r\n"}}),
    )
    .await;

    assert_eq!(
        recv(&mut bob).await,
        json!({"type": "offer", "callerId": "alice", "sdp": {"type": "offer", "sdp": "v=0\r\n"}})
    );
    assert_quiet(&mut alice).await;
}

#[tokio::test]
async fn offer_to_unregistered_target_reports_offline() {
    let pier = TestPier::start().await;
    let mut alice = pier.client("alice").await;
    let mut bob = pier.client("bob").await;

    send(
        &mut alice,
        json!({"type": "offer", "targetUserId": "carol", "callerId": "alice", "sdp": "S"}),
    )
    .await;

    assert_eq!(
        recv(&mut alice).await,
        json!({"type": "error_message", "message": "User is offline"})
    );
    assert_quiet(&mut bob).await;
}

#[tokio::test]
async fn answer_returns_to_caller() {
    let pier = TestPier::start().await;
    let mut alice = pier.client("alice").await;
    let mut bob = pier.client("bob").await;

    send(
        &mut bob,
        json!({"type": "answer", "callerId": "alice", "targetUserId": "bob", "sdp": "S2"}),
    )
    .await;

    assert_eq!(
        recv(&mut alice).await,
        json!({"type": "answer", "targetUserId": "bob", "sdp": "S2"})
    );
    assert_quiet(&mut bob).await;
}

#[tokio::test]
async fn ice_candidates_and_hangups_follow_the_target() {
    let pier = TestPier::start().await;
    let mut alice = pier.client("alice").await;
    let mut bob = pier.client("bob").await;

    send(
        &mut alice,
        json!({"type": "ice_candidate", "targetUserId": "bob", "senderId": "alice", "candidate": "X"}),
    )
    .await;
    assert_eq!(
        recv(&mut bob).await,
        json!({"type": "ice_candidate", "senderId": "alice", "candidate": "X"})
    );

    send(
        &mut bob,
        json!({"type": "end_call", "targetUserId": "alice", "senderId": "bob"}),
    )
    .await;
    assert_eq!(
        recv(&mut alice).await,
        json!({"type": "end_call", "senderId": "bob"})
    );
}

#[tokio::test]
async fn payloads_are_forwarded_byte_for_byte() {
    let pier = TestPier::start().await;
    let mut alice = pier.client("alice").await;
    let mut bob = pier.client("bob").await;

    let candidate = r#"{"sdpMid":"0","candidate":"c","id":12345678901234567890123}"#;
    alice
        .send(Message::text(format!(
            r#"{{"type":"ice_candidate","targetUserId":"bob","senderId":"alice","candidate":{candidate}}}"#
        )))
        .await
        .expect("send candidate");
    assert_eq!(
        recv_text(&mut bob).await,
        format!(r#"{{"type":"ice_candidate","senderId":"alice","candidate":{candidate}}}"#)
    );

    let sdp = r#"{ "type": "answer", "sdp": "v=0\r\no=- 9007199254740993 2 IN IP4 127.0.0.1" }"#;
    bob.send(Message::text(format!(
        r#"{{"type":"answer","callerId":"alice","targetUserId":"bob","sdp":{sdp}}}"#
    )))
    .await
    .expect("send answer");
    assert_eq!(
        recv_text(&mut alice).await,
        format!(r#"{{"type":"answer","targetUserId":"bob","sdp":{sdp}}}"#)
    );
}

#[tokio::test]
async fn signals_for_departed_peer_are_dropped_silently() {
    let pier = TestPier::start().await;
    let mut alice = pier.client("alice").await;
    let mut bob = pier.client("bob").await;

    bob.close(None).await.expect("close bob");
    pier.wait_unregistered("bob").await;

    send(
        &mut alice,
        json!({"type": "ice_candidate", "targetUserId": "bob", "senderId": "alice", "candidate": "X"}),
    )
    .await;
    send(
        &mut alice,
        json!({"type": "end_call", "targetUserId": "bob", "senderId": "alice"}),
    )
    .await;
    assert_quiet(&mut alice).await;

    // the connection is still usable after the drops
    send(
        &mut alice,
        json!({"type": "offer", "targetUserId": "bob", "callerId": "alice", "sdp": "S"}),
    )
    .await;
    assert_eq!(
        recv(&mut alice).await,
        json!({"type": "error_message", "message": "User is offline"})
    );
}

#[tokio::test]
async fn re_registration_moves_the_identifier() {
    let pier = TestPier::start().await;
    let mut alice = pier.client("alice").await;
    let mut old_bob = pier.connect().await;
    send(&mut old_bob, json!({"type": "register", "userId": "bob"})).await;
    pier.wait_until(|state| state.router().registry().len() == 2).await;

    let mut new_bob = pier.connect().await;
    let old_id = pier
        .state
        .router()
        .registry()
        .resolve(&EndpointId::from("bob"))
        .expect("bob registered")
        .id();
    send(&mut new_bob, json!({"type": "register", "userId": "bob"})).await;
    pier.wait_until(|state| {
        state
            .router()
            .registry()
            .resolve(&EndpointId::from("bob"))
            .map(|handle| handle.id() != old_id)
            .unwrap_or(false)
    })
    .await;

    send(
        &mut alice,
        json!({"type": "offer", "targetUserId": "bob", "callerId": "alice", "sdp": "S"}),
    )
    .await;
    assert_eq!(
        recv(&mut new_bob).await,
        json!({"type": "offer", "callerId": "alice", "sdp": "S"})
    );
    assert_quiet(&mut old_bob).await;

    // the superseded connection is still open and can still send
    send(
        &mut old_bob,
        json!({"type": "end_call", "targetUserId": "alice", "senderId": "bob"}),
    )
    .await;
    assert_eq!(
        recv(&mut alice).await,
        json!({"type": "end_call", "senderId": "bob"})
    );

    // and its departure leaves the newer binding alone
    old_bob.close(None).await.expect("close old bob");
    pier.wait_until(|state| state.active_connections() == 2).await;
    assert!(pier
        .state
        .router()
        .registry()
        .resolve(&EndpointId::from("bob"))
        .is_some());
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let pier = TestPier::start().await;
    let mut alice = pier.client("alice").await;
    let mut bob = pier.client("bob").await;

    alice
        .send(Message::text("this is not json".to_string()))
        .await
        .expect("send garbage");
    send(&mut alice, json!({"type": "offer", "callerId": "alice", "sdp": "S"})).await;
    send(&mut alice, json!({"type": "dance", "targetUserId": "bob"})).await;
    assert_quiet(&mut alice).await;
    assert_quiet(&mut bob).await;

    alice
        .send(Message::binary(
            json!({"type": "offer", "targetUserId": "bob", "callerId": "alice", "sdp": "S"})
                .to_string()
                .into_bytes(),
        ))
        .await
        .expect("send binary offer");
    assert_eq!(
        recv(&mut bob).await,
        json!({"type": "offer", "callerId": "alice", "sdp": "S"})
    );
}

#[tokio::test]
async fn unregistered_connection_can_relay_and_disconnect_cleanly() {
    let pier = TestPier::start().await;
    let mut bob = pier.client("bob").await;
    let mut anonymous = pier.connect().await;

    send(
        &mut anonymous,
        json!({"type": "ice_candidate", "targetUserId": "bob", "senderId": "ghost", "candidate": "X"}),
    )
    .await;
    assert_eq!(
        recv(&mut bob).await,
        json!({"type": "ice_candidate", "senderId": "ghost", "candidate": "X"})
    );

    anonymous.close(None).await.expect("close anonymous");
    pier.wait_until(|state| state.active_connections() == 1).await;
    assert_eq!(pier.state.router().registry().len(), 1);
}

#[tokio::test]
async fn banner_and_health_endpoints_respond() {
    let pier = TestPier::start().await;

    let banner = http_get(pier.addr, "/").await;
    assert!(banner.starts_with("HTTP/1.1 200"));
    assert!(banner.contains("Beach Pier signaling server is running."));

    let health = http_get(pier.addr, "/healthz").await;
    assert!(health.contains(r#"{"status":"ok"}"#));

    let _alice = pier.client("alice").await;
    let stats = http_get(pier.addr, "/stats").await;
    assert!(stats.contains(r#""registered_endpoints":1"#));
    assert!(!stats.contains("alice"));

    let metrics = http_get(pier.addr, "/metrics").await;
    assert!(metrics.starts_with("HTTP/1.1 404"));
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("tcp connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("write request");
    let mut response = Vec::new();
    timeout(RECV_TIMEOUT, stream.read_to_end(&mut response))
        .await
        .expect("response timed out")
        .expect("read response");
    String::from_utf8(response).expect("utf-8 response")
}
