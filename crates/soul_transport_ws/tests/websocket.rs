use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use soul_transport::{
    said, AuthTokenError, ConnectOptions, Listener, SaysBody, SaysEvent, SoulConnection,
    SoulConnector, TokenSource, TransportError, USER_SPEAKER,
};
use soul_transport_ws::WebSocketConnector;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

struct FixedToken(Result<String, AuthTokenError>);

#[async_trait]
impl TokenSource for FixedToken {
    async fn fetch_token(&self, _soul_id: &str) -> Result<String, AuthTokenError> {
        self.0.clone()
    }
}

fn options() -> ConnectOptions {
    ConnectOptions {
        organization: "acme".to_string(),
        blueprint: "samantha".to_string(),
        soul_id: "chat-1".to_string(),
    }
}

fn token(value: &str) -> Arc<dyn TokenSource> {
    Arc::new(FixedToken(Ok(value.to_string())))
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let address = listener.local_addr().expect("local addr");
    (listener, format!("ws://{address}"))
}

async fn accept(listener: &TcpListener) -> WebSocketStream<tokio::net::TcpStream> {
    let (socket, _) = listener.accept().await.expect("accept");
    accept_async(socket).await.expect("websocket upgrade")
}

async fn next_json(ws: &mut WebSocketStream<tokio::net::TcpStream>) -> Value {
    loop {
        match ws.next().await.expect("frame").expect("read frame") {
            Message::Text(text) => return serde_json::from_str(&text).expect("json frame"),
            _ => continue,
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<tokio::net::TcpStream>, value: Value) {
    ws.send(Message::Text(value.to_string())).await.expect("send frame");
}

#[tokio::test]
async fn connect_sends_credentials_and_waits_for_ready() {
    let (listener, host) = bind().await;
    let (seen_tx, seen_rx) = oneshot::channel();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let connect = next_json(&mut ws).await;
        send_json(&mut ws, json!({"type": "ready"})).await;
        let _ = seen_tx.send(connect);
        let _ = ws.next().await;
    });

    let connection = WebSocketConnector::new(host).open(options(), token("tok-1"));
    connection.connect().await.expect("connect");

    let connect = seen_rx.await.expect("connect frame");
    assert_eq!(
        connect,
        json!({
            "type": "connect",
            "token": "tok-1",
            "organization": "acme",
            "blueprint": "samantha",
            "soulId": "chat-1"
        })
    );

    connection.disconnect().await.expect("disconnect");
    server.await.expect("server task");
}

#[tokio::test]
async fn streamed_says_frames_reach_listeners_in_order() {
    let (listener, host) = bind().await;
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _ = next_json(&mut ws).await;
        send_json(&mut ws, json!({"type": "ready"})).await;
        let _ = go_rx.await;
        send_json(&mut ws, json!({"type": "says", "id": "m1", "streaming": true})).await;
        for text in ["Hel", "lo, ", "world"] {
            send_json(&mut ws, json!({"type": "chunk", "id": "m1", "text": text})).await;
        }
        send_json(&mut ws, json!({"type": "end", "id": "m1"})).await;
        send_json(&mut ws, json!({"type": "presence", "users": 3})).await;
        send_json(
            &mut ws,
            json!({"type": "says", "id": "m2", "streaming": false, "content": "Full answer"}),
        )
        .await;
        let _ = ws.next().await;
    });

    let connection = WebSocketConnector::new(host).open(options(), token("tok"));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SaysEvent>();
    connection.subscribe(Listener::says(move |event| {
        let _ = events_tx.send(event);
    }));
    connection.connect().await.expect("connect");
    let _ = go_tx.send(());

    let streamed = events_rx.recv().await.expect("streaming event");
    assert!(streamed.is_streaming());
    let chunks: Vec<String> = streamed.chunks().expect("chunks").collect().await;
    assert_eq!(chunks, vec!["Hel", "lo, ", "world"]);

    let complete = events_rx.recv().await.expect("complete event");
    assert!(!complete.is_streaming());
    match complete.into_body() {
        SaysBody::Deferred(content) => assert_eq!(content.await, Ok("Full answer".to_string())),
        SaysBody::Streaming(_) => panic!("expected deferred body"),
    }

    connection.disconnect().await.expect("disconnect");
    server.await.expect("server task");
}

#[tokio::test]
async fn dispatch_writes_said_frame() {
    let (listener, host) = bind().await;
    let (seen_tx, seen_rx) = oneshot::channel();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _ = next_json(&mut ws).await;
        send_json(&mut ws, json!({"type": "ready"})).await;
        let dispatched = next_json(&mut ws).await;
        let _ = seen_tx.send(dispatched);
        let _ = ws.next().await;
    });

    let connection = WebSocketConnector::new(host).open(options(), token("tok"));
    connection.connect().await.expect("connect");
    connection
        .dispatch(said(USER_SPEAKER, "abc"))
        .await
        .expect("dispatch");

    assert_eq!(
        seen_rx.await.expect("dispatch frame"),
        json!({"type": "dispatch", "action": "said", "name": "User", "content": "abc"})
    );

    connection.disconnect().await.expect("disconnect");
    server.await.expect("server task");
}

#[tokio::test]
async fn rejected_handshake_reports_server_message() {
    let (listener, host) = bind().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _ = next_json(&mut ws).await;
        send_json(&mut ws, json!({"type": "error", "message": "unknown blueprint"})).await;
        let _ = ws.close(None).await;
    });

    let connection = WebSocketConnector::new(host).open(options(), token("tok"));
    let error = connection.connect().await.expect_err("handshake must fail");

    assert_eq!(error, TransportError::Handshake("unknown blueprint".to_string()));
    assert_eq!(
        connection.dispatch(said(USER_SPEAKER, "hi")).await,
        Err(TransportError::NotConnected)
    );
    server.await.expect("server task");
}

#[tokio::test]
async fn silent_server_hits_handshake_timeout() {
    let (listener, host) = bind().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _ = next_json(&mut ws).await;
        let _ = ws.next().await;
    });

    let connection = WebSocketConnector::new(host)
        .with_handshake_timeout(Duration::from_millis(200))
        .open(options(), token("tok"));
    let error = connection.connect().await.expect_err("handshake must time out");

    assert!(matches!(error, TransportError::Handshake(message) if message.contains("timed out")));
    server.abort();
}

#[tokio::test]
async fn token_failure_fails_before_opening_socket() {
    let (listener, host) = bind().await;
    drop(listener);

    let tokens: Arc<dyn TokenSource> = Arc::new(FixedToken(Err(AuthTokenError::new(
        "Failed to fetch auth token",
    ))));
    let connection = WebSocketConnector::new(host).open(options(), tokens);

    assert_eq!(
        connection.connect().await,
        Err(TransportError::Auth(AuthTokenError::new(
            "Failed to fetch auth token"
        )))
    );
}

#[tokio::test]
async fn unexpected_close_reaches_error_listeners() {
    let (listener, host) = bind().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _ = next_json(&mut ws).await;
        send_json(&mut ws, json!({"type": "ready"})).await;
        send_json(&mut ws, json!({"type": "error", "message": "soul crashed"})).await;
        let _ = ws.close(None).await;
    });

    let connection = WebSocketConnector::new(host).open(options(), token("tok"));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
    let sink = Arc::clone(&errors);
    connection.subscribe(Listener::error(move |error| {
        sink.lock().expect("errors lock").push(error.clone());
        let _ = done_tx.send(());
    }));
    connection.connect().await.expect("connect");

    done_rx.recv().await.expect("first error");
    done_rx.recv().await.expect("second error");

    assert_eq!(
        *errors.lock().expect("errors lock"),
        vec![
            TransportError::Server("soul crashed".to_string()),
            TransportError::Closed
        ]
    );
    server.await.expect("server task");
}

#[tokio::test]
async fn requested_disconnect_stays_silent() {
    let (listener, host) = bind().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _ = next_json(&mut ws).await;
        send_json(&mut ws, json!({"type": "ready"})).await;
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
    });

    let connection = WebSocketConnector::new(host).open(options(), token("tok"));
    let errors = Arc::new(Mutex::new(Vec::<TransportError>::new()));
    let sink = Arc::clone(&errors);
    connection.subscribe(Listener::error(move |error| {
        sink.lock().expect("errors lock").push(error.clone());
    }));
    connection.connect().await.expect("connect");
    connection.disconnect().await.expect("disconnect");
    connection.disconnect().await.expect("second disconnect is a no-op");

    server.await.expect("server task");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(errors.lock().expect("errors lock").is_empty());
    assert_eq!(connection.connect().await, Err(TransportError::Closed));
}
