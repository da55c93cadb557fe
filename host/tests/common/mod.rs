//! Common test utilities for host integration tests

use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use host::Server;
use shared::{decode_frame, encode_frame, CorrelationId, Frame, ServerConfig, DEFAULT_MAX_FRAME_BYTES};

pub type TestServer = Server<String, String>;
pub type TestSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Loopback config on an ephemeral port
pub fn test_config() -> ServerConfig {
    ServerConfig::default().with_port(0)
}

pub async fn start_server(config: ServerConfig) -> (TestServer, SocketAddr) {
    let server = TestServer::new().unwrap();
    let addr = server.listen(config).await.unwrap();
    (server, addr)
}

pub async fn connect_client(addr: SocketAddr) -> TestSocket {
    let (socket, _) = connect_async(format!("ws://{addr}/sc2api")).await.unwrap();
    socket
}

pub async fn send_frame(socket: &mut TestSocket, id: u64, body: &str) {
    let bytes = encode_frame(
        &Frame::new(CorrelationId::new(id), body.to_string()),
        DEFAULT_MAX_FRAME_BYTES,
    )
    .unwrap();
    socket.send(Message::Binary(bytes)).await.unwrap();
}

pub async fn recv_frame(socket: &mut TestSocket) -> Frame<String> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("no frame within 2s")
            .expect("socket ended")
            .unwrap();
        if let Message::Binary(bytes) = message {
            return decode_frame(&bytes, DEFAULT_MAX_FRAME_BYTES).unwrap();
        }
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
