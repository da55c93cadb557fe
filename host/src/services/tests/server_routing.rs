//! Server queue and routing tests against a mocked registry

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use shared::{decode_frame, ClientId, CorrelationId, Frame, DEFAULT_MAX_FRAME_BYTES};

use crate::error::HostError;
use crate::server::Server;
use crate::services::EchoHandler;
use crate::traits::{MockClientRegistry, MockRequestHandler};
use crate::types::Envelope;

type TestServer = Server<String, String>;

fn request(client: ClientId, id: u64, body: &str) -> Envelope<String> {
    Envelope::new(client, CorrelationId::new(id), body.to_string())
}

/// Registry that knows exactly one client
fn registry_with(client: ClientId, tx: mpsc::UnboundedSender<Vec<u8>>) -> MockClientRegistry {
    let mut registry = MockClientRegistry::new();
    registry
        .expect_sender_for()
        .returning(move |id| Ok((id == client).then(|| tx.clone())));
    registry
}

#[tokio::test]
async fn test_queue_checks_and_peek() {
    let server: TestServer = Server::with_registry(Arc::new(MockClientRegistry::new()));
    let client = ClientId::new();

    assert!(!server.has_request().await);
    assert!(!server.has_response().await);

    server.queue_request(request(client, 1, "first")).await;
    server.queue_response(client, CorrelationId::new(1), "answer".to_string()).await;

    assert!(server.has_request().await);
    assert!(server.has_request_from(client).await);
    assert!(!server.has_request_from(ClientId::new()).await);
    assert!(server.has_response().await);
    assert_eq!(server.peek_request().await.unwrap().message, "first");
    assert_eq!(server.peek_response().await.unwrap().message, "answer");
    assert_eq!(server.pending_requests().await, 1);
}

#[tokio::test]
async fn test_send_response_routes_to_recorded_client() {
    let addressed = ClientId::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server: TestServer = Server::with_registry(Arc::new(registry_with(addressed, tx)));

    server
        .queue_response(addressed, CorrelationId::new(7), "for you".to_string())
        .await;
    let written_to = server.send_response(None).await.unwrap();

    assert_eq!(written_to, Some(addressed));
    let frame: Frame<String> = decode_frame(&rx.recv().await.unwrap(), DEFAULT_MAX_FRAME_BYTES).unwrap();
    assert_eq!(frame.correlation, CorrelationId::new(7));
    assert_eq!(frame.body, "for you");
    assert!(!server.has_response().await);
}

#[tokio::test]
async fn test_send_response_with_target_skips_other_clients() {
    let wanted = ClientId::new();
    let other = ClientId::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server: TestServer = Server::with_registry(Arc::new(registry_with(wanted, tx)));

    server.queue_response(other, CorrelationId::new(1), "other".to_string()).await;
    server.queue_response(wanted, CorrelationId::new(2), "wanted".to_string()).await;

    assert_eq!(server.send_response(Some(wanted)).await.unwrap(), Some(wanted));
    let frame: Frame<String> = decode_frame(&rx.recv().await.unwrap(), DEFAULT_MAX_FRAME_BYTES).unwrap();
    assert_eq!(frame.body, "wanted");

    assert_eq!(server.peek_response().await.unwrap().client, other);
}

#[tokio::test]
async fn test_send_response_with_nothing_queued() {
    let server: TestServer = Server::with_registry(Arc::new(MockClientRegistry::new()));

    assert_eq!(server.send_response(None).await.unwrap(), None);
}

#[tokio::test]
async fn test_send_response_to_departed_client_errors() {
    let departed = ClientId::new();
    let mut registry = MockClientRegistry::new();
    registry.expect_sender_for().returning(|_| Ok(None));
    let server: TestServer = Server::with_registry(Arc::new(registry));

    server.queue_response(departed, CorrelationId::new(1), "lost".to_string()).await;
    let result = server.send_response(None).await;

    assert!(matches!(result, Err(HostError::ClientNotFound { client_id }) if client_id == departed));
    assert!(!server.has_response().await);
}

#[tokio::test]
async fn test_next_request_times_out() {
    let server: TestServer = Server::with_registry(Arc::new(MockClientRegistry::new()));

    let result = server.next_request(Duration::from_millis(20)).await;

    assert!(matches!(result, Err(HostError::RequestTimeout { .. })));
}

#[tokio::test]
async fn test_handle_next_echoes_back_with_correlation() {
    let client = ClientId::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server: TestServer = Server::with_registry(Arc::new(registry_with(client, tx)));

    server.queue_request(request(client, 11, "echo me")).await;
    let answered = server
        .handle_next(&EchoHandler, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(answered, client);
    let frame: Frame<String> = decode_frame(&rx.recv().await.unwrap(), DEFAULT_MAX_FRAME_BYTES).unwrap();
    assert_eq!(frame.correlation, CorrelationId::new(11));
    assert_eq!(frame.body, "echo me");
}

#[tokio::test]
async fn test_handle_next_propagates_handler_error() {
    let client = ClientId::new();
    let server: TestServer = Server::with_registry(Arc::new(MockClientRegistry::new()));
    let mut handler = MockRequestHandler::<String, String>::new();
    handler
        .expect_handle()
        .times(1)
        .returning(|_, _| Err(HostError::handler("engine busy")));

    server.queue_request(request(client, 1, "work")).await;
    let result = server.handle_next(&handler, Duration::from_secs(1)).await;

    assert!(matches!(result, Err(HostError::HandlerError { .. })));
    assert!(!server.has_response().await);
}

#[tokio::test]
async fn test_handle_next_runs_on_spawned_task_with_mock_handler() {
    let client = ClientId::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server: Arc<TestServer> = Arc::new(Server::with_registry(Arc::new(registry_with(client, tx))));
    let mut handler = MockRequestHandler::<String, String>::new();
    handler
        .expect_handle()
        .times(1)
        .returning(|_, request| Ok(request.to_uppercase()));
    let handler = Arc::new(handler);

    let worker = {
        let server = server.clone();
        let handler = handler.clone();
        tokio::spawn(async move { server.handle_next(handler.as_ref(), Duration::from_secs(1)).await })
    };
    server.queue_request(request(client, 3, "shout")).await;

    assert_eq!(worker.await.unwrap().unwrap(), client);
    let frame: Frame<String> = decode_frame(&rx.recv().await.unwrap(), DEFAULT_MAX_FRAME_BYTES).unwrap();
    assert_eq!(frame.correlation, CorrelationId::new(3));
    assert_eq!(frame.body, "SHOUT");
}

#[tokio::test]
async fn test_forward_request_relays_to_target() {
    let origin = ClientId::new();
    let engine = ClientId::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server: TestServer = Server::with_registry(Arc::new(registry_with(engine, tx)));

    server.queue_request(request(origin, 5, "relay")).await;
    let from = server.forward_request(engine).await.unwrap();

    assert_eq!(from, Some(origin));
    let frame: Frame<String> = decode_frame(&rx.recv().await.unwrap(), DEFAULT_MAX_FRAME_BYTES).unwrap();
    assert_eq!(frame.correlation, CorrelationId::new(5));
    assert_eq!(frame.body, "relay");
}

#[tokio::test]
async fn test_pop_request_from_leaves_others() {
    let server: TestServer = Server::with_registry(Arc::new(MockClientRegistry::new()));
    let a = ClientId::new();
    let b = ClientId::new();

    server.queue_request(request(a, 1, "a1")).await;
    server.queue_request(request(b, 1, "b1")).await;

    assert_eq!(server.pop_request_from(b).await.unwrap().message, "b1");
    assert_eq!(server.pop_request().await.unwrap().message, "a1");
    assert!(server.pop_request().await.is_none());
}
