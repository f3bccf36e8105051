//! Geyser Transport Integration Tests
//!
//! Runs the transport against an in-process `geyser.Geyser/Subscribe` server
//! and checks the requests it writes and the events its reader reports.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::codegen::{Body, BoxFuture, Service, StdError, http};
use tonic::server::{Grpc, NamedService, StreamingService};
use tonic::transport::Server;
use tonic::{Code, Request, Response, Status, Streaming};

use wallet_watcher::infrastructure::geyser::proto::{self, subscribe_update::UpdateOneof};
use wallet_watcher::{
    GeyserSettings, GeyserTransport, KeepaliveSettings, SessionEvent, SessionEventKind,
    SessionEventSink, StreamHandle, StreamTransport, TransportError, build_ping,
    build_subscribe,
};

// =============================================================================
// Stub server
// =============================================================================

type UpdateStream =
    Pin<Box<dyn tokio_stream::Stream<Item = Result<proto::SubscribeUpdate, Status>> + Send>>;

/// What the server does with each `Subscribe` call.
#[derive(Clone)]
enum Script {
    /// Send the updates, then finish the stream.
    Finish(Vec<proto::SubscribeUpdate>),
    /// Fail the stream with a status.
    Fail(Code, &'static str),
    /// Record requests until the client half-closes.
    Hold,
}

#[derive(Default)]
struct Received {
    requests: Vec<proto::SubscribeRequest>,
    tokens: Vec<Option<String>>,
}

#[derive(Clone)]
struct StubGeyser {
    script: Script,
    received: Arc<Mutex<Received>>,
    request_seen: mpsc::UnboundedSender<()>,
}

impl StreamingService<proto::SubscribeRequest> for StubGeyser {
    type Response = proto::SubscribeUpdate;
    type ResponseStream = UpdateStream;
    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<Streaming<proto::SubscribeRequest>>) -> Self::Future {
        let stub = self.clone();
        Box::pin(async move {
            let token = request
                .metadata()
                .get("x-token")
                .and_then(|value| value.to_str().ok())
                .map(String::from);
            stub.received.lock().tokens.push(token);

            let mut inbound = request.into_inner();
            let (tx, rx) = mpsc::channel(16);

            tokio::spawn(async move {
                match stub.script {
                    Script::Finish(updates) => {
                        for update in updates {
                            let _ = tx.send(Ok(update)).await;
                        }
                    }
                    Script::Fail(code, message) => {
                        let _ = tx.send(Err(Status::new(code, message))).await;
                    }
                    Script::Hold => {
                        while let Ok(Some(request)) = inbound.message().await {
                            stub.received.lock().requests.push(request);
                            let _ = stub.request_seen.send(());
                        }
                        drop(tx);
                    }
                }
            });

            Ok(Response::new(Box::pin(ReceiverStream::new(rx)) as UpdateStream))
        })
    }
}

impl<B> Service<http::Request<B>> for StubGeyser
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::Body>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        if req.uri().path() != "/geyser.Geyser/Subscribe" {
            return Box::pin(async { Ok(Status::unimplemented("unknown method").into_http()) });
        }

        let method = self.clone();
        Box::pin(async move {
            let mut grpc = Grpc::new(tonic_prost::ProstCodec::default());
            Ok(grpc.streaming(method, req).await)
        })
    }
}

impl NamedService for StubGeyser {
    const NAME: &'static str = "geyser.Geyser";
}

struct StubServer {
    url: String,
    received: Arc<Mutex<Received>>,
    request_seen: mpsc::UnboundedReceiver<()>,
}

/// Start a stub server on a random port.
async fn serve(script: Script) -> StubServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let received = Arc::new(Mutex::new(Received::default()));
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let stub = StubGeyser {
        script,
        received: Arc::clone(&received),
        request_seen: seen_tx,
    };

    tokio::spawn(async move {
        Server::builder()
            .add_service(stub)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    StubServer {
        url: format!("http://{addr}"),
        received,
        request_seen: seen_rx,
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn transport(url: &str, token: Option<&str>) -> GeyserTransport {
    let settings = GeyserSettings::new(
        url.to_string(),
        token.map(String::from),
        KeepaliveSettings::default(),
    );
    GeyserTransport::new(&settings, 1).unwrap()
}

fn sink(generation: u64) -> (SessionEventSink, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SessionEventSink::new(0, generation, tx), rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Option<SessionEvent> {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
}

async fn next_kind(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEventKind {
    next_event(rx).await.expect("event queue open").kind
}

fn transaction(slot: u64, signature: &[u8], key: [u8; 32]) -> proto::SubscribeUpdate {
    proto::SubscribeUpdate {
        filters: vec!["t".to_string()],
        update_oneof: Some(UpdateOneof::Transaction(proto::SubscribeUpdateTransaction {
            slot,
            transaction: Some(proto::SubscribeUpdateTransactionInfo {
                signature: signature.to_vec(),
                is_vote: false,
                transaction: Some(proto::Transaction {
                    signatures: vec![signature.to_vec()],
                    message: Some(proto::Message {
                        account_keys: vec![key.to_vec()],
                    }),
                }),
                index: 0,
            }),
        })),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn requests_reach_server_with_token() {
    let mut server = serve(Script::Hold).await;
    let transport = transport(&server.url, Some("secret-token"));
    let (events, mut rx) = sink(3);

    let mut handle = transport.open(0, events).await.unwrap();
    handle
        .send(build_subscribe(&["A".to_string(), "B".to_string()]))
        .await
        .unwrap();
    handle.send(build_ping()).await.unwrap();
    for _ in 0..2 {
        timeout(Duration::from_secs(5), server.request_seen.recv())
            .await
            .expect("request within timeout")
            .unwrap();
    }

    {
        let received = server.received.lock();
        assert_eq!(received.tokens, vec![Some("secret-token".to_string())]);

        let subscribe = &received.requests[0];
        assert_eq!(subscribe.transactions["t"].account_include, ["A", "B"]);
        assert_eq!(subscribe.transactions["t"].vote, Some(false));
        assert_eq!(
            subscribe.commitment,
            Some(proto::CommitmentLevel::Processed as i32)
        );

        let ping = &received.requests[1];
        assert_eq!(ping.ping, Some(proto::SubscribeRequestPing { id: 1 }));
        assert!(ping.transactions.is_empty());
        assert!(ping.commitment.is_none());
    }

    handle.destroy().await.unwrap();

    let closed = next_event(&mut rx).await.unwrap();
    assert_eq!(closed.slot, 0);
    assert_eq!(closed.generation, 3);
    assert_eq!(closed.kind, SessionEventKind::Close);
    assert!(next_event(&mut rx).await.is_none());
}

#[tokio::test]
async fn server_finish_reports_end_then_close() {
    let server = serve(Script::Finish(vec![
        transaction(42, &[1, 2, 3], [0; 32]),
        proto::SubscribeUpdate {
            filters: Vec::new(),
            update_oneof: Some(UpdateOneof::Pong(proto::SubscribeUpdatePong { id: 1 })),
        },
    ]))
    .await;
    let transport = transport(&server.url, None);
    let (events, mut rx) = sink(1);

    let _handle = transport.open(0, events).await.unwrap();

    match next_kind(&mut rx).await {
        SessionEventKind::Data(notification) => {
            assert_eq!(notification.slot, 42);
            assert_eq!(notification.signature.as_deref(), Some("Ldp"));
            assert_eq!(notification.accounts, ["11111111111111111111111111111111"]);
        }
        other => panic!("expected data, got {other:?}"),
    }
    assert_eq!(next_kind(&mut rx).await, SessionEventKind::End);
    assert_eq!(next_kind(&mut rx).await, SessionEventKind::Close);
    assert!(next_event(&mut rx).await.is_none());
    assert_eq!(server.received.lock().tokens, vec![None]);
}

#[tokio::test]
async fn server_error_reports_error_then_close() {
    let server = serve(Script::Fail(Code::Unavailable, "node restarting")).await;
    let transport = transport(&server.url, None);
    let (events, mut rx) = sink(1);

    let _handle = transport.open(0, events).await.unwrap();

    assert_eq!(
        next_kind(&mut rx).await,
        SessionEventKind::Error(TransportError::new("UNAVAILABLE", "node restarting"))
    );
    assert_eq!(next_kind(&mut rx).await, SessionEventKind::Close);
    assert!(next_event(&mut rx).await.is_none());
}

#[tokio::test]
async fn finished_stream_can_still_be_destroyed() {
    let server = serve(Script::Finish(Vec::new())).await;
    let transport = transport(&server.url, None);
    let (events, mut rx) = sink(1);

    let mut handle = transport.open(0, events).await.unwrap();

    assert_eq!(next_kind(&mut rx).await, SessionEventKind::End);
    assert_eq!(next_kind(&mut rx).await, SessionEventKind::Close);
    handle.destroy().await.unwrap();
    assert_eq!(handle.send(build_ping()).await.unwrap_err().code, "UNAVAILABLE");
}

#[tokio::test]
async fn unreachable_endpoint_is_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = transport(&format!("http://{addr}"), None);
    let (events, _rx) = sink(1);

    let err = transport.open(0, events).await.unwrap_err();
    assert_eq!(err.code, "UNAVAILABLE");
}
