use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use http::StatusCode;
use http::header::{CONNECTION, HeaderValue, UPGRADE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tsu_observe::middleware::Skipper;
use tsu_observe::{App, BoxFuture, Error, HandlerResult, Request, ResponseWriter, Router, Server, health};

// ── Handlers ──────────────────────────────────────────────────────────────────

fn create_order<'a>(req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let order = req.bytes().await?;
        w.json(StatusCode::CREATED, &order).await
    })
}

fn stream<'a>(_req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        w.write_all(b"first").await?;
        w.try_flush().await?;
        tokio::time::sleep(Duration::from_millis(150)).await;
        w.write_all(b"second").await?;
        Ok(())
    })
}

fn slow<'a>(_req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        w.text(StatusCode::OK, "done").await
    })
}

static STUCK_FINISHED: AtomicBool = AtomicBool::new(false);

fn stuck<'a>(_req: &'a mut Request, _w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        tokio::time::sleep(Duration::from_millis(600)).await;
        STUCK_FINISHED.store(true, Ordering::SeqCst);
        Ok(())
    })
}

static FIREHOSE_ACCEPTED: AtomicUsize = AtomicUsize::new(0);

// Streams 64 KiB chunks until 256 MiB have gone out or the client is gone.
fn firehose<'a>(_req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let chunk = vec![b'x'; 64 * 1024];
        while FIREHOSE_ACCEPTED.load(Ordering::SeqCst) < 256 * 1024 * 1024 {
            w.write_all(&chunk).await?;
            w.try_flush().await?;
            FIREHOSE_ACCEPTED.fetch_add(chunk.len(), Ordering::SeqCst);
        }
        Ok(())
    })
}

// Answers whether the body was still unread when the handler got it.
fn body_kind<'a>(req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let body = req.take_body();
        let kind = if body.is_streaming() { "streaming" } else { "buffered" };
        let bytes = body.collect().await?;
        w.text(StatusCode::OK, &format!("{kind}:{}", bytes.len())).await
    })
}

fn boom<'a>(_req: &'a mut Request, _w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move { panic!("secret connection string leaked") })
}

fn echo_upgrade<'a>(_req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        w.headers_mut().insert(CONNECTION, HeaderValue::from_static("upgrade"));
        w.headers_mut().insert(UPGRADE, HeaderValue::from_static("tsu-echo"));
        let upgrade = w.try_hijack()?;

        let mut conn = upgrade.connection().await?;
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await?;
        if &buf == b"ping" {
            conn.write_all(b"pong").await?;
        }
        conn.flush().await?;
        Ok(())
    })
}

fn app() -> App {
    let router = Router::new()
        .post("/orders", create_order)
        .get("/stream", stream)
        .get("/slow", slow)
        .get("/stuck", stuck)
        .get("/boom", boom)
        .get("/ws", echo_upgrade)
        .get("/firehose", firehose)
        .post("/ingest", body_kind)
        .post("/inspect", body_kind)
        .get("/healthz", health::liveness);
    App::observed(router, "orders-api", Skipper::new(["/healthz", "/firehose", "/ingest"]))
}

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), Error>>,
}

async fn start(grace: Duration) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(
        Server::from_listener(listener)
            .grace_period(grace)
            .serve_with_shutdown(app(), async {
                let _ = stopped.await;
            }),
    );
    Running { addr, stop, handle }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn request_id_round_trip() {
    let server = start(Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("http://{}/orders", server.addr))
        .header("x-request-id", "abc-123")
        .body(r#"{"id":1}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 201);
    assert_eq!(res.headers()["x-request-id"], "abc-123");
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(res.bytes().await.unwrap(), r#"{"id":1}"#);

    let res = client.get(format!("http://{}/healthz", server.addr)).send().await.unwrap();
    assert!(!res.headers()["x-request-id"].is_empty());

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn flushed_bytes_arrive_before_the_handler_returns() {
    let server = start(Duration::from_secs(5)).await;

    let mut res = reqwest::get(format!("http://{}/stream", server.addr)).await.unwrap();
    assert_eq!(res.status().as_u16(), 200);

    let first = res.chunk().await.unwrap().unwrap();
    assert_eq!(first, "first");
    let mut rest = Vec::new();
    while let Some(chunk) = res.chunk().await.unwrap() {
        rest.extend_from_slice(&chunk);
    }
    assert_eq!(rest, b"second");

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn skipped_route_gets_the_body_straight_from_the_wire() {
    let server = start(Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("http://{}/ingest", server.addr))
        .body("0123456789")
        .send()
        .await
        .unwrap();
    assert_eq!(res.bytes().await.unwrap(), "streaming:10");

    let res = client
        .post(format!("http://{}/inspect", server.addr))
        .body("0123456789")
        .send()
        .await
        .unwrap();
    assert_eq!(res.bytes().await.unwrap(), "buffered:10");

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn client_that_stops_reading_stalls_the_handler() {
    let server = start(Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /firehose HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    // Never read. Only socket buffers and a few queued chunks may fill up.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let accepted = FIREHOSE_ACCEPTED.load(Ordering::SeqCst);
    assert!(accepted > 0, "handler never started streaming");
    assert!(accepted < 32 * 1024 * 1024, "{accepted} bytes accepted for a client that read nothing");

    drop(stream);
    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn panic_returns_a_generic_500_and_keeps_serving() {
    let server = start(Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let res = client.get(format!("http://{}/boom", server.addr)).send().await.unwrap();
    assert_eq!(res.status().as_u16(), 500);
    assert!(!res.headers()["x-request-id"].is_empty());
    let body: serde_json::Value = serde_json::from_slice(&res.bytes().await.unwrap()).unwrap();
    assert_eq!(body["code"], "80000");
    assert!(!body.to_string().contains("secret"));

    let res = client.get(format!("http://{}/healthz", server.addr)).send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn unknown_route_is_a_json_404() {
    let server = start(Duration::from_secs(5)).await;

    let res = reqwest::get(format!("http://{}/missing", server.addr)).await.unwrap();
    assert_eq!(res.status().as_u16(), 404);
    assert!(res.headers().contains_key("x-request-id"));
    let body: serde_json::Value = serde_json::from_slice(&res.bytes().await.unwrap()).unwrap();
    assert_eq!(body["code"], "20004");

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn hijacked_connection_speaks_raw_bytes() {
    let server = start(Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    stream
        .write_all(b"GET /ws HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: tsu-echo\r\n\r\n")
        .await
        .unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let head = String::from_utf8(head).unwrap();
    assert!(head.starts_with("HTTP/1.1 101"), "{head}");
    assert!(head.to_ascii_lowercase().contains("x-request-id"));

    stream.write_all(b"ping").await.unwrap();
    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"pong");

    drop(stream);
    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_lets_in_flight_requests_finish() {
    let server = start(Duration::from_secs(5)).await;
    let url = format!("http://{}/slow", server.addr);

    let in_flight = tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    server.stop.send(()).unwrap();

    let res = in_flight.await.unwrap().unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.bytes().await.unwrap(), "done");
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_aborts_after_the_grace_period() {
    let server = start(Duration::from_millis(100)).await;
    let url = format!("http://{}/stuck", server.addr);

    let in_flight = tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    server.stop.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(2), server.handle)
        .await
        .expect("server did not stop after the grace period")
        .unwrap()
        .unwrap();
    assert!(in_flight.await.unwrap().is_err());

    // The handler was aborted with its connection, not left running.
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(!STUCK_FINISHED.load(Ordering::SeqCst));
}
