//! Minimal observed service: JSON orders endpoint, a streaming feed, a raw
//! upgrade and the health probes.
//!
//! Run with:
//!   TSU_SERVICE=orders TSU_SKIP_PATHS=/healthz,/readyz cargo run --example basic
//!
//! Try:
//!   curl -X POST http://localhost:3000/orders \
//!        -H 'content-type: application/json' \
//!        -H 'x-request-id: demo-1' \
//!        -d '{"item":"coffee","qty":2}'
//!   curl -N http://localhost:3000/feed
//!   curl -i -H 'connection: upgrade' -H 'upgrade: echo' http://localhost:3000/echo
//!   curl http://localhost:3000/healthz     (served, not logged)

use std::time::Duration;

use http::StatusCode;
use http::header::{CONNECTION, HeaderValue, UPGRADE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;
use tsu_observe::config::Config;
use tsu_observe::{App, BoxFuture, HandlerResult, HttpError, Request, ResponseWriter, Router, Server, health};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    if config.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let router = Router::new()
        .post("/orders", create_order)
        .get("/feed", feed)
        .get("/echo", echo)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness);

    let app = App::observed(router, config.service.clone(), config.skipper());

    Server::bind(&config.addr())
        .grace_period(config.shutdown_grace())
        .serve(app)
        .await
        .expect("server error");
}

// POST /orders
//
// The body has already been logged by the time this runs; reading it here
// gets the same bytes.
fn create_order<'a>(req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let body = req.bytes().await?;
        if body.is_empty() {
            return Err(HttpError::bad_request("empty order", "request body is required").into());
        }
        w.json(StatusCode::CREATED, br#"{"id":"99","status":"accepted"}"#).await
    })
}

// GET /feed: one line every 200ms, each delivered as it is written.
fn feed<'a>(_req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        w.headers_mut()
            .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"));
        for tick in 0..5 {
            w.write_all(format!("{{\"tick\":{tick}}}\n").as_bytes()).await?;
            w.try_flush().await?;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(())
    })
}

// GET /echo with `Upgrade: echo`: echoes raw bytes until the client closes.
fn echo<'a>(_req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        w.headers_mut().insert(CONNECTION, HeaderValue::from_static("upgrade"));
        w.headers_mut().insert(UPGRADE, HeaderValue::from_static("echo"));
        let mut conn = w.try_hijack()?.connection().await?;

        let mut buf = [0u8; 1024];
        loop {
            let n = conn.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            conn.write_all(&buf[..n]).await?;
        }
    })
}
