//! # tsu-observe
//!
//! Request correlation, body capture, and structured access logs for HTTP
//! services running behind a reverse proxy.
//!
//! ## What it does
//!
//! Every request passes through one pipeline:
//!
//! ```text
//! RequestId → Recover → LogRequestBody → Logger → LogResponseBody → handler
//! ```
//!
//! - **Correlation**: `X-Request-Id` is reused when the client (or the proxy)
//!   sends one and generated otherwise, then echoed on the response.
//! - **Recovery**: a panic in any later stage becomes a logged `500` with the
//!   correlation id attached; the process keeps serving.
//! - **Request body**: logged with the request headers, then replayed so the
//!   handler reads it untouched.
//! - **Summary**: one `api_summary` record per request with method, path,
//!   client IP, status, latency and service name.
//! - **Response body**: every byte the handler writes is mirrored into a side
//!   buffer by [`CaptureWriter`](middleware::CaptureWriter). Flushing and
//!   connection hijacking (websocket-style upgrades) keep working through it.
//!
//! A [`Skipper`](middleware::Skipper) keeps chosen paths (health probes,
//! metrics scrapes) out of the logs.
//!
//! What the proxy in front already owns (TLS, rate limiting, body-size
//! limits) is left to it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use tsu_observe::middleware::Skipper;
//! use tsu_observe::{App, BoxFuture, HandlerResult, Request, ResponseWriter, Router, Server, health};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::new()
//!         .post("/orders", create_order)
//!         .get("/healthz", health::liveness);
//!
//!     let app = App::observed(router, "orders", Skipper::new(["/healthz"]));
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! fn create_order<'a>(req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
//!     Box::pin(async move {
//!         let order = req.bytes().await?;
//!         if order.is_empty() {
//!             return Err(tsu_observe::HttpError::bad_request("empty order", "").into());
//!         }
//!         w.json(StatusCode::CREATED, br#"{"ok":true}"#).await
//!     })
//! }
//! ```

mod app;
mod handler;
mod request;
mod router;
mod server;
mod transport;
mod writer;

pub mod config;
pub mod error;
pub mod health;
pub mod middleware;
pub mod testing;

pub use app::App;
pub use error::{Capability, Error, HttpError};
pub use handler::{BoxFuture, Handler, HandlerResult};
pub use request::{Body, Request};
pub use router::Router;
pub use server::{DEFAULT_GRACE_PERIOD, Server, shutdown_signal};
pub use writer::{ContentType, Flush, Hijack, ResponseWriter, Upgrade};
