//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Probes hit these paths every few seconds; list them in the
//! [`Skipper`](crate::middleware::Skipper) so they stay out of the access log:
//!
//! ```rust
//! use tsu_observe::{App, Router, health};
//! use tsu_observe::middleware::Skipper;
//!
//! let router = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! let app = App::observed(router, "orders", Skipper::new(["/healthz", "/readyz"]));
//! ```

use http::StatusCode;

use crate::handler::{BoxFuture, HandlerResult};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Liveness probe. Always `200 OK` with body `"ok"`.
pub fn liveness<'a>(_req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move { w.text(StatusCode::OK, "ok").await })
}

/// Readiness probe (default implementation). `200 OK` with body `"ready"`.
///
/// Register your own handler instead when readiness depends on a database or
/// a downstream service.
pub fn readiness<'a>(_req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move { w.text(StatusCode::OK, "ready").await })
}
