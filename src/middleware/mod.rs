//! Middleware layer.
//!
//! Middleware intercepts a request on its way to the handler and the response
//! on its way back. Each middleware receives the request, the response
//! writer, and [`Next`], the rest of the chain, and decides what to do before
//! and after calling it.
//!
//! # Built-in middleware
//!
//! | Middleware | Does |
//! |---|---|
//! | [`RequestId`] | reuses or generates the `X-Request-Id` correlation id |
//! | [`Recover`] | turns a downstream panic into a logged `500` |
//! | [`LogRequestBody`] | logs headers and body, then replays the body |
//! | [`Logger`] | logs one `api_summary` record per request |
//! | [`LogResponseBody`] | mirrors every written byte through a [`CaptureWriter`] and logs it |
//!
//! [`App::observed`](crate::App::observed) installs all five in that order.
//! The three logging stages take a [`Skipper`] so routes such as health
//! checks can be left out.
//!
//! # Writing one
//!
//! ```rust
//! use tsu_observe::middleware::{Middleware, Next};
//! use tsu_observe::{BoxFuture, HandlerResult, Request, ResponseWriter};
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn handle<'a>(
//!         &'a self,
//!         req: &'a mut Request,
//!         w: &'a mut dyn ResponseWriter,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, HandlerResult> {
//!         w.headers_mut().insert("x-powered-by", http::HeaderValue::from_static("tsu"));
//!         next.run(req, w)
//!     }
//! }
//! ```

mod logger;
mod recover;
mod request_body;
mod request_id;
mod response_body;
mod skipper;

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, HandlerResult};
use crate::request::Request;
use crate::writer::ResponseWriter;

pub use logger::{Logger, SUMMARY_MESSAGE};
pub use recover::Recover;
pub use request_body::LogRequestBody;
pub use request_id::{CorrelationId, RequestId, X_REQUEST_ID};
pub use response_body::{CaptureWriter, LogResponseBody};
pub use skipper::Skipper;

/// A stage wrapped around the handler.
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        w: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult>;
}

/// The remainder of the chain: the middleware not yet run, then the handler.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    handler: &'a BoxedHandler,
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(handler: &'a BoxedHandler, rest: &'a [Arc<dyn Middleware>]) -> Self {
        Self { handler, rest }
    }

    /// Runs the rest of the chain.
    ///
    /// The request and writer only have to live for this call, so a
    /// middleware can pass in a writer of its own that wraps `w`.
    pub fn run<'b>(self, req: &'b mut Request, w: &'b mut dyn ResponseWriter) -> BoxFuture<'b, HandlerResult>
    where
        'a: 'b,
    {
        match self.rest.split_first() {
            Some((first, rest)) => first.handle(req, w, Next { handler: self.handler, rest }),
            None => self.handler.call(req, w),
        }
    }
}

/// The correlation id for log records: the one [`RequestId`] assigned, or
/// whatever the response header carries.
pub(crate) fn correlation_id(req: &Request, w: &dyn ResponseWriter) -> String {
    req.request_id()
        .or_else(|| w.headers().get(&X_REQUEST_ID).and_then(|v| v.to_str().ok()))
        .unwrap_or_default()
        .to_owned()
}
