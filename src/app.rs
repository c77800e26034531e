//! Router plus middleware stack.

use std::sync::Arc;

use crate::handler::{self, BoxFuture, BoxedHandler, Handler, HandlerResult};
use crate::middleware::{LogRequestBody, LogResponseBody, Logger, Middleware, Next, Recover, RequestId, Skipper};
use crate::request::Request;
use crate::router::Router;
use crate::writer::ResponseWriter;

/// What the server runs for every request: route lookup, then the middleware
/// stack (outermost first), then the matched handler.
///
/// Unmatched requests still go through the middleware and end in a `404`
/// [`HttpError`](crate::HttpError), so they are correlated and logged like any
/// other request.
///
/// ```rust
/// use tsu_observe::{App, Router, health};
/// use tsu_observe::middleware::Skipper;
///
/// let router = Router::new().get("/healthz", health::liveness);
/// let app = App::observed(router, "orders", Skipper::new(["/healthz"]));
/// ```
pub struct App {
    router: Router,
    middleware: Vec<Arc<dyn Middleware>>,
    not_found: BoxedHandler,
}

impl App {
    /// An app with no middleware.
    pub fn new(router: Router) -> Self {
        Self {
            router,
            middleware: Vec::new(),
            not_found: handler::not_found.into_boxed_handler(),
        }
    }

    /// An app with the standard observability stack:
    ///
    /// ```text
    /// RequestId → Recover → LogRequestBody → Logger → LogResponseBody → handler
    /// ```
    ///
    /// `skipper` gates the three logging stages; `service` is stamped on
    /// every summary record.
    pub fn observed(router: Router, service: impl Into<Arc<str>>, skipper: Skipper) -> Self {
        Self::new(router)
            .with(RequestId::new())
            .with(Recover::new())
            .with(LogRequestBody::new(skipper.clone()))
            .with(Logger::new(service, skipper.clone()))
            .with(LogResponseBody::new(skipper))
    }

    /// Appends a middleware. Earlier ones wrap later ones.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Runs one request through routing, middleware and handler.
    ///
    /// Errors come back after the middleware has seen (and logged) them;
    /// turning them into a response is the caller's job, see
    /// [`error::respond`](crate::error::respond).
    pub fn handle<'a>(&'a self, req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
        let handler = match self.router.lookup(req.method(), req.path()) {
            Some(matched) => {
                req.params = matched.params;
                req.route = Some(matched.pattern.to_owned());
                matched.handler
            }
            None => &self.not_found,
        };
        Next::new(handler, &self.middleware).run(req, w)
    }
}

impl From<Router> for App {
    fn from(router: Router) -> Self {
        Self::new(router)
    }
}
