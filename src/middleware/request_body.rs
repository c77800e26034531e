use tracing::{info, warn};

use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next, Skipper, correlation_id};
use crate::request::{Body, Request};
use crate::writer::ResponseWriter;

/// Logs request headers and body, then hands the handler an untouched copy.
///
/// The body is read fully into memory and replaced by a buffered [`Body`]
/// holding the same bytes, so the handler reads it as if nothing happened.
/// Skipped paths are passed through without touching the body at all.
///
/// Emits one `request information` record with fields `id`, `header` and
/// `body` (lossy UTF-8; an absent body logs as an empty string).
#[derive(Clone, Debug, Default)]
pub struct LogRequestBody {
    skipper: Skipper,
}

impl LogRequestBody {
    pub fn new(skipper: Skipper) -> Self {
        Self { skipper }
    }
}

impl Middleware for LogRequestBody {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        w: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        if self.skipper.skips(req) {
            return next.run(req, w);
        }

        Box::pin(async move {
            let body = match req.take_body().collect().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(id = %correlation_id(req, w), error = %err, "failed to read request body");
                    return Err(err);
                }
            };
            req.set_body(Body::from(body.clone()));

            info!(
                id = %correlation_id(req, w),
                header = ?req.headers(),
                body = %String::from_utf8_lossy(&body),
                "request information"
            );

            next.run(req, w).await
        })
    }
}
