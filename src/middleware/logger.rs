use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next, Skipper, correlation_id};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Message of the summary record. Log pipelines key on it; keep it stable.
pub const SUMMARY_MESSAGE: &str = "api_summary";

/// Logs one summary record per request.
///
/// Fields: `id`, `method`, `path_uri`, `remote_ip`, `status`, `latency`,
/// `service`, plus `error` when the chain failed. Latency covers the rest
/// of the chain, from just before it is called to just after it returns.
///
/// When the chain fails before anything was written, `status` is the one the
/// error will be translated to ([`Error::status`](crate::Error::status)).
/// The error is returned unchanged for the host to translate.
#[derive(Clone, Debug)]
pub struct Logger {
    service: Arc<str>,
    skipper: Skipper,
}

impl Logger {
    pub fn new(service: impl Into<Arc<str>>, skipper: Skipper) -> Self {
        Self { service: service.into(), skipper }
    }
}

impl Middleware for Logger {
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
            let start = Instant::now();
            let result = next.run(&mut *req, &mut *w).await;
            let latency = start.elapsed();

            let status = match &result {
                Err(err) if !w.committed() => err.status(),
                _ => w.status(),
            };

            info!(
                id = %correlation_id(req, w),
                method = %req.method(),
                path_uri = %req.request_uri(),
                remote_ip = %req.real_ip(),
                status = status.as_u16(),
                latency = ?latency,
                service = %self.service,
                error = result.as_ref().err().map(tracing::field::display),
                "{}",
                SUMMARY_MESSAGE
            );

            result
        })
    }
}
