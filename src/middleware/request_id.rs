//! Request ID middleware: propagates or generates a unique ID per request.

use std::io;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use uuid::Uuid;

use crate::error::{Capability, Error};
use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::writer::{Flush, Hijack, ResponseWriter, Upgrade};

/// The correlation header, read on the way in and always set on the way out.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The correlation id of the current request.
///
/// Stored in the request extensions by [`RequestId`] and read back with
/// [`Request::request_id`](crate::Request::request_id). There is no setter;
/// once assigned it stays the same for the rest of the request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Ensures every request carries an `X-Request-Id`.
///
/// An incoming non-empty header is reused verbatim. Otherwise a new UUID v4
/// is generated. The id is:
/// - set on the request headers (for handlers and proxies downstream),
/// - stored as a [`CorrelationId`] extension,
/// - set on the response headers before anything else runs, and set again
///   whenever the response is about to be committed, so a later stage that
///   overwrites or removes the header cannot make the client see a different
///   id than the logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestId;

impl RequestId {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for RequestId {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        w: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        let inbound = req
            .headers()
            .get(&X_REQUEST_ID)
            .filter(|v| !v.is_empty())
            .cloned();

        let value = match inbound {
            Some(v) if v.to_str().is_ok() => v,
            _ => {
                // A UUID is always a valid header value.
                let generated = HeaderValue::from_str(&Uuid::new_v4().to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
                req.headers_mut().insert(X_REQUEST_ID.clone(), generated.clone());
                generated
            }
        };

        let id = value.to_str().unwrap_or_default().to_owned();
        req.extensions_mut().insert(CorrelationId(id));

        Box::pin(async move {
            let mut stamped = Stamped { inner: w, id: value };
            stamped.stamp();
            let result = next.run(&mut *req, &mut stamped).await;
            // The host may still write an error body after this returns.
            stamped.stamp();
            result
        })
    }
}

// ── Stamped ───────────────────────────────────────────────────────────────────

/// Puts `X-Request-Id` back on the response right before every operation
/// that can commit it.
struct Stamped<'w> {
    inner: &'w mut dyn ResponseWriter,
    id: HeaderValue,
}

impl Stamped<'_> {
    fn stamp(&mut self) {
        if !self.inner.committed() {
            self.inner.headers_mut().insert(X_REQUEST_ID.clone(), self.id.clone());
        }
    }
}

impl ResponseWriter for Stamped<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn status(&self) -> StatusCode {
        self.inner.status()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.inner.set_status(status);
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        self.stamp();
        self.inner.write(buf)
    }

    fn committed(&self) -> bool {
        self.inner.committed()
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        if self.inner.flusher().is_some() { Some(self) } else { None }
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.inner.hijacker().is_some() { Some(self) } else { None }
    }
}

impl Flush for Stamped<'_> {
    fn flush(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.stamp();
        Box::pin(async move {
            match self.inner.flusher() {
                Some(f) => f.flush().await,
                None => Ok(()),
            }
        })
    }
}

impl Hijack for Stamped<'_> {
    fn hijack(&mut self) -> Result<Upgrade, Error> {
        self.stamp();
        match self.inner.hijacker() {
            Some(h) => h.hijack(),
            None => Err(Error::Unsupported(Capability::Hijack)),
        }
    }
}
