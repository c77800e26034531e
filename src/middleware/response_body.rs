//! Response body capture.
//!
//! [`CaptureWriter`] decorates the real writer: every byte the transport
//! accepts is also appended to a side buffer. Status and headers pass straight
//! through. Flush and hijack are offered exactly when the wrapped writer
//! offers them, so a handler sees the same capabilities with or without the
//! capture in place.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use tracing::info;

use crate::error::{Capability, Error};
use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next, Skipper, correlation_id};
use crate::request::Request;
use crate::writer::{Flush, Hijack, ResponseWriter, Upgrade};

// ── CaptureWriter ─────────────────────────────────────────────────────────────

/// A [`ResponseWriter`] that mirrors the body into memory.
///
/// Only bytes the underlying writer reports as written are mirrored, so the
/// captured body is exactly what the client was sent. A failing write is
/// returned as-is and leaves the buffer untouched.
pub struct CaptureWriter<'w> {
    inner: &'w mut dyn ResponseWriter,
    captured: BytesMut,
}

impl<'w> CaptureWriter<'w> {
    pub fn new(inner: &'w mut dyn ResponseWriter) -> Self {
        Self { inner, captured: BytesMut::new() }
    }

    /// Bytes captured so far.
    pub fn captured(&self) -> &[u8] {
        &self.captured
    }

    /// Releases the wrapped writer and returns the captured body.
    pub fn into_captured(self) -> Bytes {
        self.captured.freeze()
    }
}

impl ResponseWriter for CaptureWriter<'_> {
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
        Box::pin(async move {
            let n = self.inner.write(buf).await?;
            self.captured.extend_from_slice(&buf[..n]);
            Ok(n)
        })
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

impl Flush for CaptureWriter<'_> {
    fn flush(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            match self.inner.flusher() {
                Some(f) => f.flush().await,
                None => Ok(()),
            }
        })
    }
}

impl Hijack for CaptureWriter<'_> {
    fn hijack(&mut self) -> Result<Upgrade, Error> {
        match self.inner.hijacker() {
            Some(h) => h.hijack(),
            None => Err(Error::Unsupported(Capability::Hijack)),
        }
    }
}

// ── LogResponseBody ───────────────────────────────────────────────────────────

/// Logs the response body of every request that is not skipped.
///
/// One `response information` record per request, with fields `id` and
/// `body`. The record is written after the rest of the chain returns, whether
/// or not it returned an error; the error itself is passed on unchanged.
#[derive(Clone, Debug, Default)]
pub struct LogResponseBody {
    skipper: Skipper,
}

impl LogResponseBody {
    pub fn new(skipper: Skipper) -> Self {
        Self { skipper }
    }
}

impl Middleware for LogResponseBody {
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
            let mut capture = CaptureWriter::new(&mut *w);
            let result = next.run(&mut *req, &mut capture).await;
            let body = capture.into_captured();

            info!(
                id = %correlation_id(req, w),
                body = %String::from_utf8_lossy(&body),
                "response information"
            );

            result
        })
    }
}
