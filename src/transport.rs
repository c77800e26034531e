//! The [`ResponseWriter`] backed by a live hyper connection.
//!
//! hyper wants a complete `http::Response` (head plus body stream) from the
//! service future, while handlers write incrementally. The two are joined by
//! channels:
//!
//! ```text
//!   handler task                          connection task
//!   ────────────                          ───────────────
//!   w.write(..)  → pending buffer
//!   w.flush()    → head   ──oneshot──→    awaits head, returns Response
//!                → chunk  ──mpsc(8)──→    ResponseBody yields frames
//!   (return)     → finish: head + rest, sender dropped → end of stream
//! ```
//!
//! The head is sent on the first flush, when the pending buffer fills up to
//! [`WRITE_BUFFER`], on hijack, or when the handler finishes. The chunk
//! channel holds at most [`QUEUED_CHUNKS`] chunks; once it is full, writes
//! and flushes wait until hyper has passed earlier chunks to the socket. A
//! response therefore never holds more than
//! `(QUEUED_CHUNKS + 1) * WRITE_BUFFER` bytes however slowly the client
//! reads. Once the connection task is gone (client disconnected), every
//! write and flush fails with `BrokenPipe`.

use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, HeaderMap, HeaderValue};
use http::StatusCode;
use hyper::body::{Body, Frame, SizeHint};
use hyper::upgrade::OnUpgrade;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::handler::BoxFuture;

use crate::error::{Capability, Error};
use crate::writer::{Flush, Hijack, ResponseWriter, Upgrade};

/// Pending bytes are sent as a chunk once they reach this size.
pub(crate) const WRITE_BUFFER: usize = 16 * 1024;

/// Chunks queued between the handler and the connection.
pub(crate) const QUEUED_CHUNKS: usize = 8;

/// Receiving side of a response: the head arrives once, then the body.
pub(crate) struct ResponseChannel {
    pub(crate) head: oneshot::Receiver<http::response::Parts>,
    pub(crate) body: ResponseBody,
}

// ── HttpWriter ────────────────────────────────────────────────────────────────

pub(crate) struct HttpWriter {
    status: StatusCode,
    headers: HeaderMap,
    head: Option<oneshot::Sender<http::response::Parts>>,
    body: mpsc::Sender<Bytes>,
    pending: BytesMut,
    written: bool,
    upgrade: Option<OnUpgrade>,
    hijacked: bool,
}

impl HttpWriter {
    /// Creates a writer and the channel the connection task reads from.
    ///
    /// `upgrade` is present only when the client asked for a protocol switch;
    /// without it the writer does not offer [`Hijack`].
    pub(crate) fn new(upgrade: Option<OnUpgrade>) -> (Self, ResponseChannel) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(QUEUED_CHUNKS);
        let writer = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            head: Some(head_tx),
            body: body_tx,
            pending: BytesMut::new(),
            written: false,
            upgrade,
            hijacked: false,
        };
        let channel = ResponseChannel { head: head_rx, body: ResponseBody { rx: body_rx } };
        (writer, channel)
    }

    /// Sends whatever has not been sent yet and closes the body stream.
    pub(crate) async fn finish(mut self) {
        if self.hijacked {
            return;
        }
        if self.head.is_some() && !self.headers.contains_key(CONTENT_LENGTH) && carries_body(self.status) {
            self.headers.insert(CONTENT_LENGTH, HeaderValue::from(self.pending.len()));
        }
        if let Err(e) = self.send_pending().await {
            debug!(error = %e, "client went away before the response was complete");
        }
    }

    fn commit(&mut self) -> io::Result<()> {
        let Some(tx) = self.head.take() else {
            return Ok(());
        };
        let (mut parts, ()) = http::Response::new(()).into_parts();
        parts.status = self.status;
        parts.headers = self.headers.clone();
        tx.send(parts).map_err(|_| closed())
    }

    /// Commits the head and queues the pending bytes, waiting for room in
    /// the chunk channel.
    async fn send_pending(&mut self) -> io::Result<()> {
        self.commit()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = self.pending.split().freeze();
        self.body.send(chunk).await.map_err(|_| closed())
    }
}

impl ResponseWriter for HttpWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        if !self.committed() {
            self.status = status;
        }
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(async move {
            if self.hijacked {
                return Err(io::Error::other("connection hijacked"));
            }
            if self.body.is_closed() {
                return Err(closed());
            }
            self.written = true;
            if self.pending.len() >= WRITE_BUFFER {
                self.send_pending().await?;
            }
            let n = buf.len().min(WRITE_BUFFER - self.pending.len());
            self.pending.extend_from_slice(&buf[..n]);
            Ok(n)
        })
    }

    fn committed(&self) -> bool {
        self.head.is_none() || self.written
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.upgrade.is_some() { Some(self) } else { None }
    }
}

impl Flush for HttpWriter {
    fn flush(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            if self.hijacked {
                return Err(io::Error::other("connection hijacked"));
            }
            self.send_pending().await
        })
    }
}

impl Hijack for HttpWriter {
    fn hijack(&mut self) -> Result<Upgrade, Error> {
        if self.head.is_none() || self.written {
            return Err(Error::Committed);
        }
        let Some(on_upgrade) = self.upgrade.take() else {
            return Err(Error::Unsupported(Capability::Hijack));
        };
        self.status = StatusCode::SWITCHING_PROTOCOLS;
        self.commit()?;
        self.hijacked = true;
        Ok(Upgrade::new(on_upgrade))
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client connection closed")
}

fn carries_body(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

// ── ResponseBody ──────────────────────────────────────────────────────────────

/// The body hyper polls: one data frame per flushed chunk.
pub(crate) struct ResponseBody {
    rx: mpsc::Receiver<Bytes>,
}

impl ResponseBody {
    /// A body that ends immediately.
    pub(crate) fn empty() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self { rx }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(|b| Ok(Frame::data(b))))
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use http_body_util::BodyExt;

    #[tokio::test]
    async fn head_waits_for_flush() {
        let (mut w, mut ch) = HttpWriter::new(None);
        w.set_status(StatusCode::ACCEPTED);
        w.write_all(b"first").await.unwrap();
        assert!(ch.head.try_recv().is_err());

        w.try_flush().await.unwrap();
        let head = ch.head.await.unwrap();
        assert_eq!(head.status, StatusCode::ACCEPTED);
        assert!(head.headers.get(CONTENT_LENGTH).is_none());

        let frame = ch.body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), "first");
    }

    #[tokio::test]
    async fn finish_sets_content_length_when_body_is_known() {
        let (mut w, ch) = HttpWriter::new(None);
        w.write_all(b"{\"ok\":true}").await.unwrap();
        w.finish().await;

        let head = ch.head.await.unwrap();
        assert_eq!(head.headers[CONTENT_LENGTH], "11");
        let body = ch.body.collect().await.unwrap().to_bytes();
        assert_eq!(body, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn status_is_frozen_after_commit() {
        let (mut w, _ch) = HttpWriter::new(None);
        w.try_flush().await.unwrap();
        w.set_status(StatusCode::IM_A_TEAPOT);
        assert_eq!(w.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn full_buffer_is_sent_without_a_flush() {
        let (mut w, mut ch) = HttpWriter::new(None);
        w.write_all(&vec![b'x'; WRITE_BUFFER + 1]).await.unwrap();
        assert!(ch.head.try_recv().is_ok());

        let frame = ch.body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap().len(), WRITE_BUFFER);
    }

    #[tokio::test]
    async fn stalled_reader_stops_the_writer() {
        let (mut w, _ch) = HttpWriter::new(None);
        let chunk = vec![b'x'; 64 * 1024];
        let mut accepted = 0usize;

        let streaming = tokio::time::timeout(Duration::from_millis(200), async {
            while accepted < 64 * 1024 * 1024 {
                w.write_all(&chunk).await.unwrap();
                w.try_flush().await.unwrap();
                accepted += chunk.len();
            }
        })
        .await;

        assert!(streaming.is_err(), "writer never waited for the reader");
        assert!(accepted <= (QUEUED_CHUNKS + 1) * WRITE_BUFFER + chunk.len(), "{accepted} bytes queued");
    }

    #[tokio::test]
    async fn writes_fail_once_the_client_is_gone() {
        let (mut w, ch) = HttpWriter::new(None);
        drop(ch);
        let err = w.write(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn hijack_needs_an_upgrade_request() {
        let (mut w, _ch) = HttpWriter::new(None);
        assert!(w.hijacker().is_none());
        assert!(matches!(w.try_hijack(), Err(Error::Unsupported(_))));
    }
}
