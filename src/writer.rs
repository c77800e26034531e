//! The response side of a request: [`ResponseWriter`] and its optional
//! capabilities.
//!
//! Handlers do not return a response value. They write one: set a status,
//! add headers, and push body bytes into a [`ResponseWriter`]. That keeps
//! streaming and protocol upgrades on the same path as ordinary JSON replies,
//! and it lets middleware decorate the writer (see
//! [`CaptureWriter`](crate::middleware::CaptureWriter)) without knowing what
//! the handler produces.
//!
//! # Optional capabilities
//!
//! Not every transport can do everything. Two capabilities are optional and
//! are queried at call time:
//!
//! | Capability | Query | Meaning |
//! |---|---|---|
//! | [`Flush`] | [`ResponseWriter::flusher`] | deliver buffered bytes now |
//! | [`Hijack`] | [`ResponseWriter::hijacker`] | take over the connection after `101 Switching Protocols` |
//!
//! A writer that lacks a capability returns `None`. The convenience methods
//! [`ResponseWriter::try_flush`] and [`ResponseWriter::try_hijack`] turn that
//! into [`Error::Unsupported`].
//!
//! # Backpressure
//!
//! Writing and flushing are async. A transport only resolves them once it
//! has room for the bytes, so a client that stops reading stalls the handler
//! instead of growing a queue.

use std::io;

use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::StatusCode;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;

use crate::error::{Capability, Error};
use crate::handler::BoxFuture;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseWriter::send`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    EventStream,  // text/event-stream  (SSE)
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    NdJson,       // application/x-ndjson
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::NdJson      => "application/x-ndjson",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Delivers buffered body bytes to the client before the handler returns.
///
/// Resolves once the bytes have been handed to the connection; with a slow
/// client that means waiting for it to catch up.
pub trait Flush: Send {
    fn flush(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// Hands the underlying connection to the handler.
///
/// On success the response head (`101 Switching Protocols` plus whatever
/// headers were set) is sent immediately. Body writes are rejected from then
/// on; the returned [`Upgrade`] resolves to the raw connection once the
/// client has received the head.
pub trait Hijack {
    fn hijack(&mut self) -> Result<Upgrade, Error>;
}

/// A pending connection takeover returned by [`Hijack::hijack`].
#[derive(Debug)]
pub struct Upgrade(OnUpgrade);

impl Upgrade {
    pub(crate) fn new(on_upgrade: OnUpgrade) -> Self {
        Self(on_upgrade)
    }

    /// Waits for the protocol switch and returns the raw connection, usable
    /// with tokio's `AsyncRead`/`AsyncWrite`.
    pub async fn connection(self) -> Result<TokioIo<Upgraded>, Error> {
        let upgraded = self.0.await?;
        Ok(TokioIo::new(upgraded))
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The response half of an in-flight request.
///
/// Status and headers can be changed freely until the writer is
/// [`committed`](ResponseWriter::committed); after that they are what the
/// client sees.
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn status(&self) -> StatusCode;

    fn set_status(&mut self, status: StatusCode);

    /// Appends body bytes and returns how many were accepted.
    ///
    /// May accept fewer bytes than offered. Waits while the transport has no
    /// room. Fails once the client has gone away or the connection was
    /// hijacked.
    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>>;

    /// `true` once body bytes have been accepted or the head has been sent.
    /// Error translation only touches uncommitted responses.
    fn committed(&self) -> bool;

    /// The flush capability, when the transport has one.
    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        None
    }

    /// The hijack capability, when the transport has one.
    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        None
    }

    // ── Provided ──────────────────────────────────────────────────────────────

    fn write_all<'a>(&'a mut self, mut buf: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            while !buf.is_empty() {
                match self.write(buf).await? {
                    0 => return Err(io::ErrorKind::WriteZero.into()),
                    n => buf = &buf[n..],
                }
            }
            Ok(())
        })
    }

    /// Flushes through the transport, or fails with
    /// [`Error::Unsupported`] when it cannot flush.
    fn try_flush(&mut self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            match self.flusher() {
                Some(f) => Ok(f.flush().await?),
                None => Err(Error::Unsupported(Capability::Flush)),
            }
        })
    }

    /// Hijacks the connection, or fails with [`Error::Unsupported`] when the
    /// transport cannot hand it over.
    fn try_hijack(&mut self) -> Result<Upgrade, Error> {
        match self.hijacker() {
            Some(h) => h.hijack(),
            None => Err(Error::Unsupported(Capability::Hijack)),
        }
    }

    /// Sets status and content type, then writes the whole body.
    fn send<'a>(
        &'a mut self,
        status: StatusCode,
        content_type: ContentType,
        body: &'a [u8],
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
            self.set_status(status);
            self.write_all(body).await?;
            Ok(())
        })
    }

    fn json<'a>(&'a mut self, status: StatusCode, body: &'a [u8]) -> BoxFuture<'a, Result<(), Error>> {
        self.send(status, ContentType::Json, body)
    }

    fn text<'a>(&'a mut self, status: StatusCode, body: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        self.send(status, ContentType::Text, body.as_bytes())
    }
}
