//! Test support: an in-memory [`ResponseWriter`].
//!
//! ```rust
//! use http::StatusCode;
//! use tsu_observe::ResponseWriter;
//! use tsu_observe::testing::MemoryWriter;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut w = MemoryWriter::new();
//! w.json(StatusCode::CREATED, br#"{"ok":true}"#).await.unwrap();
//! assert_eq!(w.status(), StatusCode::CREATED);
//! assert_eq!(w.body(), br#"{"ok":true}"#);
//! # }
//! ```

use std::io;

use http::{HeaderMap, StatusCode};

use crate::handler::BoxFuture;
use crate::writer::{Flush, ResponseWriter};

/// Records status, headers and body in memory.
///
/// Never hijackable. Flushable only when built with
/// [`flushable`](MemoryWriter::flushable). [`close`](MemoryWriter::close)
/// simulates a client that went away: later writes and flushes fail with
/// `BrokenPipe`.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    writes: usize,
    flushes: usize,
    flushable: bool,
    closed: bool,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flushable() -> Self {
        Self { flushable: true, ..Self::default() }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of `write` calls that reached the writer.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl ResponseWriter for MemoryWriter {
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
            if self.closed {
                return Err(closed());
            }
            self.writes += 1;
            self.body.extend_from_slice(buf);
            Ok(buf.len())
        })
    }

    fn committed(&self) -> bool {
        self.writes > 0 || self.flushes > 0
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        if self.flushable { Some(self) } else { None }
    }
}

impl Flush for MemoryWriter {
    fn flush(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            if self.closed {
                return Err(closed());
            }
            self.flushes += 1;
            Ok(())
        })
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client connection closed")
}
