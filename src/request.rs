//! Incoming HTTP request type.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use hyper::body::Incoming;

use crate::error::Error;
use crate::middleware::CorrelationId;

// ── Body ──────────────────────────────────────────────────────────────────────

/// A request body: nothing, bytes already in memory, or a stream still on
/// the wire.
///
/// A streaming body can be read exactly once. To let several stages look at
/// it, read it with [`Request::bytes`] (or [`collect`](Body::collect) it and
/// put the bytes back with [`Request::set_body`]); every later read then sees
/// the same buffered bytes.
#[derive(Default)]
pub struct Body(Kind);

#[derive(Default)]
enum Kind {
    #[default]
    Empty,
    Full(Bytes),
    Incoming(Incoming),
}

impl Body {
    pub fn empty() -> Self {
        Self(Kind::Empty)
    }

    pub(crate) fn incoming(body: Incoming) -> Self {
        Self(Kind::Incoming(body))
    }

    /// `true` when the body still has to be read from the connection.
    pub fn is_streaming(&self) -> bool {
        matches!(self.0, Kind::Incoming(_))
    }

    /// Reads the whole body into memory. An absent body yields empty bytes.
    pub async fn collect(self) -> Result<Bytes, Error> {
        match self.0 {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Full(bytes) => Ok(bytes),
            Kind::Incoming(body) => Ok(BodyExt::collect(body).await?.to_bytes()),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self(Kind::Full(bytes))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Kind::Full(bytes.into()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self(Kind::Full(s.into()))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self(Kind::Full(Bytes::from_static(s.as_bytes())))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Kind::Empty => f.write_str("Body(empty)"),
            Kind::Full(b) => write!(f, "Body({} bytes)", b.len()),
            Kind::Incoming(_) => f.write_str("Body(streaming)"),
        }
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

/// An incoming HTTP request.
///
/// Tests and tools can build one from an `http::Request<Body>`:
///
/// ```rust
/// use tsu_observe::{Body, Request};
///
/// let req: Request = http::Request::post("/orders")
///     .header("content-type", "application/json")
///     .body(Body::from(r#"{"id":1}"#))
///     .unwrap()
///     .into();
/// assert_eq!(req.path(), "/orders");
/// ```
#[derive(Debug)]
pub struct Request {
    head: http::request::Parts,
    body: Body,
    pub(crate) params: HashMap<String, String>,
    pub(crate) route: Option<String>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn new(head: http::request::Parts, body: Body, remote_addr: Option<SocketAddr>) -> Self {
        Self { head, body, params: HashMap::new(), route: None, remote_addr }
    }

    /// Sets the peer address, as the server does for live connections.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.head.headers }
    pub fn extensions(&self) -> &Extensions { &self.head.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.head.extensions }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Path plus query string, exactly as requested (`/orders?page=2`).
    pub fn request_uri(&self) -> &str {
        self.head
            .uri
            .path_and_query()
            .map_or_else(|| self.head.uri.path(), |pq| pq.as_str())
    }

    /// Case-insensitive header lookup. Values that are not visible ASCII are
    /// treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The registered route pattern that matched (`/users/{id}`), if any.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// The correlation id assigned by [`RequestId`](crate::middleware::RequestId).
    pub fn request_id(&self) -> Option<&str> {
        self.head.extensions.get::<CorrelationId>().map(CorrelationId::as_str)
    }

    /// The client address as seen through a reverse proxy.
    ///
    /// First entry of `X-Forwarded-For`, then `X-Real-IP`, then the peer
    /// address of the connection. Empty when none is known.
    pub fn real_ip(&self) -> String {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').next().map(str::trim).filter(|s| !s.is_empty()) {
                return first.to_owned();
            }
        }
        if let Some(real) = self.header("x-real-ip").map(str::trim).filter(|s| !s.is_empty()) {
            return real.to_owned();
        }
        self.remote_addr.map(|a| a.ip().to_string()).unwrap_or_default()
    }

    /// Removes the body, leaving an empty one in its place.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Reads the whole body and keeps a buffered copy, so calling this again
    /// (here or in a later stage) returns the same bytes.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        let bytes = self.take_body().collect().await?;
        self.body = Body::from(bytes.clone());
        Ok(bytes)
    }
}

impl From<http::Request<Body>> for Request {
    fn from(req: http::Request<Body>) -> Self {
        let (head, body) = req.into_parts();
        Self::new(head, body, None)
    }
}
