//! Unified error type and the JSON error body written to clients.
//!
//! Two kinds of failure travel through the pipeline:
//!
//! - [`Error`], returned by handlers and middleware. It covers transport
//!   failures, missing writer capabilities, recovered panics, and
//!   application errors.
//! - [`HttpError`], the typed application error. It carries the status the
//!   client should see plus a stable error `code` and is serialised as the
//!   response body by [`respond`].
//!
//! Anything that is not an [`HttpError`] reaches the client as a generic
//! `500` body. Internal messages never leave the process; they are logged
//! with the request's correlation id instead.

use std::fmt;
use std::io;

use http::StatusCode;
use serde::Serialize;
use tracing::debug;

use crate::writer::{ContentType, ResponseWriter};

/// Error code for a request the client got wrong.
pub const BAD_REQUEST_CODE: &str = "20000";
/// Error code for a route that does not exist.
pub const NOT_FOUND_CODE: &str = "20004";
/// Error code for a failure inside this service.
pub const INTERNAL_SERVER_ERROR_CODE: &str = "80000";
/// Error code for an upstream API that returned something unexpected.
pub const EXTERNAL_ERROR_CODE: &str = "80001";
/// Error code for an upstream API that timed out.
pub const EXTERNAL_TIMEOUT_CODE: &str = "80002";

// ── Capability ────────────────────────────────────────────────────────────────

/// An optional [`ResponseWriter`] capability.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capability {
    /// Partial delivery of the body before the handler returns.
    Flush,
    /// Taking over the raw connection after a protocol upgrade.
    Hijack,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flush => "flush",
            Self::Hijack => "hijack",
        })
    }
}

// ── Error ─────────────────────────────────────────────────────────────────────

/// The error type returned by handlers, middleware, and the server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying transport does not offer the requested capability.
    #[error("{0} is not supported by the underlying response writer")]
    Unsupported(Capability),

    /// The response head has already been sent.
    #[error("response already committed")]
    Committed,

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("transport: {0}")]
    Transport(#[from] hyper::Error),

    /// A downstream stage panicked and the panic was intercepted.
    #[error("handler panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps any application error.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }

    /// The status [`respond`] writes for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http(e) => e.status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// A typed application error with a client-visible status and code.
///
/// ```rust
/// use tsu_observe::HttpError;
///
/// let err = HttpError::bad_request("invalid order", "quantity must be positive");
/// assert_eq!(err.status.as_u16(), 400);
/// assert_eq!(err.code, "20000");
/// ```
#[derive(Clone, Debug, Serialize, thiserror::Error)]
#[error("code:{code}, msg:{message}, description:{description}")]
pub struct HttpError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub description: String,
}

impl HttpError {
    pub fn new(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            description: description.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, BAD_REQUEST_CODE, message, description)
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND_CODE, "not found", description)
    }

    pub fn internal(message: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_SERVER_ERROR_CODE,
            message,
            description,
        )
    }

    /// An upstream dependency answered with something this service cannot use.
    pub fn external(message: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            EXTERNAL_ERROR_CODE,
            message,
            description,
        )
    }

    /// An upstream dependency did not answer in time.
    pub fn external_timeout(message: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            EXTERNAL_TIMEOUT_CODE,
            message,
            description,
        )
    }
}

// ── Translation ───────────────────────────────────────────────────────────────

/// Writes `err` as a JSON body unless the response is already committed.
///
/// [`HttpError`]s keep their own status and body. Every other error becomes
/// a `500` with a generic body.
pub async fn respond(w: &mut dyn ResponseWriter, err: &Error) {
    if w.committed() {
        debug!(error = %err, "response already committed, error not written");
        return;
    }

    let body = match err {
        Error::Http(e) => e.clone(),
        _ => HttpError::internal("general", "internal server error"),
    };

    // Serialising four strings cannot fail.
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    if let Err(e) = w.send(body.status, ContentType::Json, &bytes).await {
        debug!(error = %e, "failed to write error response");
    }
}
