//! Handler trait and type erasure.
//!
//! # What a handler looks like
//!
//! A handler borrows the request and the response writer for the duration of
//! one call and returns a boxed future tied to that borrow:
//!
//! ```rust
//! use http::StatusCode;
//! use tsu_observe::{BoxFuture, HandlerResult, Request, ResponseWriter};
//!
//! fn create_order<'a>(
//!     req: &'a mut Request,
//!     w: &'a mut dyn ResponseWriter,
//! ) -> BoxFuture<'a, HandlerResult> {
//!     Box::pin(async move {
//!         let _order = req.bytes().await?;
//!         w.json(StatusCode::CREATED, br#"{"ok":true}"#).await
//!     })
//! }
//! ```
//!
//! Borrowing (instead of taking ownership) is what lets middleware wrap the
//! writer for one call and read the wrapper back afterwards.
//!
//! # How handlers are stored
//!
//! The router keeps handlers of different concrete types side by side, so
//! each one is erased behind `Arc<dyn ErasedHandler>`:
//!
//! ```text
//! fn create_order(..) -> BoxFuture<..>          ← user writes this
//!        ↓ router.post("/orders", create_order)
//! create_order.into_boxed_handler()             ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(create_order))             ← stored as BoxedHandler
//!        ↓
//! handler.call(req, w) at request time          ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// A heap-allocated, type-erased future borrowing from `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every handler and middleware resolves to. The response itself has
/// already been written to the [`ResponseWriter`].
pub type HandlerResult = Result<(), Error>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call<'a>(&'a self, req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function with
/// the signature
///
/// ```text
/// fn name<'a>(req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult>
/// ```
///
/// The trait is sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F> private::Sealed for F where
    F: for<'a> Fn(&'a mut Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static
{
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype bridging a concrete handler `F` to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F> ErasedHandler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult>,
{
    fn call<'a>(&'a self, req: &'a mut Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
        (self.0)(req, w)
    }
}

/// The handler behind every unmatched route.
pub(crate) fn not_found<'a>(req: &'a mut Request, _w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
    let path = req.path().to_owned();
    Box::pin(async move { Err(crate::error::HttpError::not_found(path).into()) })
}
