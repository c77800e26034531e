use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::error;

use crate::error::{self, Error};
use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next, correlation_id};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Turns a panic anywhere downstream into a logged `500`.
///
/// The panic is caught at this stage, logged at ERROR with the correlation
/// id, the panic message and a backtrace (captured when `RUST_BACKTRACE` is
/// set), and answered with the generic JSON error body if nothing was
/// written yet. The chain then returns [`Error::Panic`].
///
/// Install it right after [`RequestId`](super::RequestId) so the logging
/// stages run inside it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recover;

impl Recover {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Recover {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        w: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(&mut *req, &mut *w)).catch_unwind().await;
            let payload = match outcome {
                Ok(result) => return result,
                Err(payload) => payload,
            };

            let err = Error::Panic(panic_message(payload.as_ref()));
            error!(
                id = %correlation_id(req, w),
                error = %err,
                backtrace = %Backtrace::capture(),
                "recovered from panic"
            );
            error::respond(w, &err).await;
            Err(err)
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
