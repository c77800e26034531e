//! HTTP server and graceful shutdown.
//!
//! # Request lifecycle
//!
//! Every request runs in its own task. The connection task waits only for
//! the response head; the body streams in as the handler writes and flushes
//! it. When the handler chain returns an
//! error and nothing has been written yet, the server writes the JSON error
//! body via [`error::respond`].
//!
//! # Graceful shutdown
//!
//! One shutdown future is observed once. When it resolves the server:
//! 1. stops accepting connections,
//! 2. asks every open connection to finish its in-flight requests and close,
//! 3. waits for those connections and for every request handler (including
//!    ones serving a hijacked connection), at most the grace period (10 s by
//!    default) in total,
//! 4. aborts whatever is still running, waits for the aborts to land, and
//!    returns. No handler outlives `serve`.
//!
//! Behind Kubernetes, keep the grace period shorter than the pod's
//! `terminationGracePeriodSeconds`.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::error::{self, Error};
use crate::request::{Body, Request};
use crate::transport::{HttpWriter, ResponseBody};

/// Default time in-flight requests get to finish after a shutdown signal.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

enum Listen {
    Addr(SocketAddr),
    Bound(TcpListener),
}

/// The HTTP server.
pub struct Server {
    listen: Listen,
    grace: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use tsu_observe::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { listen: Listen::Addr(addr), grace: DEFAULT_GRACE_PERIOD }
    }

    /// Serves on a listener that is already bound (port `0` in tests, socket
    /// activation, …).
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listen: Listen::Bound(listener), grace: DEFAULT_GRACE_PERIOD }
    }

    /// How long in-flight requests get after the shutdown signal.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Serves until SIGTERM or Ctrl-C, then shuts down gracefully.
    pub async fn serve(self, app: impl Into<App>) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then shuts down gracefully.
    pub async fn serve_with_shutdown<F>(self, app: impl Into<App>, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = match self.listen {
            Listen::Addr(addr) => TcpListener::bind(addr).await?,
            Listen::Bound(listener) => listener,
        };
        let app = Arc::new(app.into());
        let handlers = Handlers::default();

        info!(addr = %listener.local_addr()?, "tsu listening");

        let builder = ConnBuilder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut tasks = JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting right away.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let handlers = handlers.clone();
                    let svc = service_fn(move |req| dispatch(Arc::clone(&app), handlers.clone(), req, remote_addr));
                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), svc);
                    let conn = graceful.watch(conn.into_owned());

                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        let deadline = Instant::now() + self.grace;

        if tokio::time::timeout_at(deadline, graceful.shutdown()).await.is_err() {
            warn!(grace = ?self.grace, remaining = tasks.len(), "grace period elapsed, aborting open connections");
            tasks.abort_all();
        }
        while tasks.join_next().await.is_some() {}

        // No connection is left to start new handlers.
        let mut running = handlers.take();
        let finished = tokio::time::timeout_at(deadline, async {
            while running.join_next().await.is_some() {}
        })
        .await;
        if finished.is_err() {
            warn!(grace = ?self.grace, remaining = running.len(), "grace period elapsed, aborting request handlers");
            running.abort_all();
            while running.join_next().await.is_some() {}
        }

        info!("tsu stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Starts the handler task for one request and returns as soon as the
/// response head is ready.
async fn dispatch(
    app: Arc<App>,
    handlers: Handlers,
    mut req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<hyper::Response<ResponseBody>, Infallible> {
    let upgrade = req.extensions_mut().remove::<OnUpgrade>();
    let (head, body) = req.into_parts();
    let mut request = Request::new(head, Body::incoming(body), Some(remote_addr));

    let (mut writer, channel) = HttpWriter::new(upgrade);

    handlers.spawn(async move {
        if let Err(err) = app.handle(&mut request, &mut writer).await {
            error::respond(&mut writer, &err).await;
        }
        writer.finish().await;
    });

    match channel.head.await {
        Ok(head) => Ok(hyper::Response::from_parts(head, channel.body)),
        // The handler task died without producing a head (a panic with no
        // `Recover` installed).
        Err(_) => {
            let mut res = hyper::Response::new(ResponseBody::empty());
            *res.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            Ok(res)
        }
    }
}

/// Handler tasks of in-flight requests, shared by every connection so
/// shutdown can wait for them and abort them.
#[derive(Clone, Default)]
struct Handlers(Arc<Mutex<JoinSet<()>>>);

impl Handlers {
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished handlers so the set only holds running ones.
        while set.try_join_next().is_some() {}
        set.spawn(task);
    }

    fn take(&self) -> JoinSet<()> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by the Kubernetes control
/// plane) and **SIGINT** (Ctrl-C, for local dev). On Windows only Ctrl-C is
/// available.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
