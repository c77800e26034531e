//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. You register a path, you
//! get a handler back, along with the path parameters and the pattern that
//! matched (the logging middleware uses the pattern for skip decisions).

use std::collections::HashMap;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};

struct Route {
    pattern: String,
    handler: BoxedHandler,
}

/// The result of a successful lookup.
pub(crate) struct Matched<'r> {
    pub(crate) handler: &'r BoxedHandler,
    pub(crate) pattern: &'r str,
    pub(crate) params: HashMap<String, String>,
}

/// The application router.
///
/// Build it once at startup and hand it to [`App`](crate::App) or
/// [`Server::serve`](crate::Server::serve). Registration methods return
/// `self` so they chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let route = Route { pattern: path.to_owned(), handler: handler.into_boxed_handler() };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub(crate) fn lookup<'r>(&'r self, method: &Method, path: &str) -> Option<Matched<'r>> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some(Matched {
            handler: &matched.value.handler,
            pattern: &matched.value.pattern,
            params,
        })
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{BoxFuture, HandlerResult};
    use crate::request::Request;
    use crate::writer::ResponseWriter;

    fn noop<'a>(_req: &'a mut Request, _w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn lookup_returns_params_and_pattern() {
        let router = Router::new().get("/users/{id}", noop).post("/users", noop);

        let found = router.lookup(&Method::GET, "/users/42").unwrap();
        assert_eq!(found.pattern, "/users/{id}");
        assert_eq!(found.params["id"], "42");

        assert!(router.lookup(&Method::POST, "/users").unwrap().params.is_empty());
    }

    #[test]
    fn unknown_method_or_path_misses() {
        let router = Router::new().get("/users/{id}", noop);
        assert!(router.lookup(&Method::DELETE, "/users/42").is_none());
        assert!(router.lookup(&Method::GET, "/orders").is_none());
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic() {
        let _ = Router::new().get("/users/{id}", noop).get("/users/{name}", noop);
    }
}
