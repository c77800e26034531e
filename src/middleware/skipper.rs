//! Per-path opt-out for the logging middleware.

use std::collections::HashSet;
use std::sync::Arc;

use crate::request::Request;

/// A read-only set of paths that should not be logged.
///
/// Built once at startup and cloned into every middleware that needs it;
/// clones share the same set. A request is skipped when either its literal
/// path (`/health`) or its matched route pattern (`/users/{id}`) is listed.
///
/// ```rust
/// use tsu_observe::middleware::Skipper;
///
/// let skipper = Skipper::new(["/healthz", "/readyz"]);
/// assert!(skipper.skips_path("/healthz"));
/// assert!(!skipper.skips_path("/orders"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Skipper {
    paths: Arc<HashSet<String>>,
}

impl Skipper {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { paths: Arc::new(paths.into_iter().map(Into::into).collect()) }
    }

    /// A skipper that skips nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn skips(&self, req: &Request) -> bool {
        if self.paths.is_empty() {
            return false;
        }
        self.paths.contains(req.path()) || req.route().is_some_and(|r| self.paths.contains(r))
    }

    pub fn skips_path(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Skipper {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Body;

    fn get(path: &str) -> Request {
        http::Request::get(path).body(Body::empty()).unwrap().into()
    }

    #[test]
    fn matches_literal_paths_only() {
        let skipper = Skipper::new(["/health"]);
        assert!(skipper.skips(&get("/health")));
        assert!(skipper.skips(&get("/health?verbose=1")));
        assert!(!skipper.skips(&get("/health/deep")));
        assert!(!skipper.skips(&get("/orders")));
    }

    #[test]
    fn matches_route_patterns() {
        let skipper = Skipper::new(["/users/{id}/avatar"]);
        let mut req = get("/users/42/avatar");
        assert!(!skipper.skips(&req));

        req.route = Some("/users/{id}/avatar".into());
        assert!(skipper.skips(&req));
    }

    #[test]
    fn clones_share_the_set() {
        let a: Skipper = ["/a", "/b"].into_iter().collect();
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.paths, &b.paths));
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn empty_skipper_skips_nothing() {
        assert!(!Skipper::none().skips(&get("/")));
        assert!(Skipper::none().is_empty());
    }
}
