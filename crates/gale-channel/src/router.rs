//! Route table and middleware chain for one plane.

use std::collections::HashMap;
use std::time::Instant;

use gale_core::Codec;
use metrics::histogram;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::warn;

use crate::handler::Handler;
use crate::middleware::Middleware;

/// Registration failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// A handler is already registered for this route.
    #[error("route already registered: {0}")]
    Duplicate(String),
    /// Route strings must be non-empty.
    #[error("route must not be empty")]
    Empty,
}

/// Why an inbound message produced a failure Ack.
///
/// `Display` is the exact Ack payload text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// A middleware step rejected the message.
    #[error("{message}")]
    Rejected {
        /// Prefix the rejecting middleware was registered under.
        prefix: String,
        /// Rejection text.
        message: String,
    },
    /// No handler for the route.
    #[error("route not found")]
    RouteNotFound,
    /// The handler (or payload decoding) failed.
    #[error("{0}")]
    Handler(String),
}

impl DispatchError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::RouteNotFound => "route_not_found",
            Self::Handler(_) => "handler",
        }
    }
}

/// Routes and middleware for one plane, safe to mutate while dispatching.
pub struct Router<C> {
    routes: RwLock<HashMap<String, Handler<C>>>,
    middleware: RwLock<Vec<(String, Middleware<C>)>>,
}

impl<C> std::fmt::Debug for Router<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.read().len())
            .field("middleware", &self.middleware.read().len())
            .finish()
    }
}

impl<C> Default for Router<C> {
    fn default() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
        }
    }
}

impl<C: Clone + Send + 'static> Router<C> {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Fails if the route is empty or already taken.
    pub fn add_route(
        &self,
        route: impl Into<String>,
        handler: Handler<C>,
    ) -> Result<(), RouteError> {
        let route = route.into();
        if route.is_empty() {
            return Err(RouteError::Empty);
        }
        let mut routes = self.routes.write();
        if routes.contains_key(&route) {
            return Err(RouteError::Duplicate(route));
        }
        let _ = routes.insert(route, handler);
        Ok(())
    }

    /// Register or overwrite a handler. Returns whether one was replaced.
    pub fn replace_route(
        &self,
        route: impl Into<String>,
        handler: Handler<C>,
    ) -> Result<bool, RouteError> {
        let route = route.into();
        if route.is_empty() {
            return Err(RouteError::Empty);
        }
        Ok(self.routes.write().insert(route, handler).is_some())
    }

    /// Append a middleware step for every route starting with `prefix`.
    /// An empty prefix matches every route.
    pub fn add_middleware(&self, prefix: impl Into<String>, middleware: Middleware<C>) {
        self.middleware.write().push((prefix.into(), middleware));
    }

    /// Whether a handler is registered for `route`.
    pub fn has_route(&self, route: &str) -> bool {
        self.routes.read().contains_key(route)
    }

    /// Registered routes, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the middleware chain and the route handler for one inbound
    /// Request or Push. Returns the encoded success payload.
    pub async fn dispatch(
        &self,
        ctx: C,
        codec: &dyn Codec,
        route: &str,
        payload: &str,
    ) -> Result<String, DispatchError> {
        let chain: Vec<(String, Middleware<C>)> = self
            .middleware
            .read()
            .iter()
            .filter(|(prefix, _)| route.starts_with(prefix.as_str()))
            .cloned()
            .collect();

        for (prefix, step) in chain {
            if let Err(message) = step.invoke(ctx.clone(), codec, payload).await {
                warn!(route, prefix = %prefix, error = %message, "middleware rejected message");
                return Err(DispatchError::Rejected { prefix, message });
            }
        }

        let Some(handler) = self.routes.read().get(route).cloned() else {
            return Err(DispatchError::RouteNotFound);
        };

        let start = Instant::now();
        let outcome = handler.invoke(ctx, codec, payload).await;
        histogram!("gale_handler_duration_seconds", "route" => route.to_owned())
            .record(start.elapsed().as_secs_f64());
        outcome.map_err(DispatchError::Handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{handler, middleware};
    use assert_matches::assert_matches;
    use gale_core::JsonCodec;
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Ctx = Arc<AtomicUsize>;
    type Log = Arc<parking_lot::Mutex<Vec<&'static str>>>;

    fn echo() -> Handler<Ctx> {
        handler::text(|_ctx: Ctx, raw: String| async move { Ok::<_, Infallible>(raw) })
    }

    #[test]
    fn duplicate_route_rejected() {
        let r: Router<Ctx> = Router::new();
        r.add_route("/a", echo()).unwrap();
        assert_eq!(r.add_route("/a", echo()), Err(RouteError::Duplicate("/a".into())));
        assert_eq!(r.add_route("", echo()), Err(RouteError::Empty));
        assert_eq!(r.replace_route("/a", echo()), Ok(true));
        assert_eq!(r.replace_route("/b", echo()), Ok(false));
        assert_eq!(r.routes(), vec!["/a".to_owned(), "/b".to_owned()]);
        assert!(r.has_route("/b"));
    }

    #[tokio::test]
    async fn unknown_route_fails_with_text() {
        let r: Router<Ctx> = Router::new();
        let err = r.dispatch(Ctx::default(), &JsonCodec, "/nope", "").await.unwrap_err();
        assert_eq!(err, DispatchError::RouteNotFound);
        assert_eq!(err.to_string(), gale_core::constants::ROUTE_NOT_FOUND);
    }

    #[tokio::test]
    async fn handler_result_is_encoded() {
        let r: Router<Ctx> = Router::new();
        r.add_route(
            "/double",
            handler::typed(|_ctx: Ctx, n: i64| async move { Ok::<_, Infallible>(n * 2) }),
        )
        .unwrap();
        let out = r.dispatch(Ctx::default(), &JsonCodec, "/double", "21").await.unwrap();
        assert_eq!(out, "42");
    }

    #[tokio::test]
    async fn middleware_short_circuits_handler() {
        let r: Router<Ctx> = Router::new();
        r.add_route(
            "/api/x",
            handler::unit(|ctx: Ctx| async move {
                let _ = ctx.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(())
            }),
        )
        .unwrap();
        r.add_middleware("/api", middleware::unit(|_ctx: Ctx| async { Err::<(), _>("denied") }));

        let calls = Ctx::default();
        let err = r.dispatch(Arc::clone(&calls), &JsonCodec, "/api/x", "").await.unwrap_err();
        assert_matches!(
            &err,
            DispatchError::Rejected { prefix, message } if prefix == "/api" && message == "denied"
        );
        assert_eq!(err.to_string(), "denied");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn middleware_runs_in_order_and_only_on_prefix() {
        let r: Router<Log> = Router::new();
        r.add_route("/game/move", handler::unit(|log: Log| async move {
            log.lock().push("handler");
            Ok::<_, Infallible>(())
        }))
        .unwrap();
        r.add_middleware("/game", middleware::unit(|log: Log| async move {
            log.lock().push("first");
            Ok::<_, Infallible>(())
        }));
        r.add_middleware("/other", middleware::unit(|log: Log| async move {
            log.lock().push("skipped");
            Ok::<_, Infallible>(())
        }));
        r.add_middleware("", middleware::unit(|log: Log| async move {
            log.lock().push("second");
            Ok::<_, Infallible>(())
        }));

        let log = Log::default();
        let _ = r.dispatch(Arc::clone(&log), &JsonCodec, "/game/move", "").await.unwrap();
        assert_eq!(*log.lock(), vec!["first", "second", "handler"]);
    }

    #[tokio::test]
    async fn handler_error_is_failure() {
        let r: Router<Ctx> = Router::new();
        r.add_route("/fail", handler::unit(|_ctx: Ctx| async { Err::<(), _>("bad input") }))
            .unwrap();
        let err = r.dispatch(Ctx::default(), &JsonCodec, "/fail", "").await.unwrap_err();
        assert_eq!(err, DispatchError::Handler("bad input".into()));
        assert_eq!(err.kind(), "handler");
    }
}
