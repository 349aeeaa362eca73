//! `GaleServer`: axum HTTP + WebSocket node.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use gale_channel::{Handler, Middleware, Router};
use gale_core::Plane;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cluster::{self, Coordinator};
use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::directory::Directory;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::{DrainReport, ShutdownCoordinator};
use crate::tls;
use crate::websocket::handler::{system_upgrade, user_upgrade};

#[derive(Debug)]
struct PlaneState {
    router: Arc<Router<ServerContext>>,
    directory: Arc<Directory>,
}

impl PlaneState {
    fn new(plane: Plane, page_size: usize) -> Self {
        Self {
            router: Arc::new(Router::new()),
            directory: Directory::new(plane, page_size),
        }
    }
}

struct ServerInner {
    config: ServerConfig,
    user: PlaneState,
    system: PlaneState,
    cluster: Arc<Coordinator>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

/// A gale node. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct GaleServer {
    inner: Arc<ServerInner>,
}

impl std::fmt::Debug for GaleServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaleServer")
            .field("config", &self.inner.config)
            .field("cluster", &self.inner.cluster)
            .finish_non_exhaustive()
    }
}

impl GaleServer {
    /// Create a node with the cluster routes installed on the system plane.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Result<Self, ServerError> {
        let user = PlaneState::new(Plane::User, config.page_size);
        let system = PlaneState::new(Plane::System, config.page_size);

        let users = Arc::clone(&user.directory);
        let cluster = Arc::new(Coordinator::new(
            config.network_sign_key.clone(),
            config.remove_interval,
            move || i64::try_from(users.user_count()).unwrap_or(i64::MAX),
        ));
        cluster::handlers::register(&system.router)?;

        Ok(Self {
            inner: Arc::new(ServerInner {
                config,
                user,
                system,
                cluster,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics,
            }),
        })
    }

    /// Register a user-plane handler.
    pub fn add_handler(
        &self,
        route: impl Into<String>,
        handler: Handler<ServerContext>,
    ) -> Result<(), ServerError> {
        Ok(self.inner.user.router.add_route(route, handler)?)
    }

    /// Register user-plane middleware for routes starting with `prefix`.
    pub fn add_middleware(&self, prefix: impl Into<String>, middleware: Middleware<ServerContext>) {
        self.inner.user.router.add_middleware(prefix, middleware);
    }

    /// Register a system-plane handler.
    pub fn add_system_handler(
        &self,
        route: impl Into<String>,
        handler: Handler<ServerContext>,
    ) -> Result<(), ServerError> {
        Ok(self.inner.system.router.add_route(route, handler)?)
    }

    /// Register system-plane middleware.
    pub fn add_system_middleware(
        &self,
        prefix: impl Into<String>,
        middleware: Middleware<ServerContext>,
    ) {
        self.inner.system.router.add_middleware(prefix, middleware);
    }

    fn plane(&self, plane: Plane) -> &PlaneState {
        match plane {
            Plane::User => &self.inner.user,
            Plane::System => &self.inner.system,
        }
    }

    /// Router shared by every connection on `plane`.
    pub fn router(&self, plane: Plane) -> &Arc<Router<ServerContext>> {
        &self.plane(plane).router
    }

    /// Directory of `plane`.
    pub fn directory(&self, plane: Plane) -> &Arc<Directory> {
        &self.plane(plane).directory
    }

    /// Cluster coordinator.
    pub fn cluster(&self) -> &Arc<Coordinator> {
        &self.inner.cluster
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.inner.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Current load: connected user-plane users.
    pub fn load(&self) -> i64 {
        self.inner.cluster.self_load()
    }

    /// Open connections across both planes.
    pub fn connection_count(&self) -> usize {
        self.inner.user.directory.user_count() + self.inner.system.directory.user_count()
    }

    /// Build the axum router.
    pub fn http_router(&self) -> axum::Router {
        axum::Router::new()
            .route(Plane::User.path(), get(user_upgrade))
            .route(Plane::System.path(), get(system_upgrade))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Bind, start the peer sweep (and the member task when a network is
    /// configured), and serve until shutdown. Serves TLS when a certificate
    /// and key are configured. Returns the bound address and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let config = &self.inner.config;
        let tls = match config.tls_files() {
            Some((cert, key)) => Some(tls::load_rustls_config(cert, key)?),
            None => None,
        };
        let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
        let addr = listener.local_addr()?;
        let advertised = advertised_address(config.advertise_address.as_deref(), addr);
        self.inner.cluster.set_self_address(advertised.clone());

        let shutdown = &self.inner.shutdown;
        let token = shutdown.token();
        shutdown.track("peer_sweep", self.inner.cluster.spawn_sweeper(token.clone()));
        if let Some(network) = config.join_network.clone() {
            shutdown.track("member", cluster::member::spawn(self.clone(), network, token.clone()));
        }

        let app = self.http_router();
        info!(%addr, advertised = %advertised, tls = tls.is_some(), "gale node listening");
        let handle = match tls {
            None => tokio::spawn(async move {
                let serve = axum::serve(listener, app)
                    .with_graceful_shutdown(async move { token.cancelled().await });
                if let Err(error) = serve.await {
                    warn!(%error, "server stopped with error");
                }
            }),
            Some(rustls) => {
                let listener = listener.into_std()?;
                let grace = config.shutdown_timeout;
                tokio::spawn(async move {
                    let handle = axum_server::Handle::new();
                    let stopper = handle.clone();
                    let watcher = tokio::spawn(async move {
                        token.cancelled().await;
                        stopper.graceful_shutdown(Some(grace));
                    });
                    let serve = axum_server::from_tcp_rustls(listener, rustls)
                        .handle(handle)
                        .serve(app.into_make_service());
                    if let Err(error) = serve.await {
                        warn!(%error, "tls server stopped with error");
                    }
                    watcher.abort();
                })
            }
        };
        Ok((addr, handle))
    }

    /// Cancel the listener, open connections and background tasks, then
    /// wait up to the configured grace period for the background tasks.
    pub async fn shutdown_gracefully(&self) -> DrainReport {
        self.inner.shutdown.drain(self.inner.config.shutdown_timeout).await
    }
}

/// Address to announce to the cluster: the configured one, else the bound
/// address made dialable.
fn advertised_address(configured: Option<&str>, bound: SocketAddr) -> String {
    if let Some(address) = configured {
        return address.to_owned();
    }
    if bound.ip().is_unspecified() {
        warn!(
            %bound,
            "listening on a wildcard address without cluster.advertiseAddress; \
             advertising loopback, so redirects to this node only work locally"
        );
    }
    advertise_for(bound)
}

/// Dialable form of a bound address: unspecified IPs become loopback.
fn advertise_for(addr: SocketAddr) -> String {
    let mut addr = addr;
    if addr.ip().is_unspecified() {
        addr.set_ip(if addr.is_ipv4() {
            std::net::Ipv4Addr::LOCALHOST.into()
        } else {
            std::net::Ipv6Addr::LOCALHOST.into()
        });
    }
    addr.to_string()
}

/// GET /health
async fn health_handler(State(server): State<GaleServer>) -> Json<HealthResponse> {
    Json(health::health_check(&server, server.inner.start_time))
}

/// GET /metrics
async fn metrics_handler(State(server): State<GaleServer>) -> String {
    crate::metrics::render(&server.inner.metrics)
}
