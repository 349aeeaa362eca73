//! The initiator: a dual-channel session to one server of a network.

use std::sync::{Arc, Weak};

use gale_channel::{DualChannel, Endpoint, Handler, Middleware, Router};
use gale_core::{CallError, Plane};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::ClientConfig;
use crate::connect;
use crate::errors::ClientError;

/// Context handed to client-side handlers.
#[derive(Clone, Debug)]
pub struct ClientContext {
    inner: Weak<ClientInner>,
    plane: Plane,
}

impl ClientContext {
    /// The owning client, unless it has been dropped.
    pub fn client(&self) -> Option<Client> {
        self.inner.upgrade().map(|inner| Client { inner })
    }

    /// Plane the message arrived on.
    pub fn plane(&self) -> Plane {
        self.plane
    }
}

#[derive(Debug)]
struct ClientInner {
    config: ClientConfig,
    user_router: Arc<Router<ClientContext>>,
    system_router: Arc<Router<ClientContext>>,
    session: RwLock<Option<Session>>,
}

#[derive(Debug)]
struct Session {
    address: String,
    channel: Arc<DualChannel<ClientContext>>,
}

/// Handle to a client. Cheap to clone; clones share one session.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create an unconnected client.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                user_router: Arc::new(Router::new()),
                system_router: Arc::new(Router::new()),
                session: RwLock::new(None),
            }),
        }
    }

    /// Configuration this client dials with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Register a user-plane handler for pushes and requests from the server.
    pub fn add_handler(
        &self,
        route: impl Into<String>,
        handler: Handler<ClientContext>,
    ) -> Result<(), ClientError> {
        Ok(self.inner.user_router.add_route(route, handler)?)
    }

    /// Register a system-plane handler.
    pub fn add_system_handler(
        &self,
        route: impl Into<String>,
        handler: Handler<ClientContext>,
    ) -> Result<(), ClientError> {
        Ok(self.inner.system_router.add_route(route, handler)?)
    }

    /// Register user-plane middleware for routes starting with `prefix`.
    pub fn add_middleware(&self, prefix: impl Into<String>, middleware: Middleware<ClientContext>) {
        self.inner.user_router.add_middleware(prefix, middleware);
    }

    fn context(&self, plane: Plane) -> ClientContext {
        ClientContext {
            inner: Arc::downgrade(&self.inner),
            plane,
        }
    }

    /// Connect to the configured server, following least-loaded redirects.
    /// An existing session is closed first. When two connects race, the
    /// later one to finish wins and the other session is closed.
    #[instrument(skip_all, fields(target = %self.inner.config.target()))]
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.close().await;
        let (address, channel) = connect::connect_dual(
            &self.inner.config,
            &self.inner.user_router,
            &self.inner.system_router,
            |plane| self.context(plane),
        )
        .await?;
        self.install(Session {
            address,
            channel: Arc::new(channel),
        })
        .await;
        Ok(())
    }

    async fn install(&self, session: Session) {
        let replaced = self.inner.session.write().replace(session);
        if let Some(stale) = replaced {
            warn!(address = %stale.address, "replacing a session opened concurrently");
            stale.channel.close().await;
        }
    }

    /// Whether a session is open on both planes.
    pub fn is_connected(&self) -> bool {
        self.inner
            .session
            .read()
            .as_ref()
            .is_some_and(|s| !s.channel.user().is_closed() && !s.channel.system().is_closed())
    }

    /// Address of the server the session settled on.
    pub fn address(&self) -> Option<String> {
        self.inner.session.read().as_ref().map(|s| s.address.clone())
    }

    /// Endpoint for `plane` of the current session.
    pub fn endpoint(&self, plane: Plane) -> Option<Arc<Endpoint<ClientContext>>> {
        self.inner
            .session
            .read()
            .as_ref()
            .map(|s| Arc::clone(s.channel.endpoint(plane)))
    }

    fn user(&self) -> Result<Arc<Endpoint<ClientContext>>, CallError> {
        self.endpoint(Plane::User).ok_or(CallError::NotConnected)
    }

    /// Push a message on the user plane.
    pub async fn push<T: Serialize + ?Sized>(
        &self,
        route: &str,
        payload: &T,
    ) -> Result<(), CallError> {
        self.user()?.push(route, payload).await
    }

    /// Request on the user plane and wait for the reply.
    pub async fn request<T, R>(&self, route: &str, payload: &T) -> Result<R, CallError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.user()?.request(route, payload).await
    }

    /// Request that gives up when `cancel` fires.
    pub async fn request_with_cancel<T, R>(
        &self,
        route: &str,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<R, CallError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.user()?.request_with_cancel(route, payload, cancel).await
    }

    /// Request without waiting. `callback` runs with a user-plane context
    /// and the decoded reply.
    pub async fn request_async<T, R, F>(
        &self,
        route: &str,
        payload: &T,
        callback: F,
    ) -> Result<(), CallError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned + 'static,
        F: FnOnce(ClientContext, R) + Send + 'static,
    {
        self.user()?
            .request_async(route, payload, self.context(Plane::User), callback)
            .await
    }

    /// Close the session, if any. Outstanding calls fail with
    /// [`CallError::Closed`].
    pub async fn close(&self) {
        let session = self.inner.session.write().take();
        if let Some(session) = session {
            session.channel.close().await;
            info!(address = %session.address, "disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::tests::{fake_server, lookup_router};
    use assert_matches::assert_matches;
    use gale_channel::{handler, middleware};
    use std::convert::Infallible;
    use std::time::Duration;

    fn client_for(addr: &str) -> Client {
        let mut config = ClientConfig::for_target(addr);
        config.timeout = Duration::from_secs(5);
        Client::new(config)
    }

    fn echo_server_router() -> Router<()> {
        let router = lookup_router(|_| String::new());
        router
            .add_route(
                "/echo",
                handler::text(|(): (), s: String| async move { Ok::<_, Infallible>(s) }),
            )
            .unwrap();
        router
    }

    #[tokio::test]
    async fn not_connected_before_connect() {
        let client = client_for("127.0.0.1:1");
        assert!(!client.is_connected());
        assert!(client.address().is_none());
        assert_matches!(client.push("/x", &1).await, Err(CallError::NotConnected));
        assert_matches!(client.request::<_, String>("/x", &1).await, Err(CallError::NotConnected));
    }

    #[tokio::test]
    async fn request_after_connect() {
        let addr = fake_server(echo_server_router()).await;
        let client = client_for(&addr);
        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(client.address().as_deref(), Some(addr.as_str()));

        let reply: String = client.request("/echo", &"hi").await.unwrap();
        assert_eq!(reply, "\"hi\"");

        client.close().await;
        assert!(!client.is_connected());
        assert_matches!(client.push("/echo", &1).await, Err(CallError::NotConnected));
    }

    #[tokio::test]
    async fn request_async_delivers_reply() {
        let addr = fake_server(echo_server_router()).await;
        let client = client_for(&addr);
        client.connect().await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        client
            .request_async("/echo", &"async", move |ctx: ClientContext, reply: String| {
                let _ = tx.send((ctx.plane(), ctx.client().is_some(), reply));
            })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), (Plane::User, true, "\"async\"".to_owned()));
        client.close().await;
    }

    #[tokio::test]
    async fn replaced_session_is_closed() {
        let addr = fake_server(echo_server_router()).await;
        let client = client_for(&addr);
        client.connect().await.unwrap();
        let first = client.endpoint(Plane::User).unwrap();

        // A second session finishing while the first is still installed.
        let (address, channel) = connect::connect_dual(
            client.config(),
            &client.inner.user_router,
            &client.inner.system_router,
            |plane| client.context(plane),
        )
        .await
        .unwrap();
        client
            .install(Session {
                address,
                channel: Arc::new(channel),
            })
            .await;

        assert!(first.is_closed());
        assert!(client.is_connected());
        let reply: String = client.request("/echo", &"again").await.unwrap();
        assert_eq!(reply, "\"again\"");
        client.close().await;
    }

    #[tokio::test]
    async fn concurrent_connects_leave_one_open_session() {
        let addr = fake_server(echo_server_router()).await;
        let client = client_for(&addr);
        let (a, b) = tokio::join!(client.connect(), client.connect());
        a.unwrap();
        b.unwrap();
        assert!(client.is_connected());
        let reply: String = client.request("/echo", &"one").await.unwrap();
        assert_eq!(reply, "\"one\"");
        client.close().await;
    }

    #[tokio::test]
    async fn cancel_request() {
        let router = lookup_router(|_| String::new());
        router
            .add_route(
                "/never",
                handler::unit(|(): ()| async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, Infallible>(())
                }),
            )
            .unwrap();
        let addr = fake_server(router).await;
        let client = client_for(&addr);
        client.connect().await.unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        drop(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        }));
        let result = client.request_with_cancel::<_, ()>("/never", &(), &token).await;
        assert_matches!(result, Err(CallError::Canceled));
        client.close().await;
    }

    #[tokio::test]
    async fn duplicate_handler_rejected() {
        let client = client_for("127.0.0.1:1");
        let notice = || {
            handler::text(|_ctx: ClientContext, _s: String| async { Ok::<_, Infallible>(()) })
        };
        client.add_handler("/notice", notice()).unwrap();
        let err = client.add_handler("/notice", notice()).unwrap_err();
        assert_matches!(err, ClientError::Route(_));
    }

    #[tokio::test]
    async fn handler_context_reaches_client() {
        let client = client_for("127.0.0.1:1");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client.add_middleware(
            "/",
            middleware::unit(|ctx: ClientContext| async move {
                if ctx.plane() == Plane::User { Ok(()) } else { Err("wrong plane") }
            }),
        );
        client
            .add_handler(
                "/ping",
                handler::unit(move |ctx: ClientContext| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(ctx.client().is_some());
                        Ok::<_, Infallible>(())
                    }
                }),
            )
            .unwrap();

        let ctx = client.context(Plane::User);
        let codec = gale_core::JsonCodec;
        client
            .inner
            .user_router
            .dispatch(ctx, &codec, "/ping", "")
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(true));
    }
}
