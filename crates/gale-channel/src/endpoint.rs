//! One plane of one connection.
//!
//! An [`Endpoint`] owns the write half of its connection behind an async
//! write lock, its own correlator, and a handle to the router of its plane.
//! The read half is driven by [`crate::dispatcher`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gale_core::{CallError, Codec, ConnectionId, Envelope, MessageKind, Plane};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::correlator::{Correlator, ReplyHandler};
use crate::router::Router;
use crate::transport::FrameWriter;

/// One plane of one connection.
pub struct Endpoint<C> {
    id: ConnectionId,
    plane: Plane,
    router: Arc<Router<C>>,
    correlator: Arc<Correlator>,
    codec: Arc<dyn Codec>,
    writer: Mutex<Option<Box<dyn FrameWriter>>>,
    closed: AtomicBool,
    cancel: CancellationToken,
    timeout: Duration,
}

impl<C> std::fmt::Debug for Endpoint<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("plane", &self.plane)
            .field("closed", &self.is_closed())
            .field("pending", &self.correlator.len())
            .finish_non_exhaustive()
    }
}

impl<C> Endpoint<C> {
    /// Wrap the write half of a freshly opened connection.
    pub fn new(
        plane: Plane,
        router: Arc<Router<C>>,
        codec: Arc<dyn Codec>,
        writer: Box<dyn FrameWriter>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            plane,
            router,
            correlator: Arc::new(Correlator::new()),
            codec,
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            timeout,
        }
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Plane this endpoint carries.
    pub fn plane(&self) -> Plane {
        self.plane
    }

    /// Router consulted for inbound Requests and Pushes.
    pub fn router(&self) -> &Arc<Router<C>> {
        &self.router
    }

    /// Outstanding calls.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Codec for payloads and envelopes.
    pub fn codec(&self) -> &dyn Codec {
        &*self.codec
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Token cancelled when the endpoint closes.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether [`Endpoint::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Encode and write one envelope under the write lock.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), CallError> {
        if self.is_closed() {
            return Err(CallError::Closed);
        }
        let frame = self.codec.encode_envelope(envelope)?;
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(CallError::Closed);
        };
        writer.write_frame(frame).await?;
        Ok(())
    }

    /// Fire-and-forget message. Returns once the frame is written.
    pub async fn push<T: Serialize + ?Sized>(
        &self,
        route: &str,
        payload: &T,
    ) -> Result<(), CallError> {
        let body = self.codec.encode_payload(payload)?;
        self.send(&Envelope::push(route, body)).await
    }

    /// Request and wait for the decoded reply.
    pub async fn request<T, R>(&self, route: &str, payload: &T) -> Result<R, CallError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let raw = self.call(route, payload, None).await?;
        Ok(self.codec.decode_payload(&raw)?)
    }

    /// Like [`Endpoint::request`], but gives up with
    /// [`CallError::Canceled`] when `cancel` fires first.
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
        let raw = self.call(route, payload, Some(cancel)).await?;
        Ok(self.codec.decode_payload(&raw)?)
    }

    async fn call<T: Serialize + ?Sized>(
        &self,
        route: &str,
        payload: &T,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, CallError> {
        if self.is_closed() {
            return Err(CallError::Closed);
        }
        let body = self.codec.encode_payload(payload)?;
        let (id, deadline, mut rx) = self.correlator.register(None, self.timeout).into_parts();
        let envelope = request_envelope(&id, route, body);
        if let Err(error) = self.send(&envelope).await {
            let _ = self.correlator.forget(&id);
            return Err(error);
        }

        let never = CancellationToken::new();
        let cancel = cancel.unwrap_or(&never);
        tokio::select! {
            biased;
            outcome = &mut rx => return outcome.unwrap_or(Err(CallError::Closed)),
            () = cancel.cancelled() => {
                let _ = self.correlator.cancel(&id);
            }
            () = tokio::time::sleep_until(deadline) => {
                if self.correlator.expire(&id) {
                    warn!(route, id = %id, "request timed out");
                }
            }
        }
        // Whichever path removed the entry has already completed it.
        rx.await.unwrap_or(Err(CallError::Closed))
    }

    /// Send a request and return once it is written. `callback` runs with
    /// `ctx` and the decoded reply on the dispatcher task if a success Ack
    /// arrives before the timeout. Remote failures are logged at WARN; calls
    /// that end unanswered (timeout, close) at DEBUG.
    pub async fn request_async<T, R, F>(
        &self,
        route: &str,
        payload: &T,
        ctx: C,
        callback: F,
    ) -> Result<(), CallError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned + 'static,
        C: Send + 'static,
        F: FnOnce(C, R) + Send + 'static,
    {
        if self.is_closed() {
            return Err(CallError::Closed);
        }
        let body = self.codec.encode_payload(payload)?;
        let codec = Arc::clone(&self.codec);
        let reply: ReplyHandler = Box::new(move |raw| {
            let value: R = codec.decode_payload(raw)?;
            callback(ctx, value);
            Ok(())
        });
        let (id, deadline, rx) = self.correlator.register(Some(reply), self.timeout).into_parts();
        let envelope = request_envelope(&id, route, body);
        if let Err(error) = self.send(&envelope).await {
            let _ = self.correlator.forget(&id);
            return Err(error);
        }

        let correlator = Arc::clone(&self.correlator);
        let route = route.to_owned();
        drop(tokio::spawn(async move {
            let outcome = match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(result)) => result.map(drop),
                Ok(Err(_dropped)) => Err(CallError::Closed),
                // An Ack completed the call right at the deadline.
                Err(_elapsed) if !correlator.expire(&id) => Ok(()),
                Err(_elapsed) => Err(CallError::Timeout),
            };
            match outcome {
                Ok(()) => {}
                Err(error) if error.is_unanswered() => {
                    debug!(route, id = %id, %error, "async request unanswered");
                }
                Err(error) => warn!(route, id = %id, %error, "async request failed"),
            }
        }));
        Ok(())
    }

    /// Close the endpoint: stop the dispatcher, fail outstanding calls with
    /// [`CallError::Closed`], and close the write half. Only the first call
    /// does anything; it returns `true`.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        let drained = self.correlator.drain();
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(error) = writer.close().await {
                debug!(conn_id = %self.id, %error, "closing writer failed");
            }
        }
        debug!(conn_id = %self.id, plane = %self.plane, drained, "endpoint closed");
        true
    }
}

fn request_envelope(id: &gale_core::MessageId, route: &str, payload: String) -> Envelope {
    Envelope {
        id: id.clone(),
        route: route.to_owned(),
        kind: MessageKind::Request,
        payload,
        success: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher;
    use crate::handler;
    use crate::transport::{FrameReader, MemorySide, memory_pair};
    use assert_matches::assert_matches;
    use gale_core::JsonCodec;
    use serde::Deserialize;
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn endpoint(side: MemorySide, router: Arc<Router<()>>) -> Arc<Endpoint<()>> {
        let MemorySide { reader, writer } = side;
        let ep = Arc::new(Endpoint::new(
            Plane::User,
            router,
            Arc::new(JsonCodec),
            Box::new(writer),
            TIMEOUT,
        ));
        drop(dispatcher::spawn(Arc::clone(&ep), Box::new(reader), ()));
        ep
    }

    fn linked(server: Arc<Router<()>>) -> (Arc<Endpoint<()>>, Arc<Endpoint<()>>) {
        let (a, b) = memory_pair(16);
        (endpoint(a, Arc::new(Router::new())), endpoint(b, server))
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let router = Arc::new(Router::new());
        router
            .add_route(
                "/echo",
                handler::typed(|(): (), p: Point| async move { Ok::<_, Infallible>(p) }),
            )
            .unwrap();
        let (client, _server) = linked(router);

        let back: Point = client.request("/echo", &Point { x: 3, y: -4 }).await.unwrap();
        assert_eq!(back, Point { x: 3, y: -4 });
        assert!(client.correlator().is_empty());
    }

    #[tokio::test]
    async fn failure_ack_is_remote_error() {
        let (client, _server) = linked(Arc::new(Router::new()));
        let err = client.request::<_, ()>("/missing", &()).await.unwrap_err();
        assert_matches!(err, CallError::Remote(text) if text == "route not found");
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (a, _b) = memory_pair(16);
        // Nobody reads the far side, so no Ack ever comes back.
        let client = endpoint(a, Arc::new(Router::new()));
        let err = client.request::<_, ()>("/slow", &1).await.unwrap_err();
        assert_matches!(err, CallError::Timeout);
        assert!(client.correlator().is_empty());
    }

    #[tokio::test]
    async fn cancel_token_aborts_wait() {
        let (a, _b) = memory_pair(16);
        let client = endpoint(a, Arc::new(Router::new()));
        let token = CancellationToken::new();
        let trigger = token.clone();
        drop(tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        }));
        let err = client
            .request_with_cancel::<_, ()>("/never", &(), &token)
            .await
            .unwrap_err();
        assert_matches!(err, CallError::Canceled);
        assert!(client.correlator().is_empty());
    }

    #[tokio::test]
    async fn close_drains_pending_and_is_idempotent() {
        let (a, _b) = memory_pair(16);
        let client = endpoint(a, Arc::new(Router::new()));
        let waiter = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.request::<_, ()>("/never", &()).await })
        };
        while client.correlator().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(client.close().await);
        assert!(!client.close().await);
        assert_matches!(waiter.await.unwrap(), Err(CallError::Closed));
        assert_matches!(client.push("/x", &()).await, Err(CallError::Closed));
    }

    #[tokio::test]
    async fn peer_disconnect_closes_endpoint() {
        let (a, b) = memory_pair(16);
        let client = endpoint(a, Arc::new(Router::new()));
        drop(b);
        client.cancellation_token().cancelled().await;
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn push_reaches_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Arc::new(Router::new());
        let counter = Arc::clone(&hits);
        router
            .add_route(
                "/tick",
                handler::typed(move |(): (), n: usize| {
                    let counter = Arc::clone(&counter);
                    async move {
                        let _ = counter.fetch_add(n, Ordering::SeqCst);
                        Ok::<_, Infallible>(())
                    }
                }),
            )
            .unwrap();
        let (client, _server) = linked(router);
        client.push("/tick", &2).await.unwrap();
        client.push("/tick", &3).await.unwrap();
        // A request after the pushes returns only once both were handled.
        let _ = client.request::<_, ()>("/missing", &()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn async_request_invokes_callback() {
        let router = Arc::new(Router::new());
        router
            .add_route(
                "/double",
                handler::typed(|(): (), n: i64| async move { Ok::<_, Infallible>(n * 2) }),
            )
            .unwrap();
        let (client, _server) = linked(router);
        let (tx, rx) = tokio::sync::oneshot::channel();
        client
            .request_async("/double", &21, (), move |(), n: i64| {
                let _ = tx.send(n);
            })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn async_request_timeout_removes_entry() {
        let (a, _b) = memory_pair(16);
        let client = endpoint(a, Arc::new(Router::new()));
        client.request_async("/never", &(), (), |(), (): ()| {}).await.unwrap();
        assert_eq!(client.correlator().len(), 1);
        tokio::time::sleep(TIMEOUT + Duration::from_millis(10)).await;
        assert!(client.correlator().is_empty());
    }

    #[tokio::test]
    async fn async_callback_receives_context() {
        let router = Arc::new(Router::new());
        router
            .add_route(
                "/double",
                handler::typed(|(): (), n: i64| async move { Ok::<_, Infallible>(n * 2) }),
            )
            .unwrap();
        let (a, b) = memory_pair(16);
        let MemorySide { reader, writer } = a;
        let client: Arc<Endpoint<&'static str>> = Arc::new(Endpoint::new(
            Plane::User,
            Arc::new(Router::new()),
            Arc::new(JsonCodec),
            Box::new(writer),
            TIMEOUT,
        ));
        drop(dispatcher::spawn(Arc::clone(&client), Box::new(reader), "client-ctx"));
        let _server = endpoint(b, router);

        let (tx, rx) = tokio::sync::oneshot::channel();
        client
            .request_async("/double", &4, "caller-ctx", move |ctx, n: i64| {
                let _ = tx.send((ctx, n));
            })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), ("caller-ctx", 8));
    }

    #[tokio::test]
    async fn async_request_cut_off_by_close_logs_at_debug() {
        let (logs, _guard) = gale_logging::capture_logs();
        let (a, _b) = memory_pair(16);
        let client = endpoint(a, Arc::new(Router::new()));
        client.request_async("/never", &(), (), |(), (): ()| {}).await.unwrap();
        assert!(client.close().await);

        for _ in 0..100 {
            if logs.has_event(tracing::Level::DEBUG, "async request unanswered") {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(logs.has_event(tracing::Level::DEBUG, "async request unanswered"));
        assert!(!logs.has_event(tracing::Level::WARN, "async request failed"));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn endpoints_can_cross_tasks() {
        assert_send_sync::<Endpoint<()>>();
        assert_send_sync::<Arc<Endpoint<()>>>();
        assert_send_sync::<crate::session::DualChannel<()>>();
    }

    #[tokio::test]
    async fn late_ack_after_timeout_is_ignored() {
        let (a, mut b) = memory_pair(16);
        let client = endpoint(a, Arc::new(Router::new()));
        let id = client.correlator().register(None, TIMEOUT).id().clone();
        assert!(client.correlator().expire(&id));

        let ack = Envelope {
            id,
            route: String::new(),
            kind: MessageKind::RequestAck,
            payload: "1".into(),
            success: true,
        };
        let frame = JsonCodec.marshal(&serde_json::to_value(&ack).unwrap()).unwrap();
        crate::transport::FrameWriter::write_frame(&mut b.writer, frame).await.unwrap();
        // The dispatcher absorbs the unknown id and keeps running.
        client.push("/anything", &()).await.unwrap();
        let pushed = b.reader.read_frame().await.unwrap().unwrap();
        assert!(pushed.contains("/anything"));
        assert!(!client.is_closed());
    }
}
