//! Per-connection read loop.
//!
//! Frames are handled strictly in arrival order: the next frame is not read
//! until the current handler has returned and its Ack has been written.

use std::sync::Arc;

use gale_core::{Envelope, MessageKind};
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::endpoint::Endpoint;
use crate::transport::FrameReader;

fn kind_label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Request => "request",
        MessageKind::Push => "push",
        MessageKind::RequestAck => "request_ack",
        MessageKind::PushAck => "push_ack",
    }
}

/// Spawn [`run`] on the runtime.
pub fn spawn<C>(endpoint: Arc<Endpoint<C>>, reader: Box<dyn FrameReader>, ctx: C) -> JoinHandle<()>
where
    C: Clone + Send + 'static,
{
    tokio::spawn(run(endpoint, reader, ctx))
}

/// Read frames until the peer goes away, the transport fails, or the
/// endpoint is closed, then close the endpoint.
#[instrument(skip_all, fields(conn_id = %endpoint.id(), plane = %endpoint.plane()))]
pub async fn run<C>(endpoint: Arc<Endpoint<C>>, mut reader: Box<dyn FrameReader>, ctx: C)
where
    C: Clone + Send + 'static,
{
    let cancel = endpoint.cancellation_token().clone();
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => {
                debug!("endpoint closed locally");
                break;
            }
            frame = reader.read_frame() => frame,
        };
        match frame {
            Ok(Some(text)) => handle_frame(&endpoint, ctx.clone(), &text).await,
            Ok(None) => {
                debug!("peer closed connection");
                break;
            }
            Err(error) => {
                warn!(%error, "transport read failed");
                break;
            }
        }
    }
    let _ = endpoint.close().await;
}

async fn handle_frame<C>(endpoint: &Endpoint<C>, ctx: C, text: &str)
where
    C: Clone + Send + 'static,
{
    let plane = endpoint.plane().as_str();
    let envelope = match endpoint.codec().decode_envelope(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            counter!("gale_malformed_frames_total", "plane" => plane).increment(1);
            warn!(%error, "skipping malformed envelope");
            return;
        }
    };
    counter!("gale_frames_total", "plane" => plane, "kind" => kind_label(envelope.kind))
        .increment(1);

    match envelope.kind {
        MessageKind::PushAck => {}
        MessageKind::RequestAck => {
            let _ = endpoint
                .correlator()
                .resolve(&envelope.id, envelope.success, envelope.payload);
        }
        MessageKind::Request | MessageKind::Push => {
            let outcome = endpoint
                .router()
                .dispatch(ctx, endpoint.codec(), &envelope.route, &envelope.payload)
                .await;
            let (success, payload) = match outcome {
                Ok(payload) => (true, payload),
                Err(error) => {
                    counter!(
                        "gale_dispatch_errors_total",
                        "plane" => plane,
                        "error_type" => error.kind()
                    )
                    .increment(1);
                    if envelope.kind == MessageKind::Push {
                        warn!(route = %envelope.route, %error, "push handling failed");
                    } else {
                        debug!(route = %envelope.route, %error, "request failed");
                    }
                    (false, error.to_string())
                }
            };
            write_ack(endpoint, &envelope, success, payload).await;
        }
    }
}

async fn write_ack<C>(endpoint: &Endpoint<C>, envelope: &Envelope, success: bool, payload: String) {
    let Some(ack) = envelope.reply(success, payload) else {
        return;
    };
    if let Err(error) = endpoint.send(&ack).await {
        warn!(id = %ack.id, %error, "failed to write ack");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler;
    use crate::router::Router;
    use crate::transport::{FrameWriter, MemorySide, memory_pair};
    use gale_core::{Codec, JsonCodec, Plane};
    use std::convert::Infallible;
    use std::time::Duration;

    type Log = Arc<parking_lot::Mutex<Vec<String>>>;

    fn serve(side: MemorySide, router: Router<Log>, log: Log) -> Arc<Endpoint<Log>> {
        let MemorySide { reader, writer } = side;
        let ep = Arc::new(Endpoint::new(
            Plane::User,
            Arc::new(router),
            Arc::new(JsonCodec),
            Box::new(writer),
            Duration::from_secs(5),
        ));
        drop(spawn(Arc::clone(&ep), Box::new(reader), log));
        ep
    }

    fn frame(envelope: &Envelope) -> String {
        JsonCodec
            .marshal(&serde_json::to_value(envelope).unwrap())
            .unwrap()
    }

    fn decode(text: &str) -> Envelope {
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn frames_are_handled_in_arrival_order() {
        let router: Router<Log> = Router::new();
        router
            .add_route(
                "/slow",
                handler::text(|log: Log, raw: String| async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    log.lock().push(format!("slow {raw}"));
                    Ok::<_, Infallible>(())
                }),
            )
            .unwrap();
        router
            .add_route(
                "/fast",
                handler::text(|log: Log, raw: String| async move {
                    log.lock().push(format!("fast {raw}"));
                    Ok::<_, Infallible>(())
                }),
            )
            .unwrap();

        let log = Log::default();
        let (mut peer, side) = memory_pair(16);
        let _ep = serve(side, router, Arc::clone(&log));

        let first = Envelope::push("/slow", "1");
        let second = Envelope::request("/fast", "2");
        peer.writer.write_frame(frame(&first)).await.unwrap();
        peer.writer.write_frame(frame(&second)).await.unwrap();

        let ack1 = decode(&peer.reader.read_frame().await.unwrap().unwrap());
        let ack2 = decode(&peer.reader.read_frame().await.unwrap().unwrap());
        assert_eq!(ack1.id, first.id);
        assert_eq!(ack1.kind, MessageKind::PushAck);
        assert_eq!(ack2.id, second.id);
        assert_eq!(ack2.kind, MessageKind::RequestAck);
        assert_eq!(*log.lock(), vec!["slow 1".to_owned(), "fast 2".to_owned()]);
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let router: Router<Log> = Router::new();
        router
            .add_route("/ok", handler::unit(|_log: Log| async { Ok::<_, Infallible>(true) }))
            .unwrap();
        let (logs, _guard) = gale_logging::capture_logs();
        let (mut peer, side) = memory_pair(16);
        let ep = serve(side, router, Log::default());

        peer.writer.write_frame("{not json".into()).await.unwrap();
        peer.writer.write_frame(r#"{"id":"x","type":9}"#.into()).await.unwrap();
        let req = Envelope::request("/ok", "");
        peer.writer.write_frame(frame(&req)).await.unwrap();

        let ack = decode(&peer.reader.read_frame().await.unwrap().unwrap());
        assert_eq!(ack.id, req.id);
        assert!(ack.success);
        assert_eq!(ack.payload, "true");
        assert!(!ep.is_closed());
        assert_eq!(
            logs.events()
                .iter()
                .filter(|e| e.message.contains("skipping malformed envelope"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn unknown_route_gets_failure_ack() {
        let (mut peer, side) = memory_pair(16);
        let _ep = serve(side, Router::new(), Log::default());
        let req = Envelope::request("/nowhere", "");
        peer.writer.write_frame(frame(&req)).await.unwrap();
        let ack = decode(&peer.reader.read_frame().await.unwrap().unwrap());
        assert!(!ack.success);
        assert_eq!(ack.payload, "route not found");
        assert!(ack.route.is_empty());
    }

    #[tokio::test]
    async fn push_ack_is_discarded() {
        let (mut peer, side) = memory_pair(16);
        let ep = serve(side, Router::new(), Log::default());
        let stray = Envelope::push("/x", "").reply(true, "").unwrap();
        peer.writer.write_frame(frame(&stray)).await.unwrap();
        // Nothing is written back for a PushAck; the next request still works.
        let req = Envelope::request("/y", "");
        peer.writer.write_frame(frame(&req)).await.unwrap();
        let ack = decode(&peer.reader.read_frame().await.unwrap().unwrap());
        assert_eq!(ack.id, req.id);
        assert!(ep.correlator().is_empty());
    }

    #[tokio::test]
    async fn close_stops_the_loop() {
        let (_peer, side) = memory_pair(16);
        let MemorySide { reader, writer } = side;
        let ep = Arc::new(Endpoint::new(
            Plane::System,
            Arc::new(Router::<Log>::new()),
            Arc::new(JsonCodec),
            Box::new(writer),
            Duration::from_secs(5),
        ));
        let task = spawn(Arc::clone(&ep), Box::new(reader), Log::default());
        assert!(ep.close().await);
        task.await.unwrap();
    }
}
