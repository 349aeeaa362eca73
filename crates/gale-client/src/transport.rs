//! tokio-tungstenite adapters for the frame transport traits.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gale_channel::{FrameReader, FrameWriter};
use gale_core::TransportError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Read half of a tungstenite WebSocket.
pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

/// Write half of a tungstenite WebSocket.
pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

/// Split a WebSocket into boxed frame reader and writer.
pub fn split<S>(socket: WebSocketStream<S>) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = socket.split();
    (Box::new(WsReader { stream }), Box::new(WsWriter { sink }))
}

/// Dial `url` and split the resulting socket.
pub async fn dial(
    url: &str,
) -> Result<(Box<dyn FrameReader>, Box<dyn FrameWriter>), TransportError> {
    let (socket, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::Connect {
            url: url.to_owned(),
            message: e.to_string(),
        })?;
    debug!(url, "websocket connected");
    Ok(split(socket))
}

#[async_trait]
impl<S> FrameReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_frame(&mut self) -> Result<Option<String>, TransportError> {
        while let Some(message) = self.stream.next().await {
            match message.map_err(|e| TransportError::Io(e.to_string()))? {
                Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => debug!(len = data.len(), "ignoring non-UTF-8 binary frame"),
                },
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl<S> FrameWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_frame(&mut self, frame: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frames_cross_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let socket = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let (mut reader, mut writer) = split(socket);
            let got = reader.read_frame().await.unwrap().unwrap();
            writer.write_frame(format!("echo:{got}")).await.unwrap();
            writer.close().await.unwrap();
        });

        let (mut reader, mut writer) = dial(&format!("ws://{addr}/user")).await.unwrap();
        writer.write_frame("hello".into()).await.unwrap();
        assert_eq!(reader.read_frame().await.unwrap().as_deref(), Some("echo:hello"));
        assert!(reader.read_frame().await.unwrap().is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn dial_refused_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = dial(&format!("ws://{addr}/user")).await.err().unwrap();
        assert_matches!(err, TransportError::Connect { .. });
    }
}
