//! axum WebSocket adapters for the frame transport traits.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gale_channel::{FrameReader, FrameWriter};
use gale_core::TransportError;
use tracing::debug;

/// Read half of an upgraded axum socket.
pub struct AxumReader {
    stream: SplitStream<WebSocket>,
}

/// Write half of an upgraded axum socket.
pub struct AxumWriter {
    sink: SplitSink<WebSocket, Message>,
}

/// Split an upgraded socket into boxed frame reader and writer.
pub fn split(socket: WebSocket) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>) {
    let (sink, stream) = socket.split();
    (Box::new(AxumReader { stream }), Box::new(AxumWriter { sink }))
}

#[async_trait]
impl FrameReader for AxumReader {
    async fn read_frame(&mut self) -> Result<Option<String>, TransportError> {
        while let Some(message) = self.stream.next().await {
            match message.map_err(|e| TransportError::Io(e.to_string()))? {
                Message::Text(text) => return Ok(Some(text.to_string())),
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => debug!(len = data.len(), "ignoring non-UTF-8 binary frame"),
                },
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl FrameWriter for AxumWriter {
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
