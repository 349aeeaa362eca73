//! Frame-level transport seam.
//!
//! A physical duplex connection is split into a [`FrameReader`] owned by the
//! dispatcher task and a [`FrameWriter`] owned by the endpoint behind its
//! write lock. WebSocket adapters live in the server and client crates;
//! [`memory_pair`] links two endpoints in-process.

use async_trait::async_trait;
use gale_core::TransportError;
use tokio::sync::mpsc;

/// Read half of a connection.
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Next text frame, or `Ok(None)` once the peer has closed.
    async fn read_frame(&mut self) -> Result<Option<String>, TransportError>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    /// Write one text frame.
    async fn write_frame(&mut self, frame: String) -> Result<(), TransportError>;

    /// Close the connection. Further writes fail.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Reader side of an in-memory link.
pub struct MemoryReader {
    rx: mpsc::Receiver<String>,
}

/// Writer side of an in-memory link.
pub struct MemoryWriter {
    tx: Option<mpsc::Sender<String>>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn read_frame(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn write_frame(&mut self, frame: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// One side of an in-memory link.
pub struct MemorySide {
    /// Frames written by the other side.
    pub reader: MemoryReader,
    /// Frames delivered to the other side.
    pub writer: MemoryWriter,
}

/// Two connected in-memory sides. Frames written on one side are read on the
/// other, in order.
pub fn memory_pair(capacity: usize) -> (MemorySide, MemorySide) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (
        MemorySide {
            reader: MemoryReader { rx: a_rx },
            writer: MemoryWriter { tx: Some(a_tx) },
        },
        MemorySide {
            reader: MemoryReader { rx: b_rx },
            writer: MemoryWriter { tx: Some(b_tx) },
        },
    )
}
