//! Write side of a client connection.
//!
//! The handler task owns the read half; everything that writes to the peer
//! (routing from other handlers, list replies, shutdown) goes through a
//! [`Peer`]. Clones share the same underlying writer.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::protocol::{self, Envelope};

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Clone)]
pub struct Peer {
    writer: Arc<Mutex<Option<BoxWriter>>>,
    write_timeout: Option<Duration>,
}

impl Peer {
    pub fn new<W>(writer: W, write_timeout: Option<Duration>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Some(Box::new(writer)))),
            write_timeout,
        }
    }

    /// Writes one frame followed by a newline.
    pub async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(frame.len() + 1);
        buf.extend_from_slice(frame);
        buf.push(b'\n');

        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, self.write(&buf))
                .await
                .map_err(|_| Error::WriteTimeout(limit))?,
            None => self.write(&buf).await,
        }
    }

    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        let frame = protocol::encode(envelope)?;
        self.send_frame(&frame).await
    }

    async fn write(&self, buf: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::Closed)?;

        writer.write_all(buf).await?;
        writer.flush().await?;

        Ok(())
    }

    /// Shuts the writer down. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let writer = self.writer.lock().await.take();

        if let Some(mut w) = writer {
            w.shutdown().await?;
        }

        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }

    pub fn same_connection(&self, other: &Peer) -> bool {
        Arc::ptr_eq(&self.writer, &other.writer)
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}
