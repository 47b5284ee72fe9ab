//! Byte transport underneath a connection.
//!
//! The connection only needs to write whole messages and read exact byte
//! counts. [`StreamTransport`] adapts any tokio stream; TCP is the common
//! case and has a convenience constructor.

use crate::error::ClientError;
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// An ordered, reliable byte stream.
pub trait Transport: Send {
    /// Writes all of `data`.
    fn write_bytes(&mut self, data: &[u8]) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Reads exactly `len` bytes. End of stream before that is an error.
    fn read_exactly(&mut self, len: usize) -> impl Future<Output = Result<Bytes, ClientError>> + Send;

    fn is_open(&self) -> bool;

    /// Closes the transport. Closing twice is not an error.
    fn close(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// [`Transport`] over a tokio stream, with an optional per-operation timeout.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: Option<S>,
    io_timeout: Option<Duration>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            io_timeout: None,
        }
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout
    }

    fn stream(&mut self) -> Result<&mut S, ClientError> {
        self.stream.as_mut().ok_or(ClientError::ConnectionClosed)
    }
}

impl StreamTransport<TcpStream> {
    /// Opens a TCP connection to `host:port`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}:{}...", host, port);

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ClientError::Timeout
            })?
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                ClientError::Io(e)
            })?;

        stream.set_nodelay(true).ok();
        tracing::debug!("TCP connected");
        Ok(Self::new(stream))
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    op: impl Future<Output = io::Result<T>>,
) -> Result<T, ClientError> {
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, op)
            .await
            .map_err(|_| ClientError::Timeout)?,
        None => op.await,
    };
    result.map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ClientError::ConnectionClosed,
        _ => ClientError::Io(e),
    })
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_bytes(&mut self, data: &[u8]) -> Result<(), ClientError> {
        let timeout = self.io_timeout;
        let stream = self.stream()?;
        with_timeout(timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
    }

    async fn read_exactly(&mut self, len: usize) -> Result<Bytes, ClientError> {
        let timeout = self.io_timeout;
        let stream = self.stream()?;
        let mut buf = BytesMut::zeroed(len);
        with_timeout(timeout, stream.read_exact(&mut buf)).await?;
        Ok(buf.freeze())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!("Shutting down transport");
            // The peer may already be gone.
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}
