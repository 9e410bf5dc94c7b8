//! Contains code pertaining to the FTP *data* channel

use async_trait::async_trait;
use std::{
    fmt::{self, Debug},
    future::Future,
    io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf},
    net::{TcpListener, ToSocketAddrs},
    time::Sleep,
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use super::options::DEFAULT_DATA_ACCEPT_TIMEOUT_SECS;

/// A transport stream that can carry the bytes of one transfer.
pub trait DataStream: AsyncRead + AsyncWrite + Send + Unpin + Debug {}

impl<T> DataStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + Debug {}

/// Hands out data connections. The server asks for exactly one stream per transfer, after it
/// told the client (with a `150` reply) that it is about to open it.
#[async_trait]
pub trait DataChannelProvider: Send + Sync + Debug {
    /// Establishes the data connection for the next transfer.
    async fn acquire(&self) -> io::Result<Box<dyn DataStream>>;
}

/// A [`DataChannelProvider`] that accepts one incoming TCP connection per transfer on a listener
/// the client was told about beforehand.
#[derive(Debug)]
pub struct TcpDataListener {
    listener: TcpListener,
    accept_timeout: Duration,
}

impl TcpDataListener {
    /// Binds the listener to the given address.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(TcpDataListener {
            listener,
            accept_timeout: Duration::from_secs(DEFAULT_DATA_ACCEPT_TIMEOUT_SECS),
        })
    }

    /// Sets how long to wait for the client to connect before giving up on the transfer.
    pub fn accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    /// The address clients have to connect to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl DataChannelProvider for TcpDataListener {
    #[tracing_attributes::instrument]
    async fn acquire(&self) -> io::Result<Box<dyn DataStream>> {
        match tokio::time::timeout(self.accept_timeout, self.listener.accept()).await {
            Ok(Ok((stream, _peer))) => Ok(Box::new(stream)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "no data connection came in")),
        }
    }
}

/// The data connection of a single transfer.
///
/// Reads fail with [`io::ErrorKind::TimedOut`] when the client sends nothing for longer than the
/// read timeout. Every read that has to wait arms a fresh deadline, so time spent between reads
/// doesn't count. Reads fail with [`io::ErrorKind::ConnectionAborted`] as soon as the transfer's
/// cancellation token fires.
///
/// The channel is released by [`DataChannel::close`], which consumes it.
pub(crate) struct DataChannel {
    stream: Box<dyn DataStream>,
    read_timeout: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
    cancel: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl DataChannel {
    /// Acquires a stream from `provider`. Gives up with [`io::ErrorKind::ConnectionAborted`] if
    /// `cancel` fires first.
    pub async fn open(provider: &dyn DataChannelProvider, read_timeout: Duration, cancel: &CancellationToken) -> io::Result<DataChannel> {
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(aborted()),
            stream = provider.acquire() => stream?,
        };
        Ok(DataChannel::new(stream, read_timeout, cancel.clone()))
    }

    pub fn new(stream: Box<dyn DataStream>, read_timeout: Duration, cancel: CancellationToken) -> Self {
        DataChannel {
            stream,
            read_timeout,
            deadline: None,
            cancelled: Box::pin(cancel.clone().cancelled_owned()),
            cancel,
        }
    }

    /// Shuts the stream down and drops it.
    pub async fn close(mut self, logger: &slog::Logger) {
        if let Err(err) = self.stream.shutdown().await {
            slog::debug!(logger, "Could not shutdown data channel: {}", err);
        }
    }
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "transfer aborted")
}

impl Debug for DataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannel")
            .field("stream", &self.stream)
            .field("read_timeout", &self.read_timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl AsyncRead for DataChannel {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.cancel.is_cancelled() || this.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(aborted()));
        }

        match Pin::new(&mut this.stream).poll_read(cx, buf) {
            Poll::Ready(result) => {
                // The next read starts its own idle period.
                this.deadline = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                let read_timeout = this.read_timeout;
                let deadline = this.deadline.get_or_insert_with(|| Box::pin(tokio::time::sleep(read_timeout)));
                match deadline.as_mut().poll(cx) {
                    Poll::Ready(()) => Poll::Ready(Err(io::Error::new(io::ErrorKind::TimedOut, "data channel read timed out"))),
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}
