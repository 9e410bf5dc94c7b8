//! Contains the [`Server`] struct that serves the control connections of FTP clients.

pub(crate) mod background;
pub(crate) mod chancomms;
pub(crate) mod controlchan;
pub(crate) mod datachan;
mod options;
pub(crate) mod session;
pub(crate) mod transfer;

#[cfg(test)]
pub(crate) mod test_support;

use crate::storage::StorageBackend;
use background::{BackgroundTransferQueue, QueuedTransfer};
use controlchan::{control_loop, error::ControlChanError};
use datachan::DataChannelProvider;
use options::{DEFAULT_DATA_READ_TIMEOUT_SECS, DEFAULT_GREETING, DEFAULT_IDLE_SESSION_TIMEOUT_SECS};

use slog::Drain;
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::io::{AsyncRead, AsyncWrite};

/// An instance of an FTP server that accepts uploads into a [`StorageBackend`].
///
/// The server doesn't listen by itself. Hand it every accepted control connection through
/// [`Server::serve_connection`], together with the [`DataChannelProvider`] that hands out the data
/// connections for that client.
///
/// # Example
///
/// ```no_run
/// use libunftp_stor::{Server, TcpDataListener};
/// use std::sync::Arc;
/// use tokio::net::TcpListener;
/// use unftp_stor_sbe_fs::Filesystem;
///
/// # async fn run() -> std::io::Result<()> {
/// let server = Arc::new(Server::new(Filesystem::new("/srv/ftp")?).greeting("Welcome to my FTP server"));
/// let listener = TcpListener::bind("127.0.0.1:2121").await?;
/// loop {
///     let (socket, _) = listener.accept().await?;
///     let data_channels = Arc::new(TcpDataListener::bind("127.0.0.1:0").await?);
///     let server = server.clone();
///     tokio::spawn(async move { server.serve_connection(socket, data_channels).await });
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct Server<Storage>
where
    Storage: StorageBackend,
{
    storage: Arc<Storage>,
    greeting: &'static str,
    idle_session_timeout: Duration,
    data_read_timeout: Duration,
    collect_metrics: bool,
    logger: slog::Logger,
    transfer_queue: OnceLock<BackgroundTransferQueue>,
}

impl<Storage> Server<Storage>
where
    Storage: StorageBackend + 'static,
{
    /// Construct a new [`Server`] with the given [`StorageBackend`]. The other parameters will be
    /// set to defaults.
    pub fn new(storage: Storage) -> Self {
        Server {
            storage: Arc::new(storage),
            greeting: DEFAULT_GREETING,
            idle_session_timeout: Duration::from_secs(DEFAULT_IDLE_SESSION_TIMEOUT_SECS),
            data_read_timeout: Duration::from_secs(DEFAULT_DATA_READ_TIMEOUT_SECS),
            collect_metrics: false,
            logger: default_logger(),
            transfer_queue: OnceLock::new(),
        }
    }

    /// Set the greeting that will be sent to the client after connecting.
    ///
    /// # Example
    ///
    /// ```rust
    /// use libunftp_stor::Server;
    /// use unftp_stor_sbe_fs::Filesystem;
    ///
    /// let server = Server::new(Filesystem::new(std::env::temp_dir()).unwrap()).greeting("Welcome to my FTP Server");
    /// ```
    pub fn greeting(mut self, greeting: &'static str) -> Self {
        self.greeting = greeting;
        self
    }

    /// Set the idle session timeout in seconds. The default is 600 seconds.
    ///
    /// A session that sends no command for this long gets a `421` reply and is disconnected.
    pub fn idle_session_timeout(mut self, secs: u64) -> Self {
        self.idle_session_timeout = Duration::from_secs(secs);
        self
    }

    /// Set how long, in seconds, a data connection may stay silent during an upload before the
    /// upload fails. The default is 10 seconds.
    ///
    /// The limit applies to every single read, not to the upload as a whole.
    pub fn data_read_timeout(mut self, secs: u64) -> Self {
        self.data_read_timeout = Duration::from_secs(secs);
        self
    }

    /// Enable the collection of prometheus metrics.
    ///
    /// # Example
    ///
    /// ```rust
    /// use libunftp_stor::Server;
    /// use unftp_stor_sbe_fs::Filesystem;
    ///
    /// let server = Server::new(Filesystem::new(std::env::temp_dir()).unwrap()).metrics();
    /// ```
    pub fn metrics(mut self) -> Self {
        self.collect_metrics = true;
        self
    }

    /// Sets the structured logger to use. Passing `None` brings back the default, which hands
    /// records to the `log` crate.
    pub fn logger<L: Into<Option<slog::Logger>>>(mut self, logger: L) -> Self {
        self.logger = logger.into().unwrap_or_else(default_logger);
        self
    }

    /// Serves the control connection of one client until it quits, disconnects or idles out.
    /// Must be called from within a tokio runtime.
    ///
    /// Returns an error if the connection broke or the session ran into a state it can't recover
    /// from.
    pub async fn serve_connection<IO>(&self, io: IO, data_channels: Arc<dyn DataChannelProvider>) -> Result<(), ControlChanError>
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let transfer_queue = self
            .transfer_queue
            .get_or_init(|| BackgroundTransferQueue::spawn(self.logger.new(slog::o!("component" => "background-transfers")), self.collect_metrics))
            .clone();
        let config = control_loop::Config {
            storage: self.storage.clone(),
            data_channels,
            transfer_queue,
            greeting: self.greeting,
            idle_session_timeout: self.idle_session_timeout,
            data_read_timeout: self.data_read_timeout,
            collect_metrics: self.collect_metrics,
            logger: self.logger.clone(),
        };
        control_loop::serve(config, io).await
    }

    /// Lists the background transfers that were handed over by finished uploads but did not
    /// complete yet, across all sessions.
    pub fn pending_background_transfers(&self) -> Vec<QueuedTransfer> {
        self.transfer_queue.get().map(BackgroundTransferQueue::in_flight).unwrap_or_default()
    }
}

fn default_logger() -> slog::Logger {
    slog::Logger::root(slog_stdlog::StdLog.fuse(), slog::o!())
}
