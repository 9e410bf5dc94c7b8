//! Doubles for the storage back-end and the data channel provider, shared by the unit tests.

use crate::server::{
    background::BackgroundTransferQueue,
    chancomms::ControlChanMsg,
    controlchan::{command::Command, handler::CommandContext},
    datachan::{DataChannelProvider, DataStream},
    session::Session,
};
use crate::storage::{BackgroundTransfer, Completion, DataSource, Error, ErrorKind, FEATURE_RESTART, FileTarget, FinishFuture, Result, StorageBackend};

use async_trait::async_trait;
use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

/// A context for running `cmd` against `storage` in a fresh session. Must be called from within a
/// tokio runtime.
pub(crate) fn context_for(cmd: Command, storage: MockStorage) -> (CommandContext<MockStorage>, mpsc::Receiver<ControlChanMsg>) {
    let logger = slog::Logger::root(slog::Discard, slog::o!());
    let (tx, rx) = mpsc::channel(8);
    let context = CommandContext {
        parsed_command: cmd,
        session: Arc::new(tokio::sync::Mutex::new(Session::new())),
        storage: Arc::new(storage),
        data_channels: Arc::new(MockProvider::sending(b"")),
        transfer_queue: BackgroundTransferQueue::spawn(logger.clone(), false),
        tx_control_chan: tx,
        data_read_timeout: Duration::from_secs(10),
        cancel: CancellationToken::new(),
        logger,
    };
    (context, rx)
}

/// Knows one directory, `/`, and records every call made to it.
#[derive(Debug, Default)]
pub(crate) struct MockStorage {
    existing: Vec<String>,
    fail_with: Option<ErrorKind>,
    deferred: bool,
    no_restart: bool,
    calls: Mutex<Vec<String>>,
    written: Mutex<Vec<u8>>,
    pub finished: Arc<AtomicUsize>,
}

impl MockStorage {
    pub fn new() -> Self {
        MockStorage::default()
    }

    pub fn with_existing(mut self, name: &str) -> Self {
        self.existing.push(name.to_string());
        self
    }

    pub fn failing_with(mut self, kind: ErrorKind) -> Self {
        self.fail_with = Some(kind);
        self
    }

    /// Make writes hand back a completion that still has to run.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn without_restart(mut self) -> Self {
        self.no_restart = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    async fn write(&self, call: String, input: DataSource<'_>) -> Result<Completion> {
        self.calls.lock().unwrap().push(call.clone());
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).await?;
        self.written.lock().unwrap().extend_from_slice(&buf);
        if let Some(kind) = self.fail_with {
            return Err(Error::from(kind));
        }
        if self.deferred {
            return Ok(Some(Box::new(MockCompletion {
                id: call,
                finished: self.finished.clone(),
            })));
        }
        Ok(None)
    }
}

#[async_trait]
impl StorageBackend for MockStorage {
    type Directory = PathBuf;
    type Entry = PathBuf;

    fn supported_features(&self) -> u32 {
        if self.no_restart { 0 } else { FEATURE_RESTART }
    }

    async fn search_file(&self, cwd: &Path, name: &str) -> Result<Option<FileTarget<PathBuf, PathBuf>>> {
        self.calls.lock().unwrap().push(format!("search {name}"));
        if cwd != Path::new("/") {
            return Ok(None);
        }
        let entry = self.existing.iter().any(|e| e == name).then(|| cwd.join(name));
        Ok(Some(FileTarget {
            directory: cwd.to_path_buf(),
            file_name: name.to_string(),
            entry,
        }))
    }

    async fn create(&self, _directory: &PathBuf, file_name: &str, input: DataSource<'_>) -> Result<Completion> {
        self.write(format!("create {file_name}"), input).await
    }

    async fn replace(&self, entry: &PathBuf, input: DataSource<'_>) -> Result<Completion> {
        self.write(format!("replace {}", entry.display()), input).await
    }

    async fn append(&self, target: &FileTarget<PathBuf, PathBuf>, start_pos: u64, input: DataSource<'_>) -> Result<Completion> {
        self.write(format!("append {} {start_pos}", target.file_name), input).await
    }
}

#[derive(Debug)]
pub(crate) struct MockCompletion {
    pub id: String,
    pub finished: Arc<AtomicUsize>,
}

impl BackgroundTransfer for MockCompletion {
    fn transfer_id(&self) -> &str {
        &self.id
    }

    fn finish(self: Box<Self>) -> FinishFuture {
        Box::pin(async move {
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Hands out in-memory streams and counts how they are released.
#[derive(Debug, Default)]
pub(crate) struct MockProvider {
    payload: Vec<u8>,
    stall: bool,
    refuse: bool,
    pub acquisitions: AtomicUsize,
    pub shutdowns: Arc<AtomicUsize>,
    pub drops: Arc<AtomicUsize>,
}

impl MockProvider {
    /// Streams that deliver `payload` and then end.
    pub fn sending(payload: &[u8]) -> Self {
        MockProvider {
            payload: payload.to_vec(),
            ..Default::default()
        }
    }

    /// Streams on which the client never sends anything.
    pub fn stalling() -> Self {
        MockProvider {
            stall: true,
            ..Default::default()
        }
    }

    /// No data connection can be made.
    pub fn refusing() -> Self {
        MockProvider {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataChannelProvider for MockProvider {
    async fn acquire(&self) -> io::Result<Box<dyn DataStream>> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "no data connection"));
        }
        Ok(Box::new(MockStream {
            payload: self.payload.clone(),
            pos: 0,
            stall: self.stall,
            shutdowns: self.shutdowns.clone(),
            drops: self.drops.clone(),
        }))
    }
}

#[derive(Debug)]
struct MockStream {
    payload: Vec<u8>,
    pos: usize,
    stall: bool,
    shutdowns: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

impl AsyncRead for MockStream {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.payload.len() {
            let n = buf.remaining().min(this.payload.len() - this.pos);
            buf.put_slice(&this.payload[this.pos..this.pos + n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }
        if this.stall {
            // Only the cancellation token or the read deadline can wake this up.
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}
