//! Defines the service provider interface for storage back-end implementors.

use super::error::Error;
use async_trait::async_trait;
use std::{
    fmt::{self, Debug, Display, Formatter},
    future::Future,
    path::Path,
    pin::Pin,
    result,
};
use tokio::io::AsyncRead;

/// Tells if STOR restarts are supported by the storage back-end i.e. writing from a different byte
/// offset than zero.
pub const FEATURE_RESTART: u32 = 0b0000_0001;

/// Result type used by traits in this module
pub type Result<T> = result::Result<T, Error>;

/// The readable end of a data connection as it is handed to a storage back-end.
pub type DataSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// What a write operation hands back: nothing when the data is stored once the call returns, or a
/// [`BackgroundTransfer`] that still has to run to finalize the stored entry.
pub type Completion = Option<Box<dyn BackgroundTransfer>>;

/// The future returned by [`BackgroundTransfer::finish`].
pub type FinishFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// The outcome of looking up a file name in a directory of the storage back-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget<D, E> {
    /// The directory that contains (or will contain) the file
    pub directory: D,
    /// The name of the file inside `directory`
    pub file_name: String,
    /// The existing entry, `None` if nothing is stored under `file_name` yet
    pub entry: Option<E>,
}

impl<D, E> Display for FileTarget<D, E>
where
    D: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.directory, self.file_name)
    }
}

/// Work that has to happen after the data connection closed to make an upload final, for instance
/// moving a temporary file in place. The server runs it on its background transfer queue, after
/// the client already received its reply.
pub trait BackgroundTransfer: Send + Debug {
    /// An identifier for this transfer, used in logs and in the queue's status overview.
    fn transfer_id(&self) -> &str;

    /// Consumes the transfer and performs the finalization.
    fn finish(self: Box<Self>) -> FinishFuture;
}

/// The `StorageBackend` trait can be implemented to create custom FTP virtual file systems. Once
/// implemented it needs to be registered with the `Server` on construction.
///
/// All write operations read the uploaded bytes from a [`DataSource`] they only borrow: the
/// server owns the data connection and closes it once the operation returns.
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    /// A handle to a directory in this back-end.
    type Directory: Debug + Send + Sync;

    /// A handle to an existing file in this back-end.
    type Entry: Debug + Send + Sync;

    /// Tells which optional features are supported by the storage back-end
    /// Return a value with bits set according to the FEATURE_* constants.
    fn supported_features(&self) -> u32 {
        0
    }

    /// Looks up `name` relative to `cwd`. Returns `Ok(None)` when the directory part doesn't
    /// resolve to a usable directory.
    async fn search_file(&self, cwd: &Path, name: &str) -> Result<Option<FileTarget<Self::Directory, Self::Entry>>>;

    /// Creates a new file named `file_name` in `directory` with the content read from `input`.
    async fn create(&self, directory: &Self::Directory, file_name: &str, input: DataSource<'_>) -> Result<Completion>;

    /// Replaces the content of an existing file with the content read from `input`.
    async fn replace(&self, entry: &Self::Entry, input: DataSource<'_>) -> Result<Completion>;

    /// Writes the content read from `input` into the target file starting at byte `start_pos`.
    /// If the target has no existing entry the back-end creates it.
    async fn append(&self, target: &FileTarget<Self::Directory, Self::Entry>, start_pos: u64, input: DataSource<'_>) -> Result<Completion>;
}
