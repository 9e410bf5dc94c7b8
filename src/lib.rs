//! libunftp-stor is the upload path of an asynchronous FTP server.
//!
//! It handles the `STOR` command from end to end: it works out whether an upload creates,
//! replaces or resumes a file, streams the data connection into a [`StorageBackend`], and hands
//! any finalization the back-end asks for to a background queue so the client gets its reply
//! straight away. `REST`, `ABOR`, `NOOP` and `QUIT` are understood as well.
//!
//! Storage back-ends implement the [`StorageBackend`] trait from the `unftp-stor-core` crate. A
//! local filesystem back-end lives in `unftp-stor-sbe-fs`.
//!
//! [`StorageBackend`]: storage::StorageBackend

pub mod storage;

pub(crate) mod metrics;
mod server;

pub use crate::server::{
    Server,
    background::QueuedTransfer,
    controlchan::error::{ControlChanError, ControlChanErrorKind},
    datachan::{DataChannelProvider, DataStream, TcpDataListener},
    session::TraceId,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
