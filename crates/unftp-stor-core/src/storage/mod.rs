//! Contains the [`StorageBackend`] trait that can be implemented to store uploaded files with
//! libunftp-stor.
//!
//! To create a new storage back-end:
//!
//! 1. Declare dependencies on the async-trait, tokio, and unftp-stor-core crates:
//!
//! ```toml
//! async-trait = "0.1.88"
//! tokio = { version = "1.49.0", features = ["io-util"] }
//! unftp-stor-core = { path = "../path/to/unftp-stor-core" }
//! ```
//!
//! 2. Implement the [`StorageBackend`] trait:
//!
//! ```no_run
//! use async_trait::async_trait;
//! use std::path::{Path, PathBuf};
//! use unftp_stor_core::storage::{Completion, DataSource, FileTarget, Result, StorageBackend};
//!
//! #[derive(Debug)]
//! pub struct Vfs {}
//!
//! #[async_trait]
//! impl StorageBackend for Vfs {
//!     type Directory = PathBuf;
//!     type Entry = PathBuf;
//!
//!     async fn search_file(&self, cwd: &Path, name: &str) -> Result<Option<FileTarget<PathBuf, PathBuf>>> {
//!         unimplemented!()
//!     }
//!
//!     async fn create(&self, directory: &PathBuf, file_name: &str, input: DataSource<'_>) -> Result<Completion> {
//!         unimplemented!()
//!     }
//!
//!     async fn replace(&self, entry: &PathBuf, input: DataSource<'_>) -> Result<Completion> {
//!         unimplemented!()
//!     }
//!
//!     async fn append(&self, target: &FileTarget<PathBuf, PathBuf>, start_pos: u64, input: DataSource<'_>) -> Result<Completion> {
//!         unimplemented!()
//!     }
//! }
//! ```
//!
//! 3. Initialize it with the server in your application.
//!

mod error;
pub use error::{Error, ErrorKind};

mod storage_backend;
pub use storage_backend::{BackgroundTransfer, Completion, DataSource, FEATURE_RESTART, FileTarget, FinishFuture, Result, StorageBackend};
