//! Contains the [`StorageBackend`] trait that storage back-ends implement to receive uploads,
//! along with the types that travel through it.
//!
//! The trait is defined in the `unftp-stor-core` crate so that back-ends don't have to depend on
//! the server itself.

pub use unftp_stor_core::storage::*;
