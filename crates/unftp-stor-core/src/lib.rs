//! Core traits and types for libunftp-stor storage back-ends.

pub mod storage;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
