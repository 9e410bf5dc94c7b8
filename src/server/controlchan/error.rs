//! Contains the `ControlChanError` struct that that defines the control channel error type.

use super::line_parser::error::{ParseError, ParseErrorKind};
use crate::{BoxError, server::chancomms::ControlChanMsg};

use derive_more::Display;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// The error type returned by command handlers and the control loop.
#[derive(Error, Debug)]
#[error("control channel error: {kind}")]
pub struct ControlChanError {
    kind: ControlChanErrorKind,
    #[source]
    source: Option<BoxError>,
}

/// A list specifying categories of FTP errors. It is meant to be used with the [ControlChanError] type.
#[derive(Eq, PartialEq, Debug, Display, Clone)]
pub enum ControlChanErrorKind {
    /// We encountered a system IO error.
    #[display("Failed to perform IO")]
    IoError,
    /// Internal Server Error. This is probably a bug, i.e. when a channel to the control loop
    /// closed while a handler was still running.
    #[display("Internal Server Error")]
    InternalServerError,
    /// We encountered a non-UTF8 character in the command.
    #[display("Non-UTF8 character in command")]
    Utf8Error,
    /// The client issued a command we don't know about.
    #[display("Unknown command: {command}")]
    UnknownCommand {
        /// The command that we don't know about
        command: String,
    },
    /// The client issued a command that we know about, but in an invalid way (e.g. `REST` with a
    /// non-numeric offset).
    #[display("Invalid command (invalid parameter)")]
    InvalidCommand,
    /// The timer on the Control Channel elapsed.
    #[display("Encountered read timeout on the control channel")]
    ControlChannelTimeout,
    /// The session holds a transfer representation type that uploads can't be done in. This means
    /// the session was left in a broken state and is not something the client can fix by retrying.
    #[display("Unsupported transfer type {transfer_type}")]
    UnsupportedTransferType {
        /// The offending type as it would appear in a `TYPE` command
        transfer_type: String,
    },
    /// The running transfer was cancelled, typically because the client sent `ABOR`.
    #[display("Transfer aborted")]
    TransferAborted,
}

impl ControlChanError {
    /// Creates a new FTP Error with the specific kind
    pub fn new(kind: ControlChanErrorKind) -> Self {
        ControlChanError { kind, source: None }
    }

    /// Return the inner error kind of this error.
    pub fn kind(&self) -> &ControlChanErrorKind {
        &self.kind
    }
}

impl From<ControlChanErrorKind> for ControlChanError {
    fn from(kind: ControlChanErrorKind) -> ControlChanError {
        ControlChanError { kind, source: None }
    }
}

impl From<std::io::Error> for ControlChanError {
    fn from(err: std::io::Error) -> ControlChanError {
        ControlChanError {
            kind: ControlChanErrorKind::IoError,
            source: Some(Box::new(err)),
        }
    }
}

impl From<SendError<ControlChanMsg>> for ControlChanError {
    fn from(err: SendError<ControlChanMsg>) -> ControlChanError {
        ControlChanError {
            kind: ControlChanErrorKind::InternalServerError,
            source: Some(Box::new(err)),
        }
    }
}

impl From<ParseError> for ControlChanError {
    fn from(err: ParseError) -> ControlChanError {
        let kind = match err.kind().clone() {
            ParseErrorKind::UnknownCommand { command } => ControlChanErrorKind::UnknownCommand { command },
            ParseErrorKind::InvalidUtf8 => ControlChanErrorKind::Utf8Error,
            ParseErrorKind::InvalidCommand | ParseErrorKind::InvalidEol => ControlChanErrorKind::InvalidCommand,
        };
        ControlChanError {
            kind,
            source: Some(Box::new(err)),
        }
    }
}
