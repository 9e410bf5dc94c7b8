//! Per-connection state that outlives a single command.

use std::{
    fmt::{self, Display, Formatter},
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A shared reference to the state of one control connection.
pub(crate) type SharedSession = Arc<Mutex<Session>>;

/// Identifies a client session in log output and in the background transfer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u64);

impl TraceId {
    pub(crate) fn new() -> Self {
        TraceId(uuid::Uuid::new_v4().as_u64_pair().0)
    }
}

impl Display for TraceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The representation type negotiated with `TYPE`.
///
/// `TYPE` isn't served here, so sessions start and stay in `Image`. The other modes are modelled
/// because `STOR` has to refuse the ones it can't store byte for byte, and only tests put a session
/// in them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum TransferType {
    #[cfg_attr(not(test), allow(dead_code))]
    Ascii,
    #[default]
    Image,
    #[cfg_attr(not(test), allow(dead_code))]
    Ebcdic,
    #[cfg_attr(not(test), allow(dead_code))]
    Local(u8),
}

impl TransferType {
    /// Uploads are stored byte for byte, which is only meaningful for these two.
    pub fn supports_upload(self) -> bool {
        matches!(self, TransferType::Ascii | TransferType::Image)
    }

    /// The type as it is written in a `TYPE` command.
    pub fn code(self) -> String {
        match self {
            TransferType::Ascii => "A".to_string(),
            TransferType::Image => "I".to_string(),
            TransferType::Ebcdic => "E".to_string(),
            TransferType::Local(size) => format!("L {size}"),
        }
    }
}

// This is where we keep the state for a ftp session.
#[derive(Debug)]
pub(crate) struct Session {
    pub trace_id: TraceId,
    pub cwd: PathBuf,
    pub transfer_type: TransferType,
    // The offset from a preceding `REST`. Consumed by the next `STOR`.
    pub start_pos: Option<u64>,
    // Cancels the transfer that is running right now, if any.
    pub data_abort: Option<CancellationToken>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Session {
            trace_id: TraceId::new(),
            cwd: "/".into(),
            transfer_type: TransferType::default(),
            start_pos: None,
            data_abort: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_session_starts_in_root_in_binary_mode() {
        let session = Session::new();
        assert_eq!(session.cwd, PathBuf::from("/"));
        assert_eq!(session.transfer_type, TransferType::Image);
        assert_eq!(session.start_pos, None);
        assert!(session.data_abort.is_none());
    }

    #[test]
    fn only_ascii_and_image_support_uploads() {
        assert!(TransferType::Ascii.supports_upload());
        assert!(TransferType::Image.supports_upload());
        assert!(!TransferType::Ebcdic.supports_upload());
        assert!(!TransferType::Local(8).supports_upload());
        assert_eq!(TransferType::Local(8).code(), "L 8");
    }

    #[test]
    fn trace_ids_differ_per_session() {
        assert_ne!(Session::new().trace_id, Session::new().trace_id);
    }
}
