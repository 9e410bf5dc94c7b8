use std::fmt;

/// A reply to the FTP client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: ReplyCode,
    msg: String,
}

/// The reply codes according to RFC 959 that this server sends.
//
// From: https://cr.yp.to/ftp/request.html#response
//
// The three digits form a code. Codes between 100 and 199 indicate marks; codes between 200
// and 399 indicate acceptance; codes between 400 and 599 indicate rejection.
//
// Servers must not send marks except where they are explicitly allowed. Many clients cannot
// handle unusual marks. STOR permits exactly one: 150, which must be followed by a completion
// or rejection code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ReplyCode {
    FileStatusOkay = 150,

    CommandOkay = 200,
    ServiceReady = 220,
    ClosingControlConnection = 221,
    ClosingDataConnection = 226,

    FileActionPending = 350,

    ServiceNotAvailable = 421,
    CantOpenDataConnection = 425,
    ConnectionClosed = 426,
    TransientFileError = 450,
    LocalError = 451,
    OutOfSpace = 452,

    CommandSyntaxError = 500,
    ParameterSyntaxError = 501,
    CommandNotImplemented = 502,
    FileError = 550,
    ExceededStorageAllocation = 552,
    BadFileName = 553,
}

impl Reply {
    pub fn new(code: ReplyCode, message: &str) -> Self {
        Reply {
            code,
            msg: message.to_string(),
        }
    }

    pub fn new_with_string(code: ReplyCode, msg: String) -> Self {
        Reply { code, msg }
    }

    pub fn code(&self) -> ReplyCode {
        self.code
    }

    pub fn msg(&self) -> &str {
        &self.msg
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code as u32, self.msg)
    }
}
