use std::fmt;

/// A command as received on the control channel, after parsing.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Command {
    Stor {
        /// The path to the file the client would like to store. May be empty, which the `STOR`
        /// handler answers with a syntax error.
        path: String,
    },
    Rest {
        /// The byte offset at which the next transfer should start.
        offset: u64,
    },
    Abor,
    Noop,
    Quit,
}

impl Command {
    /// The verb of this command as it appears on the wire.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Stor { .. } => "STOR",
            Command::Rest { .. } => "REST",
            Command::Abor => "ABOR",
            Command::Noop => "NOOP",
            Command::Quit => "QUIT",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
