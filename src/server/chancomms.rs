//! Contains code pertaining to the communication between the data and control channels.

use crate::server::controlchan::reply::Reply;
use std::fmt;

/// Messages that command handlers send to the control loop while they run.
#[derive(Debug)]
pub(crate) enum ControlChanMsg {
    /// Reply on the command channel. Used for the marks (1xx) that have to reach the client
    /// before the handler finishes.
    CommandChannelReply(Reply),
    /// Quit the client connection
    ExitControlLoop,
}

impl fmt::Display for ControlChanMsg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
