//! This module contains the implementations for the FTP commands defined in
//!
//! - [RFC 959 - FTP](https://tools.ietf.org/html/rfc959)
//! - [RFC 3659 - Extensions to FTP](https://tools.ietf.org/html/rfc3659)

mod abor;
mod noop;
mod quit;
mod rest;
mod stor;

pub use abor::Abor;
pub use noop::Noop;
pub use quit::Quit;
pub use rest::Rest;
pub use stor::Stor;

use super::{command::Command, handler::CommandHandler};
use crate::storage::StorageBackend;

/// Looks up the handler for a parsed command.
pub(crate) fn handler_for<Storage>(cmd: &Command) -> Box<dyn CommandHandler<Storage>>
where
    Storage: StorageBackend + 'static,
{
    match cmd {
        Command::Stor { .. } => Box::new(Stor),
        Command::Rest { offset } => Box::new(Rest::new(*offset)),
        Command::Abor => Box::new(Abor),
        Command::Noop => Box::new(Noop),
        Command::Quit => Box::new(Quit),
    }
}
