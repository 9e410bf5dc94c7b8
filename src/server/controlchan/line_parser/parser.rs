use super::error::{ParseErrorKind, Result};
use crate::server::controlchan::command::Command;

use bytes::Bytes;
use std::str;

/// Parse the given bytes into a [`Command`].
pub fn parse<T>(line: T) -> Result<Command>
where
    T: AsRef<[u8]> + Into<Bytes>,
{
    let line = line.into();
    let token_end = line.iter().position(|&b| b == b' ' || b == b'\r' || b == b'\n').unwrap_or(line.len());
    let (token, rest) = line.split_at(token_end);
    // Only the single space separating the verb from its argument is skipped, the line ending
    // stays in place for `parse_to_eol`.
    let rest = rest.strip_prefix(b" ").unwrap_or(rest);
    let cmd_token = normalize(token)?;
    let cmd_params = String::from(str::from_utf8(rest)?);

    let cmd = match &*cmd_token {
        "STOR" => {
            // An empty path is let through on purpose: the handler answers it with a 501.
            let path = parse_to_eol(cmd_params)?;
            Command::Stor {
                path: String::from_utf8_lossy(&path).to_string(),
            }
        }
        "REST" => {
            let params = parse_to_eol(cmd_params)?;
            if params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            match str::from_utf8(&params)?.trim().parse::<u64>() {
                Ok(offset) => Command::Rest { offset },
                Err(_) => return Err(ParseErrorKind::InvalidCommand.into()),
            }
        }
        "ABOR" => {
            no_params(cmd_params)?;
            Command::Abor
        }
        "NOOP" => {
            no_params(cmd_params)?;
            Command::Noop
        }
        "QUIT" => {
            no_params(cmd_params)?;
            Command::Quit
        }
        _ => {
            return Err(ParseErrorKind::UnknownCommand { command: cmd_token }.into());
        }
    };

    Ok(cmd)
}

fn no_params(text: String) -> Result<()> {
    if parse_to_eol(text)?.is_empty() {
        Ok(())
    } else {
        Err(ParseErrorKind::InvalidCommand.into())
    }
}

/// Try to parse `text`, up to end of line. Both `\r\n` and a bare `\n` end a line, a `\r` that
/// is not followed by `\n` is an error.
fn parse_to_eol(text: String) -> Result<Bytes> {
    let mut last_ch = '\n';
    for (idx, ch) in text.char_indices() {
        match (last_ch, ch) {
            ('\r', '\n') => return Ok(Bytes::copy_from_slice(&text.as_bytes()[..idx - 1])),
            ('\r', _) => return Err(ParseErrorKind::InvalidEol.into()),
            (_, '\n') => return Ok(Bytes::copy_from_slice(&text.as_bytes()[..idx])),
            _ => {}
        }
        last_ch = ch;
    }
    Err(ParseErrorKind::InvalidEol.into())
}

fn normalize(token: &[u8]) -> Result<String> {
    Ok(str::from_utf8(token).map(|t| t.to_uppercase())?)
}
