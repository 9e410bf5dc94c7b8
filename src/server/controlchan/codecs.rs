use super::{
    command::Command,
    error::ControlChanError,
    line_parser::{self, error::ParseError},
    reply::Reply,
};

use bytes::BytesMut;
use std::io::Write;
use tokio_util::codec::{Decoder, Encoder};

/// What the decoder yields for every line. A line that doesn't parse is not fatal for the control
/// channel, so it travels as an item instead of as a stream error.
pub(crate) type DecodedLine = Result<Command, ParseError>;

// FtpCodec implements tokio's `Decoder` and `Encoder` traits for the control channel, that we'll
// use to decode FTP commands and encode their responses.
#[derive(Debug, Default)]
pub(crate) struct FtpCodec {
    // Stored index of the next index to examine for a '\n' character. This is used to optimize
    // searching. For example, if `decode` was called with `abc`, it would hold `3`, because that
    // is the next index to examine. The next time `decode` is called with `abcde\n`, we will only
    // look at `de\n` before returning.
    next_index: usize,
}

impl FtpCodec {
    pub fn new() -> Self {
        FtpCodec { next_index: 0 }
    }
}

impl Decoder for FtpCodec {
    type Item = DecodedLine;
    type Error = ControlChanError;

    // Here we decode the incoming bytes into a meaningful command. We'll split on newlines, and
    // parse the resulting line using `line_parser::parse()`. This method will be called by tokio.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<DecodedLine>, Self::Error> {
        if let Some(newline_offset) = buf[self.next_index..].iter().position(|b| *b == b'\n') {
            let newline_index = newline_offset + self.next_index;
            let line = buf.split_to(newline_index + 1);
            self.next_index = 0;
            Ok(Some(line_parser::parse(line.freeze())))
        } else {
            self.next_index = buf.len();
            Ok(None)
        }
    }
}

impl Encoder<Reply> for FtpCodec {
    type Error = ControlChanError;

    // Here we encode the outgoing response
    fn encode(&mut self, reply: Reply, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let mut buffer = vec![];
        if reply.msg().is_empty() {
            writeln!(buffer, "{}\r", reply.code() as u32)?;
        } else {
            writeln!(buffer, "{} {}\r", reply.code() as u32, reply.msg())?;
        }
        buf.extend(&buffer);
        Ok(())
    }
}
