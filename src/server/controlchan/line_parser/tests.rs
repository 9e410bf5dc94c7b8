use super::error::{ParseError, ParseErrorKind};
use crate::server::controlchan::{command::Command, line_parser::parser::parse};

use pretty_assertions::assert_eq;

#[test]
fn parse_stor_cmd_crnl() {
    let input = "STOR report.txt\r\n";
    assert_eq!(parse(input).unwrap(), Command::Stor { path: "report.txt".into() });
}

#[test]
// Not all clients include the (actually mandatory) '\r'
fn parse_stor_cmd_nl() {
    let input = "STOR new.bin\n";
    assert_eq!(parse(input).unwrap(), Command::Stor { path: "new.bin".into() });
}

#[test]
fn parse_stor_cmd_mixed_case() {
    let input = "sToR new.bin\r\n";
    assert_eq!(parse(input).unwrap(), Command::Stor { path: "new.bin".into() });
}

#[test]
fn parse_stor_cmd_with_spaces_in_path() {
    let input = "STOR my report.txt\r\n";
    assert_eq!(parse(input).unwrap(), Command::Stor { path: "my report.txt".into() });
}

#[test]
// The handler decides what to do with a missing file name, not the parser.
fn parse_stor_cmd_without_path() {
    assert_eq!(parse("STOR\r\n").unwrap(), Command::Stor { path: "".into() });
    assert_eq!(parse("STOR \r\n").unwrap(), Command::Stor { path: "".into() });
}

#[test]
// Although we accept requests ending in only '\n', we won't accept requests ending only in '\r'
fn parse_stor_cmd_cr() {
    let input = "STOR report.txt\r";
    assert_eq!(parse(input), Err(ParseError::from(ParseErrorKind::InvalidEol)));
}

#[test]
// We should fail if the request does not end in '\n' or '\r'
fn parse_stor_cmd_no_eol() {
    let input = "STOR report.txt";
    assert_eq!(parse(input), Err(ParseError::from(ParseErrorKind::InvalidEol)));
}

#[test]
fn parse_rest() {
    assert_eq!(parse("REST 4096\r\n").unwrap(), Command::Rest { offset: 4096 });
    assert_eq!(parse("REST 0\n").unwrap(), Command::Rest { offset: 0 });
}

#[test]
fn parse_rest_invalid_offset() {
    assert_eq!(parse("REST abc\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    assert_eq!(parse("REST -1\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    assert_eq!(parse("REST\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
}

#[test]
fn parse_commands_without_params() {
    assert_eq!(parse("ABOR\r\n").unwrap(), Command::Abor);
    assert_eq!(parse("NOOP\n").unwrap(), Command::Noop);
    assert_eq!(parse("quit\r\n").unwrap(), Command::Quit);
}

#[test]
fn parse_noop_with_params_is_invalid() {
    assert_eq!(parse("NOOP now\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
}

#[test]
fn parse_unknown_command() {
    assert_eq!(
        parse("RETR report.txt\r\n"),
        Err(ParseError::from(ParseErrorKind::UnknownCommand { command: "RETR".into() }))
    );
}

#[test]
fn parse_invalid_utf8() {
    let input: &[u8] = b"STOR \xc3\x28\r\n";
    assert_eq!(parse(input), Err(ParseError::from(ParseErrorKind::InvalidUtf8)));
}
