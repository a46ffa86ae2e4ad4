// Line framing for the switch protocol.
//
// One frame per line, UTF-8, `TYPE<<metadata`. The decoder splits on the
// first `<<` only, so metadata may itself contain the separator. Trailing
// `\r\n` / `\n` are stripped. A line without the separator is a
// `FramingError::MissingSeparator`: the caller treats the connection as
// corrupted and drops it.
//
// `write_line` flushes after every frame. Writers are expected to be one
// long-lived `BufWriter` per connection, not reopened per frame.

use std::io::{BufRead, Write};

use crate::command::{Command, CommandType};
use crate::error::FramingError;

/// Separator between the command type and its metadata.
pub const SEPARATOR: &str = "<<";

/// Encode a command as a wire line (no trailing newline).
pub fn encode_line(command: &Command) -> String {
    command.render()
}

/// Decode a single wire line.
pub fn decode_line(line: &str) -> Result<Command, FramingError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (tag, metadata) =
        line.split_once(SEPARATOR)
            .ok_or_else(|| FramingError::MissingSeparator {
                line: line.to_string(),
            })?;
    Ok(Command::new(CommandType::parse(tag), metadata))
}

/// Read and decode the next line. Returns `FramingError::Closed` on a clean
/// EOF.
pub fn read_command<R: BufRead>(reader: &mut R) -> Result<Command, FramingError> {
    let mut line = String::new();
    let read = reader.read_line(&mut line)?;
    if read == 0 {
        return Err(FramingError::Closed);
    }
    decode_line(&line)
}

/// Write one line and flush.
pub fn write_line<W: Write>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn decode_splits_on_first_separator() {
        let cmd = decode_line("SERVER_MESSAGE<<look: a << inside\r\n").unwrap();
        assert_eq!(cmd.kind, CommandType::ServerMessage);
        assert_eq!(cmd.metadata, "look: a << inside");
    }

    #[test]
    fn decode_empty_metadata() {
        let cmd = decode_line("CHALLENGE<<").unwrap();
        assert_eq!(cmd.kind, CommandType::Challenge);
        assert_eq!(cmd.metadata, "");
    }

    #[test]
    fn missing_separator_is_framing_error() {
        let err = decode_line("LOGIN_INFORM 12").unwrap_err();
        assert!(matches!(err, FramingError::MissingSeparator { .. }));
    }

    #[test]
    fn read_until_eof() {
        let mut wire = Vec::new();
        write_line(&mut wire, "LOGIN_INFORM<<3:mode=1").unwrap();
        write_line(&mut wire, "ACTION_REPLY<<3:null:4").unwrap();

        let mut cursor = Cursor::new(wire);
        let first = read_command(&mut cursor).unwrap();
        assert_eq!(first.kind, CommandType::LoginInform);
        let second = read_command(&mut cursor).unwrap();
        assert_eq!(second.metadata, "3:null:4");
        assert!(matches!(
            read_command(&mut cursor),
            Err(FramingError::Closed)
        ));
    }

    #[test]
    fn encode_matches_decode() {
        let cmd = Command::new(CommandType::ServerPing, "null");
        let line = encode_line(&cmd);
        assert_eq!(line, "SERVER_PING<<null");
        assert_eq!(decode_line(&line).unwrap(), cmd);
    }
}
