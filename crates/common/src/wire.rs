//! Line-delimited JSON records understood by the actuator controller.
//!
//! Each record is `{"pwmR": <int>, "pwmL": <int>}` followed by `\n`. There is
//! no acknowledgement, framing or version beyond the newline.

use std::io;

use serde::Serialize;

use crate::MotorCommand;

pub const RECORD_SEPARATOR: u8 = b'\n';

/// Writes `", "` between members and `": "` before values, matching the
/// spacing the controller firmware was written against.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Encodes one complete record, separator included. Nothing is returned on
/// failure, so callers never see a partial record.
pub fn encode_command(command: &MotorCommand) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::with_capacity(32);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    command.serialize(&mut ser)?;
    buf.push(RECORD_SEPARATOR);
    Ok(buf)
}

/// Decodes one record; surrounding whitespace and the separator are ignored.
pub fn decode_command(line: &str) -> Result<MotorCommand, serde_json::Error> {
    serde_json::from_str(line.trim())
}
