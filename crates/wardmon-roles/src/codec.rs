//! Newline-framed control protocol
//!
//! Both control channels speak newline-terminated ASCII records over
//! TCP. The codec accumulates received chunks and yields every complete
//! segment in order; a tail not yet terminated by `\n` stays buffered
//! for the next read, so framing is invariant under arbitrary chunk
//! boundaries.
//!
//! Tester to monitor records carry a verb, split from the value on the
//! first `:` only:
//!
//! ```text
//! NAME:<name>
//! CONFIG_REQUEST:
//! STATS_UPDATE:<compact-json-object>
//! ```
//!
//! The monitor answers a `CONFIG_REQUEST` with a single bare
//! `<json-object>` line.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;
use wardmon_core::{Error, Result};

/// Frames newline-terminated ASCII records
#[derive(Debug, Default)]
pub struct LineCodec;

impl LineCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let Some(end) = src.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = src.split_to(end + 1);
        Ok(Some(
            String::from_utf8_lossy(&line[..line.len() - 1]).into_owned(),
        ))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        // Complete records still buffered at EOF are delivered; an
        // unterminated tail is dropped with the connection.
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None => {
                if !src.is_empty() {
                    debug!("discarding {} unterminated bytes at EOF", src.len());
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// A control record from a tester
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Name(String),
    ConfigRequest,
    StatsUpdate(String),
}

impl Command {
    /// Parse one framed line into a command
    ///
    /// A record without `:` or with an unknown verb is a protocol
    /// error; the dispatcher logs it and keeps the connection.
    pub fn parse(line: &str) -> Result<Command> {
        let (verb, value) = line
            .split_once(':')
            .ok_or_else(|| Error::Protocol(format!("missing ':' in record {:?}", line)))?;
        match verb {
            "NAME" => Ok(Command::Name(value.to_string())),
            "CONFIG_REQUEST" => Ok(Command::ConfigRequest),
            "STATS_UPDATE" => Ok(Command::StatsUpdate(value.to_string())),
            _ => Err(Error::Protocol(format!("unknown command {:?}", verb))),
        }
    }

    /// The wire form of this command, without the trailing newline
    pub fn into_line(self) -> String {
        match self {
            Command::Name(name) => format!("NAME:{}", name),
            Command::ConfigRequest => "CONFIG_REQUEST:".to_string(),
            Command::StatsUpdate(json) => format!("STATS_UPDATE:{}", json),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_decode_complete_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("NAME:t1\nCONFIG_REQUEST:\n");
        assert_eq!(drain(&mut codec, &mut buf), vec!["NAME:t1", "CONFIG_REQUEST:"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_tail_is_retained() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("NAME:t1\nSTATS_UP");
        assert_eq!(drain(&mut codec, &mut buf), vec!["NAME:t1"]);
        assert_eq!(&buf[..], b"STATS_UP");

        buf.extend_from_slice(b"DATE:{}\n");
        assert_eq!(drain(&mut codec, &mut buf), vec!["STATS_UPDATE:{}"]);
    }

    #[test]
    fn test_framing_is_chunk_invariant() {
        let wire = b"NAME:alpha\nCONFIG_REQUEST:\nSTATS_UPDATE:{\"g\":-1}\n";
        let expected = vec![
            "NAME:alpha".to_string(),
            "CONFIG_REQUEST:".to_string(),
            "STATS_UPDATE:{\"g\":-1}".to_string(),
        ];

        for chunk_size in 1..wire.len() {
            let mut codec = LineCodec::new();
            let mut buf = BytesMut::new();
            let mut lines = Vec::new();
            for chunk in wire.chunks(chunk_size) {
                buf.extend_from_slice(chunk);
                lines.extend(drain(&mut codec, &mut buf));
            }
            assert_eq!(lines, expected, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_decode_eof_drops_unterminated_tail() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("NAME:t1\ntrailing");
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("NAME:t1".to_string()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("NAME:t1".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"NAME:t1\n");
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("NAME:t1").unwrap(), Command::Name("t1".to_string()));
        assert_eq!(Command::parse("CONFIG_REQUEST:").unwrap(), Command::ConfigRequest);
        assert_eq!(
            Command::parse("STATS_UPDATE:{\"g\":0.5}").unwrap(),
            Command::StatsUpdate("{\"g\":0.5}".to_string())
        );
    }

    #[test]
    fn test_value_splits_on_first_colon_only() {
        assert_eq!(
            Command::parse("NAME:a:b:c").unwrap(),
            Command::Name("a:b:c".to_string())
        );
    }

    #[test]
    fn test_malformed_records() {
        assert!(matches!(Command::parse("NAME"), Err(Error::Protocol(_))));
        assert!(matches!(
            Command::parse("BOGUS_CMD:value"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_command_round_trip() {
        for command in [
            Command::Name("t1".to_string()),
            Command::ConfigRequest,
            Command::StatsUpdate("{\"g\":true}".to_string()),
        ] {
            let line = command.clone().into_line();
            assert_eq!(Command::parse(&line).unwrap(), command);
        }
    }
}
