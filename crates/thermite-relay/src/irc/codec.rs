//! Line framing for the IRC byte stream.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Inbound lines longer than this (tags included) are discarded.
const MAX_INBOUND_LINE: usize = 8191 + 512;

/// CRLF/LF line codec. Invalid UTF-8 is decoded lossily since channel
/// traffic is not guaranteed to be UTF-8.
#[derive(Debug, Default)]
pub struct IrcCodec {
    /// Set while skipping the remainder of an oversized line.
    discarding: bool,
}

impl Decoder for IrcCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_INBOUND_LINE {
                    src.clear();
                    self.discarding = true;
                }
                return Ok(None);
            };

            let raw = src.split_to(newline + 1);
            if std::mem::take(&mut self.discarding) || raw.len() > MAX_INBOUND_LINE {
                continue;
            }

            let line = String::from_utf8_lossy(&raw[..newline]);
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line.to_string()));
        }
    }
}

impl Encoder<String> for IrcCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // strip embedded line breaks so one item can never become two lines
        let clean: String = item.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
        dst.reserve(clean.len() + 2);
        dst.put_slice(clean.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_crlf_and_lf() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(&b"PING a\r\nPING b\nPART"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING a"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING b"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"PART");
    }

    #[test]
    fn invalid_utf8_is_lossy() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(&b"PRIVMSG #c :\xff\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("PRIVMSG #c :"));
        assert!(line.ends_with('\u{fffd}'));
    }

    #[test]
    fn oversized_line_is_dropped() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'a'; MAX_INBOUND_LINE + 10]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"tail\r\nPING ok\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING ok"));
    }

    #[test]
    fn encode_appends_crlf_and_strips_breaks() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode("PRIVMSG #c :a\r\nQUIT".to_string(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #c :aQUIT\r\n");
    }
}
