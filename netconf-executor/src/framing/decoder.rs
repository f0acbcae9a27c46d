//! Incremental decoder splitting the inbound byte stream into messages.

use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;

use super::codec::parse_chunk_size;
use super::{END_OF_MESSAGE, Framing};
use crate::error::FramingError;

/// Default upper bound for a single decoded message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Longest chunk header we accept: `\n#` + 10 digits + `\n`.
const MAX_CHUNK_HEADER: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Header,
    Data { remaining: usize },
}

/// Stateful frame decoder.
///
/// Bytes are appended with [`extend`](Self::extend) as they arrive and whole
/// messages are pulled out with [`next_message`](Self::next_message). Headers,
/// chunks and end-of-message markers may be split across reads arbitrarily.
///
/// The framing can be switched between messages; bytes already buffered but
/// not yet decoded are interpreted with the new framing.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    framing: Framing,
    state: ChunkState,
    message: BytesMut,
    max_message_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// A decoder starting in end-of-message mode.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            framing: Framing::EndOfMessage,
            state: ChunkState::Header,
            message: BytesMut::new(),
            max_message_size,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Switch framing for subsequent messages.
    pub fn set_framing(&mut self, framing: Framing) {
        self.framing = framing;
        self.state = ChunkState::Header;
        self.message.clear();
    }

    /// Number of buffered bytes not yet returned as a message.
    pub fn buffered(&self) -> usize {
        self.buffer.len() + self.message.len()
    }

    /// Append raw bytes read from the transport.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Decode the next complete message, if one is buffered.
    pub fn next_message(&mut self) -> Result<Option<Bytes>, FramingError> {
        match self.framing {
            Framing::EndOfMessage => self.next_end_of_message(),
            Framing::Chunked => self.next_chunked(),
        }
    }

    /// Append `data` and drain every message that is now complete.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>, FramingError> {
        self.extend(data);
        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }

    fn next_end_of_message(&mut self) -> Result<Option<Bytes>, FramingError> {
        match memmem::find(&self.buffer, END_OF_MESSAGE.as_bytes()) {
            Some(pos) => {
                let message = self.buffer.split_to(pos).freeze();
                self.buffer.advance(END_OF_MESSAGE.len());
                Ok(Some(message))
            }
            None if self.buffer.len() > self.max_message_size + END_OF_MESSAGE.len() => {
                Err(FramingError::MessageTooLarge {
                    max: self.max_message_size,
                })
            }
            None => Ok(None),
        }
    }

    fn next_chunked(&mut self) -> Result<Option<Bytes>, FramingError> {
        loop {
            match self.state {
                ChunkState::Header => {
                    if self.buffer.len() < 2 {
                        return Ok(None);
                    }
                    if &self.buffer[..2] != b"\n#" {
                        return Err(FramingError::InvalidChunkHeader(preview(&self.buffer)));
                    }
                    if self.buffer.len() < 3 {
                        return Ok(None);
                    }

                    if self.buffer[2] == b'#' {
                        if self.buffer.len() < 4 {
                            return Ok(None);
                        }
                        if self.buffer[3] != b'\n' {
                            return Err(FramingError::InvalidChunkHeader(preview(&self.buffer)));
                        }
                        self.buffer.advance(4);
                        return Ok(Some(self.message.split().freeze()));
                    }

                    let Some(lf) = memchr::memchr(b'\n', &self.buffer[2..]) else {
                        if self.buffer.len() >= MAX_CHUNK_HEADER {
                            return Err(FramingError::InvalidChunkSize(preview(&self.buffer[2..])));
                        }
                        return Ok(None);
                    };
                    let digits = &self.buffer[2..2 + lf];
                    let size = parse_chunk_size(digits)
                        .ok_or_else(|| FramingError::InvalidChunkSize(preview(digits)))?;
                    if self.message.len() + size > self.max_message_size {
                        return Err(FramingError::MessageTooLarge {
                            max: self.max_message_size,
                        });
                    }
                    self.buffer.advance(2 + lf + 1);
                    self.state = ChunkState::Data { remaining: size };
                }
                ChunkState::Data { remaining } => {
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(self.buffer.len());
                    self.message.extend_from_slice(&self.buffer[..take]);
                    self.buffer.advance(take);
                    self.state = if take == remaining {
                        ChunkState::Header
                    } else {
                        ChunkState::Data {
                            remaining: remaining - take,
                        }
                    };
                }
            }
        }
    }
}

fn preview(bytes: &[u8]) -> String {
    let end = bytes.len().min(16);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{encode, encode_chunked};

    #[test]
    fn test_end_of_message_split_marker() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"<rpc-reply/>]]>").unwrap().is_empty());
        let messages = decoder.push(b"]]><hello/>]]>]]>").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(&messages[0][..], b"<rpc-reply/>");
        assert_eq!(&messages[1][..], b"<hello/>");
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_chunked_byte_by_byte() {
        let framed = encode_chunked(b"<rpc-reply><ok/></rpc-reply>", 5);
        let mut decoder = FrameDecoder::new();
        decoder.set_framing(Framing::Chunked);

        let mut messages = Vec::new();
        for byte in framed.iter() {
            messages.extend(decoder.push(&[*byte]).unwrap());
        }
        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], b"<rpc-reply><ok/></rpc-reply>");
    }

    #[test]
    fn test_chunked_round_trip_lengths() {
        let mut decoder = FrameDecoder::new();
        decoder.set_framing(Framing::Chunked);
        for len in [0usize, 1, 4096, 4097, 70_000] {
            let payload = "x".repeat(len);
            let framed = encode_chunked(payload.as_bytes(), 4096);
            let messages = decoder.push(&framed).unwrap();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].len(), len);
        }
    }

    #[test]
    fn test_chunked_example_from_rfc() {
        let mut decoder = FrameDecoder::new();
        decoder.set_framing(Framing::Chunked);
        let messages = decoder
            .push(b"\n#4\n<rpc\n#18\n message-id=\"102\"\n\n#79\n     xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\n  <close-session/>\n</rpc>\n##\n")
            .unwrap();
        assert_eq!(messages.len(), 1);
        let text = std::str::from_utf8(&messages[0]).unwrap();
        assert!(text.starts_with("<rpc message-id=\"102\""));
        assert!(text.ends_with("</rpc>"));
    }

    #[test]
    fn test_switch_after_hello_keeps_buffered_bytes() {
        let mut decoder = FrameDecoder::new();
        let mut wire = encode(Framing::EndOfMessage, "<hello/>").to_vec();
        wire.extend_from_slice(&encode(Framing::Chunked, "<rpc-reply message-id=\"1\"/>"));
        decoder.extend(&wire);

        let hello = decoder.next_message().unwrap().unwrap();
        assert_eq!(&hello[..], b"<hello/>");
        decoder.set_framing(Framing::Chunked);
        let reply = decoder.next_message().unwrap().unwrap();
        assert_eq!(&reply[..], b"<rpc-reply message-id=\"1\"/>");
        assert!(decoder.next_message().unwrap().is_none());
    }

    #[test]
    fn test_chunked_rejects_bad_headers() {
        let mut decoder = FrameDecoder::new();
        decoder.set_framing(Framing::Chunked);
        assert!(matches!(
            decoder.push(b"<rpc/>"),
            Err(FramingError::InvalidChunkHeader(_))
        ));

        for bad in [&b"\n#0\n"[..], b"\n#007\n", b"\n#4294967296\n", b"\n#12ab\n"] {
            let mut decoder = FrameDecoder::new();
            decoder.set_framing(Framing::Chunked);
            assert!(matches!(
                decoder.push(bad),
                Err(FramingError::InvalidChunkSize(_))
            ));
        }
    }

    #[test]
    fn test_max_message_size() {
        let mut decoder = FrameDecoder::with_max_message_size(8);
        assert!(matches!(
            decoder.push(b"0123456789abcdef"),
            Err(FramingError::MessageTooLarge { max: 8 })
        ));

        let mut decoder = FrameDecoder::with_max_message_size(8);
        decoder.set_framing(Framing::Chunked);
        assert!(matches!(
            decoder.push(b"\n#9\n"),
            Err(FramingError::MessageTooLarge { max: 8 })
        ));
    }
}
