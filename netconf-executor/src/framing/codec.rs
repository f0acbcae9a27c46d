//! Outbound framing and strict validation of chunked messages.

use bytes::{BufMut, Bytes, BytesMut};

use super::{END_OF_MESSAGE, Framing, MAX_CHUNK_SIZE};

/// Frame `payload` for the wire using `framing`.
///
/// Chunked payloads are written as a single chunk.
pub fn encode(framing: Framing, payload: &str) -> Bytes {
    match framing {
        Framing::EndOfMessage => {
            let mut out = BytesMut::with_capacity(payload.len() + END_OF_MESSAGE.len());
            out.put_slice(payload.as_bytes());
            out.put_slice(END_OF_MESSAGE.as_bytes());
            out.freeze()
        }
        Framing::Chunked => encode_chunked(payload.as_bytes(), MAX_CHUNK_SIZE),
    }
}

/// Chunk-encode `payload`, splitting it into chunks of at most `max_chunk` bytes.
///
/// An empty payload produces only the end-of-chunks marker.
pub fn encode_chunked(payload: &[u8], max_chunk: usize) -> Bytes {
    let max_chunk = max_chunk.clamp(1, MAX_CHUNK_SIZE);
    let mut out = BytesMut::with_capacity(payload.len() + 16);
    for chunk in payload.chunks(max_chunk) {
        out.put_slice(format!("\n#{}\n", chunk.len()).as_bytes());
        out.put_slice(chunk);
    }
    out.put_slice(b"\n##\n");
    out.freeze()
}

/// Check that `raw` is exactly one complete, correctly sized chunked message.
pub fn validate_chunked_framing(raw: &[u8]) -> bool {
    let mut rest = raw;
    loop {
        let Some(after_hash) = rest.strip_prefix(b"\n#") else {
            return false;
        };
        if after_hash == b"#\n" {
            return true;
        }
        let Some(lf) = memchr::memchr(b'\n', after_hash) else {
            return false;
        };
        let Some(size) = parse_chunk_size(&after_hash[..lf]) else {
            return false;
        };
        let data = &after_hash[lf + 1..];
        if data.len() < size {
            return false;
        }
        rest = &data[size..];
    }
}

/// Parse an RFC 6242 chunk-size: `[1-9][0-9]*`, at most 4294967295.
pub(super) fn parse_chunk_size(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() || digits.len() > 10 || digits[0] == b'0' {
        return None;
    }
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let size: u64 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    if size > MAX_CHUNK_SIZE as u64 {
        return None;
    }
    usize::try_from(size).ok()
}
