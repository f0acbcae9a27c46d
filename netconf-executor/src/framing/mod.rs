//! RFC 6242 message framing.
//!
//! NETCONF 1.0 delimits messages with the `]]>]]>` end-of-message marker;
//! NETCONF 1.1 uses chunked framing. Which one applies is decided by the
//! hello exchange (the hello itself is always end-of-message framed):
//!
//! ```text
//! base:1.0   <rpc .../>]]>]]>
//! base:1.1   \n#4\n<rpc\n#8\n .../>...\n##\n
//! ```

mod codec;
mod decoder;

pub use codec::{encode, encode_chunked, validate_chunked_framing};
pub use decoder::FrameDecoder;

use crate::rpc::NETCONF_BASE_1_1;

/// End-of-message marker used by NETCONF 1.0 framing.
pub const END_OF_MESSAGE: &str = "]]>]]>";

/// Largest chunk-size allowed by RFC 6242.
pub const MAX_CHUNK_SIZE: usize = 4_294_967_295;

/// Transport framing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// `]]>]]>` terminated messages (base:1.0, and always for hello).
    #[default]
    EndOfMessage,

    /// Chunked messages (base:1.1).
    Chunked,
}

impl Framing {
    /// Pick the framing for everything after the hello exchange.
    ///
    /// Chunked framing is used only when both peers advertise base:1.1.
    pub fn negotiate<L, R>(local: &[L], remote: &[R]) -> Self
    where
        L: AsRef<str>,
        R: AsRef<str>,
    {
        if supports_chunked(local) && supports_chunked(remote) {
            Framing::Chunked
        } else {
            Framing::EndOfMessage
        }
    }
}

fn supports_chunked<S: AsRef<str>>(capabilities: &[S]) -> bool {
    capabilities.iter().any(|c| c.as_ref() == NETCONF_BASE_1_1)
}
