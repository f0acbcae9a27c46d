//! Inspection of inbound NETCONF messages.

use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;

use super::HELLO_MESSAGE_ID;
use crate::framing::END_OF_MESSAGE;

static MESSAGE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"message-id="(.*?)""#).unwrap());
static SESSION_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w.-]+:)?session-id>\s*(.*?)\s*</(?:[\w.-]+:)?session-id>").unwrap()
});
static CAPABILITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w.-]+:)?capability>\s*(.*?)\s*</(?:[\w.-]+:)?capability>").unwrap()
});
static HELLO_ELEMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(?:[\w.-]+:)?hello[\s/>]").unwrap());

/// `true` when `message` contains a `<hello>` element.
pub(crate) fn is_hello_message(message: &str) -> bool {
    HELLO_ELEMENT.is_match(message)
}

/// Pull the `message-id` out of a message or fragment.
///
/// Returns [`HELLO_MESSAGE_ID`] (`"-1"`) for hello messages, which carry no
/// message-id, and an empty string when there is nothing to correlate.
pub fn extract_message_id(message: &str) -> String {
    if let Some(caps) = MESSAGE_ID.captures(message) {
        return caps[1].to_string();
    }
    if is_hello_message(message) {
        HELLO_MESSAGE_ID.to_string()
    } else {
        String::new()
    }
}

/// Session-id announced in the server hello, if any.
pub fn extract_session_id(hello: &str) -> Option<String> {
    SESSION_ID
        .captures(hello)
        .map(|caps| caps[1].to_string())
        .filter(|id| !id.is_empty())
}

/// All capabilities listed in a hello message, in order.
pub fn extract_capabilities(hello: &str) -> Vec<String> {
    CAPABILITY
        .captures_iter(hello)
        .map(|caps| caps[1].to_string())
        .filter(|cap| !cap.is_empty())
        .collect()
}

/// `true` when a reply is present and carries no `rpc-error`.
pub fn check_reply(reply: Option<&str>) -> bool {
    reply.is_some_and(|body| !body.contains("rpc-error"))
}

/// Check that `xml` is a single well-formed XML document.
///
/// A trailing end-of-message marker is ignored. This is a diagnostic helper;
/// requests are never gated on it.
pub fn validate_well_formed_xml(xml: &str) -> bool {
    let xml = xml.trim();
    let xml = xml.strip_suffix(END_OF_MESSAGE).unwrap_or(xml).trim();
    if xml.is_empty() {
        return false;
    }

    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut roots = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Ok(Event::End(_)) => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Ok(Event::Empty(_)) => {
                if depth == 0 {
                    roots += 1;
                }
            }
            Ok(Event::Text(text)) => {
                if depth == 0 && !text.iter().all(u8::is_ascii_whitespace) {
                    return false;
                }
            }
            Ok(Event::CData(_)) if depth == 0 => return false,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    depth == 0 && roots == 1
}
