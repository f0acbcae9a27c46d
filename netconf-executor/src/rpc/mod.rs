//! NETCONF message construction and inspection.
//!
//! Everything here is pure: builders turn parameters into complete `<rpc>`
//! documents and the reply helpers pull message-ids, session-ids and
//! capabilities out of raw messages. No I/O happens in this module.

mod builder;
mod datastore;
mod reply;

pub use builder::{
    cancel_commit, close_session, commit, delete_config, discard_changes, edit_config,
    format_request, get, get_config, hello, lock, replace_message_id, unlock, validate, wrap_rpc,
};
pub use datastore::Datastore;
pub use reply::{
    check_reply, extract_capabilities, extract_message_id, extract_session_id,
    validate_well_formed_xml,
};
pub(crate) use reply::is_hello_message;

/// NETCONF 1.0 base capability (end-of-message framing).
pub const NETCONF_BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// NETCONF 1.1 base capability (chunked framing).
pub const NETCONF_BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

/// Namespace of every base protocol element.
pub const NETCONF_BASE_NAMESPACE: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// XML declaration placed at the top of every outgoing message.
pub const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Message-id used to correlate the hello exchange, which carries none.
pub const HELLO_MESSAGE_ID: &str = "-1";
