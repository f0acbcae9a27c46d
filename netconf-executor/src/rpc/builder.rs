//! Builders for NETCONF `<rpc>` documents.
//!
//! Each function returns a complete document: XML declaration, `<rpc>`
//! envelope with message-id and base namespace, and the operation element.
//! Framing is applied later by the session.

use log::warn;
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use super::datastore::Datastore;
use super::reply::is_hello_message;
use super::{NETCONF_BASE_NAMESPACE, XML_HEADER};
use crate::error::{Error, Result};

static MESSAGE_ID_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"message-id="[^"]*""#).unwrap());
static RPC_OPEN_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<rpc([\s>/])").unwrap());

/// Wrap an operation body in the `<rpc>` envelope.
pub fn wrap_rpc(message_id: &str, body: &str) -> String {
    format!(
        "{XML_HEADER}\n<rpc message-id=\"{message_id}\" xmlns=\"{NETCONF_BASE_NAMESPACE}\">\n{body}</rpc>"
    )
}

/// `<wrapper><datastore/></wrapper>`, e.g. `<target><candidate/></target>`.
fn datastore_element(wrapper: &str, datastore: Datastore) -> String {
    format!("<{wrapper}>\n<{datastore}/>\n</{wrapper}>\n")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Build a `<get-config>` RPC. The subtree filter is omitted when `filter` is
/// `None` or blank.
pub fn get_config(message_id: &str, datastore: Datastore, filter: Option<&str>) -> String {
    let mut body = String::from("<get-config>\n");
    body.push_str(&datastore_element("source", datastore));
    if let Some(filter) = non_empty(filter) {
        body.push_str("<filter type=\"subtree\">\n");
        body.push_str(filter.trim());
        body.push_str("\n</filter>\n");
    }
    body.push_str("</get-config>\n");
    wrap_rpc(message_id, &body)
}

/// Build an operational-state `<get>` RPC.
pub fn get(message_id: &str, filter: Option<&str>) -> String {
    let body = match non_empty(filter) {
        Some(filter) => format!(
            "<get>\n<filter type=\"subtree\">\n{}\n</filter>\n</get>\n",
            filter.trim()
        ),
        None => "<get/>\n".to_string(),
    };
    wrap_rpc(message_id, &body)
}

/// Build an `<edit-config>` RPC carrying `config` for the target datastore.
pub fn edit_config(
    message_id: &str,
    datastore: Datastore,
    default_operation: Option<&str>,
    config: &str,
) -> String {
    let mut body = String::from("<edit-config>\n");
    body.push_str(&datastore_element("target", datastore));
    if let Some(operation) = default_operation {
        body.push_str(&format!(
            "<default-operation>{operation}</default-operation>\n"
        ));
    }
    body.push_str("<config>\n");
    body.push_str(config.trim());
    body.push_str("\n</config>\n</edit-config>\n");
    wrap_rpc(message_id, &body)
}

/// Build a `<validate>` RPC for the source datastore.
pub fn validate(message_id: &str, datastore: Datastore) -> String {
    let body = format!("<validate>\n{}</validate>\n", datastore_element("source", datastore));
    wrap_rpc(message_id, &body)
}

/// Build a `<commit>` RPC.
///
/// `persist` and `persist_id` are mutually exclusive, and a confirmed commit
/// cannot carry a `persist_id`. `persist` is only meaningful for a confirmed
/// commit and is ignored otherwise. With nothing to add the result is a bare
/// `<commit/>`.
pub fn commit(
    message_id: &str,
    confirmed: bool,
    confirm_timeout: u32,
    persist: &str,
    persist_id: &str,
) -> Result<String> {
    if !persist.is_empty() && !persist_id.is_empty() {
        return Err(Error::invalid_argument(format!(
            "Can't proceed <commit> with both persist({persist}) and persistId({persist_id}) specified. Only one should be specified."
        )));
    }
    if confirmed && !persist_id.is_empty() {
        return Err(Error::invalid_argument(format!(
            "Can't proceed <commit> with both confirmed flag and persistId({persist_id}) specified. Only one should be specified."
        )));
    }

    let mut children = String::new();
    if confirmed {
        children.push_str("<confirmed/>\n");
        children.push_str(&format!("<confirm-timeout>{confirm_timeout}</confirm-timeout>\n"));
        if !persist.is_empty() {
            children.push_str(&format!("<persist>{persist}</persist>\n"));
        }
    }
    if !persist_id.is_empty() {
        children.push_str(&format!("<persist-id>{persist_id}</persist-id>\n"));
    }

    let body = if children.is_empty() {
        "<commit/>\n".to_string()
    } else {
        format!("<commit>\n{children}</commit>\n")
    };
    Ok(wrap_rpc(message_id, &body))
}

/// Build a `<cancel-commit>` RPC, optionally naming a persistent confirmed commit.
pub fn cancel_commit(message_id: &str, persist_id: &str) -> String {
    let body = if persist_id.is_empty() {
        "<cancel-commit/>\n".to_string()
    } else {
        format!("<cancel-commit>\n<persist-id>{persist_id}</persist-id>\n</cancel-commit>\n")
    };
    wrap_rpc(message_id, &body)
}

/// Build a `<delete-config>` RPC. The running datastore can never be deleted.
pub fn delete_config(message_id: &str, datastore: Datastore) -> Result<String> {
    if datastore == Datastore::Running {
        warn!("Target configuration for delete operation can't be \"running\"");
        return Err(Error::invalid_argument(
            "Target configuration for delete operation can't be running",
        ));
    }
    let body = format!(
        "<delete-config>\n{}</delete-config>\n",
        datastore_element("target", datastore)
    );
    Ok(wrap_rpc(message_id, &body))
}

/// Build a `<lock>` RPC.
pub fn lock(message_id: &str, datastore: Datastore) -> String {
    let body = format!("<lock>\n{}</lock>\n", datastore_element("target", datastore));
    wrap_rpc(message_id, &body)
}

/// Build an `<unlock>` RPC.
pub fn unlock(message_id: &str, datastore: Datastore) -> String {
    let body = format!("<unlock>\n{}</unlock>\n", datastore_element("target", datastore));
    wrap_rpc(message_id, &body)
}

/// Build a `<discard-changes>` RPC.
pub fn discard_changes(message_id: &str) -> String {
    wrap_rpc(message_id, "<discard-changes/>\n")
}

/// Build a `<close-session>` RPC, or `<kill-session>` when `force` is set.
pub fn close_session(message_id: &str, force: bool) -> String {
    let body = if force {
        "<kill-session/>\n"
    } else {
        "<close-session/>\n"
    };
    wrap_rpc(message_id, body)
}

/// Build the client `<hello>` advertising `capabilities`.
pub fn hello<S: AsRef<str>>(capabilities: &[S]) -> String {
    let mut message = format!("{XML_HEADER}\n<hello xmlns=\"{NETCONF_BASE_NAMESPACE}\">\n");
    message.push_str("  <capabilities>\n");
    for capability in capabilities {
        message.push_str(&format!(
            "    <capability>{}</capability>\n",
            capability.as_ref()
        ));
    }
    message.push_str("  </capabilities>\n</hello>\n");
    message
}

/// Replace the first `message-id` attribute in `rpc` with `message_id`.
pub fn replace_message_id(rpc: &str, message_id: &str) -> String {
    let replacement = format!("message-id=\"{message_id}\"");
    MESSAGE_ID_ATTR
        .replacen(rpc, 1, NoExpand(&replacement))
        .into_owned()
}

/// Normalise an outgoing request: make sure it starts with the XML
/// declaration and that its `<rpc>` element carries `message_id`.
///
/// Hello messages carry no message-id and are only given the declaration.
pub fn format_request(request: &str, message_id: &str) -> String {
    let request = request.trim();
    let formatted = if request.starts_with("<?xml") {
        request.to_string()
    } else {
        format!("{XML_HEADER}\n{request}")
    };

    if is_hello_message(&formatted) {
        return formatted;
    }
    if MESSAGE_ID_ATTR.is_match(&formatted) {
        return replace_message_id(&formatted, message_id);
    }
    let replacement = format!("<rpc message-id=\"{message_id}\"$1");
    RPC_OPEN_TAG
        .replacen(&formatted, 1, replacement.as_str())
        .into_owned()
}
