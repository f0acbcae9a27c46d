//! Result of one NETCONF operation as reported to callers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcStatus {
    Success,
    Failure,
}

/// Response from a NETCONF operation.
///
/// Composite operations such as
/// [`NetconfRpcService::edit_config`](crate::NetconfRpcService::edit_config)
/// record each step under `sub_responses`, keyed `"<message-id>-<step>"` and
/// kept in the order the steps ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceResponse {
    /// Overall outcome.
    pub status: RpcStatus,

    /// The request that was sent, if one was built.
    pub request_message: Option<String>,

    /// The raw reply from the device.
    pub response_message: Option<String>,

    /// Why the operation failed. Always set when `status` is `Failure`.
    pub error_message: Option<String>,

    /// Responses of the individual steps of a composite operation.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub sub_responses: IndexMap<String, DeviceResponse>,
}

impl DeviceResponse {
    /// Create a successful response.
    pub fn success(request: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            status: RpcStatus::Success,
            request_message: Some(request.into()),
            response_message: Some(response.into()),
            error_message: None,
            sub_responses: IndexMap::new(),
        }
    }

    /// Create a failed response.
    pub fn failed(
        request: Option<String>,
        response: Option<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            status: RpcStatus::Failure,
            request_message: request,
            response_message: response,
            error_message: Some(error_message.into()),
            sub_responses: IndexMap::new(),
        }
    }

    /// Check if the response indicates success.
    pub fn is_success(&self) -> bool {
        self.status == RpcStatus::Success
    }

    /// Mark the response failed with `error_message`, replacing any earlier message.
    pub fn fail(&mut self, error_message: impl Into<String>) {
        self.status = RpcStatus::Failure;
        self.error_message = Some(error_message.into());
    }

    pub fn add_sub_response(&mut self, key: impl Into<String>, response: DeviceResponse) {
        self.sub_responses.insert(key.into(), response);
    }

    pub fn sub_response(&self, key: &str) -> Option<&DeviceResponse> {
        self.sub_responses.get(key)
    }
}

impl std::fmt::Display for DeviceResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.status, &self.error_message, &self.response_message) {
            (RpcStatus::Failure, Some(error), _) => write!(f, "FAILURE: {}", error),
            (_, _, Some(response)) => write!(f, "{}", response),
            _ => write!(f, "{:?}", self.status),
        }
    }
}
