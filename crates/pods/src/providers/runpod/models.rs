//! RunPod GraphQL API models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// GraphQL envelope
// ============================================================================

/// GraphQL request body.
#[derive(Debug, Serialize)]
pub struct GraphQlRequest {
    /// Query or mutation document.
    pub query: String,
}

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse {
    /// Response data; raw so pod payloads can be validated one by one.
    #[serde(default)]
    pub data: Option<Value>,
    /// Errors reported by the server.
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
}

/// A single GraphQL error.
#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    /// Error message.
    pub message: String,
}

impl GraphQlResponse {
    /// Join all error messages, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.errors
            .as_ref()
            .filter(|errors| !errors.is_empty())
            .map(|errors| {
                errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
    }
}

// ============================================================================
// Query fragments
// ============================================================================

/// Fields selected for every pod query.
pub const POD_FIELDS: &str = "\
id name desiredStatus imageName dockerArgs lastStatusChange gpuCount \
memoryInGb vcpuCount containerDiskInGb volumeMountPath costPerHr \
machine { gpuDisplayName podHostId } \
runtime { uptimeInSeconds ports { ip isIpPublic privatePort publicPort type } }";

/// Fields returned by the deploy mutation.
pub const CREATED_POD_FIELDS: &str = "id name imageName desiredStatus machine { podHostId }";
