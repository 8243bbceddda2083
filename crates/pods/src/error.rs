//! Error types for pod provisioning.

use std::time::Duration;

use thiserror::Error;

use crate::providers::traits::ProviderError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving, staging, provisioning, or reconciling a pod.
#[derive(Error, Debug)]
pub enum Error {
    // GPU resolution
    #[error("Unknown GPU type: '{input}'")]
    UnknownGpu { input: String },

    #[error("Ambiguous GPU type: '{input}' matches {candidates:?}. Use a full name or ID (see `rpc gpus`)")]
    AmbiguousGpu {
        input: String,
        candidates: Vec<String>,
    },

    // Storage
    #[error("Failed to look up network volume '{volume_id}': {reason}")]
    VolumeLookup { volume_id: String, reason: String },

    #[error("Failed to write object '{key}': {reason}")]
    StorageWrite { key: String, reason: String },

    #[error("Failed to read object '{key}': {reason}")]
    StorageRead { key: String, reason: String },

    // Lifecycle
    #[error("Pod creation rejected: {0}")]
    PodCreate(#[source] ProviderError),

    #[error(
        "Pod '{pod_id}' did not get a network assignment after {attempts} polls ({}s); \
         it is still running, inspect or terminate it manually",
        waited.as_secs()
    )]
    ProvisioningTimeout {
        pod_id: String,
        attempts: u32,
        waited: Duration,
    },

    #[error("Malformed pod response for '{pod_id}': {reason}")]
    MalformedPodResponse { pod_id: String, reason: String },

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Invalid pod spec: {0}")]
    InvalidSpec(String),

    // Ambient
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to render bootstrap script '{name}': {reason}")]
    Template { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Malformed { pod_id, reason } => {
                Self::MalformedPodResponse { pod_id, reason }
            }
            other => Self::Provider(other),
        }
    }
}
