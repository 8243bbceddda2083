//! Pod provider trait and common types.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during pod provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// GraphQL endpoint answered with an `errors` array.
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A pod payload could not be decoded into a [`Pod`].
    #[error("Malformed pod payload for '{pod_id}': {reason}")]
    Malformed { pod_id: String, reason: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cloud tier a pod is scheduled on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloudType {
    /// RunPod-operated data centers.
    #[default]
    Secure,
    /// Community-hosted machines.
    Community,
}

impl std::fmt::Display for CloudType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secure => write!(f, "SECURE"),
            Self::Community => write!(f, "COMMUNITY"),
        }
    }
}

impl std::str::FromStr for CloudType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SECURE" => Ok(Self::Secure),
            "COMMUNITY" => Ok(Self::Community),
            other => Err(format!("unknown cloud type '{other}' (expected SECURE or COMMUNITY)")),
        }
    }
}

/// One port mapping from a pod's runtime record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    /// Address the port is reachable on.
    pub ip: String,
    /// Whether `ip` is publicly routable.
    pub is_ip_public: bool,
    /// Externally visible port.
    pub public_port: u16,
    /// Port inside the container.
    #[serde(default)]
    pub private_port: Option<u16>,
    /// `tcp` or `http`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Runtime record, present once the provider has allocated networking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRuntime {
    /// Port mappings; null until the network is assigned.
    #[serde(default)]
    pub ports: Option<Vec<PortMapping>>,
    /// Seconds since the container started.
    #[serde(default)]
    pub uptime_in_seconds: Option<u64>,
}

/// Machine the pod was scheduled on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMachine {
    /// Human-readable GPU name.
    #[serde(default)]
    pub gpu_display_name: Option<String>,
    /// Host identifier.
    #[serde(default)]
    pub pod_host_id: Option<String>,
}

/// A snapshot of a pod as reported by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    /// Provider-assigned identifier.
    pub id: String,
    /// Pod name.
    #[serde(default)]
    pub name: String,
    /// Desired status (`RUNNING`, `EXITED`, ...).
    #[serde(default)]
    pub desired_status: Option<String>,
    /// Runtime record; `None` until networking is allocated.
    #[serde(default)]
    pub runtime: Option<PodRuntime>,
    /// Free-text status change note, e.g. `Rented by User: Mon Jan 02 2023 ... GMT`.
    #[serde(default)]
    pub last_status_change: Option<String>,
    /// Container entrypoint as submitted.
    #[serde(default)]
    pub docker_args: Option<String>,
    /// Image reference.
    #[serde(default)]
    pub image_name: Option<String>,
    /// Number of GPUs.
    #[serde(default)]
    pub gpu_count: Option<u32>,
    /// Machine info.
    #[serde(default)]
    pub machine: Option<PodMachine>,
    /// RAM in GB.
    #[serde(default)]
    pub memory_in_gb: Option<f64>,
    /// vCPU count.
    #[serde(default)]
    pub vcpu_count: Option<f64>,
    /// Container disk in GB.
    #[serde(default)]
    pub container_disk_in_gb: Option<u32>,
    /// Mount path of the network volume.
    #[serde(default)]
    pub volume_mount_path: Option<String>,
    /// Hourly cost in USD.
    #[serde(default)]
    pub cost_per_hr: Option<f64>,
}

impl Pod {
    /// Port mappings, or an empty slice if the runtime is not allocated yet.
    #[must_use]
    pub fn ports(&self) -> &[PortMapping] {
        self.runtime
            .as_ref()
            .and_then(|r| r.ports.as_deref())
            .unwrap_or_default()
    }

    /// Whether the provider has finished network allocation.
    #[must_use]
    pub fn is_network_ready(&self) -> bool {
        !self.ports().is_empty()
    }
}

/// Request to create a new pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePodRequest {
    /// Pod name.
    pub name: String,
    /// Container image.
    pub image_name: String,
    /// Provider GPU identifier.
    pub gpu_type_id: String,
    /// Cloud tier.
    pub cloud_type: CloudType,
    /// Number of GPUs.
    pub gpu_count: u32,
    /// Ephemeral volume size in GB.
    pub volume_in_gb: u32,
    /// Container disk size in GB.
    pub container_disk_in_gb: u32,
    /// Minimum vCPU count.
    pub min_vcpu_count: u32,
    /// Minimum memory in GB.
    pub min_memory_in_gb: u32,
    /// Container entrypoint command.
    pub docker_args: String,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Port exposure, e.g. `8888/http,22/tcp`.
    pub ports: String,
    /// Where the network volume is mounted.
    pub volume_mount_path: String,
    /// Network volume to attach.
    pub network_volume_id: Option<String>,
    /// Require a machine with a public IP; SSH needs one.
    pub support_public_ip: bool,
    /// Start the image's SSH daemon.
    pub start_ssh: bool,
}

/// Network volume metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkVolume {
    /// Volume ID.
    pub id: String,
    /// Volume name.
    #[serde(default)]
    pub name: Option<String>,
    /// Size in GB.
    #[serde(default)]
    pub size: Option<u64>,
    /// Data center hosting the volume, e.g. `EU-RO-1`.
    #[serde(default)]
    pub data_center_id: Option<String>,
}

/// Trait for GPU pod providers.
#[async_trait]
pub trait PodProvider: Send + Sync {
    /// List all pods in the account.
    async fn get_pods(&self) -> Result<Vec<Pod>, ProviderError>;

    /// Get a pod by ID.
    async fn get_pod(&self, id: &str) -> Result<Pod, ProviderError>;

    /// Create a new pod.
    async fn create_pod(&self, req: CreatePodRequest) -> Result<Pod, ProviderError>;

    /// Terminate a pod.
    async fn terminate_pod(&self, id: &str) -> Result<(), ProviderError>;
}

/// Lookup of network volume metadata.
#[async_trait]
pub trait VolumeLookup: Send + Sync {
    /// Fetch metadata for a network volume.
    async fn network_volume(&self, id: &str) -> Result<NetworkVolume, ProviderError>;
}
