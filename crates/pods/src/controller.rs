//! Pod lifecycle controller.
//!
//! ```text
//!  create()
//!    │ resolve GPU ─ stage scripts ─ create pod
//!    ▼
//!  Requested ──► Provisioning ──(runtime.ports non-empty)──► Ready
//!                     │                                        │
//!                     └──(attempt budget spent)──► Failed      ├─ write SSH config
//!                                                              └─ append host keys
//! ```
//!
//! Nothing is cleaned up on failure: a pod that times out is left running
//! and the error carries its ID.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::gpu::GpuCatalog;
use crate::providers::traits::{CloudType, CreatePodRequest, Pod, PodProvider};
use crate::scripts::{self, ScriptContext, START_SCRIPT, TERMINATE_SCRIPT};
use crate::ssh::{self, SshSettings};
use crate::storage::ObjectStore;

/// Default container image.
pub const DEFAULT_IMAGE_NAME: &str =
    "runpod/pytorch:2.8.0-py3.11-cuda12.8.1-cudnn-devel-ubuntu22.04";

/// Port exposure: Jupyter over HTTP and SSH over TCP.
pub const EXPOSED_PORTS: &str = "8888/http,22/tcp";

/// Shortest sleep in the entrypoint, so the pod outlives its own setup.
pub const MIN_SLEEP_SECS: u64 = 20;

/// Polling interval while waiting for network assignment.
const POLL_INTERVAL_SECS: u64 = 5;

/// Poll attempts before giving up (60 × 5s = 5 minutes).
const MAX_POLL_ATTEMPTS: u32 = 60;

/// Wait before fetching host keys; they land on the volume slightly after
/// the port opens.
const HOST_KEY_GRACE_SECS: u64 = 5;

/// Provisioning state of a `create` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    /// Create request about to be sent.
    Requested,
    /// Pod exists; waiting for network assignment.
    Provisioning,
    /// Pod has a port mapping.
    Ready,
    /// Create was rejected or provisioning timed out.
    Failed,
}

impl std::fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Configuration for one pod creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct PodSpec {
    /// Container image.
    pub image_name: String,
    /// GPU type as typed by the user; resolved at create time.
    pub gpu_type: String,
    /// Cloud tier.
    pub cloud_type: CloudType,
    /// Number of GPUs; at least 1.
    pub gpu_count: u32,
    /// Ephemeral volume size in GB.
    pub volume_in_gb: u32,
    /// Minimum vCPU count.
    pub min_vcpu_count: u32,
    /// Minimum memory in GB.
    pub min_memory_in_gb: u32,
    /// Container disk size in GB.
    pub container_disk_in_gb: u32,
    /// Where the network volume is mounted.
    pub volume_mount_path: String,
    /// Staging directory name on the volume; derived from the pod name if unset.
    pub staging_dir: Option<String>,
    /// Extra container environment variables.
    pub env: BTreeMap<String, String>,
    /// Point the SSH alias at the new pod.
    pub update_ssh_config: bool,
    /// Add `ForwardAgent yes` to the alias.
    pub forward_agent: bool,
    /// Append the pod's host keys to the known-hosts file.
    pub update_known_hosts: bool,
}

impl Default for PodSpec {
    fn default() -> Self {
        Self {
            image_name: DEFAULT_IMAGE_NAME.to_string(),
            gpu_type: "RTX A4000".to_string(),
            cloud_type: CloudType::Secure,
            gpu_count: 1,
            volume_in_gb: 0,
            min_vcpu_count: 1,
            min_memory_in_gb: 1,
            container_disk_in_gb: 30,
            volume_mount_path: "/network".to_string(),
            staging_dir: None,
            env: BTreeMap::new(),
            update_ssh_config: true,
            forward_agent: false,
            update_known_hosts: true,
        }
    }
}

impl PodSpec {
    /// Check invariants not expressed by the field types.
    ///
    /// # Errors
    /// `InvalidSpec` for a zero GPU count, a relative mount path, or a mount
    /// path or staging directory that cannot be embedded in the entrypoint.
    pub fn validate(&self) -> Result<()> {
        if self.gpu_count == 0 {
            return Err(Error::InvalidSpec("GPU count must be at least 1".to_string()));
        }
        if !self.volume_mount_path.starts_with('/') {
            return Err(Error::InvalidSpec(format!(
                "volume mount path must be absolute, got '{}'",
                self.volume_mount_path
            )));
        }
        ensure_shell_safe("volume mount path", &self.volume_mount_path)?;
        if let Some(dir) = &self.staging_dir {
            ensure_shell_safe("staging directory", dir)?;
        }
        Ok(())
    }
}

/// Reject values that would break out of the single-quoted entrypoint.
///
/// Only ASCII alphanumerics and `-_./` are accepted.
///
/// # Errors
/// `InvalidSpec` naming the first offending character.
pub fn ensure_shell_safe(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidSpec(format!("{what} must not be empty")));
    }
    match value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')))
    {
        Some(c) => Err(Error::InvalidSpec(format!(
            "{what} '{value}' contains unsupported character {c:?}; use letters, digits, '-', '_', '.'"
        ))),
        None => Ok(()),
    }
}

/// Public SSH endpoint of a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Public IP.
    pub ip: String,
    /// Public port mapped to the pod's SSH port.
    pub port: u16,
}

/// Find the pod's single public port mapping.
///
/// # Errors
/// `MalformedPodResponse` unless exactly one mapping is public.
pub fn extract_public_endpoint(pod: &Pod) -> Result<Endpoint> {
    let public: Vec<_> = pod.ports().iter().filter(|p| p.is_ip_public).collect();

    match public.as_slice() {
        [mapping] if !mapping.ip.is_empty() => Ok(Endpoint {
            ip: mapping.ip.clone(),
            port: mapping.public_port,
        }),
        [_] => Err(Error::MalformedPodResponse {
            pod_id: pod.id.clone(),
            reason: "public port mapping has an empty IP".to_string(),
        }),
        _ => Err(Error::MalformedPodResponse {
            pod_id: pod.id.clone(),
            reason: format!("expected 1 public IP port mapping, got {}", public.len()),
        }),
    }
}

/// Pod name used when none is given.
#[must_use]
pub fn default_pod_name(user: &str, gpu_display_name: &str) -> String {
    format!("{user}-{gpu_display_name}")
}

/// Staging directory name derived from the pod name.
#[must_use]
pub fn staging_dir_for(pod_name: &str) -> String {
    format!(".tmp_{}", pod_name.replace(' ', "_"))
}

/// Container entrypoint: run the start script, sleep out the runtime, then
/// run the terminate script, all in one shell.
#[must_use]
pub fn build_entrypoint(volume_mount_path: &str, staging_dir: &str, runtime_minutes: u32) -> String {
    let path = format!("{}/{staging_dir}", volume_mount_path.trim_end_matches('/'));
    let sleep_secs = (u64::from(runtime_minutes) * 60).max(MIN_SLEEP_SECS);
    format!(
        "/bin/bash -c 'mkdir -p {path}; bash {path}/{START_SCRIPT}; sleep {sleep_secs}; bash {path}/{TERMINATE_SCRIPT}'"
    )
}

/// Settings that stay fixed across calls.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Network volume attached to every pod.
    pub network_volume_id: Option<String>,
    /// Local user name, used for default pod names.
    pub user: String,
    /// Git author email for the pod user.
    pub git_email: String,
    /// Git author name for the pod user.
    pub git_name: String,
    /// Delay between provisioning polls.
    pub poll_interval: Duration,
    /// Number of polls before `ProvisioningTimeout`.
    pub max_poll_attempts: u32,
    /// Delay before fetching host keys.
    pub host_key_grace: Duration,
    /// Local SSH files.
    pub ssh: SshSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            network_volume_id: None,
            user: "user".to_string(),
            git_email: String::new(),
            git_name: String::new(),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            max_poll_attempts: MAX_POLL_ATTEMPTS,
            host_key_grace: Duration::from_secs(HOST_KEY_GRACE_SECS),
            ssh: SshSettings::default(),
        }
    }
}

/// Drives pod creation, listing, and termination.
pub struct PodController {
    provider: Arc<dyn PodProvider>,
    store: Arc<dyn ObjectStore>,
    catalog: GpuCatalog,
    settings: ControllerSettings,
}

impl PodController {
    /// Create a controller with the built-in GPU catalog.
    pub fn new(
        provider: Arc<dyn PodProvider>,
        store: Arc<dyn ObjectStore>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            provider,
            store,
            catalog: GpuCatalog::runpod(),
            settings,
        }
    }

    /// Replace the GPU catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: GpuCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Create a pod, wait for its network, and reconcile local SSH state.
    ///
    /// # Errors
    /// - `InvalidSpec`, `UnknownGpu`, `AmbiguousGpu`, `Template`, `StorageWrite`:
    ///   nothing was created.
    /// - `PodCreate`: the provider rejected the request.
    /// - `ProvisioningTimeout`, `MalformedPodResponse`, `Provider`, `Io`: the pod
    ///   exists and is left running.
    pub async fn create(
        &self,
        name: Option<String>,
        spec: &PodSpec,
        runtime_minutes: u32,
    ) -> Result<Pod> {
        spec.validate()?;
        let gpu = self.catalog.resolve(&spec.gpu_type)?;

        let name = name.unwrap_or_else(|| default_pod_name(&self.settings.user, &gpu.display_name));
        let staging_dir = spec
            .staging_dir
            .clone()
            .unwrap_or_else(|| staging_dir_for(&name));
        ensure_shell_safe("staging directory derived from the pod name", &staging_dir)?;
        let mount = spec.volume_mount_path.trim_end_matches('/');
        let staging_path = format!("{mount}/{staging_dir}");

        info!(
            name = %name,
            image = %spec.image_name,
            gpu = %gpu.display_name,
            gpu_count = spec.gpu_count,
            disk_gb = spec.container_disk_in_gb,
            min_vcpu = spec.min_vcpu_count,
            min_memory_gb = spec.min_memory_in_gb,
            staging_dir = %staging_dir,
            runtime_minutes,
            "Creating pod"
        );

        let scripts = scripts::render_bootstrap_scripts(&ScriptContext {
            staging_path,
            volume_mount_path: mount.to_string(),
            git_email: self.settings.git_email.clone(),
            git_name: self.settings.git_name.clone(),
        })?;
        scripts::stage(self.store.as_ref(), &scripts, &staging_dir).await?;

        let request = CreatePodRequest {
            name,
            image_name: spec.image_name.clone(),
            gpu_type_id: gpu.provider_id,
            cloud_type: spec.cloud_type,
            gpu_count: spec.gpu_count,
            volume_in_gb: spec.volume_in_gb,
            container_disk_in_gb: spec.container_disk_in_gb,
            min_vcpu_count: spec.min_vcpu_count,
            min_memory_in_gb: spec.min_memory_in_gb,
            docker_args: build_entrypoint(mount, &staging_dir, runtime_minutes),
            env: spec.env.clone(),
            ports: EXPOSED_PORTS.to_string(),
            volume_mount_path: mount.to_string(),
            network_volume_id: self.settings.network_volume_id.clone(),
            support_public_ip: true,
            start_ssh: true,
        };

        debug!(state = %ProvisionState::Requested, "Submitting create request");
        let created = self.provider.create_pod(request).await.map_err(|e| {
            warn!(state = %ProvisionState::Failed, error = %e, "Create request rejected");
            Error::PodCreate(e)
        })?;

        info!(pod_id = %created.id, state = %ProvisionState::Provisioning, "Pod created, provisioning");
        let pod = self.wait_for_network(&created.id).await?;
        info!(pod_id = %pod.id, state = %ProvisionState::Ready, "Pod provisioned");

        let endpoint = extract_public_endpoint(&pod)?;
        info!(pod_id = %pod.id, ip = %endpoint.ip, port = endpoint.port, "Public endpoint");

        if spec.update_ssh_config {
            ssh::write_ssh_config(&self.settings.ssh, &endpoint.ip, endpoint.port, spec.forward_agent)?;
        }

        if spec.update_known_hosts {
            tokio::time::sleep(self.settings.host_key_grace).await;
            self.update_known_hosts(&endpoint, &staging_dir).await;
        }

        Ok(pod)
    }

    /// Poll until the pod has a non-empty port list.
    ///
    /// # Errors
    /// `ProvisioningTimeout` after `max_poll_attempts` polls; provider errors
    /// from any poll.
    pub async fn wait_for_network(&self, pod_id: &str) -> Result<Pod> {
        let attempts = self.settings.max_poll_attempts;
        let start = tokio::time::Instant::now();

        for attempt in 1..=attempts {
            let pod = self.provider.get_pod(pod_id).await?;

            if pod.is_network_ready() {
                debug!(pod_id = %pod_id, attempt, "Network assigned");
                return Ok(pod);
            }

            debug!(
                pod_id = %pod_id,
                attempt,
                elapsed_secs = start.elapsed().as_secs(),
                "Waiting for network assignment"
            );

            if attempt < attempts {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }

        warn!(pod_id = %pod_id, state = %ProvisionState::Failed, attempts, "Provisioning timed out");
        Err(Error::ProvisioningTimeout {
            pod_id: pod_id.to_string(),
            attempts,
            waited: start.elapsed(),
        })
    }

    async fn update_known_hosts(&self, endpoint: &Endpoint, staging_dir: &str) {
        let entries = ssh::collect_host_keys(self.store.as_ref(), staging_dir).await;
        if entries.is_empty() {
            warn!(staging_dir = %staging_dir, "No host keys published by the pod");
            return;
        }

        let appended = ssh::append_known_hosts(
            &self.settings.ssh.known_hosts_path,
            &endpoint.ip,
            endpoint.port,
            &entries,
        );
        info!(appended, found = entries.len(), "Known hosts updated");
    }

    /// List all pods.
    ///
    /// # Errors
    /// Provider errors.
    pub async fn list(&self) -> Result<Vec<Pod>> {
        Ok(self.provider.get_pods().await?)
    }

    /// Terminate a pod.
    ///
    /// # Errors
    /// Provider errors.
    pub async fn terminate(&self, pod_id: &str) -> Result<()> {
        info!(pod_id = %pod_id, "Terminating pod");
        self.provider.terminate_pod(pod_id).await?;
        Ok(())
    }
}
