//! GPU pod provisioning on RunPod.
//!
//! This crate creates, lists, and terminates RunPod GPU pods. Bootstrap
//! scripts and SSH host keys travel through the S3 interface of a network
//! volume that every pod mounts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   put scripts    ┌──────────────────────┐
//! │              │ ───────────────► │  Network volume (S3) │
//! │ PodController│ ◄─────────────── │  .tmp_<name>/...     │
//! │              │   get host keys  └──────────▲───────────┘
//! │              │                             │ mounted at /network
//! │              │   GraphQL        ┌──────────┴───────────┐
//! │              │ ───────────────► │  Pod                 │
//! └──────┬───────┘                  │  start → sleep → term│
//!        │                          └──────────────────────┘
//!        ▼
//!  ~/.ssh/config.runpod_cli, ~/.ssh/known_hosts.runpod_cli
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pods::{ControllerSettings, Credentials, PodController, PodSpec, RunPod, S3Gateway};
//!
//! let creds = Credentials::from_env()?;
//! let runpod = Arc::new(RunPod::new(&creds.api_key)?);
//! let store = Arc::new(S3Gateway::for_network_volume(runpod.as_ref(), &creds).await?);
//!
//! let controller = PodController::new(runpod, store, ControllerSettings::default());
//! let pod = controller.create(None, &PodSpec::default(), 60).await?;
//! controller.terminate(&pod.id).await?;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod gpu;
pub mod providers;
pub mod remaining;
pub mod scripts;
pub mod ssh;
pub mod storage;

pub use config::Credentials;
pub use controller::{ControllerSettings, Endpoint, PodController, PodSpec, ProvisionState};
pub use error::{Error, Result};
pub use gpu::{GpuCatalog, ResolvedGpu};
pub use providers::runpod::RunPod;
pub use providers::traits::{CloudType, CreatePodRequest, Pod, PodProvider, ProviderError};
pub use storage::{ObjectStore, S3Gateway};
