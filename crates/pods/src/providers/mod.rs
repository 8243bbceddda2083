//! Pod provider implementations.
//!
//! This module contains the [`PodProvider`] trait and the RunPod implementation.

pub mod runpod;
pub mod traits;

pub use traits::{
    CloudType, CreatePodRequest, NetworkVolume, Pod, PodMachine, PodProvider, PodRuntime,
    PortMapping, ProviderError, VolumeLookup,
};
