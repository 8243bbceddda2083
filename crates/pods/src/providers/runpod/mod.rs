//! RunPod GPU pod provider.
//!
//! Implements [`PodProvider`](crate::providers::traits::PodProvider) over the
//! RunPod GraphQL API and [`VolumeLookup`](crate::providers::traits::VolumeLookup)
//! over its REST API.
//!
//! ## Example
//!
//! ```ignore
//! use pods::providers::runpod::RunPod;
//! use pods::providers::traits::PodProvider;
//!
//! let provider = RunPod::new(api_key)?;
//! for pod in provider.get_pods().await? {
//!     println!("{} {}", pod.id, pod.name);
//! }
//! ```

mod client;
mod models;
mod queries;

pub use client::RunPod;
