//! GPU type resolution.
//!
//! Maps what a user types (`"A100 SXM"`, `"NVIDIA A40"`, `"4090"`) to the
//! provider's GPU identifier and its canonical display name.

use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Display name → RunPod GPU ID, from <https://docs.runpod.io/references/gpu-types>.
pub const RUNPOD_GPUS: &[(&str, &str)] = &[
    ("MI300X", "AMD Instinct MI300X OAM"),
    ("A100 PCIe", "NVIDIA A100 80GB PCIe"),
    ("A100 SXM", "NVIDIA A100-SXM4-80GB"),
    ("A30", "NVIDIA A30"),
    ("A40", "NVIDIA A40"),
    ("B200", "NVIDIA B200"),
    ("RTX 3070", "NVIDIA GeForce RTX 3070"),
    ("RTX 3080", "NVIDIA GeForce RTX 3080"),
    ("RTX 3080 Ti", "NVIDIA GeForce RTX 3080 Ti"),
    ("RTX 3090", "NVIDIA GeForce RTX 3090"),
    ("RTX 3090 Ti", "NVIDIA GeForce RTX 3090 Ti"),
    ("RTX 4070 Ti", "NVIDIA GeForce RTX 4070 Ti"),
    ("RTX 4080", "NVIDIA GeForce RTX 4080"),
    ("RTX 4080 SUPER", "NVIDIA GeForce RTX 4080 SUPER"),
    ("RTX 4090", "NVIDIA GeForce RTX 4090"),
    ("RTX 5080", "NVIDIA GeForce RTX 5080"),
    ("RTX 5090", "NVIDIA GeForce RTX 5090"),
    ("H100 SXM", "NVIDIA H100 80GB HBM3"),
    ("H100 NVL", "NVIDIA H100 NVL"),
    ("H100 PCIe", "NVIDIA H100 PCIe"),
    ("H200 SXM", "NVIDIA H200"),
    ("L4", "NVIDIA L4"),
    ("L40", "NVIDIA L40"),
    ("L40S", "NVIDIA L40S"),
    ("RTX 2000 Ada", "NVIDIA RTX 2000 Ada Generation"),
    ("RTX 4000 Ada", "NVIDIA RTX 4000 Ada Generation"),
    ("RTX 5000 Ada", "NVIDIA RTX 5000 Ada Generation"),
    ("RTX 6000 Ada", "NVIDIA RTX 6000 Ada Generation"),
    ("RTX A2000", "NVIDIA RTX A2000"),
    ("RTX A4000", "NVIDIA RTX A4000"),
    ("RTX A4500", "NVIDIA RTX A4500"),
    ("RTX A5000", "NVIDIA RTX A5000"),
    ("RTX A6000", "NVIDIA RTX A6000"),
    ("RTX PRO 6000", "NVIDIA RTX PRO 6000 Blackwell Workstation Edition"),
    ("V100 FHHL", "Tesla V100-FHHL-16GB"),
    ("Tesla V100", "Tesla V100-PCIE-16GB"),
    ("V100 SXM2", "Tesla V100-SXM2-16GB"),
];

/// A GPU type resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGpu {
    /// Provider GPU identifier.
    pub provider_id: String,
    /// Canonical display name.
    pub display_name: String,
}

/// Table of known GPU types.
#[derive(Debug, Clone)]
pub struct GpuCatalog {
    entries: Vec<(String, String)>,
}

impl Default for GpuCatalog {
    fn default() -> Self {
        Self::runpod()
    }
}

impl GpuCatalog {
    /// Build a catalog from `(display_name, provider_id)` pairs.
    pub fn new<I, N, D>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, id)| (name.into(), id.into()))
                .collect(),
        }
    }

    /// The built-in RunPod table.
    #[must_use]
    pub fn runpod() -> Self {
        Self::new(RUNPOD_GPUS.iter().copied())
    }

    /// All `(display_name, provider_id)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, i)| (n.as_str(), i.as_str()))
    }

    fn display_name_for(&self, id: &str) -> Option<&str> {
        self.entries()
            .find(|(_, entry_id)| *entry_id == id)
            .map(|(name, _)| name)
    }

    /// Resolve a display name, provider ID, or unique case-insensitive substring.
    ///
    /// # Errors
    /// `UnknownGpu` if nothing matches, `AmbiguousGpu` if the substring matches
    /// more than one GPU.
    pub fn resolve(&self, input: &str) -> Result<ResolvedGpu> {
        if let Some((name, id)) = self.entries().find(|(name, _)| *name == input) {
            return Ok(ResolvedGpu {
                provider_id: id.to_string(),
                display_name: name.to_string(),
            });
        }

        if let Some(name) = self.display_name_for(input) {
            return Ok(ResolvedGpu {
                provider_id: input.to_string(),
                display_name: name.to_string(),
            });
        }

        let needle = input.to_lowercase();
        let matches: BTreeSet<&str> = self
            .entries()
            .filter(|(name, id)| {
                name.to_lowercase().contains(&needle) || id.to_lowercase().contains(&needle)
            })
            .map(|(_, id)| id)
            .collect();

        let mut ids = matches.into_iter();
        match (ids.next(), ids.next()) {
            (Some(id), None) => Ok(ResolvedGpu {
                provider_id: id.to_string(),
                display_name: self.display_name_for(id).unwrap_or(id).to_string(),
            }),
            (Some(first), Some(second)) => Err(Error::AmbiguousGpu {
                input: input.to_string(),
                candidates: [first, second]
                    .into_iter()
                    .chain(ids)
                    .map(str::to_string)
                    .collect(),
            }),
            (None, _) => Err(Error::UnknownGpu {
                input: input.to_string(),
            }),
        }
    }
}
