//! Local SSH trust reconciliation.
//!
//! A fresh pod gets a new IP/port and new host keys. The SSH config file is
//! rewritten so the `runpod` alias points at the new pod, and the host keys the
//! pod copied to the network volume are appended to a dedicated known-hosts
//! file.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::storage::ObjectStore;

/// Host-key files written by `start_pod.sh`, in preference order.
pub const HOST_KEY_FILES: [&str; 4] = [
    "ssh_ed25519_host_key",
    "ssh_ecdsa_host_key",
    "ssh_rsa_host_key",
    "ssh_dsa_host_key",
];

/// Local SSH file locations and alias settings.
#[derive(Debug, Clone)]
pub struct SshSettings {
    /// Host alias written to the config file.
    pub alias: String,
    /// Remote login user.
    pub user: String,
    /// Dedicated SSH config file, meant to be `Include`d from `~/.ssh/config`.
    pub config_path: PathBuf,
    /// Dedicated known-hosts file.
    pub known_hosts_path: PathBuf,
}

impl Default for SshSettings {
    fn default() -> Self {
        let ssh_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(".ssh");
        Self {
            alias: "runpod".to_string(),
            user: "user".to_string(),
            config_path: ssh_dir.join("config.runpod_cli"),
            known_hosts_path: ssh_dir.join("known_hosts.runpod_cli"),
        }
    }
}

/// One public host key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyEntry {
    /// Key type, e.g. `ssh-ed25519`.
    pub algorithm: String,
    /// Base64 key material.
    pub key: String,
}

impl HostKeyEntry {
    /// Parse an `algorithm key [comment]` line; the comment is dropped.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let algorithm = fields.next()?;
        let key = fields.next()?;
        Some(Self {
            algorithm: algorithm.to_string(),
            key: key.to_string(),
        })
    }

    /// Known-hosts line for a non-default port.
    #[must_use]
    pub fn known_hosts_line(&self, ip: &str, port: u16) -> String {
        format!("[{ip}]:{port} {} {}", self.algorithm, self.key)
    }
}

/// Render the host-alias block.
#[must_use]
pub fn render_ssh_config(
    settings: &SshSettings,
    ip: &str,
    port: u16,
    forward_agent: bool,
) -> String {
    let mut lines = vec![
        format!("Host {}", settings.alias),
        format!("  HostName {ip}"),
        format!("  User {}", settings.user),
        format!("  Port {port}"),
        format!(
            "  UserKnownHostsFile ~/.ssh/known_hosts {}",
            settings.known_hosts_path.display()
        ),
    ];
    if forward_agent {
        lines.push("  ForwardAgent yes".to_string());
    }
    lines.join("\n") + "\n"
}

/// Overwrite the dedicated SSH config file so the alias targets `ip:port`.
///
/// # Errors
/// `Io` if the file or its directory cannot be written.
pub fn write_ssh_config(
    settings: &SshSettings,
    ip: &str,
    port: u16,
    forward_agent: bool,
) -> Result<()> {
    let path = &settings.config_path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_ssh_config(settings, ip, port, forward_agent))?;
    info!(path = %path.display(), alias = %settings.alias, "SSH config updated");
    Ok(())
}

/// Fetch and parse whichever host keys the pod managed to publish.
///
/// Missing or unparsable keys are skipped.
pub async fn collect_host_keys(store: &dyn ObjectStore, staging_dir: &str) -> Vec<HostKeyEntry> {
    let mut entries = Vec::new();

    for file in HOST_KEY_FILES {
        let key = format!("{}/{file}", staging_dir.trim_end_matches('/'));
        let bytes = match store.get(&key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(key = %key, error = %e, "Host key not available");
                continue;
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        match HostKeyEntry::parse(text.trim()) {
            Some(entry) => entries.push(entry),
            None => warn!(key = %key, "Unparsable host key"),
        }
    }

    entries
}

/// Append `entries` to the known-hosts file. Returns how many were written.
///
/// A failed append is logged and the remaining entries are still attempted.
pub fn append_known_hosts(path: &Path, ip: &str, port: u16, entries: &[HostKeyEntry]) -> usize {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!(path = %parent.display(), error = %e, "Cannot create known-hosts directory");
        }
    }

    let mut appended = 0;
    for entry in entries {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| {
                writeln!(file, "# runpod cli:\n{}", entry.known_hosts_line(ip, port))
            });

        match result {
            Ok(()) => {
                appended += 1;
                info!(algorithm = %entry.algorithm, path = %path.display(), "Added host key");
            }
            Err(e) => {
                error!(algorithm = %entry.algorithm, error = %e, "Error adding host key");
            }
        }
    }
    appended
}
