//! Credentials and local settings.
//!
//! Credentials come from a `.env` file. Without an explicit path, exactly one
//! of `./.env` and `$XDG_CONFIG_HOME/runpod_cli/.env` must exist.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};

/// Directory under the XDG config dir holding the default `.env`.
const CONFIG_DIR_NAME: &str = "runpod_cli";

/// Credentials for the provider API and the network volume's object store.
#[derive(Clone)]
pub struct Credentials {
    /// RunPod API key.
    pub api_key: String,
    /// Network volume attached to every pod; also the S3 bucket.
    pub network_volume_id: String,
    /// S3 access key ID.
    pub s3_access_key_id: String,
    /// S3 secret key.
    pub s3_secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("network_volume_id", &self.network_volume_id)
            .field("s3_access_key_id", &self.s3_access_key_id)
            .field("s3_secret_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    ///
    /// # Errors
    /// `Config` naming the first missing or empty variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary variable lookup.
    ///
    /// # Errors
    /// `Config` naming the first missing or empty variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    Error::Config(format!(
                        "{key} not found in environment. Set it in your .env file."
                    ))
                })
        };

        Ok(Self {
            api_key: require("RUNPOD_API_KEY")?,
            network_volume_id: require("RUNPOD_NETWORK_VOLUME_ID")?,
            s3_access_key_id: require("RUNPOD_S3_ACCESS_KEY_ID")?,
            s3_secret_key: require("RUNPOD_S3_SECRET_KEY")?,
        })
    }
}

/// Default `.env` locations, in search order.
#[must_use]
pub fn default_env_paths(cwd: &Path, config_dir: &Path) -> Vec<PathBuf> {
    vec![
        cwd.join(".env"),
        config_dir.join(CONFIG_DIR_NAME).join(".env"),
    ]
}

/// XDG config directory: `$XDG_CONFIG_HOME`, falling back to `~/.config`.
#[must_use]
pub fn xdg_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
}

/// Pick the `.env` file to load.
///
/// # Errors
/// `Config` if the explicit file does not exist, if no default file exists,
/// or if more than one default file exists.
pub fn discover_env_file(explicit: Option<&Path>, candidates: &[PathBuf]) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = expand_home(path);
        if !path.exists() {
            return Err(Error::Config(format!(
                "Specified .env file not found: {}",
                path.display()
            )));
        }
        return Ok(path);
    }

    let found: Vec<&PathBuf> = candidates.iter().filter(|p| p.exists()).collect();
    match found.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(Error::Config(format!(
            "No .env file found in {}",
            display_paths(candidates)
        ))),
        _ => Err(Error::Config(format!(
            "Multiple .env files found: {}",
            display_paths(&found.into_iter().cloned().collect::<Vec<_>>())
        ))),
    }
}

/// Load the `.env` file into the process environment, overriding existing values.
///
/// # Errors
/// `Config` if discovery fails or the file cannot be parsed.
pub fn load_env(explicit: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let config_dir = xdg_config_dir()
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    let path = discover_env_file(explicit, &default_env_paths(&cwd, &config_dir))?;
    dotenvy::from_path_override(&path)
        .map_err(|e| Error::Config(format!("Failed to load {}: {e}", path.display())))?;

    info!(path = %path.display(), "Loaded environment");
    Ok(path)
}

/// Expand a leading `~/` to the home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;

    fn setup() -> (TempDir, Vec<PathBuf>) {
        let temp_dir = TempDir::new().unwrap();
        let cwd = temp_dir.path().join("work");
        let config = temp_dir.path().join("config");
        std::fs::create_dir_all(&cwd).unwrap();
        std::fs::create_dir_all(config.join(CONFIG_DIR_NAME)).unwrap();
        let candidates = default_env_paths(&cwd, &config);
        (temp_dir, candidates)
    }

    #[test]
    fn test_discover_single_default() {
        let (_temp_dir, candidates) = setup();
        std::fs::write(&candidates[1], "RUNPOD_API_KEY=x\n").unwrap();

        let path = discover_env_file(None, &candidates).unwrap();
        assert_eq!(path, candidates[1]);
    }

    #[test]
    fn test_discover_none_found() {
        let (_temp_dir, candidates) = setup();
        let err = discover_env_file(None, &candidates).unwrap_err();
        assert!(err.to_string().contains("No .env file found"));
    }

    #[test]
    fn test_discover_multiple_found() {
        let (_temp_dir, candidates) = setup();
        for path in &candidates {
            std::fs::write(path, "").unwrap();
        }
        let err = discover_env_file(None, &candidates).unwrap_err();
        assert!(err.to_string().contains("Multiple .env files"));
    }

    #[test]
    fn test_discover_explicit_must_exist() {
        let (temp_dir, candidates) = setup();
        let missing = temp_dir.path().join("custom.env");
        assert!(discover_env_file(Some(&missing), &candidates).is_err());

        std::fs::write(&missing, "").unwrap();
        assert_eq!(discover_env_file(Some(&missing), &candidates).unwrap(), missing);
    }

    #[test]
    fn test_credentials_require_every_variable() {
        let mut vars: HashMap<&str, &str> = HashMap::from([
            ("RUNPOD_API_KEY", "key"),
            ("RUNPOD_NETWORK_VOLUME_ID", "vol123"),
            ("RUNPOD_S3_ACCESS_KEY_ID", "user_abc"),
            ("RUNPOD_S3_SECRET_KEY", "rps_secret"),
        ]);

        let creds =
            Credentials::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(creds.network_volume_id, "vol123");
        assert!(!format!("{creds:?}").contains("rps_secret"));

        vars.insert("RUNPOD_S3_SECRET_KEY", "");
        let err = Credentials::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap_err();
        assert!(err.to_string().contains("RUNPOD_S3_SECRET_KEY"));
    }
}
