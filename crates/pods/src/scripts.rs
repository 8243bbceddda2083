//! Bootstrap scripts staged on the network volume before a pod starts.
//!
//! The container entrypoint runs `start_pod.sh` (which in turn runs the two
//! setup scripts), sleeps, then runs `terminate_pod.sh`. All four must exist
//! in the staging directory before the pod is created.

use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::ObjectStore;

/// Script run first by the entrypoint.
pub const START_SCRIPT: &str = "start_pod.sh";

/// Script run last by the entrypoint.
pub const TERMINATE_SCRIPT: &str = "terminate_pod.sh";

/// Templates in staging order.
const TEMPLATES: &[(&str, &str)] = &[
    ("setup_root.sh", include_str!("../templates/setup_root.sh.hbs")),
    ("setup_user.sh", include_str!("../templates/setup_user.sh.hbs")),
    (START_SCRIPT, include_str!("../templates/start_pod.sh.hbs")),
    (TERMINATE_SCRIPT, include_str!("../templates/terminate_pod.sh.hbs")),
];

/// A named script ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedScript {
    /// File name inside the staging directory.
    pub name: String,
    /// Script body.
    pub content: String,
}

impl StagedScript {
    /// Create a script.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Values substituted into the bootstrap templates.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptContext {
    /// Absolute staging directory on the pod, e.g. `/network/.tmp_alice_A40`.
    pub staging_path: String,
    /// Where the network volume is mounted.
    pub volume_mount_path: String,
    /// Git author email configured for the pod user.
    pub git_email: String,
    /// Git author name configured for the pod user.
    pub git_name: String,
}

/// Render the four bootstrap scripts in staging order.
///
/// # Errors
/// `Template` if a template fails to parse or render.
pub fn render_bootstrap_scripts(context: &ScriptContext) -> Result<Vec<StagedScript>> {
    let mut handlebars = Handlebars::new();
    // Shell scripts, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    TEMPLATES
        .iter()
        .map(|(name, template)| {
            let content = handlebars
                .render_template(template, context)
                .map_err(|e| Error::Template {
                    name: (*name).to_string(),
                    reason: e.to_string(),
                })?;
            Ok(StagedScript::new(*name, content))
        })
        .collect()
}

/// Upload `scripts` under `{target_prefix}/{name}`, in order.
///
/// Stops at the first failed upload. Scripts already uploaded stay in place.
///
/// # Errors
/// The first `StorageWrite` encountered.
pub async fn stage(
    store: &dyn ObjectStore,
    scripts: &[StagedScript],
    target_prefix: &str,
) -> Result<()> {
    let prefix = target_prefix.trim_end_matches('/');

    for script in scripts {
        let key = format!("{prefix}/{}", script.name);
        debug!(key = %key, "Staging script");
        store.put(&key, script.content.as_bytes().to_vec()).await?;
    }

    info!(prefix = %prefix, count = scripts.len(), "Bootstrap scripts staged");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ScriptContext {
        ScriptContext {
            staging_path: "/network/.tmp_alice_A40".to_string(),
            volume_mount_path: "/network".to_string(),
            git_email: "alice@example.com".to_string(),
            git_name: "Alice".to_string(),
        }
    }

    #[test]
    fn test_renders_four_scripts_in_order() {
        let scripts = render_bootstrap_scripts(&context()).unwrap();
        let names: Vec<&str> = scripts.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["setup_root.sh", "setup_user.sh", START_SCRIPT, TERMINATE_SCRIPT]
        );
        assert!(scripts.iter().all(|s| s.content.starts_with("#!/bin/bash")));
    }

    #[test]
    fn test_placeholders_substituted() {
        let scripts = render_bootstrap_scripts(&context()).unwrap();
        for script in &scripts {
            assert!(!script.content.contains("{{"), "{} left a placeholder", script.name);
            assert!(script.content.contains("/network/.tmp_alice_A40/log.txt"));
        }

        let user = &scripts[1].content;
        assert!(user.contains(r#"git config --global user.email "alice@example.com""#));

        let start = &scripts[2].content;
        assert!(start.contains("/network/.tmp_alice_A40/ssh_${kind}_host_key"));
    }

    #[test]
    fn test_terminate_script_keeps_shell_quoting() {
        let scripts = render_bootstrap_scripts(&context()).unwrap();
        let terminate = &scripts[3].content;
        assert!(terminate.contains(r#"podTerminate(input: {podId: \\\"${RUNPOD_POD_ID}\\\"})"#));
    }
}
