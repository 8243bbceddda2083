//! rpc - RunPod GPU pod provisioning tool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pods::config::{self, Credentials};
use pods::controller::{extract_public_endpoint, DEFAULT_IMAGE_NAME};
use pods::providers::traits::CloudType;
use pods::remaining::{estimate_remaining, format_remaining};
use pods::ssh::SshSettings;
use pods::{ControllerSettings, GpuCatalog, Pod, PodController, PodSpec, RunPod, S3Gateway};

/// rpc - Create, list, and terminate RunPod GPU pods.
#[derive(Parser)]
#[command(name = "rpc")]
#[command(about = "Provision and manage RunPod GPU pods backed by a network volume")]
struct Cli {
    /// Path to a `.env` file (default: `./.env` or `$XDG_CONFIG_HOME/runpod_cli/.env`).
    #[arg(long = "env", global = true)]
    env_file: Option<PathBuf>,

    /// Enable debug logging (`-v` works after the subcommand too).
    #[arg(short = 'v', long = "debug", global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a pod, wait for its network, and update local SSH files.
    Create(CreateArgs),

    /// List all pods.
    List {
        /// Show endpoint, hardware, and cost.
        #[arg(long, default_value = "false")]
        verbose: bool,
    },

    /// Terminate a pod.
    Terminate {
        /// Pod ID.
        pod_id: String,
    },

    /// List known GPU types.
    Gpus,
}

#[derive(clap::Args)]
struct CreateArgs {
    /// Pod name (default: `$USER-<gpu display name>`).
    #[arg(long)]
    name: Option<String>,

    /// Minutes before the pod terminates itself.
    #[arg(short, long, default_value = "60")]
    runtime: u32,

    /// GPU type: display name, provider ID, or a unique substring of either.
    #[arg(short, long, default_value = "RTX A4000")]
    gpu_type: String,

    /// Number of GPUs.
    #[arg(long, default_value = "1")]
    num_gpus: u32,

    /// Minimum vCPUs.
    #[arg(long, default_value = "1")]
    cpus: u32,

    /// Minimum memory in GB.
    #[arg(long, default_value = "1")]
    memory: u32,

    /// Container disk in GB.
    #[arg(long, default_value = "30")]
    disk: u32,

    /// Ephemeral volume in GB.
    #[arg(long, default_value = "0")]
    volume_in_gb: u32,

    /// Container image.
    #[arg(long, default_value = DEFAULT_IMAGE_NAME)]
    image_name: String,

    /// Network volume mount path.
    #[arg(long, default_value = "/network")]
    volume_mount_path: String,

    /// Cloud tier: SECURE or COMMUNITY.
    #[arg(long, default_value = "SECURE")]
    cloud_type: CloudType,

    /// Extra container environment variable (repeatable).
    #[arg(long = "env-var", value_name = "KEY=VALUE", value_parser = parse_env_var)]
    env_vars: Vec<(String, String)>,

    /// Forward the local SSH agent through the alias.
    #[arg(long, default_value = "false")]
    forward_agent: bool,

    /// Point the `runpod` SSH alias at the new pod.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    update_ssh_config: bool,

    /// Append the pod's host keys to the dedicated known-hosts file.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    update_known_hosts: bool,
}

impl CreateArgs {
    fn to_spec(&self) -> PodSpec {
        PodSpec {
            image_name: self.image_name.clone(),
            gpu_type: self.gpu_type.clone(),
            cloud_type: self.cloud_type,
            gpu_count: self.num_gpus,
            volume_in_gb: self.volume_in_gb,
            min_vcpu_count: self.cpus,
            min_memory_in_gb: self.memory,
            container_disk_in_gb: self.disk,
            volume_mount_path: self.volume_mount_path.clone(),
            staging_dir: None,
            env: self.env_vars.iter().cloned().collect::<BTreeMap<_, _>>(),
            update_ssh_config: self.update_ssh_config,
            forward_agent: self.forward_agent,
            update_known_hosts: self.update_known_hosts,
        }
    }
}

fn parse_env_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Gpus => print_gpus(&GpuCatalog::runpod()),

        Commands::Create(args) => {
            let controller = build_controller(cli.env_file.as_deref()).await?;
            let spec = args.to_spec();
            let pod = controller
                .create(args.name.clone(), &spec, args.runtime)
                .await?;

            println!("\n✅ Pod created successfully!");
            println!("   ID:      {}", pod.id);
            println!("   Name:    {}", pod.name);
            if let Ok(endpoint) = extract_public_endpoint(&pod) {
                println!("   SSH:     {}:{}", endpoint.ip, endpoint.port);
            }
            println!("   Runtime: {} min", args.runtime);
            if spec.update_ssh_config {
                println!("\n💡 Connect with `ssh {}`", controller.settings().ssh.alias);
            }
        }

        Commands::List { verbose } => {
            let controller = build_controller(cli.env_file.as_deref()).await?;
            let pods = controller.list().await?;
            if pods.is_empty() {
                println!("\nNo pods.");
                return Ok(());
            }

            let now = chrono::Utc::now();
            println!("\n{:<16} {:<32} {:<12}", "ID", "NAME", "REMAINING");
            println!("{}", "-".repeat(62));
            for pod in &pods {
                println!(
                    "{:<16} {:<32} {:<12}",
                    pod.id,
                    pod.name,
                    format_remaining(estimate_remaining(pod, now))
                );
                if verbose {
                    print_pod_details(pod);
                }
            }
            println!();
        }

        Commands::Terminate { pod_id } => {
            let controller = build_controller(cli.env_file.as_deref()).await?;
            controller.terminate(&pod_id).await?;
            info!(pod_id = %pod_id, "Terminate request accepted");
            println!("\n✅ Pod {pod_id} terminated");
        }
    }

    Ok(())
}

/// Load credentials, resolve the network volume, and wire up the controller.
async fn build_controller(env_file: Option<&Path>) -> Result<PodController> {
    config::load_env(env_file).context("Failed to load .env file")?;
    let creds = Credentials::from_env()?;

    let runpod = Arc::new(RunPod::new(&creds.api_key).context("Failed to create RunPod client")?);
    let store = Arc::new(
        S3Gateway::for_network_volume(runpod.as_ref(), &creds)
            .await
            .context("Failed to set up network volume storage")?,
    );

    let settings = ControllerSettings {
        network_volume_id: Some(creds.network_volume_id.clone()),
        user: env_or("USER", "user"),
        git_email: env_or("GIT_EMAIL", ""),
        git_name: env_or("GIT_NAME", ""),
        ssh: SshSettings::default(),
        ..ControllerSettings::default()
    };
    Ok(PodController::new(runpod, store, settings))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn print_gpus(catalog: &GpuCatalog) {
    println!("\n{:<16} {:<50}", "NAME", "ID");
    println!("{}", "-".repeat(66));
    for (name, id) in catalog.entries() {
        println!("{name:<16} {id:<50}");
    }
    println!();
}

fn print_pod_details(pod: &Pod) {
    let endpoint = extract_public_endpoint(pod)
        .map_or_else(|_| "n/a".to_string(), |e| format!("{}:{}", e.ip, e.port));
    let gpu = pod
        .machine
        .as_ref()
        .and_then(|m| m.gpu_display_name.as_deref())
        .unwrap_or("n/a");

    println!("   📡 Public: {endpoint}");
    println!("   🎮 GPU:    {} x{}", gpu, pod.gpu_count.unwrap_or(0));
    println!(
        "   💾 Memory: {} GB | vCPU: {} | Disk: {} GB",
        pod.memory_in_gb.unwrap_or(0.0),
        pod.vcpu_count.unwrap_or(0.0),
        pod.container_disk_in_gb.unwrap_or(0)
    );
    println!(
        "   📁 Mount:  {}",
        pod.volume_mount_path.as_deref().unwrap_or("n/a")
    );
    println!("   💰 ${:.3}/hr", pod.cost_per_hr.unwrap_or(0.0));
}
