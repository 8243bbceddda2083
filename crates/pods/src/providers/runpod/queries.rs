//! GraphQL documents for the RunPod API.
//!
//! Values are inlined as GraphQL literals. Strings go through `serde_json`
//! so quotes and backslashes in entrypoints survive intact.

use super::models::{CREATED_POD_FIELDS, POD_FIELDS};
use crate::providers::traits::CreatePodRequest;

/// Render a string as a quoted GraphQL literal.
fn literal(value: &str) -> String {
    // JSON string escaping is a subset of GraphQL string escaping.
    serde_json::Value::String(value.to_string()).to_string()
}

/// `myself { pods { ... } }`
pub fn list_pods() -> String {
    format!("query Pods {{ myself {{ pods {{ {POD_FIELDS} }} }} }}")
}

/// `pod(input: { podId })`
pub fn get_pod(id: &str) -> String {
    format!(
        "query Pod {{ pod(input: {{ podId: {} }}) {{ {POD_FIELDS} }} }}",
        literal(id)
    )
}

/// `podTerminate(input: { podId })`
pub fn terminate_pod(id: &str) -> String {
    format!(
        "mutation {{ podTerminate(input: {{ podId: {} }}) }}",
        literal(id)
    )
}

/// `podFindAndDeployOnDemand(input: { ... })`
pub fn deploy_pod(req: &CreatePodRequest) -> String {
    let mut fields = vec![
        format!("cloudType: {}", req.cloud_type),
        format!("gpuCount: {}", req.gpu_count),
        format!("volumeInGb: {}", req.volume_in_gb),
        format!("containerDiskInGb: {}", req.container_disk_in_gb),
        format!("minVcpuCount: {}", req.min_vcpu_count),
        format!("minMemoryInGb: {}", req.min_memory_in_gb),
        format!("gpuTypeId: {}", literal(&req.gpu_type_id)),
        format!("name: {}", literal(&req.name)),
        format!("imageName: {}", literal(&req.image_name)),
        format!("dockerArgs: {}", literal(&req.docker_args)),
        format!("ports: {}", literal(&req.ports)),
        format!("volumeMountPath: {}", literal(&req.volume_mount_path)),
        format!("supportPublicIp: {}", req.support_public_ip),
        format!("startSsh: {}", req.start_ssh),
    ];

    if let Some(volume_id) = &req.network_volume_id {
        fields.push(format!("networkVolumeId: {}", literal(volume_id)));
    }

    if !req.env.is_empty() {
        let env = req
            .env
            .iter()
            .map(|(key, value)| format!("{{ key: {}, value: {} }}", literal(key), literal(value)))
            .collect::<Vec<_>>()
            .join(", ");
        fields.push(format!("env: [{env}]"));
    }

    format!(
        "mutation {{ podFindAndDeployOnDemand(input: {{ {} }}) {{ {CREATED_POD_FIELDS} }} }}",
        fields.join(", ")
    )
}
