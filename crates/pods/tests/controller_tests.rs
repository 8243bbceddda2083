//! End-to-end tests of the pod lifecycle against in-memory fakes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::Instant;

use pods::providers::traits::{PodRuntime, PortMapping};
use pods::ssh::SshSettings;
use pods::{
    ControllerSettings, CreatePodRequest, Error, ObjectStore, Pod, PodController, PodProvider,
    PodSpec, ProviderError,
};

const POD_ID: &str = "pod-xyz";

struct FakeProvider {
    /// Responses to successive `get_pod` calls; the last one repeats.
    polls: Mutex<Vec<Pod>>,
    poll_times: Mutex<Vec<Instant>>,
    get_calls: AtomicU32,
    created: Mutex<Vec<CreatePodRequest>>,
    terminated: Mutex<Vec<String>>,
    reject_create: bool,
}

impl FakeProvider {
    fn with_polls(polls: Vec<Pod>) -> Self {
        Self {
            polls: Mutex::new(polls),
            poll_times: Mutex::new(Vec::new()),
            get_calls: AtomicU32::new(0),
            created: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            reject_create: false,
        }
    }

    fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn created(&self) -> Vec<CreatePodRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PodProvider for FakeProvider {
    async fn get_pods(&self) -> Result<Vec<Pod>, ProviderError> {
        Ok(vec![ready_pod(), pending_pod()])
    }

    async fn get_pod(&self, pod_id: &str) -> Result<Pod, ProviderError> {
        assert_eq!(pod_id, POD_ID);
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.poll_times.lock().unwrap().push(Instant::now());

        let mut polls = self.polls.lock().unwrap();
        if polls.len() > 1 {
            Ok(polls.remove(0))
        } else {
            Ok(polls[0].clone())
        }
    }

    async fn create_pod(&self, request: CreatePodRequest) -> Result<Pod, ProviderError> {
        if self.reject_create {
            return Err(ProviderError::Api {
                status: 400,
                message: "There are no longer any instances available".to_string(),
            });
        }
        let pod = Pod {
            id: POD_ID.to_string(),
            name: request.name.clone(),
            ..Pod::default()
        };
        self.created.lock().unwrap().push(request);
        Ok(pod)
    }

    async fn terminate_pod(&self, pod_id: &str) -> Result<(), ProviderError> {
        self.terminated.lock().unwrap().push(pod_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    /// Every key `put` was called with, including failed ones.
    put_attempts: Mutex<Vec<String>>,
    /// `put` fails for keys ending with this suffix.
    fail_suffix: Option<String>,
}

impl FakeStore {
    fn failing_on(suffix: &str) -> Self {
        Self {
            fail_suffix: Some(suffix.to_string()),
            ..Self::default()
        }
    }

    fn insert(&self, key: &str, content: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), content.as_bytes().to_vec());
    }

    fn put_attempts(&self) -> Vec<String> {
        self.put_attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put(&self, key: &str, content: Vec<u8>) -> pods::Result<()> {
        self.put_attempts.lock().unwrap().push(key.to_string());
        if self.fail_suffix.as_deref().is_some_and(|s| key.ends_with(s)) {
            return Err(Error::StorageWrite {
                key: key.to_string(),
                reason: "403 Forbidden".to_string(),
            });
        }
        self.objects.lock().unwrap().insert(key.to_string(), content);
        Ok(())
    }

    async fn get(&self, key: &str) -> pods::Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::StorageRead {
                key: key.to_string(),
                reason: "404 Not Found".to_string(),
            })
    }
}

fn mapping(ip: &str, public: bool, public_port: u16, private_port: u16) -> PortMapping {
    PortMapping {
        ip: ip.to_string(),
        is_ip_public: public,
        public_port,
        private_port: Some(private_port),
        kind: Some("tcp".to_string()),
    }
}

fn pending_pod() -> Pod {
    Pod {
        id: POD_ID.to_string(),
        name: "job 1".to_string(),
        desired_status: Some("RUNNING".to_string()),
        runtime: None,
        ..Pod::default()
    }
}

fn pod_with_ports(ports: Vec<PortMapping>) -> Pod {
    Pod {
        runtime: Some(PodRuntime {
            ports: Some(ports),
            uptime_in_seconds: Some(3),
        }),
        ..pending_pod()
    }
}

fn ready_pod() -> Pod {
    pod_with_ports(vec![
        mapping("100.65.0.2", false, 8888, 8888),
        mapping("203.0.113.7", true, 22122, 22),
    ])
}

fn settings(dir: &Path, max_poll_attempts: u32) -> ControllerSettings {
    ControllerSettings {
        network_volume_id: Some("vol123".to_string()),
        user: "alice".to_string(),
        git_email: "alice@example.com".to_string(),
        git_name: "Alice".to_string(),
        max_poll_attempts,
        ssh: SshSettings {
            alias: "runpod".to_string(),
            user: "user".to_string(),
            config_path: dir.join("config.runpod_cli"),
            known_hosts_path: dir.join("known_hosts.runpod_cli"),
        },
        ..ControllerSettings::default()
    }
}

fn controller(
    provider: &Arc<FakeProvider>,
    store: &Arc<FakeStore>,
    settings: ControllerSettings,
) -> PodController {
    PodController::new(provider.clone(), store.clone(), settings)
}

fn a40_spec() -> PodSpec {
    PodSpec {
        gpu_type: "NVIDIA A40".to_string(),
        ..PodSpec::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_create_ready_on_third_poll() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![
        pending_pod(),
        pending_pod(),
        ready_pod(),
    ]));
    let store = Arc::new(FakeStore::default());
    store.insert(".tmp_job_1/ssh_ed25519_host_key", "ssh-ed25519 AAAAED root@pod\n");
    store.insert(".tmp_job_1/ssh_rsa_host_key", "ssh-rsa AAAARSA root@pod\n");
    let settings = settings(temp_dir.path(), 60);
    let ssh = settings.ssh.clone();

    let pod = controller(&provider, &store, settings)
        .create(Some("job 1".to_string()), &a40_spec(), 60)
        .await
        .unwrap();

    assert_eq!(pod.id, POD_ID);
    assert!(pod.is_network_ready());
    assert_eq!(provider.get_calls(), 3);

    let times = provider.poll_times.lock().unwrap().clone();
    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_secs(5) && gap < Duration::from_millis(5010), "gap {gap:?}");
    }

    let config = std::fs::read_to_string(&ssh.config_path).unwrap();
    assert!(config.contains("HostName 203.0.113.7"));
    assert!(config.contains("Port 22122"));

    let known_hosts = std::fs::read_to_string(&ssh.known_hosts_path).unwrap();
    assert_eq!(
        known_hosts,
        "# runpod cli:\n[203.0.113.7]:22122 ssh-ed25519 AAAAED\n\
         # runpod cli:\n[203.0.113.7]:22122 ssh-rsa AAAARSA\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_create_request_carries_entrypoint_and_volume() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![ready_pod()]));
    let store = Arc::new(FakeStore::default());

    let spec = PodSpec {
        env: [("HF_TOKEN".to_string(), "hf_x".to_string())].into(),
        update_known_hosts: false,
        ..a40_spec()
    };
    controller(&provider, &store, settings(temp_dir.path(), 60))
        .create(None, &spec, 1)
        .await
        .unwrap();

    let created = provider.created();
    assert_eq!(created.len(), 1);
    let request = &created[0];
    assert_eq!(request.name, "alice-A40");
    assert_eq!(request.gpu_type_id, "NVIDIA A40");
    assert_eq!(request.ports, "8888/http,22/tcp");
    assert_eq!(request.network_volume_id.as_deref(), Some("vol123"));
    assert_eq!(request.env.get("HF_TOKEN").map(String::as_str), Some("hf_x"));
    assert_eq!(
        request.docker_args,
        "/bin/bash -c 'mkdir -p /network/.tmp_alice-A40; \
         bash /network/.tmp_alice-A40/start_pod.sh; sleep 60; \
         bash /network/.tmp_alice-A40/terminate_pod.sh'"
    );

    assert_eq!(
        store.put_attempts(),
        [
            ".tmp_alice-A40/setup_root.sh",
            ".tmp_alice-A40/setup_user.sh",
            ".tmp_alice-A40/start_pod.sh",
            ".tmp_alice-A40/terminate_pod.sh",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_timeout_after_exact_attempts() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![pending_pod()]));
    let store = Arc::new(FakeStore::default());

    let err = controller(&provider, &store, settings(temp_dir.path(), 4))
        .create(None, &a40_spec(), 60)
        .await
        .unwrap_err();

    match err {
        Error::ProvisioningTimeout {
            pod_id,
            attempts,
            waited,
        } => {
            assert_eq!(pod_id, POD_ID);
            assert_eq!(attempts, 4);
            // No sleep after the final poll.
            assert!(waited >= Duration::from_secs(15) && waited < Duration::from_secs(20));
        }
        other => panic!("expected ProvisioningTimeout, got {other:?}"),
    }
    assert_eq!(provider.get_calls(), 4);
    assert!(!temp_dir.path().join("config.runpod_cli").exists());
}

#[tokio::test(start_paused = true)]
async fn test_runtime_without_ports_keeps_polling() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![
        pod_with_ports(vec![]),
        ready_pod(),
    ]));
    let store = Arc::new(FakeStore::default());

    let spec = PodSpec {
        update_known_hosts: false,
        ..a40_spec()
    };
    controller(&provider, &store, settings(temp_dir.path(), 60))
        .create(None, &spec, 60)
        .await
        .unwrap();
    assert_eq!(provider.get_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_two_public_mappings_is_malformed() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![pod_with_ports(vec![
        mapping("203.0.113.7", true, 22122, 22),
        mapping("203.0.113.8", true, 22123, 22),
    ])]));
    let store = Arc::new(FakeStore::default());

    let err = controller(&provider, &store, settings(temp_dir.path(), 60))
        .create(None, &a40_spec(), 60)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MalformedPodResponse { ref pod_id, .. } if pod_id == POD_ID));
    assert!(err.to_string().contains(POD_ID));
    assert!(!temp_dir.path().join("config.runpod_cli").exists());
}

#[tokio::test]
async fn test_staging_aborts_on_second_upload() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![ready_pod()]));
    let store = Arc::new(FakeStore::failing_on("setup_user.sh"));

    let err = controller(&provider, &store, settings(temp_dir.path(), 60))
        .create(None, &a40_spec(), 60)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::StorageWrite { ref key, .. } if key.ends_with("setup_user.sh")));
    assert_eq!(store.put_attempts().len(), 2);
    assert!(provider.created().is_empty());
    assert_eq!(provider.get_calls(), 0);
}

#[tokio::test]
async fn test_unknown_gpu_makes_no_remote_calls() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![ready_pod()]));
    let store = Arc::new(FakeStore::default());

    let spec = PodSpec {
        gpu_type: "Voodoo 5".to_string(),
        ..PodSpec::default()
    };
    let err = controller(&provider, &store, settings(temp_dir.path(), 60))
        .create(None, &spec, 60)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownGpu { .. }));
    assert!(store.put_attempts().is_empty());
    assert!(provider.created().is_empty());
}

#[tokio::test]
async fn test_ambiguous_gpu_lists_candidates() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![ready_pod()]));
    let store = Arc::new(FakeStore::default());

    let spec = PodSpec {
        gpu_type: "rtx".to_string(),
        ..PodSpec::default()
    };
    let err = controller(&provider, &store, settings(temp_dir.path(), 60))
        .create(None, &spec, 60)
        .await
        .unwrap_err();

    match err {
        Error::AmbiguousGpu { candidates, .. } => assert!(candidates.len() > 1),
        other => panic!("expected AmbiguousGpu, got {other:?}"),
    }
    assert!(store.put_attempts().is_empty());
}

#[tokio::test]
async fn test_rejected_create_is_pod_create_error() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider {
        reject_create: true,
        ..FakeProvider::with_polls(vec![ready_pod()])
    });
    let store = Arc::new(FakeStore::default());

    let err = controller(&provider, &store, settings(temp_dir.path(), 60))
        .create(None, &a40_spec(), 60)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PodCreate(ProviderError::Api { status: 400, .. })));
    assert_eq!(provider.get_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_host_keys_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![ready_pod()]));
    let store = Arc::new(FakeStore::default());
    store.insert(".tmp_alice-A40/ssh_ecdsa_host_key", "ecdsa-sha2-nistp256 AAAAEC\n");
    let settings = settings(temp_dir.path(), 60);
    let known_hosts = settings.ssh.known_hosts_path.clone();

    controller(&provider, &store, settings)
        .create(None, &a40_spec(), 60)
        .await
        .unwrap();

    let content = std::fs::read_to_string(known_hosts).unwrap();
    assert_eq!(content, "# runpod cli:\n[203.0.113.7]:22122 ecdsa-sha2-nistp256 AAAAEC\n");
}

#[tokio::test]
async fn test_list_and_terminate_delegate() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![ready_pod()]));
    let store = Arc::new(FakeStore::default());
    let controller = controller(&provider, &store, settings(temp_dir.path(), 60));

    assert_eq!(controller.list().await.unwrap().len(), 2);

    controller.terminate(POD_ID).await.unwrap();
    assert_eq!(*provider.terminated.lock().unwrap(), [POD_ID]);
}

#[tokio::test]
async fn test_quote_in_pod_name_rejected_before_staging() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![ready_pod()]));
    let store = Arc::new(FakeStore::default());

    let err = controller(&provider, &store, settings(temp_dir.path(), 60))
        .create(Some("bob's pod".to_string()), &a40_spec(), 60)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidSpec(ref m) if m.contains(".tmp_bob's_pod")));
    assert!(store.put_attempts().is_empty());
    assert!(provider.created().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_create_requests_public_ip_and_ssh() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::with_polls(vec![ready_pod()]));
    let store = Arc::new(FakeStore::default());

    let spec = PodSpec {
        update_known_hosts: false,
        ..a40_spec()
    };
    controller(&provider, &store, settings(temp_dir.path(), 60))
        .create(Some("job 1".to_string()), &spec, 60)
        .await
        .unwrap();

    let created = provider.created();
    assert!(created[0].support_public_ip);
    assert!(created[0].start_ssh);
}
