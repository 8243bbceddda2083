//! RunPod API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::models::{GraphQlRequest, GraphQlResponse};
use super::queries;
use crate::providers::traits::{
    CreatePodRequest, NetworkVolume, Pod, PodProvider, ProviderError, VolumeLookup,
};

/// GraphQL endpoint for pod operations.
const GRAPHQL_URL: &str = "https://api.runpod.io/graphql";

/// REST endpoint for volume metadata.
const REST_BASE_URL: &str = "https://rest.runpod.io/v1";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// RunPod pod provider.
#[derive(Clone)]
pub struct RunPod {
    /// HTTP client.
    client: Client,
    /// API key for authentication.
    api_key: String,
    /// GraphQL endpoint.
    graphql_url: String,
    /// REST base URL.
    rest_base_url: String,
}

impl RunPod {
    /// Create a new RunPod provider.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            graphql_url: GRAPHQL_URL.to_string(),
            rest_base_url: REST_BASE_URL.to_string(),
        })
    }

    /// Point the client at different API endpoints.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        graphql_url: impl Into<String>,
        rest_base_url: impl Into<String>,
    ) -> Self {
        self.graphql_url = graphql_url.into();
        self.rest_base_url = rest_base_url.into();
        self
    }

    /// Run a GraphQL document and return its `data` object.
    async fn graphql(&self, operation: &str, query: String) -> Result<Value, ProviderError> {
        debug!(operation, url = %self.graphql_url, "GraphQL request");

        let response = self
            .client
            .post(&self.graphql_url)
            .query(&[("api_key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&GraphQlRequest { query })
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let body: GraphQlResponse = serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %text, "Failed to parse GraphQL response");
            ProviderError::Serialization(e)
        })?;

        if let Some(message) = body.error_message() {
            return Err(ProviderError::GraphQl(message));
        }

        body.data
            .ok_or_else(|| ProviderError::GraphQl(format!("{operation}: response has no data")))
    }

    /// Make an authenticated REST GET request.
    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.rest_base_url);
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                ProviderError::Serialization(e)
            })
        } else if status == StatusCode::NOT_FOUND {
            Err(ProviderError::NotFound(text))
        } else {
            Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }

    /// Decode one pod payload, naming the pod in the error if possible.
    fn to_pod(value: Value) -> Result<Pod, ProviderError> {
        let pod_id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();

        serde_json::from_value(value).map_err(|e| ProviderError::Malformed {
            pod_id,
            reason: e.to_string(),
        })
    }
}

/// Move the value at `pointer` out of `data`, or `Null` if absent.
fn take(data: &mut Value, pointer: &str) -> Value {
    data.pointer_mut(pointer).map(Value::take).unwrap_or_default()
}

#[async_trait]
impl PodProvider for RunPod {
    async fn get_pods(&self) -> Result<Vec<Pod>, ProviderError> {
        let mut data = self.graphql("pods", queries::list_pods()).await?;

        match take(&mut data, "/myself/pods") {
            Value::Array(pods) => pods.into_iter().map(Self::to_pod).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(ProviderError::GraphQl(format!(
                "pods: expected a list, got {other}"
            ))),
        }
    }

    async fn get_pod(&self, id: &str) -> Result<Pod, ProviderError> {
        let mut data = self.graphql("pod", queries::get_pod(id)).await?;

        match take(&mut data, "/pod") {
            Value::Null => Err(ProviderError::NotFound(format!("pod {id}"))),
            value => Self::to_pod(value),
        }
    }

    async fn create_pod(&self, req: CreatePodRequest) -> Result<Pod, ProviderError> {
        info!(name = %req.name, gpu_type_id = %req.gpu_type_id, "Creating pod");

        let mut data = self
            .graphql("podFindAndDeployOnDemand", queries::deploy_pod(&req))
            .await?;

        let pod = match take(&mut data, "/podFindAndDeployOnDemand") {
            Value::Null => {
                return Err(ProviderError::GraphQl(
                    "podFindAndDeployOnDemand returned no pod".to_string(),
                ))
            }
            value => Self::to_pod(value)?,
        };

        info!(pod_id = %pod.id, "Pod created");
        Ok(pod)
    }

    async fn terminate_pod(&self, id: &str) -> Result<(), ProviderError> {
        self.graphql("podTerminate", queries::terminate_pod(id))
            .await?;
        info!(pod_id = %id, "Pod terminated");
        Ok(())
    }
}

#[async_trait]
impl VolumeLookup for RunPod {
    async fn network_volume(&self, id: &str) -> Result<NetworkVolume, ProviderError> {
        self.get(&format!("/networkvolumes/{id}")).await
    }
}
