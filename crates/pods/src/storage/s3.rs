//! S3-compatible gateway for the RunPod network volume.
//!
//! Requests are path-style (`{endpoint}/{bucket}/{key}`) and signed with
//! AWS Signature Version 4.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use super::ObjectStore;
use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::providers::traits::VolumeLookup;

type HmacSha256 = Hmac<Sha256>;

/// Default timeout for object requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// S3 endpoint for a RunPod data center.
#[must_use]
pub fn s3_endpoint_for(data_center_id: &str) -> String {
    format!("https://s3api-{}.runpod.io/", data_center_id.to_lowercase())
}

/// Connection settings for an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Service endpoint, e.g. `https://s3api-eu-ro-1.runpod.io/`.
    pub endpoint: String,
    /// Signing region.
    pub region: String,
    /// Bucket name.
    pub bucket: String,
    /// Access key ID.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

/// [`ObjectStore`] backed by an S3-compatible API.
#[derive(Clone)]
pub struct S3Gateway {
    client: Client,
    config: S3Config,
    /// Endpoint with any trailing slash removed.
    base: Url,
}

impl S3Gateway {
    /// Create a gateway for an explicit bucket configuration.
    ///
    /// # Errors
    /// `Config` if the endpoint is not a valid URL or the HTTP client cannot
    /// be built.
    pub fn new(config: S3Config) -> Result<Self> {
        let base = Url::parse(config.endpoint.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("invalid S3 endpoint '{}': {e}", config.endpoint)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            base,
        })
    }

    /// Create a gateway for the credentials' network volume.
    ///
    /// The volume's data center decides both the endpoint and the signing
    /// region. The bucket is the volume ID.
    ///
    /// # Errors
    /// `VolumeLookup` if the volume metadata cannot be fetched or has no data
    /// center.
    pub async fn for_network_volume(
        lookup: &dyn VolumeLookup,
        credentials: &Credentials,
    ) -> Result<Self> {
        let volume_id = &credentials.network_volume_id;

        let volume = lookup
            .network_volume(volume_id)
            .await
            .map_err(|e| Error::VolumeLookup {
                volume_id: volume_id.clone(),
                reason: e.to_string(),
            })?;

        let data_center_id = volume
            .data_center_id
            .filter(|dc| !dc.is_empty())
            .ok_or_else(|| Error::VolumeLookup {
                volume_id: volume_id.clone(),
                reason: "response has no dataCenterId".to_string(),
            })?;

        info!(volume_id = %volume_id, data_center_id = %data_center_id, "Resolved network volume");

        Self::new(S3Config {
            endpoint: s3_endpoint_for(&data_center_id),
            region: data_center_id,
            bucket: volume_id.clone(),
            access_key_id: credentials.s3_access_key_id.clone(),
            secret_access_key: credentials.s3_secret_key.clone(),
        })
    }

    /// Signing region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.config.region
    }

    /// URL of an object, with the path already in canonical encoding.
    fn object_url(&self, key: &str) -> Url {
        let prefix = self.base.path().trim_end_matches('/');
        let path = format!(
            "{prefix}/{}/{}",
            uri_encode(&self.config.bucket),
            uri_encode(key.trim_start_matches('/'))
        );
        let mut url = self.base.clone();
        url.set_path(&path);
        url
    }

    /// Build the SigV4 `Authorization` header value.
    fn authorization(
        &self,
        method: &Method,
        url: &Url,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<String, InvalidLength> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let canonical_request = format!(
            "{method}\n{path}\n\nhost:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{payload_hash}",
            path = url.path(),
            host = host_header(url),
        );

        let scope = format!("{date}/{}/s3/aws4_request", self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let key = signing_key(&self.config.secret_access_key, &date, &self.config.region, "s3")?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            self.config.access_key_id
        ))
    }

    /// Send a signed request and return the response, or a reason string.
    async fn send(
        &self,
        method: Method,
        key: &str,
        body: Vec<u8>,
    ) -> std::result::Result<reqwest::Response, String> {
        let url = self.object_url(key);
        let payload_hash = hex::encode(Sha256::digest(&body));
        let now = Utc::now();
        let authorization = self
            .authorization(&method, &url, &payload_hash, now)
            .map_err(|e| format!("failed to sign request: {e}"))?;

        debug!(method = %method, url = %url, "S3 request");

        let response = self
            .client
            .request(method, url)
            .header("x-amz-date", now.format("%Y%m%dT%H%M%SZ").to_string())
            .header("x-amz-content-sha256", payload_hash)
            .header("Authorization", authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(format!("{} {}", status.as_u16(), text.trim()))
        }
    }
}

#[async_trait]
impl ObjectStore for S3Gateway {
    async fn put(&self, key: &str, content: Vec<u8>) -> Result<()> {
        let size = content.len();
        self.send(Method::PUT, key, content)
            .await
            .map_err(|reason| Error::StorageWrite {
                key: key.to_string(),
                reason,
            })?;
        debug!(key = %key, bytes = size, "Uploaded object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let read_error = |reason: String| Error::StorageRead {
            key: key.to_string(),
            reason,
        };

        let response = self
            .send(Method::GET, key, Vec::new())
            .await
            .map_err(read_error)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| read_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// `Host` header value as reqwest will send it.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Percent-encode everything except unreserved characters and `/`.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(char::from(byte));
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> std::result::Result<Vec<u8>, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the SigV4 signing key for one day, region, and service.
fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> std::result::Result<Vec<u8>, InvalidLength> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}
