// # Cloudflare Zone API
//
// `ZoneApi` implementation for the Cloudflare v4 REST API, authenticated with
// an account email and global API key.
//
// ## Calls
//
// | Operation       | Request                                              |
// |-----------------|------------------------------------------------------|
// | `zone_name`     | `GET    /zones/{zone_id}`                            |
// | `list_records`  | `GET    /zones/{zone_id}/dns_records?name=..&per_page=100` |
// | `delete_record` | `DELETE /zones/{zone_id}/dns_records/{id}`           |
// | `create_record` | `POST   /zones/{zone_id}/dns_records`                |
//
// Every call is a single request. Nothing is retried or cached here; the
// reconciler decides what a failure means for the run.
//
// ## Security
//
// - The API key NEVER appears in logs or `Debug` output
// - Construction fails fast on an empty zone id or key

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use speedns_core::traits::{DnsRecord, NewRecord, ZoneApi, ZoneApiFactory};
use speedns_core::{ApiCredentials, Error, Result};
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest page the record listing asks for
const LIST_PAGE_SIZE: &str = "100";

const PROVIDER: &str = "cloudflare";

/// Cloudflare response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ZoneResult {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordResult {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    record_type: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct IdResult {
    id: String,
}

/// Body of a record creation
#[derive(Debug, Serialize)]
struct CreatePayload<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

impl<'a> From<&'a NewRecord> for CreatePayload<'a> {
    fn from(record: &'a NewRecord) -> Self {
        Self {
            record_type: record.record_type.as_str(),
            name: &record.name,
            content: &record.content,
            ttl: record.ttl,
            proxied: record.proxied,
        }
    }
}

/// Cloudflare zone API client bound to one zone
pub struct CloudflareZoneApi {
    /// Account email (`X-Auth-Email`)
    email: String,

    /// Global API key (`X-Auth-Key`)
    /// ⚠️ NEVER log this value
    api_key: String,

    /// Zone identifier
    zone_id: String,

    /// API root, without trailing slash
    base_url: String,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for CloudflareZoneApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareZoneApi")
            .field("email", &self.email)
            .field("api_key", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareZoneApi {
    /// Create a client for the zone in `credentials`
    pub fn new(credentials: &ApiCredentials) -> Result<Self> {
        Self::with_base_url(credentials, CLOUDFLARE_API_BASE)
    }

    /// Create a client against a different API root (proxies, tests)
    pub fn with_base_url(credentials: &ApiCredentials, base_url: impl Into<String>) -> Result<Self> {
        if credentials.zone_id.trim().is_empty() {
            return Err(Error::config("Cloudflare zone id is required"));
        }
        if credentials.api_key.trim().is_empty() {
            return Err(Error::config("Cloudflare API key is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            email: credentials.email.trim().to_string(),
            api_key: credentials.api_key.trim().to_string(),
            zone_id: credentials.zone_id.trim().to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn zone_url(&self) -> String {
        format!("{}/zones/{}", self.base_url, self.zone_id)
    }

    fn records_url(&self) -> String {
        format!("{}/dns_records", self.zone_url())
    }

    fn record_url(&self, record_id: &str) -> String {
        format!("{}/{}", self.records_url(), record_id)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        // `headers` replaces, so a body set by `.json()` keeps a single content type
        let mut json = HeaderMap::new();
        json.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request
            .header("X-Auth-Email", &self.email)
            .header("X-Auth-Key", &self.api_key)
            .headers(json)
    }

    /// Send `request` and unwrap the envelope
    async fn call<T>(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("{}: HTTP request failed: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body, what));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            Error::provider(PROVIDER, format!("{}: failed to parse response: {}", what, e))
        })?;
        envelope.into_result(what)
    }
}

impl<T> Envelope<T> {
    fn into_result(self, what: &str) -> Result<Option<T>> {
        if self.success {
            return Ok(self.result);
        }

        let detail = if self.errors.is_empty() {
            "no error detail".to_string()
        } else {
            self.errors
                .iter()
                .map(|e| format!("[{}] {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; ")
        };
        Err(Error::provider(PROVIDER, format!("{} rejected: {}", what, detail)))
    }
}

/// Map a non-success HTTP status to an error
fn status_error(status: u16, body: &str, what: &str) -> Error {
    match status {
        401 | 403 => Error::provider(
            PROVIDER,
            format!(
                "{}: authentication failed, check the email and API key. Status: {}",
                what, status
            ),
        ),
        404 => Error::not_found(format!("{}: not found ({})", what, body.trim())),
        429 => Error::provider(
            PROVIDER,
            format!("{}: rate limit exceeded. Status: {}", what, status),
        ),
        500..=599 => Error::provider(
            PROVIDER,
            format!("{}: Cloudflare server error {} - {}", what, status, body.trim()),
        ),
        _ => Error::provider(PROVIDER, format!("{}: {} - {}", what, status, body.trim())),
    }
}

#[async_trait]
impl ZoneApi for CloudflareZoneApi {
    async fn zone_name(&self) -> Result<String> {
        tracing::debug!("Looking up zone name for zone {}", self.zone_id);

        let zone: Option<ZoneResult> = self
            .call(self.client.get(self.zone_url()), "zone lookup")
            .await?;
        Ok(zone.map(|z| z.name).unwrap_or_default())
    }

    async fn list_records(&self, fqdn: &str) -> Result<Vec<DnsRecord>> {
        let request = self
            .client
            .get(self.records_url())
            .query(&[("name", fqdn), ("per_page", LIST_PAGE_SIZE)]);

        let records: Option<Vec<RecordResult>> = self.call(request, "record listing").await?;
        let records: Vec<DnsRecord> = records
            .unwrap_or_default()
            .into_iter()
            .map(|r| DnsRecord {
                id: r.id,
                name: r.name,
                record_type: r.record_type,
                content: r.content,
            })
            .collect();

        tracing::debug!("Found {} record(s) named {}", records.len(), fqdn);
        Ok(records)
    }

    async fn delete_record(&self, record_id: &str) -> Result<()> {
        let _: Option<IdResult> = self
            .call(self.client.delete(self.record_url(record_id)), "record deletion")
            .await?;
        Ok(())
    }

    async fn create_record(&self, record: &NewRecord) -> Result<String> {
        let request = self
            .client
            .post(self.records_url())
            .json(&CreatePayload::from(record));

        let created: Option<IdResult> = self.call(request, "record creation").await?;
        created.map(|r| r.id).ok_or_else(|| {
            Error::provider(PROVIDER, "record creation: response carried no record id")
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for Cloudflare zone APIs
#[derive(Debug, Clone)]
pub struct CloudflareFactory {
    base_url: String,
}

impl CloudflareFactory {
    /// Factory for the public Cloudflare API
    pub fn new() -> Self {
        Self::with_base_url(CLOUDFLARE_API_BASE)
    }

    /// Factory for a different API root
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for CloudflareFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneApiFactory for CloudflareFactory {
    fn create(&self, credentials: &ApiCredentials) -> Result<Box<dyn ZoneApi>> {
        Ok(Box::new(CloudflareZoneApi::with_base_url(
            credentials,
            self.base_url.clone(),
        )?))
    }
}
