// # Zone API Trait
//
// Defines the four remote operations the reconciler needs from a DNS
// hosting provider.
//
// ## Implementations
//
// - Cloudflare: `speedns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use speedns_core::traits::{NewRecord, ZoneApi};
//
// async fn publish(api: &dyn ZoneApi) -> speedns_core::Result<()> {
//     let zone = api.zone_name().await?;
//     for record in api.list_records("edge.example.com").await? {
//         api.delete_record(&record.id).await?;
//     }
//     api.create_record(&NewRecord::for_endpoint("edge", "198.51.100.7")).await?;
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::fmt;

/// TTL applied to every created record
pub const RECORD_TTL: u32 = 60;

/// Address record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
}

impl RecordType {
    /// Classify an endpoint string
    ///
    /// Anything containing a colon is IPv6. No further validation happens
    /// here; malformed endpoints surface as API failures.
    pub fn infer(endpoint: &str) -> Self {
        if endpoint.contains(':') {
            RecordType::Aaaa
        } else {
            RecordType::A
        }
    }

    /// Wire spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An existing record on the remote service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// Provider record identifier
    pub id: String,
    /// Fully-qualified name as reported by the provider
    pub name: String,
    /// Record type as reported by the provider (may be non-address types)
    pub record_type: String,
    /// Record content
    pub content: String,
}

/// A record to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Zone-relative record name (`@` for the apex)
    pub name: String,
    /// Address type
    pub record_type: RecordType,
    /// Endpoint address
    pub content: String,
    /// Time to live in seconds
    pub ttl: u32,
    /// Provider-side proxying
    pub proxied: bool,
}

impl NewRecord {
    /// Unproxied record with the standard TTL; the type follows the endpoint
    pub fn for_endpoint(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let content = endpoint.into();
        Self {
            name: name.into(),
            record_type: RecordType::infer(&content),
            content,
            ttl: RECORD_TTL,
            proxied: false,
        }
    }
}

/// Trait for zone API implementations
///
/// Each method is a single remote call. Implementations do not retry, do not
/// cache and do not log secrets; the reconciler decides what a failure means.
///
/// # Thread Safety
///
/// Implementations must be usable across async tasks.
#[async_trait]
pub trait ZoneApi: Send + Sync {
    /// Canonical name of the configured zone (e.g. "example.com")
    async fn zone_name(&self) -> Result<String, crate::Error>;

    /// Every record whose name exactly matches `fqdn`
    async fn list_records(&self, fqdn: &str) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Delete one record by identifier
    async fn delete_record(&self, record_id: &str) -> Result<(), crate::Error>;

    /// Create one record, returning its identifier
    async fn create_record(&self, record: &NewRecord) -> Result<String, crate::Error>;

    /// Provider name for logs
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing zone APIs from credentials
pub trait ZoneApiFactory: Send + Sync {
    /// Create a ZoneApi for the given credentials
    fn create(
        &self,
        credentials: &crate::config::ApiCredentials,
    ) -> Result<Box<dyn ZoneApi>, crate::Error>;
}
