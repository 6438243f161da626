//! Configuration types for speedns
//!
//! [`RunConfig`] is the persisted run configuration. Its JSON keys are flat
//! (`cron_spec`, `zone_id`, `api_key`, `domains`, `test_count`, ...) so that
//! existing `config.json` files keep loading; the Rust side groups them into
//! [`ApiCredentials`] and [`MeasureConfig`].
//!
//! [`DataLayout`] derives every file the run touches from a single data
//! directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Result cap used when `max_result` is unset
pub const DEFAULT_MAX_RESULT: usize = 10;

/// Port probed when `test_port` is unset
pub const DEFAULT_TEST_PORT: u16 = 443;

/// Default data directory for the daemon
pub const DEFAULT_DATA_DIR: &str = "/app/data";

/// Persisted run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Cron expression for scheduled runs (empty = on demand only)
    #[serde(rename = "cron_spec")]
    pub schedule: String,

    /// Zone API credentials
    #[serde(flatten)]
    pub credentials: ApiCredentials,

    /// Explicit root domain of the zone (e.g. "example.com")
    pub main_domain: String,

    /// Comma-separated target domains, in priority order
    pub domains: String,

    /// Measurement tool tuning
    #[serde(flatten)]
    pub measure: MeasureConfig,
}

impl RunConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the configured domains into an ordered list
    pub fn domain_list(&self) -> Vec<String> {
        parse_domains(&self.domains)
    }

    /// Explicitly configured root domain, if any
    pub fn root_domain(&self) -> Option<&str> {
        let trimmed = self.main_domain.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Canonicalize values the way a save does
    ///
    /// - root domain is trimmed
    /// - region codes are uppercased and stripped of whitespace
    pub fn normalize(&mut self) {
        self.main_domain = self.main_domain.trim().to_string();
        self.measure.colo = self
            .measure
            .colo
            .split(',')
            .map(|code| code.trim().to_uppercase())
            .filter(|code| !code.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        self.measure.download_url = self.measure.download_url.trim().to_string();
    }

    /// Validate the configuration
    ///
    /// Only checks values that would make the measurement tool reject its
    /// arguments. Missing domains or credentials are reported at run time.
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.measure.validate()
    }
}

/// Parse a comma-separated domain list
///
/// Entries are trimmed; empty entries are dropped; order is kept.
pub fn parse_domains(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Zone API credentials
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiCredentials {
    /// Zone identifier
    pub zone_id: String,

    /// Global API key
    /// ⚠️ NEVER log this value
    pub api_key: String,

    /// Account email
    pub email: String,
}

impl ApiCredentials {
    /// Create credentials
    pub fn new(
        zone_id: impl Into<String>,
        api_key: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            zone_id: zone_id.into(),
            api_key: api_key.into(),
            email: email.into(),
        }
    }

    /// Whether the zone API can be called at all
    pub fn is_complete(&self) -> bool {
        !self.zone_id.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("zone_id", &self.zone_id)
            .field("api_key", &"<REDACTED>")
            .field("email", &self.email)
            .finish()
    }
}

/// Which endpoint pool feeds the measurement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IpPool {
    /// IPv4 list only
    #[default]
    V4,
    /// IPv6 list only
    V6,
    /// Both lists merged
    Both,
}

impl IpPool {
    /// Configuration spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            IpPool::V4 => "v4",
            IpPool::V6 => "v6",
            IpPool::Both => "both",
        }
    }
}

impl From<String> for IpPool {
    /// Unknown or empty values fall back to IPv4
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "v6" => IpPool::V6,
            "both" => IpPool::Both,
            _ => IpPool::V4,
        }
    }
}

impl From<IpPool> for String {
    fn from(pool: IpPool) -> Self {
        pool.as_str().to_string()
    }
}

impl fmt::Display for IpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurement tool tuning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Endpoint pool selection
    #[serde(rename = "ip_type")]
    pub pool: IpPool,

    /// Requested number of results from the tool (`-dn`)
    pub test_count: usize,

    /// Maximum addresses published (0 = [`DEFAULT_MAX_RESULT`])
    pub max_result: usize,

    /// Minimum download speed in MB/s (`-sl`)
    pub min_speed: f64,

    /// Maximum latency in ms (`-tl`)
    pub max_delay: u32,

    /// Minimum latency in ms (`-tll`)
    pub min_delay: u32,

    /// Probe port (0 = [`DEFAULT_TEST_PORT`])
    pub test_port: u16,

    /// Region code filter, comma-separated (`-cfcolo`)
    pub colo: String,

    /// HTTP latency probe mode (`-httping`)
    pub enable_httping: bool,

    /// Custom download URL (`-url`)
    pub download_url: String,
}

impl MeasureConfig {
    /// Effective result cap
    pub fn result_cap(&self) -> usize {
        if self.max_result == 0 {
            DEFAULT_MAX_RESULT
        } else {
            self.max_result
        }
    }

    /// Effective probe port
    pub fn port(&self) -> u16 {
        if self.test_port == 0 {
            DEFAULT_TEST_PORT
        } else {
            self.test_port
        }
    }

    /// Validate tuning values
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.min_speed.is_finite() || self.min_speed < 0.0 {
            return Err(crate::Error::config(format!(
                "min_speed must be a non-negative number, got {}",
                self.min_speed
            )));
        }

        if self.max_delay > 0 && self.min_delay > self.max_delay {
            return Err(crate::Error::config(format!(
                "min_delay ({} ms) exceeds max_delay ({} ms)",
                self.min_delay, self.max_delay
            )));
        }

        Ok(())
    }
}

/// File layout under the shared data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    data_dir: PathBuf,
}

impl DataLayout {
    /// Create a layout rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// The data directory itself (working directory of the tool)
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Measurement executable
    pub fn executable(&self) -> PathBuf {
        self.data_dir.join("cfst")
    }

    /// IPv4 endpoint pool
    pub fn ipv4_list(&self) -> PathBuf {
        self.data_dir.join("ip.txt")
    }

    /// IPv6 endpoint pool
    pub fn ipv6_list(&self) -> PathBuf {
        self.data_dir.join("ipv6.txt")
    }

    /// Derived merged pool
    pub fn combined_list(&self) -> PathBuf {
        self.data_dir.join("ip_combined.txt")
    }

    /// Result CSV written by the tool
    pub fn result_file(&self) -> PathBuf {
        self.data_dir.join("result.csv")
    }

    /// Log sink file
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("app.log")
    }

    /// Persisted configuration
    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}
