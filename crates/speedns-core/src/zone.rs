//! Zone name resolution and record naming
//!
//! The zone API scopes record names to its zone, so a record for
//! `edge.example.com` in zone `example.com` must be created as `edge`.
//! Passing the FQDN has been seen to produce `edge.example.com.example.com`
//! on some providers, which is why the zone name is resolved before any
//! record is written.

use crate::config::RunConfig;
use crate::sink::LogSink;
use crate::traits::ZoneApi;

/// Record name denoting the zone apex
pub const APEX: &str = "@";

/// Where the zone name came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneSource {
    /// Explicit `main_domain` setting
    Configured,
    /// Looked up through the zone API
    Discovered,
    /// Unknown; records use the FQDN verbatim
    Unresolved,
}

/// Resolved zone name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneName {
    name: String,
    source: ZoneSource,
}

impl ZoneName {
    /// Zone name known from configuration or lookup
    pub fn new(name: impl Into<String>, source: ZoneSource) -> Self {
        Self {
            name: name.into().trim().trim_end_matches('.').to_string(),
            source,
        }
    }

    /// No zone name available
    pub fn unresolved() -> Self {
        Self {
            name: String::new(),
            source: ZoneSource::Unresolved,
        }
    }

    /// The zone name (empty when unresolved)
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Where it came from
    pub fn source(&self) -> &ZoneSource {
        &self.source
    }

    /// Zone-relative record name for `fqdn`
    ///
    /// - `fqdn` equals the zone → `@`
    /// - `fqdn` ends with `.zone` → the prefix
    /// - otherwise → `fqdn` unchanged
    ///
    /// Comparison ignores ASCII case; the prefix keeps its original casing.
    pub fn record_name(&self, fqdn: &str) -> String {
        if self.name.is_empty() {
            return fqdn.to_string();
        }

        let fqdn_lower = fqdn.to_ascii_lowercase();
        let zone_lower = self.name.to_ascii_lowercase();

        if fqdn_lower == zone_lower {
            return APEX.to_string();
        }

        let suffix = format!(".{}", zone_lower);
        if fqdn_lower.ends_with(&suffix) {
            return fqdn[..fqdn.len() - suffix.len()].to_string();
        }

        fqdn.to_string()
    }
}

/// Determine the zone name for this run
///
/// An explicit root domain always wins and skips the lookup. Otherwise the
/// zone API is asked; a failed lookup degrades record naming but never
/// aborts the run.
pub async fn resolve_zone_name(
    config: &RunConfig,
    api: Option<&dyn ZoneApi>,
    sink: &LogSink,
) -> ZoneName {
    if let Some(root) = config.root_domain() {
        sink.info(format!("Using configured root domain: {}", root));
        return ZoneName::new(root, ZoneSource::Configured);
    }

    let Some(api) = api else {
        sink.warn(
            "No root domain configured and no zone API credentials; \
             records will be named with the full domain",
        );
        return ZoneName::unresolved();
    };

    match api.zone_name().await {
        Ok(name) if !name.trim().is_empty() => {
            let zone = ZoneName::new(name, ZoneSource::Discovered);
            sink.info(format!("Discovered root domain: {}", zone.as_str()));
            zone
        }
        Ok(_) => {
            sink.warn(
                "Zone lookup returned an empty name; records will be named with the \
                 full domain. Set main_domain to fix this",
            );
            ZoneName::unresolved()
        }
        Err(e) => {
            sink.warn(format!(
                "Zone lookup failed: {}. Records will be named with the full domain, \
                 which some providers suffix twice. Set main_domain to fix this",
                e
            ));
            ZoneName::unresolved()
        }
    }
}
