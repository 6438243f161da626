//! DNS reconciliation
//!
//! Converges the target domains onto the ranked endpoints. Every touched
//! domain is fully replaced: all of its existing records are deleted, then
//! the new ones are created. There is no diffing, so repeating a
//! reconciliation with the same inputs leaves the same record set.
//!
//! ## Policies
//!
//! The policy follows from the number of domains alone:
//!
//! - one domain → [`DistributionPolicy::LoadBalance`]: the domain gets one
//!   record per endpoint, up to the result cap
//! - several domains → [`DistributionPolicy::RankMapping`]: domain *i* gets
//!   exactly endpoint *i*; domains beyond the endpoint list are left alone
//!
//! ## Failure handling
//!
//! - listing a domain's records fails → that domain is abandoned, others continue
//! - a delete or create fails → logged, the loop continues
//!
//! Nothing is retried.

use crate::sink::LogSink;
use crate::traits::{NewRecord, ZoneApi};
use crate::zone::ZoneName;

/// How endpoints are distributed over domains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionPolicy {
    /// One domain, several records (client-side load distribution)
    LoadBalance {
        /// Maximum records created
        cap: usize,
    },
    /// Several domains, one record each, in rank order
    RankMapping,
}

impl DistributionPolicy {
    /// Policy for `domain_count` domains
    ///
    /// Returns `None` when there are no domains.
    pub fn for_domains(domain_count: usize, cap: usize) -> Option<Self> {
        match domain_count {
            0 => None,
            1 => Some(DistributionPolicy::LoadBalance { cap }),
            _ => Some(DistributionPolicy::RankMapping),
        }
    }
}

/// What happened to one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainOutcome {
    /// Target FQDN
    pub domain: String,
    /// Zone-relative name records were created under
    pub record_name: String,
    /// Existing records found
    pub listed: usize,
    /// Records deleted
    pub deleted: usize,
    /// Deletions that failed
    pub delete_failures: usize,
    /// Records created
    pub created: usize,
    /// Creations that failed
    pub create_failures: usize,
    /// Listing failed; nothing was changed
    pub list_error: Option<String>,
}

impl DomainOutcome {
    fn new(domain: &str, record_name: String) -> Self {
        Self {
            domain: domain.to_string(),
            record_name,
            listed: 0,
            deleted: 0,
            delete_failures: 0,
            created: 0,
            create_failures: 0,
            list_error: None,
        }
    }

    /// Whether every call for this domain succeeded
    pub fn is_clean(&self) -> bool {
        self.list_error.is_none() && self.delete_failures == 0 && self.create_failures == 0
    }
}

/// Summary of one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Policy applied
    pub policy: DistributionPolicy,
    /// Domains that were processed, in order
    pub domains: Vec<DomainOutcome>,
    /// Domains left untouched for lack of an endpoint
    pub skipped: Vec<String>,
}

impl ReconcileReport {
    /// Records created across all domains
    pub fn total_created(&self) -> usize {
        self.domains.iter().map(|d| d.created).sum()
    }

    /// Whether every processed domain was clean and none were skipped
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.domains.iter().all(DomainOutcome::is_clean)
    }
}

/// Applies a distribution policy through a [`ZoneApi`]
pub struct Reconciler<'a> {
    api: &'a dyn ZoneApi,
    sink: &'a LogSink,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler
    pub fn new(api: &'a dyn ZoneApi, sink: &'a LogSink) -> Self {
        Self { api, sink }
    }

    /// Reconcile `domains` onto `endpoints` (best first)
    ///
    /// `cap` bounds the records created under the load-balance policy.
    /// Returns `None` if `domains` is empty.
    pub async fn reconcile(
        &self,
        domains: &[String],
        endpoints: &[String],
        zone: &ZoneName,
        cap: usize,
    ) -> Option<ReconcileReport> {
        let policy = DistributionPolicy::for_domains(domains.len(), cap)?;
        let mut report = ReconcileReport {
            policy,
            domains: Vec::with_capacity(domains.len()),
            skipped: Vec::new(),
        };

        match policy {
            DistributionPolicy::LoadBalance { cap } => {
                let domain = &domains[0];
                let selected = &endpoints[..endpoints.len().min(cap)];
                self.sink.info(format!(
                    "Updating [{}] with {} record(s) (load-balance mode)",
                    domain,
                    selected.len()
                ));
                report
                    .domains
                    .push(self.replace_domain(domain, selected, zone).await);
            }
            DistributionPolicy::RankMapping => {
                self.sink.info(format!(
                    "Updating {} domain(s) (one endpoint per domain)",
                    domains.len()
                ));
                for (index, domain) in domains.iter().enumerate() {
                    let Some(endpoint) = endpoints.get(index) else {
                        self.sink.warn(format!(
                            "No endpoint left for [{}] (rank {}), leaving it unchanged",
                            domain,
                            index + 1
                        ));
                        report.skipped.push(domain.clone());
                        continue;
                    };

                    self.sink
                        .info(format!(" -> [{}] resolves to [{}]", domain, endpoint));
                    report.domains.push(
                        self.replace_domain(domain, std::slice::from_ref(endpoint), zone)
                            .await,
                    );
                }
            }
        }

        Some(report)
    }

    /// Delete every record of `domain`, then create one per endpoint
    async fn replace_domain(
        &self,
        domain: &str,
        endpoints: &[String],
        zone: &ZoneName,
    ) -> DomainOutcome {
        let mut outcome = DomainOutcome::new(domain, zone.record_name(domain));

        let existing = match self.api.list_records(domain).await {
            Ok(records) => records,
            Err(e) => {
                self.sink
                    .error(format!("Failed to list records for [{}]: {}", domain, e));
                outcome.list_error = Some(e.to_string());
                return outcome;
            }
        };
        outcome.listed = existing.len();

        if existing.is_empty() {
            self.sink
                .info(format!("No existing records for [{}]", domain));
        } else {
            self.sink.info(format!(
                "Removing {} existing record(s) for [{}]",
                existing.len(),
                domain
            ));
        }

        for record in &existing {
            match self.api.delete_record(&record.id).await {
                Ok(()) => outcome.deleted += 1,
                Err(e) => {
                    outcome.delete_failures += 1;
                    self.sink
                        .warn(format!("Failed to delete record {}: {}", record.id, e));
                }
            }
        }

        for endpoint in endpoints {
            let record = NewRecord::for_endpoint(outcome.record_name.clone(), endpoint.clone());
            match self.api.create_record(&record).await {
                Ok(id) => {
                    outcome.created += 1;
                    tracing::debug!(
                        "Created {} record {} -> {} ({})",
                        record.record_type,
                        record.name,
                        record.content,
                        id
                    );
                }
                Err(e) => {
                    outcome.create_failures += 1;
                    self.sink.error(format!(
                        "Failed to create record [{} -> {}]: {}",
                        record.name, record.content, e
                    ));
                }
            }
        }

        self.sink.info(format!(
            "Added {} new record(s) for [{}]",
            outcome.created, domain
        ));
        outcome
    }
}
