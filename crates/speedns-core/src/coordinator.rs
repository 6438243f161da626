//! Run coordinator
//!
//! Sequences one speed-test-to-DNS run and guarantees that runs never
//! overlap.
//!
//! ## Run sequence
//!
//! ```text
//! executable check ─► endpoint source ─► domain list ─► zone name
//!        │                  │                │
//!        ▼                  ▼                ▼
//!     Aborted            Aborted          Aborted
//!
//! measurement plan ─► invoke tool ─► parse results ─► reconcile ─► Completed
//!                                         │
//!                                         ▼
//!                                    NoEndpoints
//! ```
//!
//! ## Single flight
//!
//! The run lock is acquired with `try_lock`: a trigger that finds a run in
//! progress returns [`RunOutcome::Busy`] at once instead of queueing. The
//! guard is dropped on every exit path. [`RunCoordinator::is_running`] reads
//! a flag set while the guard is held, so observers never contend for the
//! lock themselves.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::{ApiCredentials, DataLayout};
use crate::measure::{Invoker, MeasurementPlan};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::results::parse_result_csv;
use crate::sink::LogSink;
use crate::source::resolve_endpoint_source;
use crate::store::ConfigStore;
use crate::traits::{ZoneApi, ZoneApiFactory};
use crate::zone::resolve_zone_name;

/// Why a run stopped before measuring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The measurement executable is missing
    MissingExecutable,
    /// The endpoint pool could not be prepared
    EndpointSource(String),
    /// No target domains are configured
    NoDomains,
    /// The measurement tool could not be started
    Measurement(String),
}

/// Result of one trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run held the lock; nothing was done
    Busy,
    /// A precondition failed
    Aborted(AbortReason),
    /// The tool produced no usable endpoints
    NoEndpoints,
    /// The run reached the end
    Completed {
        /// Ranked endpoints read from the result file
        endpoints: Vec<String>,
        /// DNS changes, `None` when the update was skipped for lack of credentials
        report: Option<ReconcileReport>,
    },
}

/// Owns the run lock and drives each run end to end
pub struct RunCoordinator {
    store: ConfigStore,
    layout: DataLayout,
    sink: LogSink,
    factory: Arc<dyn ZoneApiFactory>,
    running: Mutex<()>,
    active: AtomicBool,
}

/// Clears the active flag when a run ends, however it ends
struct ActiveRun<'a>(&'a AtomicBool);

impl<'a> ActiveRun<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RunCoordinator {
    /// Create a coordinator
    pub fn new(
        store: ConfigStore,
        layout: DataLayout,
        sink: LogSink,
        factory: Arc<dyn ZoneApiFactory>,
    ) -> Self {
        Self {
            store,
            layout,
            sink,
            factory,
            running: Mutex::new(()),
            active: AtomicBool::new(false),
        }
    }

    /// Configuration store
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Log sink
    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Data layout
    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for the active run, if any, to finish
    ///
    /// Returns `false` when `grace` elapses first.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.running.lock()).await.is_ok()
    }

    /// Start a run on its own task without waiting for it
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<RunOutcome> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run().await })
    }

    /// Run once, or return [`RunOutcome::Busy`] immediately if a run is active
    pub async fn run(&self) -> RunOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            self.sink
                .warn("A run is already in progress, skipping this trigger");
            return RunOutcome::Busy;
        };
        let _active = ActiveRun::start(&self.active);

        self.sink.info("=== Speed test run started ===");
        self.run_locked().await
    }

    async fn run_locked(&self) -> RunOutcome {
        // Saves made from here on apply to the next run
        let config = self.store.snapshot().await;

        let invoker = Invoker::new(self.layout.executable(), self.layout.data_dir());
        if !invoker.is_available().await {
            self.sink.error(format!(
                "Measurement executable not found: {}",
                invoker.executable().display()
            ));
            return RunOutcome::Aborted(AbortReason::MissingExecutable);
        }

        let source = match resolve_endpoint_source(&self.layout, config.measure.pool).await {
            Ok(path) => path,
            Err(e) => {
                self.sink.error(format!(
                    "Endpoint pool '{}' unavailable: {}",
                    config.measure.pool, e
                ));
                return RunOutcome::Aborted(AbortReason::EndpointSource(e.to_string()));
            }
        };

        let domains = config.domain_list();
        if domains.is_empty() {
            self.sink.error("No target domains configured");
            return RunOutcome::Aborted(AbortReason::NoDomains);
        }

        let api = self.zone_api(&config.credentials);
        let zone = resolve_zone_name(&config, api.as_deref(), &self.sink).await;

        let plan = MeasurementPlan::build(
            &config.measure,
            domains.len(),
            &self.layout.result_file(),
            &source,
        );
        if plan.escalated {
            self.sink.info(format!(
                "Requested result count raised to {}",
                plan.test_count
            ));
        }
        self.sink
            .info(format!("Running: cfst {}", plan.command_line()));

        match invoker.run(&plan.args, &self.sink).await {
            Ok(status) if status.success() => {
                self.sink.info("Measurement finished");
            }
            Ok(status) => {
                self.sink.warn(format!(
                    "Measurement exited with {} (often no endpoint met the thresholds)",
                    status
                ));
            }
            Err(e) => {
                self.sink.error(format!("Measurement failed to run: {}", e));
                return RunOutcome::Aborted(AbortReason::Measurement(e.to_string()));
            }
        }

        let result_file = self.layout.result_file();
        let result_count = plan.result_count;
        let endpoints =
            match tokio::task::spawn_blocking(move || parse_result_csv(&result_file, result_count))
                .await
            {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    self.sink
                        .error(format!("Reading measurement results failed: {}", e));
                    Vec::new()
                }
            };
        if endpoints.is_empty() {
            self.sink.error("No usable endpoints in the measurement results");
            return RunOutcome::NoEndpoints;
        }
        self.sink
            .info(format!("Got {} ranked endpoint(s)", endpoints.len()));

        let report = match api.as_deref() {
            Some(api) => {
                Reconciler::new(api, &self.sink)
                    .reconcile(&domains, &endpoints, &zone, config.measure.result_cap())
                    .await
            }
            None => {
                self.sink
                    .warn("Zone API credentials missing, skipping DNS update");
                None
            }
        };

        self.sink.info("=== Run completed ===");
        RunOutcome::Completed { endpoints, report }
    }

    fn zone_api(&self, credentials: &ApiCredentials) -> Option<Box<dyn ZoneApi>> {
        if !credentials.is_complete() {
            return None;
        }

        match self.factory.create(credentials) {
            Ok(api) => Some(api),
            Err(e) => {
                self.sink
                    .error(format!("Cannot create zone API client: {}", e));
                None
            }
        }
    }
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("layout", &self.layout)
            .field("running", &self.is_running())
            .finish()
    }
}
