// # speednsd - speed-test DNS daemon
//
// Thin integration layer: reads its settings from the environment, opens the
// data directory, and triggers runs of the `speedns_core::RunCoordinator` on
// the configured cron schedule. All run logic lives in speedns-core.
//
// ## Configuration
//
// Process settings come from environment variables:
//
// - `SPEEDNS_DATA_DIR`: data directory holding `cfst`, `ip.txt`, `ipv6.txt`,
//   `config.json`, `app.log` (default `/app/data`)
// - `SPEEDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `SPEEDNS_RUN_ON_START`: run once right after startup (default false)
// - `SPEEDNS_API_BASE`: DNS API root override (default: public Cloudflare API)
//
// Run settings (credentials, domains, schedule, thresholds) live in
// `config.json` and are re-read before every run.
//
// ## Signals
//
// - `SIGUSR1`: run now
// - `SIGINT` / `SIGTERM`: stop, giving an in-flight run a grace period
//
// ## Example
//
// ```bash
// export SPEEDNS_DATA_DIR=/var/lib/speedns
// export SPEEDNS_RUN_ON_START=true
//
// speednsd
// kill -USR1 $(pidof speednsd)
// ```

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use speedns_core::config::DEFAULT_DATA_DIR;
use speedns_core::traits::ZoneApiFactory;
use speedns_core::{ConfigStore, CronSchedule, DataLayout, LogSink, RunCoordinator, RunOutcome};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Longest sleep between schedule checks, so saved schedules apply promptly
const RESCHEDULE_INTERVAL: Duration = Duration::from_secs(60);

/// How long shutdown waits for an in-flight run
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SpeednsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SpeednsExitCode> for ExitCode {
    fn from(code: SpeednsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Process settings
#[derive(Debug)]
struct Config {
    data_dir: PathBuf,
    log_level: String,
    run_on_start: bool,
    api_base: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let run_on_start = match env::var("SPEEDNS_RUN_ON_START") {
            Ok(value) => parse_bool(&value).with_context(|| {
                format!("SPEEDNS_RUN_ON_START '{}' is not a boolean", value)
            })?,
            Err(_) => false,
        };

        Ok(Self {
            data_dir: env::var("SPEEDNS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
            log_level: env::var("SPEEDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            run_on_start,
            api_base: env::var("SPEEDNS_API_BASE")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("SPEEDNS_DATA_DIR cannot be empty");
        }

        if self.data_dir.exists() && !self.data_dir.is_dir() {
            anyhow::bail!(
                "SPEEDNS_DATA_DIR is not a directory: {}",
                self.data_dir.display()
            );
        }

        if let Some(ref base) = self.api_base {
            if !base.starts_with("https://") && !base.starts_with("http://") {
                anyhow::bail!(
                    "SPEEDNS_API_BASE must use HTTP or HTTPS scheme. Got: {}",
                    base
                );
            }

            if base.starts_with("http://") {
                eprintln!(
                    "WARNING: SPEEDNS_API_BASE uses HTTP (not HTTPS). \
                     API credentials will be sent in clear text."
                );
            }
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "SPEEDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn tracing_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected true or false, got '{}'", other),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SpeednsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SpeednsExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.tracing_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SpeednsExitCode::ConfigError.into();
    }

    info!("Starting speednsd");
    info!("Data directory: {}", config.data_dir.display());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SpeednsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let coordinator = match open(&config).await {
            Ok(coordinator) => coordinator,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return SpeednsExitCode::ConfigError;
            }
        };

        if let Err(e) = run_daemon(&config, coordinator).await {
            error!("Daemon error: {:#}", e);
            SpeednsExitCode::RuntimeError
        } else {
            SpeednsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Open the data directory and build the coordinator
async fn open(config: &Config) -> Result<Arc<RunCoordinator>> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("cannot create {}", config.data_dir.display()))?;

    let layout = DataLayout::new(&config.data_dir);
    let store = ConfigStore::open(layout.config_file())
        .await
        .context("cannot open run configuration")?;
    // The writer task ends once the last sink handle is dropped
    let (sink, _writer) = LogSink::open(layout.log_file())
        .await
        .context("cannot open run log")?;

    let factory = zone_api_factory(config)?;
    Ok(Arc::new(RunCoordinator::new(store, layout, sink, factory)))
}

#[cfg(feature = "cloudflare")]
fn zone_api_factory(config: &Config) -> Result<Arc<dyn ZoneApiFactory>> {
    use speedns_provider_cloudflare::CloudflareFactory;

    let factory = match config.api_base {
        Some(ref base) => {
            info!("Using DNS API at {}", base);
            CloudflareFactory::with_base_url(base.clone())
        }
        None => CloudflareFactory::new(),
    };
    Ok(Arc::new(factory))
}

#[cfg(not(feature = "cloudflare"))]
fn zone_api_factory(_config: &Config) -> Result<Arc<dyn ZoneApiFactory>> {
    anyhow::bail!("speednsd was built without a DNS provider; enable the `cloudflare` feature")
}

/// Why the daemon woke up
#[derive(Debug)]
enum Wake {
    /// The schedule fired
    Scheduled,
    /// Time to look at the schedule again
    Recheck,
    /// On-demand run requested
    RunNow,
    /// Stop
    Shutdown(&'static str),
}

/// Scheduler loop
///
/// Re-reads the schedule before every wait, so a saved `cron_spec` takes
/// effect within [`RESCHEDULE_INTERVAL`]. Runs are started without waiting
/// for them; overlapping triggers are turned away by the coordinator.
async fn run_daemon(config: &Config, coordinator: Arc<RunCoordinator>) -> Result<()> {
    let mut signals = Signals::install()?;
    let mut in_flight: Option<JoinHandle<RunOutcome>> = None;

    if config.run_on_start {
        info!("Running once at startup");
        track(&mut in_flight, coordinator.trigger());
    }

    let mut announced: Option<String> = None;

    loop {
        let expression = coordinator.store().snapshot().await.schedule;
        let next = next_fire(&expression, &mut announced, coordinator.sink());

        let wait = match next {
            Some(at) => (at - Local::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(RESCHEDULE_INTERVAL),
            None => RESCHEDULE_INTERVAL,
        };

        let wake = tokio::select! {
            _ = tokio::time::sleep(wait) => match next {
                Some(at) if Local::now() >= at => Wake::Scheduled,
                _ => Wake::Recheck,
            },
            event = signals.next() => event,
        };

        match wake {
            Wake::Scheduled => {
                info!("Schedule fired");
                track(&mut in_flight, coordinator.trigger());
            }
            Wake::RunNow => {
                info!("On-demand run requested");
                track(&mut in_flight, coordinator.trigger());
            }
            Wake::Recheck => {}
            Wake::Shutdown(signal) => {
                info!("Received shutdown signal: {}", signal);
                break;
            }
        }

        if let Some(handle) = in_flight.take_if(|h| h.is_finished()) {
            log_outcome(handle).await;
        }
    }

    shutdown(coordinator, in_flight).await
}

/// Next fire time for `expression`, logging schedule changes once
fn next_fire(
    expression: &str,
    announced: &mut Option<String>,
    sink: &LogSink,
) -> Option<DateTime<Local>> {
    let changed = announced.as_deref() != Some(expression);
    if changed {
        *announced = Some(expression.to_string());
    }

    match CronSchedule::parse(expression) {
        Ok(Some(schedule)) => {
            let next = schedule.next_after(&Local::now());
            if changed {
                match next {
                    Some(at) => sink.info(format!(
                        "Schedule set to '{}', next run at {}",
                        expression.trim(),
                        at.format("%Y-%m-%d %H:%M:%S")
                    )),
                    None => sink.warn(format!("Schedule '{}' never fires", expression.trim())),
                }
            }
            next
        }
        Ok(None) => {
            if changed {
                sink.info("No schedule configured, running on demand only");
            }
            None
        }
        Err(e) => {
            if changed {
                sink.error(format!("{}; scheduled runs are disabled", e));
            }
            None
        }
    }
}

/// Keep the handle of the run that holds the lock
///
/// A trigger arriving while that run is active ends as `Busy`; its handle is
/// detached instead of replacing the real run's.
fn track(in_flight: &mut Option<JoinHandle<RunOutcome>>, handle: JoinHandle<RunOutcome>) {
    if in_flight.as_ref().is_some_and(|current| !current.is_finished()) {
        return;
    }
    *in_flight = Some(handle);
}

async fn log_outcome(handle: JoinHandle<RunOutcome>) {
    match handle.await {
        Ok(outcome) => debug!("Run finished: {:?}", outcome),
        Err(e) => error!("Run task failed: {}", e),
    }
}

/// Give an in-flight run a grace period, then flush the log
async fn shutdown(
    coordinator: Arc<RunCoordinator>,
    in_flight: Option<JoinHandle<RunOutcome>>,
) -> Result<()> {
    if coordinator.is_running() {
        info!("Waiting up to {:?} for the current run", SHUTDOWN_GRACE);
        if !coordinator.wait_idle(SHUTDOWN_GRACE).await {
            warn!("Run still active after {:?}, exiting anyway", SHUTDOWN_GRACE);
        }
    }

    if let Some(handle) = in_flight.filter(|h| h.is_finished()) {
        log_outcome(handle).await;
    }

    coordinator.sink().info("speednsd stopped");
    coordinator.sink().flush().await;
    info!("Shutting down speednsd");
    Ok(())
}

/// Process signal handlers
#[cfg(unix)]
struct Signals {
    run_now: Signal,
    terminate: Signal,
    interrupt: Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Self {
            run_now: signal(SignalKind::user_defined1())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGUSR1 handler: {}", e))?,
            terminate: signal(SignalKind::terminate())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?,
            interrupt: signal(SignalKind::interrupt())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?,
        })
    }

    async fn next(&mut self) -> Wake {
        tokio::select! {
            _ = self.run_now.recv() => Wake::RunNow,
            _ = self.terminate.recv() => Wake::Shutdown("SIGTERM"),
            _ = self.interrupt.recv() => Wake::Shutdown("SIGINT"),
        }
    }
}

/// Process signal handlers (CTRL-C only)
#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> Wake {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Wake::Shutdown("SIGINT"),
            Err(e) => {
                error!("Failed to wait for CTRL-C: {}", e);
                Wake::Shutdown("signal error")
            }
        }
    }
}
