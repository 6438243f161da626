//! Measurement tool invocation
//!
//! [`MeasurementPlan::build`] turns the configuration into the tool's argument
//! vector and the number of ranked results the run will consume.
//! [`Invoker::run`] executes the tool once, copying stdout and stderr into
//! the log sink line by line while it runs.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;

use crate::config::MeasureConfig;
use crate::error::{Error, Result};
use crate::sink::LogSink;

const FLAG_HTTPING: &str = "-httping";

/// Arguments and counts for one measurement run
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPlan {
    /// Argument vector passed to the tool
    pub args: Vec<String>,
    /// Results requested from the tool (`-dn`)
    pub test_count: usize,
    /// Ranked endpoints read back from the result file
    pub result_count: usize,
    /// Whether `test_count` was raised above the configured value
    pub escalated: bool,
}

impl MeasurementPlan {
    /// Build the plan
    ///
    /// The result cap is `max_result` (10 when unset), raised to the number
    /// of domains when several are configured so every domain can get an
    /// endpoint. The tool is asked for at least that many results.
    pub fn build(
        measure: &MeasureConfig,
        domain_count: usize,
        result_file: &Path,
        endpoint_source: &Path,
    ) -> Self {
        let mut result_count = measure.result_cap();
        if domain_count > 1 && domain_count > result_count {
            result_count = domain_count;
        }

        let escalated = measure.test_count < result_count;
        let test_count = measure.test_count.max(result_count);

        let mut args = vec![
            "-o".to_string(),
            result_file.display().to_string(),
            "-dn".to_string(),
            test_count.to_string(),
            "-sl".to_string(),
            format!("{:.2}", measure.min_speed),
            "-tl".to_string(),
            measure.max_delay.to_string(),
            "-tll".to_string(),
            measure.min_delay.to_string(),
            "-tp".to_string(),
            measure.port().to_string(),
            "-f".to_string(),
            endpoint_source.display().to_string(),
        ];

        let download_url = measure.download_url.trim();
        if !download_url.is_empty() {
            args.push("-url".to_string());
            args.push(download_url.to_string());
        }

        let colo = measure.colo.trim();
        if !colo.is_empty() {
            args.push("-cfcolo".to_string());
            args.push(colo.to_string());
            // Region filtering only works in HTTP probe mode
            args.push(FLAG_HTTPING.to_string());
        }

        if measure.enable_httping && !args.iter().any(|a| a == FLAG_HTTPING) {
            args.push(FLAG_HTTPING.to_string());
        }

        Self {
            args,
            test_count,
            result_count,
            escalated,
        }
    }

    /// Arguments joined for the log line
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }
}

/// Runs the external measurement executable
#[derive(Debug, Clone)]
pub struct Invoker {
    executable: PathBuf,
    working_dir: PathBuf,
}

impl Invoker {
    /// Create an invoker for `executable`, run from `working_dir`
    pub fn new(executable: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Path of the executable
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Whether the executable is present
    pub async fn is_available(&self) -> bool {
        tokio::fs::metadata(&self.executable)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Run the tool to completion
    ///
    /// Output is streamed into `sink` as it arrives; this returns only once
    /// the process has exited and both streams are drained. The exit status
    /// is returned as-is: a non-zero exit is for the caller to interpret.
    pub async fn run(&self, args: &[String], sink: &LogSink) -> Result<ExitStatus> {
        if !self.is_available().await {
            return Err(Error::measurement(format!(
                "executable not found: {}",
                self.executable.display()
            )));
        }

        self.ensure_executable().await?;

        let mut child = Command::new(&self.executable)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::measurement(format!(
                    "failed to start {}: {}",
                    self.executable.display(),
                    e
                ))
            })?;

        let stdout_pump = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(pump_lines(stdout, sink.clone())));
        let stderr_pump = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(pump_lines(stderr, sink.clone())));

        let status = child.wait().await.map_err(|e| {
            Error::measurement(format!("failed to wait for measurement tool: {}", e))
        })?;

        for pump in [stdout_pump, stderr_pump].into_iter().flatten() {
            if let Err(e) = pump.await {
                tracing::warn!("Output pump task failed: {}", e);
            }
        }

        Ok(status)
    }

    #[cfg(unix)]
    async fn ensure_executable(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        tokio::fs::set_permissions(&self.executable, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| {
                Error::measurement(format!(
                    "cannot mark {} executable: {}",
                    self.executable.display(),
                    e
                ))
            })
    }

    #[cfg(not(unix))]
    async fn ensure_executable(&self) -> Result<()> {
        Ok(())
    }
}

async fn pump_lines<R>(reader: R, sink: LogSink)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LinesStream::new(BufReader::new(reader).lines());
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => sink.raw_line(line),
            Err(e) => {
                tracing::debug!("Stopped reading tool output: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measure() -> MeasureConfig {
        MeasureConfig {
            test_count: 0,
            max_result: 5,
            min_speed: 2.0,
            max_delay: 300,
            min_delay: 20,
            ..Default::default()
        }
    }

    fn plan(measure: &MeasureConfig, domains: usize) -> MeasurementPlan {
        MeasurementPlan::build(
            measure,
            domains,
            Path::new("/data/result.csv"),
            Path::new("/data/ip.txt"),
        )
    }

    #[test]
    fn test_fixed_arguments() {
        let plan = plan(&measure(), 1);
        assert_eq!(
            plan.args,
            vec![
                "-o", "/data/result.csv", "-dn", "5", "-sl", "2.00", "-tl", "300", "-tll",
                "20", "-tp", "443", "-f", "/data/ip.txt",
            ]
        );
        assert_eq!(plan.result_count, 5);
        assert!(plan.escalated);
    }

    #[test]
    fn test_count_escalates_to_domain_count() {
        let plan = plan(&measure(), 8);
        assert_eq!(plan.result_count, 8);
        assert_eq!(plan.test_count, 8);
        assert!(plan.escalated);
    }

    #[test]
    fn test_single_domain_does_not_escalate_past_cap() {
        let mut config = measure();
        config.max_result = 0;
        let plan = plan(&config, 1);
        assert_eq!(plan.result_count, 10);
        assert_eq!(plan.test_count, 10);
    }

    #[test]
    fn test_configured_count_above_cap_is_kept() {
        let mut config = measure();
        config.test_count = 50;
        let plan = plan(&config, 3);
        assert_eq!(plan.test_count, 50);
        assert_eq!(plan.result_count, 5);
        assert!(!plan.escalated);
    }

    #[test]
    fn test_region_filter_forces_probe_mode_once() {
        let mut config = measure();
        config.colo = "HKG,SJC".to_string();
        config.enable_httping = true;
        config.download_url = "https://speed.example.com/100mb".to_string();
        config.test_port = 8443;

        let plan = plan(&config, 1);
        let tail: Vec<&str> = plan.args[14..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "-url",
                "https://speed.example.com/100mb",
                "-cfcolo",
                "HKG,SJC",
                "-httping"
            ]
        );
        assert!(plan.command_line().contains("-tp 8443"));
    }

    #[test]
    fn test_probe_mode_without_region() {
        let mut config = measure();
        config.enable_httping = true;
        let plan = plan(&config, 1);
        assert_eq!(plan.args.last().map(String::as_str), Some("-httping"));
        assert!(!plan.args.iter().any(|a| a == "-cfcolo"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, _writer) = LogSink::open(dir.path().join("app.log")).await.unwrap();
        let invoker = Invoker::new(dir.path().join("cfst"), dir.path());

        assert!(!invoker.is_available().await);
        let err = invoker.run(&[], &sink).await.unwrap_err();
        assert!(matches!(err, Error::Measurement(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_both_outputs_and_reports_exit() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, _writer) = LogSink::open(dir.path().join("app.log")).await.unwrap();
        let script = dir.path().join("cfst");
        tokio::fs::write(
            &script,
            "#!/bin/sh\necho \"args: $*\"\necho \"to stderr\" >&2\npwd\nexit 3\n",
        )
        .await
        .unwrap();

        let invoker = Invoker::new(&script, dir.path());
        let status = invoker
            .run(&["-dn".to_string(), "4".to_string()], &sink)
            .await
            .unwrap();
        assert_eq!(status.code(), Some(3));

        let log = sink.read_from(0).await.unwrap().text;
        assert!(log.contains("args: -dn 4"));
        assert!(log.contains("to stderr"));
        let cwd = dir.path().canonicalize().unwrap();
        assert!(log.contains(cwd.to_str().unwrap()) || log.contains(dir.path().to_str().unwrap()));
    }
}
