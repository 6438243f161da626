//! Run log sink
//!
//! An append-only text file that operators read to follow a run. All writers
//! (coordinator milestones, the two child-output pumps) go through one
//! unbounded channel drained by a single writer task, so lines never
//! interleave mid-line.
//!
//! Milestones are written as `[YYYY-MM-DD HH:MM:SS] message` and mirrored to
//! `tracing`. Raw measurement tool output is appended as-is.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

enum SinkCommand {
    Append(String),
    Truncate(oneshot::Sender<std::io::Result<()>>),
    Flush(oneshot::Sender<()>),
}

/// A chunk of the log read from an offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    /// Text from the requested offset to the end of the file
    pub text: String,
    /// Offset to pass on the next read
    pub next_offset: u64,
}

/// Handle to the shared log file
///
/// Cloning is cheap; all clones feed the same writer task. The writer exits
/// once every handle is dropped.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<SinkCommand>,
    path: Arc<PathBuf>,
}

impl std::fmt::Debug for SinkCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkCommand::Append(line) => f.debug_tuple("Append").field(line).finish(),
            SinkCommand::Truncate(_) => f.write_str("Truncate"),
            SinkCommand::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl LogSink {
    /// Open (or create) the log file and start its writer task
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<(Self, JoinHandle<()>)> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                Error::config(format!("Failed to open log file {}: {}", path.display(), e))
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(writer_loop(file, rx));

        Ok((
            Self {
                tx,
                path: Arc::new(path),
            },
            handle,
        ))
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an informational milestone
    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{}", message);
        self.append_stamped(message);
    }

    /// Record a degraded-but-continuing condition
    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{}", message);
        self.append_stamped(message);
    }

    /// Record a failure
    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!("{}", message);
        self.append_stamped(message);
    }

    /// Append one line of raw tool output, unprefixed
    pub fn raw_line(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        tracing::debug!(target: "speedns::tool", "{}", line);
        self.send(SinkCommand::Append(format!("{}\n", line)));
    }

    /// Wait until every line queued so far is on disk
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(SinkCommand::Flush(done_tx));
        let _ = done_rx.await;
    }

    /// Read everything after `offset`
    ///
    /// An offset past the end (the file was cleared since the caller's last
    /// read) restarts from the beginning.
    pub async fn read_from(&self, offset: u64) -> Result<LogChunk> {
        self.flush().await;

        let mut file = fs::File::open(self.path.as_ref()).await?;
        let len = file.metadata().await?.len();
        let start = if offset > len { 0 } else { offset };

        file.seek(SeekFrom::Start(start)).await?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await?;

        Ok(LogChunk {
            next_offset: start + bytes.len() as u64,
            text: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// Truncate the log and note the manual clear
    pub async fn clear(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(SinkCommand::Truncate(done_tx));
        done_rx
            .await
            .map_err(|_| Error::Other("log writer stopped".to_string()))??;

        self.info("=== Log cleared manually ===");
        Ok(())
    }

    fn append_stamped(&self, message: &str) {
        let stamp = chrono::Local::now().format(TIMESTAMP_FORMAT);
        self.send(SinkCommand::Append(format!("[{}] {}\n", stamp, message)));
    }

    fn send(&self, command: SinkCommand) {
        if self.tx.send(command).is_err() {
            tracing::warn!("Log writer stopped, dropping log line");
        }
    }
}

async fn writer_loop(mut file: fs::File, mut rx: mpsc::UnboundedReceiver<SinkCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            SinkCommand::Append(text) => {
                if let Err(e) = file.write_all(text.as_bytes()).await {
                    tracing::error!("Failed to append to log file: {}", e);
                    continue;
                }
                if let Err(e) = file.flush().await {
                    tracing::error!("Failed to flush log file: {}", e);
                }
            }
            SinkCommand::Truncate(done) => {
                // Append mode: subsequent writes land at the new end (offset 0)
                let _ = done.send(file.set_len(0).await);
            }
            SinkCommand::Flush(done) => {
                let _ = file.flush().await;
                let _ = done.send(());
            }
        }
    }
}
