// # Configuration Store
//
// File-backed owner of the persisted `RunConfig`.
//
// ## Crash Recovery
//
// - Atomic writes: new content goes to `config.tmp`, then is renamed over `config.json`
// - Automatic backup: the previous file is copied to `config.backup` before each rename
// - Recovery: a corrupted main file falls back to the backup, then to defaults
//
// ## Concurrency
//
// Reads take a snapshot under the read lock. `update` mutates under the write
// lock and persists before releasing it, so saves are serialized and a run that
// already took its snapshot is unaffected.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::RunConfig;

/// Single owner of the persisted run configuration
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: Arc<RwLock<RunConfig>>,
}

impl ConfigStore {
    /// Open or create a configuration store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing file
    /// 3. If it is corrupted, load the backup
    /// 4. If both fail, start from defaults
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let config = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// Path of the persisted file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current configuration
    pub async fn snapshot(&self) -> RunConfig {
        self.config.read().await.clone()
    }

    /// Mutate the configuration and persist it before returning
    ///
    /// The mutation is normalized and validated; an invalid result is
    /// rejected and the stored configuration is left untouched.
    pub async fn update<F>(&self, mutate: F) -> Result<RunConfig, Error>
    where
        F: FnOnce(&mut RunConfig),
    {
        let mut guard = self.config.write().await;

        let mut next = guard.clone();
        mutate(&mut next);
        next.normalize();
        next.validate()?;

        Self::write_atomic(&self.path, &next).await?;
        *guard = next.clone();

        tracing::debug!("Configuration saved to {}", self.path.display());
        Ok(next)
    }

    /// Replace the whole configuration
    pub async fn replace(&self, config: RunConfig) -> Result<RunConfig, Error> {
        self.update(move |current| *current = config).await
    }

    async fn load_with_recovery(path: &Path) -> Result<RunConfig, Error> {
        match Self::load(path).await {
            Ok(config) => Ok(config),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Configuration file {} is corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No configuration backup found. Starting with defaults.");
                    return Ok(RunConfig::default());
                }

                match Self::load(&backup_path).await {
                    Ok(config) => {
                        tracing::info!("Recovered configuration from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore configuration from backup: {}",
                                restore_err
                            );
                        }
                        Ok(config)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Configuration backup also unusable: {}. Starting with defaults.",
                            backup_err
                        );
                        Ok(RunConfig::default())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<RunConfig, Error> {
        if !path.exists() {
            tracing::debug!("Configuration file does not exist: {}", path.display());
            return Ok(RunConfig::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!(
                "Failed to read configuration {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config: RunConfig = serde_json::from_str(&content)?;
        config.normalize();
        Ok(config)
    }

    async fn write_atomic(path: &Path, config: &RunConfig) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(config)?;

        let temp_path = Self::temp_path(path);
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        if path.exists()
            && let Err(e) = fs::copy(path, Self::backup_path(path)).await
        {
            tracing::warn!("Failed to back up configuration: {}", e);
        }

        fs::rename(&temp_path, path).await.map_err(|e| {
            Error::config(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.to_path_buf();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}
