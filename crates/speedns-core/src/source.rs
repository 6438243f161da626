//! Endpoint source resolution
//!
//! Picks the address list handed to the measurement tool with `-f`. The
//! uploaded `ip.txt` / `ipv6.txt` files are only ever read; the merged pool
//! is written to a separate derived file.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::{DataLayout, IpPool};
use crate::error::{Error, Result};

/// Resolve the endpoint list for `pool`
///
/// - `V4` / `V6`: the uploaded list, which must exist
/// - `Both`: both lists concatenated into the combined file, each followed
///   by a newline in case it lacks a trailing one
pub async fn resolve_endpoint_source(layout: &DataLayout, pool: IpPool) -> Result<PathBuf> {
    match pool {
        IpPool::V4 => existing(layout.ipv4_list()).await,
        IpPool::V6 => existing(layout.ipv6_list()).await,
        IpPool::Both => {
            let target = layout.combined_list();
            combine(&target, &[layout.ipv4_list(), layout.ipv6_list()]).await?;
            Ok(target)
        }
    }
}

async fn existing(path: PathBuf) -> Result<PathBuf> {
    match fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => Err(Error::endpoint_source(format!(
            "endpoint list not found: {}",
            path.display()
        ))),
    }
}

async fn combine(target: &Path, sources: &[PathBuf]) -> Result<()> {
    // Read everything before touching the target so a missing source leaves
    // no half-written combined file behind
    let mut contents = Vec::with_capacity(sources.len());
    for source in sources {
        let bytes = fs::read(source).await.map_err(|e| {
            Error::endpoint_source(format!("cannot read {}: {}", source.display(), e))
        })?;
        contents.push(bytes);
    }

    let mut out = fs::File::create(target).await.map_err(|e| {
        Error::endpoint_source(format!("cannot create {}: {}", target.display(), e))
    })?;
    for bytes in contents {
        out.write_all(&bytes).await?;
        out.write_all(b"\n").await?;
    }
    out.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_single_pools_return_uploaded_lists() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        fs::write(layout.ipv4_list(), "104.16.0.0/13\n").await.unwrap();
        fs::write(layout.ipv6_list(), "2606:4700::/32\n").await.unwrap();

        assert_eq!(
            resolve_endpoint_source(&layout, IpPool::V4).await.unwrap(),
            layout.ipv4_list()
        );
        assert_eq!(
            resolve_endpoint_source(&layout, IpPool::V6).await.unwrap(),
            layout.ipv6_list()
        );
    }

    #[tokio::test]
    async fn test_missing_single_pool_fails() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path());

        let err = resolve_endpoint_source(&layout, IpPool::V6).await.unwrap_err();
        assert!(err.to_string().contains("ipv6.txt"));
    }

    #[tokio::test]
    async fn test_both_merges_with_separator() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        // No trailing newline on the v4 list
        fs::write(layout.ipv4_list(), "104.16.0.0/13").await.unwrap();
        fs::write(layout.ipv6_list(), "2606:4700::/32\n").await.unwrap();

        let path = resolve_endpoint_source(&layout, IpPool::Both).await.unwrap();
        assert_eq!(path, layout.combined_list());

        let merged = fs::read_to_string(&path).await.unwrap();
        let entries: Vec<&str> = merged.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(entries, vec!["104.16.0.0/13", "2606:4700::/32"]);

        // Originals untouched
        assert_eq!(
            fs::read_to_string(layout.ipv4_list()).await.unwrap(),
            "104.16.0.0/13"
        );
    }

    #[tokio::test]
    async fn test_both_names_the_unreadable_source() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        fs::write(layout.ipv4_list(), "104.16.0.0/13\n").await.unwrap();

        let err = resolve_endpoint_source(&layout, IpPool::Both).await.unwrap_err();
        assert!(err.to_string().contains("ipv6.txt"));
        assert!(!layout.combined_list().exists());
    }
}
