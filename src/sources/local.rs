//! Local filesystem client.
//!
//! Paths are resolved under a base directory; `..` components are rejected
//! so API-supplied paths cannot escape the source root.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use streambox_core::{Error, Result, SourceKind};

use super::{ByteReader, Capabilities, ProtocolClient, RemoteEntry};

pub struct LocalClient {
    base: PathBuf,
}

impl LocalClient {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Resolve a source-relative path, refusing traversal outside the base.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::Validation(format!("path '{path}' escapes the source root")));
        }
        Ok(self.base.join(rel))
    }

    fn entry_for(path: &Path, rel_path: String, meta: &std::fs::Metadata) -> RemoteEntry {
        let mtime = meta
            .modified()
            .ok()
            .map(|t: SystemTime| DateTime::<Utc>::from(t).to_rfc3339());
        RemoteEntry {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            path: rel_path,
            is_dir: meta.is_dir(),
            size: meta.is_file().then(|| meta.len()),
            mtime,
        }
    }
}

#[async_trait]
impl ProtocolClient for LocalClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            browse: true,
            read: true,
            discover: false,
        }
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let abs = self.resolve(path)?;
        let rel_prefix = path.trim_matches('/').to_string();

        let entries = tokio::task::spawn_blocking(move || -> Result<Vec<RemoteEntry>> {
            let mut out = Vec::new();
            for entry in std::fs::read_dir(&abs)? {
                let entry = entry?;
                let meta = entry.metadata()?;
                let name = entry.file_name().to_string_lossy().to_string();
                let rel = if rel_prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{rel_prefix}/{name}")
                };
                out.push(LocalClient::entry_for(&entry.path(), rel, &meta));
            }
            out.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(out)
        })
        .await
        .map_err(|e| Error::Internal(format!("list task panicked: {e}")))??;

        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<RemoteEntry> {
        let abs = self.resolve(path)?;
        let meta = tokio::fs::metadata(&abs)
            .await
            .map_err(|_| Error::not_found("file", path))?;
        Ok(Self::entry_for(&abs, path.trim_matches('/').to_string(), &meta))
    }

    async fn open_range(&self, path: &str, start: u64, end: Option<u64>) -> Result<ByteReader> {
        let abs = self.resolve(path)?;
        let mut file = tokio::fs::File::open(&abs)
            .await
            .map_err(|_| Error::not_found("file", path))?;

        let len = file.metadata().await?.len();
        if start >= len {
            return Err(Error::Validation(format!(
                "range start {start} beyond end of file ({len} bytes)"
            )));
        }

        file.seek(std::io::SeekFrom::Start(start)).await?;
        let take = end.map_or(len - start, |e| e.saturating_sub(start) + 1);
        Ok(Box::new(file.take(take)))
    }

    async fn test_connection(&self) -> (bool, String) {
        match tokio::fs::metadata(&self.base).await {
            Ok(meta) if meta.is_dir() => (true, format!("{} is readable", self.base.display())),
            Ok(_) => (false, format!("{} is not a directory", self.base.display())),
            Err(e) => (false, format!("{}: {e}", self.base.display())),
        }
    }
}
