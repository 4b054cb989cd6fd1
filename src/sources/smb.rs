//! SMB protocol client backed by `pavao` (libsmbclient).
//!
//! libsmbclient contexts are not thread-safe, so a fresh `SmbClient` is
//! created inside each `spawn_blocking` operation from the stored
//! parameters; the pool-level caching keeps this object (and its decrypted
//! credential) alive between calls. Range reads are pumped through an async
//! channel like the FTP client.

use std::io::{Read, Seek, SeekFrom};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use pavao::{SmbClient as PavaoClient, SmbCredentials, SmbDirentType, SmbOpenOptions, SmbOptions};

use streambox_core::{Error, Result, SourceKind};

use super::{channel_reader, ByteReader, Capabilities, ProtocolClient, RemoteEntry, OP_TIMEOUT};

/// Chunk size for data reads.
const READ_CHUNK: usize = 64 * 1024;

#[derive(Clone)]
struct SmbParams {
    host: String,
    share: String,
    username: Option<String>,
    password: Option<String>,
    domain: Option<String>,
}

impl SmbParams {
    fn open(&self) -> Result<PavaoClient> {
        let mut creds = SmbCredentials::default()
            .server(format!("smb://{}", self.host))
            .share(format!("/{}", self.share.trim_matches('/')));
        if let Some(ref user) = self.username {
            creds = creds.username(user);
        }
        if let Some(ref pass) = self.password {
            creds = creds.password(pass);
        }
        if let Some(ref domain) = self.domain {
            creds = creds.workgroup(domain);
        }

        PavaoClient::new(creds, SmbOptions::default().one_share_per_server(true))
            .map_err(|e| Error::upstream(&self.host, format!("SMB connect failed: {e}")))
    }

    fn abs(path: &str) -> String {
        format!("/{}", path.trim_start_matches('/'))
    }
}

pub struct SmbClient {
    params: SmbParams,
}

impl SmbClient {
    pub fn new(
        host: String,
        share: String,
        username: Option<String>,
        password: Option<String>,
        domain: Option<String>,
    ) -> Self {
        Self {
            params: SmbParams {
                host,
                share,
                username,
                password,
                domain,
            },
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&PavaoClient) -> Result<T> + Send + 'static,
    {
        let params = self.params.clone();
        let task = tokio::task::spawn_blocking(move || {
            let client = params.open()?;
            op(&client)
        });

        match tokio::time::timeout(OP_TIMEOUT, task).await {
            Ok(joined) => {
                joined.map_err(|e| Error::Internal(format!("smb task panicked: {e}")))?
            }
            Err(_) => Err(Error::Transient(format!(
                "SMB operation timed out after {OP_TIMEOUT:?}"
            ))),
        }
    }
}

#[async_trait]
impl ProtocolClient for SmbClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Smb
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            browse: true,
            read: true,
            discover: false,
        }
    }

    async fn connect(&self) -> Result<()> {
        self.blocking(|_| Ok(())).await
    }

    async fn disconnect(&self) {
        // Contexts are per-operation; nothing persistent to tear down.
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let host = self.params.host.clone();
        let abs = SmbParams::abs(path);
        let rel_prefix = path.trim_matches('/').to_string();

        self.blocking(move |client| {
            let dirents = client
                .list_dir(&abs)
                .map_err(|e| Error::upstream(&host, format!("list {abs} failed: {e}")))?;

            let mut entries = Vec::new();
            for dirent in dirents {
                let name = dirent.name().to_string();
                if name == "." || name == ".." {
                    continue;
                }
                let is_dir = matches!(dirent.get_type(), SmbDirentType::Dir);
                if !is_dir && !matches!(dirent.get_type(), SmbDirentType::File) {
                    continue; // printers, shares, comms
                }
                let rel = if rel_prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{rel_prefix}/{name}")
                };

                // Sizes need a stat; keep listing cheap and let the indexer
                // stat the files it actually wants.
                entries.push(RemoteEntry {
                    name,
                    path: rel,
                    is_dir,
                    size: None,
                    mtime: None,
                });
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        })
        .await
    }

    async fn stat(&self, path: &str) -> Result<RemoteEntry> {
        let abs = SmbParams::abs(path);
        let rel = path.trim_matches('/').to_string();
        let name = rel.rsplit('/').next().unwrap_or(&rel).to_string();

        self.blocking(move |client| {
            let st = client
                .stat(&abs)
                .map_err(|_| Error::not_found("file", &abs))?;
            Ok(RemoteEntry {
                name,
                path: rel,
                is_dir: false,
                size: Some(st.size),
                mtime: Some(DateTime::<Utc>::from(st.modified).to_rfc3339()),
            })
        })
        .await
    }

    async fn open_range(&self, path: &str, start: u64, end: Option<u64>) -> Result<ByteReader> {
        let params = self.params.clone();
        let abs = SmbParams::abs(path);
        let (tx, rx) = tokio::sync::mpsc::channel::<std::io::Result<Bytes>>(8);

        tokio::task::spawn_blocking(move || {
            let client = match params.open() {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.blocking_send(Err(std::io::Error::other(e.to_string())));
                    return;
                }
            };

            let mut file = match client.open_with(&abs, SmbOpenOptions::default().read(true)) {
                Ok(f) => f,
                Err(e) => {
                    let _ = tx.blocking_send(Err(std::io::Error::other(format!(
                        "open {abs} failed: {e}"
                    ))));
                    return;
                }
            };

            if start > 0 {
                if let Err(e) = file.seek(SeekFrom::Start(start)) {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            }

            let mut remaining = end.map(|e| e.saturating_sub(start) + 1);
            let mut buf = [0u8; READ_CHUNK];
            loop {
                let want = match remaining {
                    Some(0) => break,
                    Some(r) => (r.min(READ_CHUNK as u64)) as usize,
                    None => READ_CHUNK,
                };
                match file.read(&mut buf[..want]) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                            break;
                        }
                        if let Some(r) = remaining.as_mut() {
                            *r -= n as u64;
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
        });

        Ok(channel_reader(rx))
    }

    async fn test_connection(&self) -> (bool, String) {
        let host = self.params.host.clone();
        let share = self.params.share.clone();
        match self
            .blocking(move |client| {
                client
                    .list_dir("/")
                    .map_err(|e| Error::upstream(&host, format!("share listing failed: {e}")))?;
                Ok(())
            })
            .await
        {
            Ok(()) => (
                true,
                format!("connected to //{}/{}", self.params.host, self.params.share),
            ),
            Err(e) => (false, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs_path_normalization() {
        assert_eq!(SmbParams::abs("movies/a.mkv"), "/movies/a.mkv");
        assert_eq!(SmbParams::abs("/movies"), "/movies");
        assert_eq!(SmbParams::abs(""), "/");
    }

    #[test]
    fn capabilities_allow_reads() {
        let client = SmbClient::new("h".into(), "media".into(), None, None, None);
        assert!(client.capabilities().read);
        assert!(!client.capabilities().discover);
    }
}
