//! FTP protocol client backed by `suppaftp`.
//!
//! The library is synchronous, so every control-channel operation runs in
//! `spawn_blocking` under the per-operation deadline. One control session is
//! cached and reconnected once when an idle timeout kills it. Range reads
//! use a dedicated data connection (REST + RETR) pumped into an async
//! channel so the cached session stays free for concurrent `list`/`stat`.

use std::io::Read;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use suppaftp::list::File as FtpListEntry;
use suppaftp::FtpStream;

use streambox_core::{Error, Result, SourceKind};

use super::{channel_reader, ByteReader, Capabilities, ProtocolClient, RemoteEntry, OP_TIMEOUT};

/// Chunk size for data-connection reads.
const READ_CHUNK: usize = 64 * 1024;

#[derive(Clone)]
struct FtpParams {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    base_path: Option<String>,
}

impl FtpParams {
    fn full_path(&self, path: &str) -> String {
        match self.base_path.as_deref() {
            Some(base) if !base.is_empty() => {
                format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
            }
            _ => format!("/{}", path.trim_start_matches('/')),
        }
    }
}

fn dial(params: &FtpParams) -> Result<FtpStream> {
    let mut stream = FtpStream::connect((params.host.as_str(), params.port))
        .map_err(|e| Error::upstream(&params.host, format!("connect failed: {e}")))?;

    let user = params.username.as_deref().unwrap_or("anonymous");
    let pass = params.password.as_deref().unwrap_or("anonymous");
    stream
        .login(user, pass)
        .map_err(|e| Error::upstream(&params.host, format!("authentication failed: {e}")))?;

    stream
        .transfer_type(suppaftp::types::FileType::Binary)
        .map_err(|e| Error::upstream(&params.host, format!("TYPE I failed: {e}")))?;

    Ok(stream)
}

pub struct FtpClient {
    params: FtpParams,
    session: Arc<Mutex<Option<FtpStream>>>,
}

impl FtpClient {
    pub fn new(
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        base_path: Option<String>,
    ) -> Self {
        Self {
            params: FtpParams {
                host,
                port,
                username,
                password,
                base_path,
            },
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Run an operation against the cached control session, dialing lazily
    /// and reconnecting once if the session has gone stale.
    async fn with_session<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&mut FtpStream) -> std::result::Result<T, suppaftp::FtpError> + Send + 'static,
    {
        let session = self.session.clone();
        let params = self.params.clone();

        let task = tokio::task::spawn_blocking(move || -> Result<T> {
            let mut guard = session.lock().expect("ftp session lock poisoned");

            if guard.is_none() {
                *guard = Some(dial(&params)?);
            }

            match op(guard.as_mut().expect("session just dialed")) {
                Ok(v) => Ok(v),
                Err(first) => {
                    // Idle-timeout or dropped connection: redial and retry once.
                    tracing::debug!(host = %params.host, "FTP session stale ({first}); reconnecting");
                    *guard = None;
                    *guard = Some(dial(&params)?);
                    op(guard.as_mut().expect("session just redialed"))
                        .map_err(|e| Error::upstream(&params.host, e.to_string()))
                }
            }
        });

        match tokio::time::timeout(OP_TIMEOUT, task).await {
            Ok(joined) => {
                joined.map_err(|e| Error::Internal(format!("ftp task panicked: {e}")))?
            }
            Err(_) => Err(Error::Transient(format!(
                "FTP operation timed out after {OP_TIMEOUT:?}"
            ))),
        }
    }
}

#[async_trait]
impl ProtocolClient for FtpClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Ftp
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            browse: true,
            read: true,
            discover: false,
        }
    }

    async fn connect(&self) -> Result<()> {
        self.with_session(|_| Ok(())).await
    }

    async fn disconnect(&self) {
        let session = self.session.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Some(mut stream) = session.lock().expect("ftp session lock poisoned").take() {
                let _ = stream.quit();
            }
        })
        .await;
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let full = self.params.full_path(path);
        let rel_prefix = path.trim_matches('/').to_string();

        let lines = self
            .with_session(move |stream| stream.list(Some(full.as_str())))
            .await?;

        let mut entries = Vec::new();
        for line in lines {
            let Ok(parsed) = FtpListEntry::try_from(line.as_str()) else {
                tracing::debug!(line, "Skipping unparseable FTP list line");
                continue;
            };
            let name = parsed.name().to_string();
            if name == "." || name == ".." {
                continue;
            }
            let rel = if rel_prefix.is_empty() {
                name.clone()
            } else {
                format!("{rel_prefix}/{name}")
            };
            entries.push(RemoteEntry {
                name,
                path: rel,
                is_dir: parsed.is_directory(),
                size: (!parsed.is_directory()).then(|| parsed.size() as u64),
                mtime: Some(DateTime::<Utc>::from(parsed.modified()).to_rfc3339()),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<RemoteEntry> {
        let full = self.params.full_path(path);
        let rel = path.trim_matches('/').to_string();
        let name = rel.rsplit('/').next().unwrap_or(&rel).to_string();

        // SIZE answers for files only; directories fall back to LIST.
        let size_result = {
            let full = full.clone();
            self.with_session(move |stream| stream.size(&full)).await
        };

        match size_result {
            Ok(size) => Ok(RemoteEntry {
                name,
                path: rel,
                is_dir: false,
                size: Some(size as u64),
                mtime: None,
            }),
            Err(_) => {
                let listable = self
                    .with_session(move |stream| stream.list(Some(full.as_str())))
                    .await;
                match listable {
                    Ok(_) => Ok(RemoteEntry {
                        name,
                        path: rel,
                        is_dir: true,
                        size: None,
                        mtime: None,
                    }),
                    Err(_) => Err(Error::not_found("file", path)),
                }
            }
        }
    }

    async fn open_range(&self, path: &str, start: u64, end: Option<u64>) -> Result<ByteReader> {
        let params = self.params.clone();
        let full = params.full_path(path);
        let (tx, rx) = tokio::sync::mpsc::channel::<std::io::Result<Bytes>>(8);

        tokio::task::spawn_blocking(move || {
            let mut stream = match dial(&params) {
                Ok(s) => s,
                Err(e) => {
                    let _ = tx.blocking_send(Err(std::io::Error::other(e.to_string())));
                    return;
                }
            };

            if start > 0 {
                if let Err(e) = stream.resume_transfer(start as usize) {
                    let _ = tx.blocking_send(Err(std::io::Error::other(format!(
                        "REST {start} failed: {e}"
                    ))));
                    return;
                }
            }

            let mut data = match stream.retr_as_stream(&full) {
                Ok(d) => d,
                Err(e) => {
                    let _ = tx.blocking_send(Err(std::io::Error::other(format!(
                        "RETR failed: {e}"
                    ))));
                    return;
                }
            };

            let mut remaining = end.map(|e| e.saturating_sub(start) + 1);
            let mut buf = [0u8; READ_CHUNK];
            loop {
                let want = match remaining {
                    Some(0) => break,
                    Some(r) => (r.min(READ_CHUNK as u64)) as usize,
                    None => READ_CHUNK,
                };
                match data.read(&mut buf[..want]) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                            break; // reader dropped; stop pumping
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

            // Aborted transfers make these fail; that is fine.
            let _ = stream.finalize_retr_stream(data);
            let _ = stream.quit();
        });

        Ok(channel_reader(rx))
    }

    async fn test_connection(&self) -> (bool, String) {
        let params = self.params.clone();
        let task = tokio::task::spawn_blocking(move || match dial(&params) {
            Ok(mut stream) => {
                let _ = stream.quit();
                (true, format!("connected to {}:{}", params.host, params.port))
            }
            Err(e) => (false, e.to_string()),
        });

        match tokio::time::timeout(OP_TIMEOUT, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => (false, format!("test task panicked: {e}")),
            Err(_) => (false, "connection test timed out".into()),
        }
    }
}
