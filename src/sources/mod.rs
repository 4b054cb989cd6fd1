//! Protocol clients: a uniform `list/stat/open_range` surface over
//! heterogeneous filesystems (local disk, FTP, SMB) plus UPnP discovery.
//!
//! Clients are cached per source in a [`ClientPool`]; a source update or
//! delete evicts and disconnects the cached entry. Discovery-only variants
//! advertise unsupported operations through [`Capabilities`] and fail loudly
//! when asked to read.

pub mod ftp;
pub mod local;
pub mod secrets;
pub mod smb;
pub mod upnp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

use streambox_core::{Error, Result, SourceId, SourceKind};
use streambox_db::models::Source;

/// Default per-operation deadline for remote protocols.
pub const OP_TIMEOUT: Duration = Duration::from_secs(30);

/// A boxed async byte reader, as returned by `open_range`.
pub type ByteReader = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// One directory entry on a source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub name: String,
    /// Path within the source, usable in subsequent `list`/`stat` calls.
    pub path: String,
    pub is_dir: bool,
    pub size: Option<u64>,
    /// RFC 3339 modification time where the protocol exposes one.
    pub mtime: Option<String>,
}

/// What a client variant can actually do.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub browse: bool,
    pub read: bool,
    pub discover: bool,
}

/// The uniform protocol surface. Implementations are lazily connected on
/// first use and must keep `test_connection` free of side effects.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn capabilities(&self) -> Capabilities;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self);

    /// List one directory (non-recursive).
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Stat a single file or directory.
    async fn stat(&self, path: &str) -> Result<RemoteEntry>;

    /// Open a byte range `[start, end]` (inclusive; `None` = to EOF).
    async fn open_range(&self, path: &str, start: u64, end: Option<u64>) -> Result<ByteReader>;

    /// Open and cleanly close a connection, reporting the outcome.
    async fn test_connection(&self) -> (bool, String);
}

/// Error for operations a variant does not support (UPnP reads).
pub(crate) fn unsupported(kind: SourceKind, op: &str) -> Error {
    Error::Validation(format!("{kind} sources do not support {op}"))
}

/// Bridge a blocking reader loop into an async [`ByteReader`] via an mpsc
/// channel. Used by the FTP and SMB clients, whose underlying libraries are
/// synchronous.
pub(crate) fn channel_reader(
    rx: tokio::sync::mpsc::Receiver<std::io::Result<bytes::Bytes>>,
) -> ByteReader {
    Box::new(tokio_util::io::StreamReader::new(
        tokio_stream::wrappers::ReceiverStream::new(rx),
    ))
}

// ---------------------------------------------------------------------------
// ClientPool
// ---------------------------------------------------------------------------

/// Caches one connected client per source. Entries are created lazily and
/// shared; eviction disconnects in the background once outstanding
/// operations drop their references.
pub struct ClientPool {
    secret: String,
    clients: DashMap<SourceId, Arc<dyn ProtocolClient>>,
}

impl ClientPool {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            clients: DashMap::new(),
        }
    }

    /// Build a client for a source row, decrypting its credential.
    /// The client is not yet connected; connection happens on first use.
    pub fn build_client(&self, source: &Source) -> Result<Arc<dyn ProtocolClient>> {
        let password = source
            .credential
            .as_deref()
            .map(|blob| secrets::decrypt_credential(&self.secret, blob))
            .transpose()?;

        let client: Arc<dyn ProtocolClient> = match source.protocol {
            SourceKind::Local => Arc::new(local::LocalClient::new(
                source.base_path.clone().unwrap_or_else(|| "/".into()),
            )),
            SourceKind::Ftp => Arc::new(ftp::FtpClient::new(
                source.host.clone(),
                source.port.unwrap_or(21),
                source.username.clone(),
                password,
                source.base_path.clone(),
            )),
            SourceKind::Smb => Arc::new(smb::SmbClient::new(
                source.host.clone(),
                source.base_path.clone().unwrap_or_default(),
                source.username.clone(),
                password,
                source.domain.clone(),
            )),
            SourceKind::Upnp => Arc::new(upnp::UpnpClient::new()),
        };
        Ok(client)
    }

    /// Get the cached client for a source, building and caching on miss.
    pub fn get_or_create(&self, source: &Source) -> Result<Arc<dyn ProtocolClient>> {
        if let Some(existing) = self.clients.get(&source.id) {
            return Ok(existing.clone());
        }
        let client = self.build_client(source)?;
        self.clients.insert(source.id, client.clone());
        Ok(client)
    }

    /// Drop the cached entry for a source and disconnect it. In-progress
    /// operations finish on their own `Arc` before the connection closes.
    pub fn evict(&self, source_id: SourceId) {
        if let Some((_, client)) = self.clients.remove(&source_id) {
            tokio::spawn(async move {
                client.disconnect().await;
            });
        }
    }

    /// Number of cached clients (diagnostics).
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
