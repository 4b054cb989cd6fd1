//! UPnP discovery client.
//!
//! Speaks SSDP directly over UDP multicast: two M-SEARCH passes (media
//! servers first, then `ssdp:all`), aggregating unique responders by USN
//! until the caller's deadline elapses. Device descriptions are fetched over
//! HTTP and parsed from their XML. This variant is discovery-only; reads are
//! advertised as unsupported and fail loudly.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use serde::Serialize;
use tokio::net::UdpSocket;

use streambox_core::{Error, Result, SourceKind};

use super::{unsupported, ByteReader, Capabilities, ProtocolClient, RemoteEntry};

/// SSDP multicast group.
const SSDP_ADDR: &str = "239.255.255.250:1900";

/// Search target for the first discovery pass.
const ST_MEDIA_SERVER: &str = "urn:schemas-upnp-org:device:MediaServer:1";

/// A device that answered an M-SEARCH.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpnpDevice {
    /// Unique service name; the dedup key.
    pub usn: String,
    /// Description document URL.
    pub location: String,
    /// Search target the device answered for.
    pub st: String,
    /// Server header, if sent.
    pub server: Option<String>,
}

/// Parsed device description document.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpnpDeviceInfo {
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub services: Vec<String>,
}

pub struct UpnpClient;

impl UpnpClient {
    pub fn new() -> Self {
        Self
    }

    /// Run SSDP discovery until `timeout` elapses.
    pub async fn discover(&self, timeout: Duration) -> Result<Vec<UpnpDevice>> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .map_err(|e| Error::upstream("ssdp", format!("bind failed: {e}")))?;

        let deadline = tokio::time::Instant::now() + timeout;
        let per_pass_mx = (timeout.as_secs() / 2).clamp(1, 5) as u32;

        // Pass 1: media servers; pass 2: everything.
        for st in [ST_MEDIA_SERVER, "ssdp:all"] {
            let msearch = format!(
                "M-SEARCH * HTTP/1.1\r\n\
                 HOST: {SSDP_ADDR}\r\n\
                 MAN: \"ssdp:discover\"\r\n\
                 MX: {per_pass_mx}\r\n\
                 ST: {st}\r\n\r\n"
            );
            let addr: SocketAddr = SSDP_ADDR.parse().expect("static multicast addr");
            if let Err(e) = socket.send_to(msearch.as_bytes(), addr).await {
                tracing::debug!("SSDP send failed: {e}");
            }
        }

        let mut devices: HashMap<String, UpnpDevice> = HashMap::new();
        let mut buf = [0u8; 2048];

        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok((n, peer))) => {
                    let response = String::from_utf8_lossy(&buf[..n]);
                    if let Some(device) = parse_ssdp_response(&response) {
                        tracing::debug!(usn = %device.usn, %peer, "SSDP responder");
                        devices.entry(device.usn.clone()).or_insert(device);
                    }
                }
                Ok(Err(e)) => {
                    tracing::debug!("SSDP recv error: {e}");
                    break;
                }
                Err(_) => break, // deadline
            }
        }

        let mut list: Vec<UpnpDevice> = devices.into_values().collect();
        list.sort_by(|a, b| a.usn.cmp(&b.usn));
        Ok(list)
    }

    /// Fetch and parse a device's description document.
    pub async fn device_info(&self, device: &UpnpDevice) -> Result<UpnpDeviceInfo> {
        let response = reqwest::Client::new()
            .get(&device.location)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| Error::upstream(&device.location, format!("description fetch: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::upstream(
                &device.location,
                format!("description fetch: HTTP {}", response.status()),
            ));
        }

        let xml = response
            .text()
            .await
            .map_err(|e| Error::upstream(&device.location, format!("description read: {e}")))?;

        Ok(parse_device_description(&xml))
    }
}

impl Default for UpnpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an SSDP HTTP-over-UDP response into a device record.
fn parse_ssdp_response(response: &str) -> Option<UpnpDevice> {
    let mut lines = response.lines();
    let status = lines.next()?;
    if !status.contains("200") {
        return None;
    }

    let mut usn = None;
    let mut location = None;
    let mut st = None;
    let mut server = None;

    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim().to_ascii_uppercase().as_str() {
            "USN" => usn = Some(value),
            "LOCATION" => location = Some(value),
            "ST" => st = Some(value),
            "SERVER" => server = Some(value),
            _ => {}
        }
    }

    Some(UpnpDevice {
        usn: usn?,
        location: location?,
        st: st.unwrap_or_default(),
        server,
    })
}

/// Pull the interesting fields out of a device description document.
fn parse_device_description(xml: &str) -> UpnpDeviceInfo {
    let mut info = UpnpDeviceInfo::default();
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = Some(String::from_utf8_lossy(e.local_name().as_ref()).to_string());
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().to_string();
                match current.as_deref() {
                    Some("friendlyName") if info.friendly_name.is_none() => {
                        info.friendly_name = Some(text)
                    }
                    Some("manufacturer") if info.manufacturer.is_none() => {
                        info.manufacturer = Some(text)
                    }
                    Some("modelName") if info.model_name.is_none() => {
                        info.model_name = Some(text)
                    }
                    Some("serviceType") => info.services.push(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    info
}

#[async_trait]
impl ProtocolClient for UpnpClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Upnp
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            browse: false,
            read: false,
            discover: true,
        }
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn list(&self, _path: &str) -> Result<Vec<RemoteEntry>> {
        Err(unsupported(SourceKind::Upnp, "directory listing"))
    }

    async fn stat(&self, _path: &str) -> Result<RemoteEntry> {
        Err(unsupported(SourceKind::Upnp, "stat"))
    }

    async fn open_range(
        &self,
        _path: &str,
        _start: u64,
        _end: Option<u64>,
    ) -> Result<ByteReader> {
        Err(unsupported(SourceKind::Upnp, "byte-range reads"))
    }

    async fn test_connection(&self) -> (bool, String) {
        match UdpSocket::bind(("0.0.0.0", 0)).await {
            Ok(_) => (true, "SSDP socket available".into()),
            Err(e) => (false, format!("SSDP socket unavailable: {e}")),
        }
    }
}
