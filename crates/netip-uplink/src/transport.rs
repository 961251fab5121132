//! Websocket dialing: endpoint resolution, override-IP connects and the
//! stream-level handshake.
//!
//! When the control plane hands out an override IP the TCP connection goes to
//! that literal address while the URL, the `Host` header and the TLS server
//! name keep the original host.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_tls_with_config};
use tracing::debug;

use crate::config::Timeouts;
use crate::error::{Result, UplinkError};
use crate::protocol::{HandshakeFrame, HandshakeTicket};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where a stream connection goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    pub url: String,
    /// Host identity presented in `Host` and SNI
    pub host: String,
    pub port: u16,
    pub override_ip: Option<IpAddr>,
}

impl DialTarget {
    /// # Errors
    ///
    /// Returns `UplinkError::Endpoint` for an unparseable URL, a scheme other
    /// than `ws`/`wss`, a missing host, or an override that is not an IP.
    pub fn resolve(endpoint_path: &str, override_ip: Option<&str>) -> Result<Self> {
        let uri: Uri = endpoint_path
            .parse()
            .map_err(|e| UplinkError::endpoint(endpoint_path, format!("{e}")))?;

        let default_port = match uri.scheme_str() {
            Some("ws") => 80,
            Some("wss") => 443,
            other => {
                return Err(UplinkError::endpoint(
                    endpoint_path,
                    format!("unsupported scheme {}", other.unwrap_or("<none>")),
                ));
            }
        };

        let Some(host) = uri.host().filter(|h| !h.is_empty()) else {
            return Err(UplinkError::endpoint(endpoint_path, "missing host"));
        };

        let override_ip = override_ip
            .map(|ip| {
                ip.parse::<IpAddr>().map_err(|_| {
                    UplinkError::endpoint(endpoint_path, format!("invalid override IP {ip}"))
                })
            })
            .transpose()?;

        Ok(Self {
            url: endpoint_path.to_string(),
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port: uri.port_u16().unwrap_or(default_port),
            override_ip,
        })
    }

    /// Address handed to the TCP connect
    #[must_use]
    pub fn connect_addr(&self) -> String {
        match self.override_ip {
            Some(ip) => SocketAddr::new(ip, self.port).to_string(),
            None if self.host.contains(':') => format!("[{}]:{}", self.host, self.port),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// Connect and upgrade deadlines for this target
    #[must_use]
    pub fn deadlines(&self, timeouts: &Timeouts) -> (Duration, Duration) {
        if self.override_ip.is_some() {
            (timeouts.override_connect, timeouts.override_handshake)
        } else {
            (timeouts.connect, timeouts.stream_handshake)
        }
    }
}

/// Counts sockets between TCP connect and the drop of both session halves
#[derive(Debug, Default)]
pub struct SessionGauge {
    open: AtomicUsize,
    peak: AtomicUsize,
}

impl SessionGauge {
    #[must_use]
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open sockets ever observed
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn acquire(self: &Arc<Self>) -> OpenGuard {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        OpenGuard(Arc::clone(self))
    }
}

#[derive(Debug)]
pub(crate) struct OpenGuard(Arc<SessionGauge>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Dial the ticket's endpoint, present the key and wait for the first frame.
///
/// Any frame acknowledges the handshake. On failure the socket is dropped
/// before returning.
pub(crate) async fn open_stream(
    ticket: HandshakeTicket,
    service: &str,
    timeouts: &Timeouts,
    gauge: &Arc<SessionGauge>,
) -> Result<(WsStream, OpenGuard)> {
    let target = DialTarget::resolve(&ticket.endpoint_path, ticket.endpoint_ip.as_deref())?;
    let (connect_timeout, upgrade_timeout) = target.deadlines(timeouts);
    let addr = target.connect_addr();

    debug!("Dialing {} via {}", target.url, addr);

    let tcp = timeout(connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| UplinkError::timeout("stream dial", connect_timeout))?
        .map_err(|source| UplinkError::Dial {
            addr: addr.clone(),
            source,
        })?;
    let guard = gauge.acquire();

    let (mut ws, _response) = timeout(
        upgrade_timeout,
        client_async_tls_with_config(target.url.as_str(), tcp, None, None),
    )
    .await
    .map_err(|_| UplinkError::timeout("stream upgrade", upgrade_timeout))??;

    let frame = serde_json::to_string(&HandshakeFrame::new(&ticket.handshake_key, service))
        .map_err(UplinkError::Identity)?;

    timeout(timeouts.write_wait, ws.send(Message::Text(frame.into())))
        .await
        .map_err(|_| UplinkError::timeout("handshake write", timeouts.write_wait))??;

    match timeout(timeouts.pong_wait, ws.next()).await {
        Ok(Some(Ok(_ack))) => Ok((ws, guard)),
        Ok(Some(Err(e))) => Err(e.into()),
        Ok(None) => Err(UplinkError::StreamClosed),
        Err(_) => Err(UplinkError::timeout("handshake ack", timeouts.pong_wait)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_dials_ip_with_scheme_port() {
        let target = DialTarget::resolve("wss://host.example/ws", Some("10.0.0.5")).unwrap();
        assert_eq!(target.host, "host.example");
        assert_eq!(target.port, 443);
        assert_eq!(target.connect_addr(), "10.0.0.5:443");
        assert_eq!(target.url, "wss://host.example/ws");
    }

    #[test]
    fn test_override_keeps_explicit_port() {
        let target = DialTarget::resolve("ws://host.example:8081/ws", Some("10.0.0.5")).unwrap();
        assert_eq!(target.connect_addr(), "10.0.0.5:8081");
    }

    #[test]
    fn test_default_ports() {
        let ws = DialTarget::resolve("ws://host.example/ws", None).unwrap();
        assert_eq!(ws.connect_addr(), "host.example:80");

        let wss = DialTarget::resolve("wss://host.example/ws", None).unwrap();
        assert_eq!(wss.connect_addr(), "host.example:443");
    }

    #[test]
    fn test_ipv6_override() {
        let target = DialTarget::resolve("wss://host.example/ws", Some("fd00::5")).unwrap();
        assert_eq!(target.connect_addr(), "[fd00::5]:443");
    }

    #[test]
    fn test_deadlines_depend_on_override() {
        let timeouts = Timeouts::default();
        let plain = DialTarget::resolve("wss://host.example/ws", None).unwrap();
        assert_eq!(
            plain.deadlines(&timeouts),
            (Duration::from_secs(6), Duration::from_secs(10))
        );

        let direct = DialTarget::resolve("wss://host.example/ws", Some("10.0.0.5")).unwrap();
        assert_eq!(
            direct.deadlines(&timeouts),
            (Duration::from_secs(12), Duration::from_secs(45))
        );
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        assert!(DialTarget::resolve("https://host.example/ws", None).is_err());
        assert!(DialTarget::resolve("not a url", None).is_err());
        assert!(DialTarget::resolve("wss://host.example/ws", Some("host.example")).is_err());
    }

    #[test]
    fn test_gauge_tracks_open_and_peak() {
        let gauge = Arc::new(SessionGauge::default());
        let first = gauge.acquire();
        assert_eq!(gauge.open(), 1);
        drop(first);
        let second = gauge.acquire();
        assert_eq!(gauge.open(), 1);
        assert_eq!(gauge.peak(), 1);
        drop(second);
        assert_eq!(gauge.open(), 0);
    }
}
