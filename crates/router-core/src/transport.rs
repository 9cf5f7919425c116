//! One UDP socket, owned for the engine's entire lifetime.
//!
//! [`Transport`] is a thin wrapper around [`tokio::net::UdpSocket`]. `recv`
//! uses `tokio::time::timeout` around `recv_from` as the async translation
//! of the reference implementation's `sock.settimeout(1.0)` +
//! blocking-`recvfrom` loop — there is no async equivalent of a
//! thread-blocking `recvfrom` with a timeout, so a bounded `timeout` future
//! is the idiomatic stand-in. `send_to` never propagates an error to its
//! caller: per spec.md's transport error taxonomy, a failed send is logged
//! and dropped, never retried.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::config::MAX_DATAGRAM;
use crate::error::EngineError;

/// How long `recv` waits for a datagram before returning `Ok(None)` so the
/// listener can re-check its stop signal.
const RECV_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Backoff before attempting to rebind after a receive error that
/// indicates the socket itself is unusable.
const REBIND_BACKOFF: Duration = Duration::from_millis(500);

pub struct Transport {
    self_addr: IpAddr,
    port: u16,
    socket: UdpSocket,
}

impl Transport {
    /// Bind the socket at `(self_addr, port)`. The only fatal error path in
    /// the whole engine.
    pub async fn bind(self_addr: IpAddr, port: u16) -> Result<Self, EngineError> {
        let socket = UdpSocket::bind(SocketAddr::new(self_addr, port))
            .await
            .map_err(|source| EngineError::BindFailed {
                addr: self_addr,
                port,
                source,
            })?;
        Ok(Self {
            self_addr,
            port,
            socket,
        })
    }

    /// Best-effort send. Failures are logged and swallowed, never
    /// propagated or retried.
    pub async fn send_to(&self, peer: IpAddr, payload: &str) {
        let dest = SocketAddr::new(peer, self.port);
        if let Err(err) = self.socket.send_to(payload.as_bytes(), dest).await {
            tracing::warn!(%peer, %err, "failed to send datagram");
        }
    }

    /// Wait up to [`RECV_POLL_INTERVAL`] for one datagram.
    ///
    /// Returns `Ok(None)` on a plain timeout (the normal "nothing arrived,
    /// go check the stop signal" case), `Ok(Some((source, payload)))` on a
    /// decoded UTF-8 payload, and `Err` only when the socket itself needs
    /// rebinding.
    pub async fn recv(&self) -> Result<Option<(IpAddr, String)>, std::io::Error> {
        let mut buf = [0u8; MAX_DATAGRAM];
        match tokio::time::timeout(RECV_POLL_INTERVAL, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, src))) => {
                let payload = String::from_utf8_lossy(&buf[..len]).into_owned();
                Ok(Some((src.ip(), payload)))
            }
            Ok(Err(err)) => Err(err),
            Err(_timeout) => Ok(None),
        }
    }

    pub fn self_addr(&self) -> IpAddr {
        self.self_addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Rebind a transport after a receive error, waiting [`REBIND_BACKOFF`]
/// first. Matches spec.md §4.2: "transient recv errors that indicate
/// socket health loss cause the listener to attempt to rebind after a
/// short backoff."
pub async fn rebind_after_backoff(self_addr: IpAddr, port: u16) -> Result<Transport, EngineError> {
    tokio::time::sleep(REBIND_BACKOFF).await;
    Transport::bind(self_addr, port).await
}
