//! The device connection handle (spec §3 "Device connection", §6).
//!
//! Owns the TLS-backed message channel and the per-connection state spec
//! §5 lists as exclusively connection-owned: the rolling read buffer
//! (inside `MessageChannel`), a monotonically increasing `requestId`, and an
//! `isConnected` flag. `Connect` drives the TLS handshake and sends the
//! initial `CONNECT` message; `Close` sends a best-effort `CLOSE` and
//! marks the handle unusable for anything else.

use std::time::Duration;

use crate::channel::MessageChannel;
use crate::config::Config;
use crate::error::Error;
use crate::protocol;
use crate::transport::TlsTransport;

pub struct Connection {
    channel: MessageChannel,
    request_id: u32,
    connected: bool,
    config: Config,
}

impl Connection {
    /// Resolve `host:port`, complete the TLS handshake, and issue the
    /// initial `CONNECT` (spec §4.7 "Issued once during `Connect`").
    pub fn connect(host: &str, port: u16, config: Config) -> Result<Self, Error> {
        let handshake_timeout = Duration::from_millis(config.message_timeout_ms);
        let transport = TlsTransport::connect(host, port, handshake_timeout)?;
        let mut channel = MessageChannel::new(transport);
        protocol::connect(&mut channel)?;
        Ok(Connection {
            channel,
            request_id: 0,
            connected: true,
            config,
        })
    }

    /// Assigned just before send (spec §4.7); strictly increasing within
    /// the connection's lifetime (spec §8 invariants).
    fn next_request_id(&mut self) -> u32 {
        self.request_id += 1;
        self.request_id
    }

    fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.config.message_timeout_ms)
    }

    /// `Ping(conn)` (spec §6): `true` iff a `PONG` arrived within the
    /// configured message timeout. A transport error surfaces as `Err`;
    /// per spec §7 the connection is then only safe to `Close`.
    pub fn ping(&mut self) -> Result<bool, Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let timeout = self.message_timeout();
        protocol::ping(&mut self.channel, timeout)
    }

    /// `AppAvailable(conn)` (spec §6), probing the configured
    /// `applicationId` (default `"02834648"`).
    pub fn app_available(&mut self) -> Result<bool, Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let app_id = self.config.application_id.clone();
        let timeout = self.message_timeout();
        let request_id = self.next_request_id();
        protocol::app_available(&mut self.channel, request_id, &app_id, timeout)
    }

    /// `Close(conn)` (spec §6): best-effort `CLOSE`, then release. Safe to
    /// call more than once; a second call is a no-op returning `Ok(())`,
    /// matching "re-use of a closed handle is an error" for every other
    /// operation while keeping teardown itself idempotent.
    pub fn close(&mut self) -> Result<(), Error> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        if let Err(e) = protocol::close(&mut self.channel) {
            warn!("connection: best-effort CLOSE send failed: {}", e);
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
