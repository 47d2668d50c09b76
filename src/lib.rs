//! Discover and control Google Cast devices over mDNS and the Cast v2 wire
//! protocol.
//!
//! Two jobs, kept in separate module trees: `mdns` discovers devices on
//! the local network; `connection` (backed by `transport`, `channel`,
//! `frame`, `protocol`) opens a session against one and drives `CONNECT`,
//! `PING`/`PONG`, `GET_APP_AVAILABILITY`, and `CLOSE` over it.
//!
//! Both are blocking, single-threaded-per-call APIs (spec §5): there is no
//! background executor here, and no reconnection or rediscovery loop — a
//! caller that wants either drives `discover`/`Connection::connect` again.

#[macro_use]
extern crate log;

mod buffer;
mod channel;
pub mod config;
mod connection;
mod endpoint;
mod error;
mod frame;
pub mod mdns;
mod namespace;
mod payload;
mod protocol;
mod transport;

pub use config::Config;
pub use connection::Connection;
pub use error::Error;
pub use mdns::Device;
pub use namespace::Namespace;

/// `Discover(ipMode, waitMs)` (spec §6). `ip_mode` is `mdns::INET4` and/or
/// `mdns::INET6`, bitwise-ORed; `0` returns immediately with no I/O (spec
/// §8 boundary behaviors). `wait_ms == 0` uses `config`'s discovery
/// timeout.
pub fn discover(ip_mode: u8, wait_ms: u64, config: &Config) -> Vec<Device> {
    mdns::discover(ip_mode, wait_ms, config)
}

/// `Connect(address, port)` (spec §6): resolve, complete the TLS
/// handshake, and issue the initial `CONNECT` message.
pub fn connect(address: &str, port: u16, config: Config) -> Result<Connection, Error> {
    Connection::connect(address, port, config)
}

/// `TestCtl(mode)` (spec §6): process-wide test mode. Non-zero enables
/// `discover`'s two canned responses (spec §4.3, §8).
pub fn test_ctl(mode: i32) {
    mdns::set_test_mode(mode)
}
