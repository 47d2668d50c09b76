//! The discovery engine (C3, spec §4.3): drives the mDNS codec across
//! IPv4 and/or IPv6 multicast sockets and aggregates responses into device
//! records.
//!
//! The source's process-wide test flag and canned-response pointers
//! (design note §9-3) are replaced here by an injected `DatagramSource`
//! trait. `TestCtl`'s observable behavior (spec §4.3, §8) is preserved by
//! an `AtomicBool` that `discover` consults to pick a `CannedDatagramSource`
//! instead of opening real sockets — the flag is still process-wide (spec
//! §6's `TestCtl(mode)` has no connection/discovery handle to scope it to),
//! but every socket/codec call underneath goes through the trait rather
//! than reading globals directly.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use byteorder::BigEndian;
use byteorder::ByteOrder;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use super::codec;
use super::device::{Device, DEFAULT_MODEL};
use crate::config::{Config, DEFAULT_PORT};
use crate::error::Error;

pub const INET4: u8 = 0b01;
pub const INET6: u8 = 0b10;

const MDNS_PORT: u16 = 5353;
const MULTICAST_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
const MULTICAST_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

static TEST_MODE: AtomicBool = AtomicBool::new(false);

/// `TestCtl(mode)` (spec §6): `0` disables canned responses, any other
/// value enables them.
pub fn set_test_mode(mode: i32) {
    TEST_MODE.store(mode != 0, Ordering::SeqCst);
}

pub fn test_mode_active() -> bool {
    TEST_MODE.load(Ordering::SeqCst)
}

/// Abstracts "receive one datagram, or give up after `budget`" so the
/// engine can be driven by a real multicast socket or by canned test data
/// without the rest of the discovery logic caring which.
pub trait DatagramSource {
    fn recv(&mut self, budget: Duration) -> io::Result<Option<(Vec<u8>, SocketAddr)>>;
}

struct SocketSource {
    socket: UdpSocket,
}

impl DatagramSource for SocketSource {
    fn recv(&mut self, budget: Duration) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
        // The spec models this as a non-blocking socket plus an explicit
        // wait-for-readable primitive; a blocking socket with its read
        // timeout set to the remaining budget observes the same contract
        // (return by the deadline, no spurious wakeups) without requiring
        // a poll/select dependency nothing else in this workspace uses.
        self.socket.set_read_timeout(Some(budget))?;
        let mut buf = vec![0u8; codec::MAX_DATAGRAM_LEN];
        match self.socket.recv_from(&mut buf) {
            Ok((n, addr)) => {
                buf.truncate(n);
                Ok(Some((buf, addr)))
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Delivers exactly the two canned datagrams of spec §8 scenarios 1 and 2,
/// one per address family, then reports exhaustion.
pub struct CannedDatagramSource {
    datagram: Option<(Vec<u8>, SocketAddr)>,
}

impl CannedDatagramSource {
    pub fn v4() -> Self {
        CannedDatagramSource {
            datagram: Some(canned_v4_datagram()),
        }
    }

    pub fn v6() -> Self {
        CannedDatagramSource {
            datagram: Some(canned_v6_datagram()),
        }
    }
}

impl DatagramSource for CannedDatagramSource {
    fn recv(&mut self, _budget: Duration) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
        Ok(self.datagram.take())
    }
}

/// Drive discovery across the address families selected in `ip_mode`
/// (`INET4`/`INET6`, bitwise-ORed). `wait_ms == 0` uses `config`'s
/// configured discovery timeout.
pub fn discover(ip_mode: u8, wait_ms: u64, config: &Config) -> Vec<Device> {
    let wait = if wait_ms == 0 {
        Duration::from_millis(config.discovery_timeout_ms)
    } else {
        Duration::from_millis(wait_ms)
    };

    let mut devices = Vec::new();
    if ip_mode & INET4 != 0 {
        devices.extend(discover_v4(wait));
    }
    if ip_mode & INET6 != 0 {
        devices.extend(discover_v6(wait));
    }
    devices
}

fn discover_v4(wait: Duration) -> Vec<Device> {
    if test_mode_active() {
        return run(&mut CannedDatagramSource::v4(), wait);
    }
    let socket = match open_v4_socket() {
        Ok(socket) => socket,
        Err(e) => {
            warn!("discovery: skipping IPv4, failed to open multicast socket: {}", e);
            return Vec::new();
        }
    };
    let query = codec::encode_query();
    if let Err(e) = socket.send_to(&query, SocketAddr::new(IpAddr::V4(MULTICAST_V4), MDNS_PORT)) {
        warn!("discovery: skipping IPv4, failed to send PTR query: {}", e);
        return Vec::new();
    }
    run(&mut SocketSource { socket }, wait)
}

fn discover_v6(wait: Duration) -> Vec<Device> {
    if test_mode_active() {
        return run(&mut CannedDatagramSource::v6(), wait);
    }
    let socket = match open_v6_socket() {
        Ok(socket) => socket,
        Err(e) => {
            warn!("discovery: skipping IPv6, failed to open multicast socket: {}", e);
            return Vec::new();
        }
    };
    let query = codec::encode_query();
    if let Err(e) = socket.send_to(&query, SocketAddr::new(IpAddr::V6(MULTICAST_V6), MDNS_PORT)) {
        warn!("discovery: skipping IPv6, failed to send PTR query: {}", e);
        return Vec::new();
    }
    run(&mut SocketSource { socket }, wait)
}

fn run(source: &mut dyn DatagramSource, wait: Duration) -> Vec<Device> {
    let deadline = Instant::now() + wait;
    let mut devices = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match source.recv(remaining) {
            Ok(None) => break,
            Ok(Some((datagram, addr))) => match codec::decode_response(&datagram) {
                Ok(response) => devices.push(to_device(response, addr)),
                Err(e) => warn!("discovery: discarding malformed response: {}", e),
            },
            Err(e) => {
                warn!("discovery: recv error: {}", e);
                break;
            }
        }
    }
    devices
}

fn to_device(response: codec::Response, source: SocketAddr) -> Device {
    let fallback_name = response
        .ptr_name
        .split('.')
        .next()
        .unwrap_or_default()
        .to_owned();
    Device {
        id: response.id.unwrap_or_default(),
        name: response.friendly_name.unwrap_or(fallback_name),
        model: response.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
        ip_addr: source.ip().to_string(),
        port: response.port.unwrap_or(DEFAULT_PORT),
    }
}

fn open_v4_socket() -> Result<UdpSocket, Error> {
    let socket = Socket::new(Domain::ipv4(), Type::dgram(), Some(Protocol::udp()))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(false)?;
    socket.set_multicast_ttl_v4(1)?;
    socket.set_multicast_loop_v4(true)?;
    socket.join_multicast_v4(&MULTICAST_V4, &Ipv4Addr::UNSPECIFIED)?;
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), MDNS_PORT);
    socket.bind(&SockAddr::from(bind_addr))?;
    Ok(socket.into_udp_socket())
}

fn open_v6_socket() -> Result<UdpSocket, Error> {
    let socket = Socket::new(Domain::ipv6(), Type::dgram(), Some(Protocol::udp()))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(false)?;
    socket.set_multicast_loop_v6(true)?;
    socket.set_multicast_hops_v6(1)?;
    socket.join_multicast_v6(&MULTICAST_V6, 0)?;
    let bind_addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), MDNS_PORT);
    socket.bind(&SockAddr::from(bind_addr))?;
    Ok(socket.into_udp_socket())
}

fn push_name(buf: &mut Vec<u8>, labels: &[&str]) {
    for label in labels {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
}

fn push_txt(buf: &mut Vec<u8>, segments: &[&str]) {
    let mut txt = Vec::new();
    for segment in segments {
        txt.push(segment.len() as u8);
        txt.extend_from_slice(segment.as_bytes());
    }
    buf.extend_from_slice(&(txt.len() as u16).to_be_bytes());
    buf.extend_from_slice(&txt);
}

fn canned_answer(buf: &mut Vec<u8>, ptr_target_first_label: &str) {
    buf.extend_from_slice(&0xFEEDu16.to_be_bytes());
    buf.extend_from_slice(&0x8400u16.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes()); // QDCOUNT
    buf.extend_from_slice(&1u16.to_be_bytes()); // ANCOUNT
    buf.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    buf.extend_from_slice(&2u16.to_be_bytes()); // ARCOUNT: TXT + SRV

    push_name(buf, &["_googlecast", "_tcp", "local"]);
    buf.extend_from_slice(&12u16.to_be_bytes()); // TYPE_PTR
    buf.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
    buf.extend_from_slice(&120u32.to_be_bytes()); // TTL
    let rdlength_pos = buf.len();
    buf.extend_from_slice(&0u16.to_be_bytes());
    let name_start = buf.len();
    push_name(buf, &[ptr_target_first_label, "_googlecast", "_tcp", "local"]);
    let rdlength = (buf.len() - name_start) as u16;
    BigEndian::write_u16(&mut buf[rdlength_pos..rdlength_pos + 2], rdlength);
}

fn canned_v4_datagram() -> (Vec<u8>, SocketAddr) {
    let mut msg = Vec::new();
    canned_answer(&mut msg, "Den TV");

    // TXT
    push_name(&mut msg, &["_googlecast", "_tcp", "local"]);
    msg.extend_from_slice(&16u16.to_be_bytes()); // TYPE_TXT
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&120u32.to_be_bytes());
    push_txt(
        &mut msg,
        &[
            "id=63970hbc22h26b6b2a0492825db8d2f4",
            "fn=Den TV",
            "md=Chromecast",
        ],
    );

    // SRV
    push_name(&mut msg, &["_googlecast", "_tcp", "local"]);
    msg.extend_from_slice(&33u16.to_be_bytes()); // TYPE_SRV
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&120u32.to_be_bytes());
    msg.extend_from_slice(&6u16.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&8009u16.to_be_bytes());

    let source = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 11, 12, 13)), MDNS_PORT);
    (msg, source)
}

fn canned_v6_datagram() -> (Vec<u8>, SocketAddr) {
    let mut msg = Vec::new();
    canned_answer(&mut msg, "TST Chrome Panel");

    push_name(&mut msg, &["_googlecast", "_tcp", "local"]);
    msg.extend_from_slice(&16u16.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&120u32.to_be_bytes());
    push_txt(
        &mut msg,
        &[
            "id=6b0h3b26023d232e072a2be28a24b7b7",
            "fn=TST Chrome Panel",
            "md=Chromecast Ultra",
        ],
    );

    push_name(&mut msg, &["_googlecast", "_tcp", "local"]);
    msg.extend_from_slice(&33u16.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&120u32.to_be_bytes());
    msg.extend_from_slice(&6u16.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&8009u16.to_be_bytes());

    let source: Ipv6Addr = "2016:cd8:4567:2cd0::12".parse().expect("valid literal");
    let source = SocketAddr::new(IpAddr::V6(source), MDNS_PORT);
    (msg, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_mode_zero_does_no_discovery() {
        let config = Config::default();
        assert!(discover(0, 10, &config).is_empty());
    }

    // These drive `run` directly over a `CannedDatagramSource` rather than
    // going through `discover`/`set_test_mode`: the process-wide
    // `TEST_MODE` flag is shared, unsynchronized, global mutable state, so
    // flipping it from multiple tests running in parallel (the `cargo
    // test` default) would flake. `run` is the entire piece of logic the
    // flag would have selected between real and canned sockets for, so
    // testing it directly exercises the same code with no shared state.

    #[test]
    fn canned_v4_scenario_matches_spec_8_1() {
        let devices = run(&mut CannedDatagramSource::v4(), Duration::from_millis(10));
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.id, "63970hbc22h26b6b2a0492825db8d2f4");
        assert_eq!(device.name, "Den TV");
        assert_eq!(device.model, "Chromecast");
        assert_eq!(device.ip_addr, "10.11.12.13");
        assert_eq!(device.port, 8009);
    }

    #[test]
    fn canned_v6_scenario_matches_spec_8_2() {
        let devices = run(&mut CannedDatagramSource::v6(), Duration::from_millis(10));
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.id, "6b0h3b26023d232e072a2be28a24b7b7");
        assert_eq!(device.name, "TST Chrome Panel");
        assert_eq!(device.model, "Chromecast Ultra");
        assert_eq!(device.ip_addr, "2016:cd8:4567:2cd0::12");
        assert_eq!(device.port, 8009);
    }

    #[test]
    fn canned_mode_returns_both_families_when_both_requested() {
        let mut devices = run(&mut CannedDatagramSource::v4(), Duration::from_millis(10));
        devices.extend(run(&mut CannedDatagramSource::v6(), Duration::from_millis(10)));
        assert_eq!(devices.len(), 2);
    }

    /// `set_test_mode`/`test_mode_active` back `TestCtl`'s process-wide
    /// contract (spec §6); this only checks the flag's own get/set
    /// behavior, not `discover`'s routing, so it doesn't race with the
    /// tests above.
    #[test]
    fn test_mode_flag_round_trips() {
        let before = test_mode_active();
        set_test_mode(1);
        assert!(test_mode_active());
        set_test_mode(0);
        assert!(!test_mode_active());
        set_test_mode(before as i32);
    }
}
