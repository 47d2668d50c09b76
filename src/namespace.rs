//! The four canonical Cast namespaces (spec §3), plus the `Any`/`Unknown`
//! sentinels used by filters and by frame decoding respectively.

use std::fmt;

use crate::error::Error;

pub const CONNECTION: &str = "urn:x-cast:com.google.cast.tp.connection";
pub const DEVICEAUTH: &str = "urn:x-cast:com.google.cast.tp.deviceauth";
pub const HEARTBEAT: &str = "urn:x-cast:com.google.cast.tp.heartbeat";
pub const RECEIVER: &str = "urn:x-cast:com.google.cast.receiver";

/// A Cast message namespace. `Unknown` is a parse-result sentinel (spec
/// §3); it is never produced by the builders in `message`, only by
/// `frame::decode` on a wire namespace outside the closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Connection,
    DeviceAuth,
    Heartbeat,
    Receiver,
    Unknown,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Connection => CONNECTION,
            Namespace::DeviceAuth => DEVICEAUTH,
            Namespace::Heartbeat => HEARTBEAT,
            Namespace::Receiver => RECEIVER,
            Namespace::Unknown => "",
        }
    }

    pub fn parse(s: &str) -> Namespace {
        match s {
            CONNECTION => Namespace::Connection,
            DEVICEAUTH => Namespace::DeviceAuth,
            HEARTBEAT => Namespace::Heartbeat,
            RECEIVER => Namespace::Receiver,
            _ => Namespace::Unknown,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tri-valued filter value: require true, require false, or accept any
/// (spec §4.6 "each filter is tri-valued: `true`, `false`, `any`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tri {
    True,
    False,
    Any,
}

impl Tri {
    pub fn matches(self, actual: bool) -> bool {
        match self {
            Tri::True => actual,
            Tri::False => !actual,
            Tri::Any => true,
        }
    }
}

/// Filter value for `namespace`: exact match or `any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceFilter {
    Exact(Namespace),
    Any,
}

impl NamespaceFilter {
    pub fn matches(self, actual: Namespace) -> bool {
        match self {
            NamespaceFilter::Exact(ns) => ns == actual,
            NamespaceFilter::Any => true,
        }
    }
}

/// Parse a namespace string for use in a filter, rejecting the `Unknown`
/// sentinel (a caller should never be filtering for "unknown").
pub fn known(s: &str) -> Result<Namespace, Error> {
    match Namespace::parse(s) {
        Namespace::Unknown => Err(Error::InvalidArgument("not a known Cast namespace")),
        ns => Ok(ns),
    }
}
