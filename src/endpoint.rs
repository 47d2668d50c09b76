//! Sender/destination endpoint classification (spec §4.6, §9 open question 1).
//!
//! The source classifies an endpoint id with `fragLen = 999` (an assignment
//! where a comparison against the session id's length was clearly meant),
//! which makes the "session" branch unconditionally true. Per spec §9-1 we
//! resolve this as exact-string match against the two known globals, with
//! every other value classified as `Session`.

pub const DEFAULT_SENDER_ID: &str = "sender-0";
pub const DEFAULT_RECEIVER_ID: &str = "receiver-0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The device-level global sender or receiver endpoint.
    Global,
    /// A caller-assigned application session endpoint.
    Session,
}

pub fn classify(id: &str) -> Endpoint {
    if id == DEFAULT_SENDER_ID || id == DEFAULT_RECEIVER_ID {
        Endpoint::Global
    } else {
        Endpoint::Session
    }
}

pub fn is_sender_session(id: &str) -> bool {
    classify(id) == Endpoint::Session
}

pub fn is_portal_receiver(id: &str) -> bool {
    id == DEFAULT_RECEIVER_ID
}
