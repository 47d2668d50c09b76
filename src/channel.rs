//! The send/receive-with-filter loop (C6, spec §4.6).
//!
//! Filter semantics follow the spec directly. The matcher's ownership
//! dance in the source (design note §9: "the matcher returns either a
//! *borrowed* view... or an *adopted* value") is a non-issue in Rust —
//! the matcher returns `Option<Result<T, Error>>` and simply owns `T`
//! outright; there is no separate release step.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::buffer::ByteBuffer;
use crate::error::Error;
use crate::frame::{self, CastMessage};
use crate::namespace::{NamespaceFilter, Tri};
use crate::transport::TlsTransport;

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK: usize = 4096;

/// The four tri-valued filters of spec §4.6, plus the JSON `requestId`
/// match.
#[derive(Debug, Clone, Copy)]
pub struct Filter {
    pub for_sender_session: Tri,
    pub from_portal_receiver: Tri,
    pub namespace: NamespaceFilter,
    pub expect_json_payload: Tri,
    pub request_id: Option<u32>,
}

impl Default for Filter {
    fn default() -> Self {
        Filter {
            for_sender_session: Tri::Any,
            from_portal_receiver: Tri::Any,
            namespace: NamespaceFilter::Any,
            expect_json_payload: Tri::Any,
            request_id: None,
        }
    }
}

impl Filter {
    fn matches(&self, message: &CastMessage) -> bool {
        self.for_sender_session.matches(message.for_sender_session())
            && self.from_portal_receiver.matches(message.from_portal_receiver())
            && self.namespace.matches(message.namespace)
            && self.expect_json_payload.matches(message.payload.as_utf8().is_some())
    }
}

/// Outcome of testing one inbound frame against the JSON `requestId`
/// filter once the tri-valued filters already matched. `Skip` mirrors
/// spec §4.6 step 3: "If a frame fails the filters, discard it silently
/// and continue."
enum Admit {
    Skip,
    Admit(Option<Value>),
}

fn admit(filter: &Filter, message: &CastMessage) -> Admit {
    if !filter.matches(message) {
        return Admit::Skip;
    }
    let json = match message.payload.as_utf8() {
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("channel: discarding frame with unparseable JSON payload: {}", e);
                return Admit::Skip;
            }
        },
        None => None,
    };
    if let Some(expected) = filter.request_id {
        if expected > 0 {
            let actual = json
                .as_ref()
                .and_then(|v| v.get("requestId"))
                .and_then(Value::as_u64);
            if actual != Some(u64::from(expected)) {
                return Admit::Skip;
            }
        }
    }
    Admit::Admit(json)
}

/// Send/receive loop over a TLS transport: frames out directly, frames in
/// through a rolling buffer, filtered and dispatched to a matcher.
pub struct MessageChannel {
    transport: TlsTransport,
    buffer: ByteBuffer,
}

impl MessageChannel {
    pub fn new(transport: TlsTransport) -> Self {
        MessageChannel {
            transport,
            buffer: ByteBuffer::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    pub fn send(&mut self, message: &CastMessage) -> Result<(), Error> {
        let wire = frame::encode(message);
        self.transport.write_all(&wire)
    }

    /// Read and filter frames until `matcher` returns `Some(_)` or
    /// `timeout` expires. `matcher` returning `None` means "not this
    /// frame, keep reading"; `Some(Ok(value))`/`Some(Err(err))` stop the
    /// loop with that result. Expiry without a match is `Ok(None)`, not
    /// an error (spec §4.6, §7 item 3).
    pub fn receive_filtered<T>(
        &mut self,
        filter: &Filter,
        timeout: Duration,
        mut matcher: impl FnMut(&CastMessage, Option<&Value>) -> Option<Result<T, Error>>,
    ) -> Result<Option<T>, Error> {
        let deadline = Instant::now() + timeout;
        loop {
            loop {
                match frame::try_decode(&mut self.buffer) {
                    Ok(Some(message)) => match admit(filter, &message) {
                        Admit::Skip => continue,
                        Admit::Admit(json) => {
                            if let Some(result) = matcher(&message, json.as_ref()) {
                                return result.map(Some);
                            }
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("channel: discarding malformed frame: {}", e);
                        continue;
                    }
                }
            }
            self.buffer.compact();

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.transport.read_some(&mut chunk, remaining)?;
            if n == 0 {
                continue;
            }
            self.buffer.append(&chunk[..n]);
        }
    }
}
