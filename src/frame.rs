//! The length-prefixed `CastMessage` envelope (C5, spec §3 / §4.5).
//!
//! Unlike the teacher, which decodes a `protobuf`-crate-generated
//! `proto::CastMessage`, this encodes/decodes the self-describing
//! tag/wire-type stream by hand over `buffer::ByteBuffer`, dispatching on
//! the seven known field indices (design note §9).

use byteorder::{BigEndian, ByteOrder};

use crate::buffer::ByteBuffer;
use crate::endpoint;
use crate::error::Error;
use crate::namespace::Namespace;

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LENGTH_DELIMITED: u32 = 2;
const WIRE_FIXED32: u32 = 5;

const FIELD_PROTOCOL_VERSION: u32 = 1;
const FIELD_SOURCE_ID: u32 = 2;
const FIELD_DESTINATION_ID: u32 = 3;
const FIELD_NAMESPACE: u32 = 4;
const FIELD_PAYLOAD_TYPE: u32 = 5;
const FIELD_PAYLOAD_UTF8: u32 = 6;
const FIELD_PAYLOAD_BINARY: u32 = 7;

const CASTV2_1_0: u32 = 0;

/// The decoded payload of a frame: exactly one of JSON text or raw bytes,
/// per spec §3 "`payload_type` and payload-tag are consistent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Utf8(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn as_utf8(&self) -> Option<&str> {
        match self {
            Payload::Utf8(s) => Some(s),
            Payload::Binary(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastMessage {
    pub source_id: String,
    pub destination_id: String,
    pub namespace: Namespace,
    pub payload: Payload,
}

impl CastMessage {
    pub fn new_json(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: Namespace,
        json: String,
    ) -> Self {
        CastMessage {
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace,
            payload: Payload::Utf8(json),
        }
    }

    pub fn for_sender_session(&self) -> bool {
        endpoint::is_sender_session(&self.destination_id)
    }

    pub fn from_portal_receiver(&self) -> bool {
        endpoint::is_portal_receiver(&self.source_id)
    }
}

fn put_tag(buf: &mut ByteBuffer, field: u32, wire_type: u32) {
    buf.put_varint((field << 3) | wire_type);
}

fn put_length_delimited(buf: &mut ByteBuffer, field: u32, bytes: &[u8]) {
    put_tag(buf, field, WIRE_LENGTH_DELIMITED);
    buf.put_varint(bytes.len() as u32);
    buf.put_bytes(bytes);
}

/// Encode the `CastMessage` body (field 1..7, no length prefix).
fn encode_body(message: &CastMessage) -> Vec<u8> {
    let mut buf = ByteBuffer::new();
    put_tag(&mut buf, FIELD_PROTOCOL_VERSION, WIRE_VARINT);
    buf.put_varint(CASTV2_1_0);
    put_length_delimited(&mut buf, FIELD_SOURCE_ID, message.source_id.as_bytes());
    put_length_delimited(
        &mut buf,
        FIELD_DESTINATION_ID,
        message.destination_id.as_bytes(),
    );
    put_length_delimited(
        &mut buf,
        FIELD_NAMESPACE,
        message.namespace.as_str().as_bytes(),
    );
    match &message.payload {
        Payload::Utf8(s) => {
            put_tag(&mut buf, FIELD_PAYLOAD_TYPE, WIRE_VARINT);
            buf.put_varint(0);
            put_length_delimited(&mut buf, FIELD_PAYLOAD_UTF8, s.as_bytes());
        }
        Payload::Binary(b) => {
            put_tag(&mut buf, FIELD_PAYLOAD_TYPE, WIRE_VARINT);
            buf.put_varint(1);
            put_length_delimited(&mut buf, FIELD_PAYLOAD_BINARY, b);
        }
    }
    buf.into_vec()
}

/// Encode a frame: 4-byte big-endian length prefix followed by the
/// tag/wire-type-encoded body.
pub fn encode(message: &CastMessage) -> Vec<u8> {
    let body = encode_body(message);
    let mut framed = Vec::with_capacity(4 + body.len());
    let mut header = [0u8; 4];
    BigEndian::write_u32(&mut header, body.len() as u32);
    framed.extend_from_slice(&header);
    framed.extend_from_slice(&body);
    framed
}

#[derive(Default)]
struct RawFields {
    protocol_version: Option<u32>,
    source_id: Option<String>,
    destination_id: Option<String>,
    namespace: Option<String>,
    payload_type: Option<u32>,
    payload_utf8: Option<String>,
    payload_binary: Option<Vec<u8>>,
}

fn decode_body(body: &[u8]) -> Result<CastMessage, Error> {
    let mut buf = ByteBuffer::from_vec(body.to_vec());
    let mut fields = RawFields::default();
    while buf.remaining() > 0 {
        let tag = buf
            .get_varint()
            .ok_or(Error::Malformed("frame: truncated field tag"))?;
        let field = tag >> 3;
        let wire_type = tag & 0x7;
        match wire_type {
            WIRE_VARINT => {
                let v = buf
                    .get_varint()
                    .ok_or(Error::Malformed("frame: truncated varint field"))?;
                match field {
                    FIELD_PROTOCOL_VERSION => fields.protocol_version = Some(v),
                    FIELD_PAYLOAD_TYPE => fields.payload_type = Some(v),
                    _ => return Err(Error::Malformed("frame: unexpected varint field index")),
                }
            }
            WIRE_FIXED64 => {
                buf.get_bytes(8)
                    .ok_or(Error::Malformed("frame: truncated fixed64 field"))?;
                return Err(Error::Malformed("frame: unexpected fixed64 field"));
            }
            WIRE_LENGTH_DELIMITED => {
                let len = buf
                    .get_varint()
                    .ok_or(Error::Malformed("frame: truncated length-delimited length"))?
                    as usize;
                let bytes = buf
                    .get_bytes(len)
                    .ok_or(Error::Malformed("frame: truncated length-delimited field"))?;
                match field {
                    FIELD_SOURCE_ID => {
                        fields.source_id =
                            Some(String::from_utf8(bytes).map_err(|_| {
                                Error::Malformed("frame: source_id is not valid utf8")
                            })?)
                    }
                    FIELD_DESTINATION_ID => {
                        fields.destination_id =
                            Some(String::from_utf8(bytes).map_err(|_| {
                                Error::Malformed("frame: destination_id is not valid utf8")
                            })?)
                    }
                    FIELD_NAMESPACE => {
                        fields.namespace = Some(String::from_utf8(bytes).map_err(|_| {
                            Error::Malformed("frame: namespace is not valid utf8")
                        })?)
                    }
                    FIELD_PAYLOAD_UTF8 => {
                        fields.payload_utf8 =
                            Some(String::from_utf8(bytes).map_err(|_| {
                                Error::Malformed("frame: payload_utf8 is not valid utf8")
                            })?)
                    }
                    FIELD_PAYLOAD_BINARY => fields.payload_binary = Some(bytes),
                    _ => {
                        return Err(Error::Malformed(
                            "frame: unexpected length-delimited field index",
                        ))
                    }
                }
            }
            WIRE_FIXED32 => {
                buf.get_bytes(4)
                    .ok_or(Error::Malformed("frame: truncated fixed32 field"))?;
                return Err(Error::Malformed("frame: unexpected fixed32 field"));
            }
            // Groups (start=3, end=4) are not used by CastMessage and are
            // rejected rather than skipped (spec §4.5 step 3).
            _ => return Err(Error::Malformed("frame: unsupported wire type")),
        }
    }

    if fields.protocol_version != Some(CASTV2_1_0) {
        return Err(Error::Malformed("frame: missing or wrong protocol_version"));
    }
    let source_id = fields
        .source_id
        .ok_or(Error::Malformed("frame: missing source_id"))?;
    let destination_id = fields
        .destination_id
        .ok_or(Error::Malformed("frame: missing destination_id"))?;
    let namespace = fields
        .namespace
        .ok_or(Error::Malformed("frame: missing namespace"))?;
    let namespace = crate::namespace::known(&namespace)
        .map_err(|_| Error::Malformed("frame: unknown namespace"))?;

    let payload = match fields.payload_type {
        Some(0) => Payload::Utf8(
            fields
                .payload_utf8
                .ok_or(Error::Malformed("frame: payload_type=STRING with no payload_utf8"))?,
        ),
        Some(1) => Payload::Binary(fields.payload_binary.ok_or(Error::Malformed(
            "frame: payload_type=BINARY with no payload_binary",
        ))?),
        _ => return Err(Error::Malformed("frame: missing or invalid payload_type")),
    };

    Ok(CastMessage {
        source_id,
        destination_id,
        namespace,
        payload,
    })
}

/// Try to decode one complete frame from the front of `buf`. Returns
/// `Ok(None)` (without consuming anything) when fewer than `length + 4`
/// bytes are buffered. On a validation failure the frame's bytes are still
/// consumed (so the buffer can resynchronize on the next frame); the
/// caller is expected to log and continue (spec §4.5 "the entire frame is
/// discarded... parsing resumes with any following frame bytes").
pub fn try_decode(buf: &mut ByteBuffer) -> Result<Option<CastMessage>, Error> {
    let header = match buf.peek(4) {
        Some(h) => h,
        None => return Ok(None),
    };
    let length = BigEndian::read_u32(header) as usize;
    if buf.remaining() < 4 + length {
        return Ok(None);
    }
    buf.get_u32();
    let body = buf
        .get_bytes(length)
        .expect("checked remaining >= 4 + length above");
    decode_body(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;

    #[test]
    fn round_trip_json_frame() {
        let message = CastMessage::new_json(
            "sender-0",
            "receiver-0",
            Namespace::Heartbeat,
            r#"{"type":"PING"}"#.to_owned(),
        );
        let wire = encode(&message);
        let mut buf = ByteBuffer::from_vec(wire);
        let decoded = try_decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, message);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn round_trip_binary_frame() {
        let message = CastMessage {
            source_id: "sender-0".to_owned(),
            destination_id: "receiver-0".to_owned(),
            namespace: Namespace::Receiver,
            payload: Payload::Binary(vec![1, 2, 3, 4]),
        };
        let wire = encode(&message);
        let mut buf = ByteBuffer::from_vec(wire);
        let decoded = try_decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn short_buffer_does_not_advance_cursor() {
        let message = CastMessage::new_json(
            "sender-0",
            "receiver-0",
            Namespace::Connection,
            r#"{"type":"CONNECT"}"#.to_owned(),
        );
        let mut wire = encode(&message);
        wire.truncate(wire.len() - 1);
        let mut buf = ByteBuffer::from_vec(wire);
        assert_eq!(try_decode(&mut buf).unwrap(), None);
        assert_eq!(buf.offset(), 0);
    }

    #[test]
    fn two_frames_back_to_back_decode_in_order() {
        let a = CastMessage::new_json(
            "sender-0",
            "receiver-0",
            Namespace::Heartbeat,
            r#"{"type":"PING"}"#.to_owned(),
        );
        let b = CastMessage::new_json(
            "sender-0",
            "receiver-0",
            Namespace::Heartbeat,
            r#"{"type":"PONG"}"#.to_owned(),
        );
        let mut wire = encode(&a);
        wire.extend(encode(&b));
        let mut buf = ByteBuffer::from_vec(wire);
        assert_eq!(try_decode(&mut buf).unwrap(), Some(a));
        assert_eq!(try_decode(&mut buf).unwrap(), Some(b));
        assert_eq!(try_decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn unknown_namespace_is_malformed() {
        let mut buf = ByteBuffer::new();
        put_tag(&mut buf, FIELD_PROTOCOL_VERSION, WIRE_VARINT);
        buf.put_varint(0);
        put_length_delimited(&mut buf, FIELD_SOURCE_ID, b"sender-0");
        put_length_delimited(&mut buf, FIELD_DESTINATION_ID, b"receiver-0");
        put_length_delimited(&mut buf, FIELD_NAMESPACE, b"urn:x-cast:bogus");
        put_tag(&mut buf, FIELD_PAYLOAD_TYPE, WIRE_VARINT);
        buf.put_varint(0);
        put_length_delimited(&mut buf, FIELD_PAYLOAD_UTF8, b"{}");
        let body = buf.into_vec();
        assert!(decode_body(&body).is_err());
    }

    #[test]
    fn group_wire_type_is_malformed() {
        let mut buf = ByteBuffer::new();
        put_tag(&mut buf, FIELD_SOURCE_ID, 3); // start-group wire type
        let body = buf.into_vec();
        assert!(decode_body(&body).is_err());
    }
}
