//! mDNS PTR query encoding and response decoding (C2, spec §4.2).
//!
//! Decoding is built on `buffer::ByteBuffer`'s `seek`/`full`, which exist
//! specifically so this module can follow DNS name-compression pointers to
//! arbitrary earlier offsets without losing the outer record cursor.

use byteorder::{BigEndian, ByteOrder};

use crate::buffer::ByteBuffer;
use crate::error::Error;

const TXID: u16 = 0xFEED;
const QUERY_FLAGS: u16 = 0x0000;
const RESPONSE_FLAGS: u16 = 0x8400;
const QTYPE_PTR: u16 = 12;
const TYPE_A: u16 = 1;
const TYPE_TXT: u16 = 16;
const TYPE_AAAA: u16 = 28;
const TYPE_SRV: u16 = 33;
const QCLASS_IN_UNICAST_RESPONSE: u16 = 0x8001;
const SERVICE_NAME: &str = "_googlecast._tcp.local";

/// Maximum datagram size this codec will attempt to decode (spec §6).
pub const MAX_DATAGRAM_LEN: usize = 9000;

/// Build the 12-byte header + one-question PTR query for
/// `_googlecast._tcp.local`.
pub fn encode_query() -> Vec<u8> {
    let mut buf = ByteBuffer::with_capacity(64);
    buf.put_u16(TXID);
    buf.put_u16(QUERY_FLAGS);
    buf.put_u16(1); // QDCOUNT
    buf.put_u16(0); // ANCOUNT
    buf.put_u16(0); // NSCOUNT
    buf.put_u16(0); // ARCOUNT
    for label in &["_googlecast", "_tcp", "local"] {
        buf.put_u8(label.len() as u8);
        buf.put_bytes(label.as_bytes());
    }
    buf.put_u8(0);
    buf.put_u16(QTYPE_PTR);
    buf.put_u16(QCLASS_IN_UNICAST_RESPONSE);
    buf.into_vec()
}

/// Everything this codec extracts from a single response datagram. Identity
/// fields folded from TXT records are applied by the caller with the
/// fallbacks spec §4.3 step 5 specifies; `ptr_name`/`ipv4`/`ipv6` are kept
/// for testability even though the discovery engine sources the device's
/// address from the datagram's source address, not from the A/AAAA record.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Response {
    pub ptr_name: String,
    pub id: Option<String>,
    pub friendly_name: Option<String>,
    pub model: Option<String>,
    pub port: Option<u16>,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
}

pub fn decode_response(datagram: &[u8]) -> Result<Response, Error> {
    if datagram.len() > MAX_DATAGRAM_LEN {
        return Err(Error::Malformed("mdns: datagram exceeds max size"));
    }
    let mut buf = ByteBuffer::from_vec(datagram.to_vec());

    let txid = buf.get_u16().ok_or(Error::Malformed("mdns: truncated header"))?;
    let flags = buf.get_u16().ok_or(Error::Malformed("mdns: truncated header"))?;
    let qdcount = buf.get_u16().ok_or(Error::Malformed("mdns: truncated header"))?;
    let ancount = buf.get_u16().ok_or(Error::Malformed("mdns: truncated header"))?;
    let nscount = buf.get_u16().ok_or(Error::Malformed("mdns: truncated header"))?;
    let arcount = buf.get_u16().ok_or(Error::Malformed("mdns: truncated header"))?;

    if txid != TXID {
        return Err(Error::Malformed("mdns: unexpected transaction id"));
    }
    if flags != RESPONSE_FLAGS {
        return Err(Error::Malformed("mdns: unexpected flags"));
    }
    if qdcount != 0 {
        return Err(Error::Malformed("mdns: expected zero questions in response"));
    }
    if ancount != 1 {
        return Err(Error::Malformed("mdns: expected exactly one answer"));
    }

    let name = decode_name(&mut buf)?;
    if name != SERVICE_NAME {
        return Err(Error::Malformed("mdns: answer name is not _googlecast._tcp.local"));
    }
    let rtype = buf.get_u16().ok_or(Error::Malformed("mdns: truncated answer"))?;
    let class = buf.get_u16().ok_or(Error::Malformed("mdns: truncated answer"))?;
    let _ttl = buf.get_u32().ok_or(Error::Malformed("mdns: truncated answer"))?;
    let rdlength = buf.get_u16().ok_or(Error::Malformed("mdns: truncated answer"))? as usize;
    if rtype != QTYPE_PTR {
        return Err(Error::Malformed("mdns: answer is not a PTR record"));
    }
    if class & 0x7FFF != 1 {
        return Err(Error::Malformed("mdns: answer class is not IN"));
    }
    let rdata_start = buf.offset();
    let ptr_name = decode_name(&mut buf)?;
    enforce_rdlength_bound(&buf, rdata_start, rdlength)?;
    seek_past_record(&mut buf, rdata_start, rdlength)?;

    let mut response = Response {
        ptr_name,
        ..Response::default()
    };

    for _ in 0..nscount {
        skip_record(&mut buf)?;
    }

    for _ in 0..arcount {
        decode_next_record(&mut buf, &mut response)?;
    }

    Ok(response)
}

/// Skip an authority-section record entirely: owner name, type, class,
/// ttl, rdlength, rdata. No dispatch (spec §4.2 "Authority records are
/// skipped").
fn skip_record(buf: &mut ByteBuffer) -> Result<(), Error> {
    decode_name(buf)?;
    buf.get_u16().ok_or(Error::Malformed("mdns: truncated record"))?;
    buf.get_u16().ok_or(Error::Malformed("mdns: truncated record"))?;
    buf.get_u32().ok_or(Error::Malformed("mdns: truncated record"))?;
    let rdlength = buf
        .get_u16()
        .ok_or(Error::Malformed("mdns: truncated record"))? as usize;
    let rdata_start = buf.offset();
    seek_past_record(buf, rdata_start, rdlength)
}

/// Decode an additional-section record, dispatching by type (spec §4.2).
fn decode_next_record(buf: &mut ByteBuffer, response: &mut Response) -> Result<(), Error> {
    decode_name(buf)?;
    let rtype = buf.get_u16().ok_or(Error::Malformed("mdns: truncated record"))?;
    let _class = buf.get_u16().ok_or(Error::Malformed("mdns: truncated record"))?;
    let _ttl = buf.get_u32().ok_or(Error::Malformed("mdns: truncated record"))?;
    let rdlength = buf
        .get_u16()
        .ok_or(Error::Malformed("mdns: truncated record"))? as usize;
    let rdata_start = buf.offset();

    match rtype {
        TYPE_A => {
            if rdlength != 4 {
                return Err(Error::Malformed("mdns: A record rdlength != 4"));
            }
            let bytes = buf
                .get_bytes(4)
                .ok_or(Error::Malformed("mdns: truncated A record"))?;
            response.ipv4 = Some(format_ipv4(&bytes));
        }
        TYPE_AAAA => {
            if rdlength != 16 {
                return Err(Error::Malformed("mdns: AAAA record rdlength != 16"));
            }
            let bytes = buf
                .get_bytes(16)
                .ok_or(Error::Malformed("mdns: truncated AAAA record"))?;
            response.ipv6 = Some(format_ipv6(&bytes));
        }
        TYPE_TXT => {
            decode_txt(buf, rdata_start, rdlength, response)?;
        }
        TYPE_SRV => {
            if rdlength < 6 {
                return Err(Error::Malformed("mdns: SRV record rdlength < 6"));
            }
            buf.get_u16().ok_or(Error::Malformed("mdns: truncated SRV record"))?; // priority
            buf.get_u16().ok_or(Error::Malformed("mdns: truncated SRV record"))?; // weight
            let port = buf
                .get_u16()
                .ok_or(Error::Malformed("mdns: truncated SRV record"))?;
            response.port = Some(port);
        }
        _ => {}
    }
    enforce_rdlength_bound(buf, rdata_start, rdlength)?;
    seek_past_record(buf, rdata_start, rdlength)
}

/// DNS-SD TXT records are a sequence of `<u8 length><bytes>` character
/// strings. A segment whose declared length runs past the owning record's
/// `rdlength` aborts parsing of *this* record only (spec §9-2, §8
/// boundary behaviors), not the whole response.
fn decode_txt(
    buf: &mut ByteBuffer,
    rdata_start: usize,
    rdlength: usize,
    response: &mut Response,
) -> Result<(), Error> {
    let rdata_end = rdata_start + rdlength;
    loop {
        if buf.offset() >= rdata_end {
            break;
        }
        let slen = match buf.get_u8() {
            Some(v) => v as usize,
            None => break,
        };
        if buf.offset() + slen > rdata_end {
            break;
        }
        let bytes = buf
            .get_bytes(slen)
            .ok_or(Error::Malformed("mdns: truncated TXT segment"))?;
        if let Some(rest) = bytes.strip_prefix(b"id=") {
            response.id = Some(String::from_utf8_lossy(rest).into_owned());
        } else if let Some(rest) = bytes.strip_prefix(b"fn=") {
            response.friendly_name = Some(String::from_utf8_lossy(rest).into_owned());
        } else if let Some(rest) = bytes.strip_prefix(b"md=") {
            response.model = Some(String::from_utf8_lossy(rest).into_owned());
        }
    }
    Ok(())
}

fn enforce_rdlength_bound(buf: &ByteBuffer, rdata_start: usize, rdlength: usize) -> Result<(), Error> {
    if buf.offset() > rdata_start + rdlength || rdata_start + rdlength > buf.full().len() {
        return Err(Error::Malformed("mdns: record crossed rdlength boundary"));
    }
    Ok(())
}

fn seek_past_record(buf: &mut ByteBuffer, rdata_start: usize, rdlength: usize) -> Result<(), Error> {
    if !buf.seek(rdata_start + rdlength) {
        return Err(Error::Malformed("mdns: rdlength runs past end of message"));
    }
    Ok(())
}

/// Decode a (possibly compressed) DNS name starting at `buf`'s current
/// offset, then reposition `buf` to resume right after the first pointer
/// (or the terminating zero byte if no pointer was used) — the
/// post-redirect tail never advances the outer cursor (spec §3).
fn decode_name(buf: &mut ByteBuffer) -> Result<String, Error> {
    let message = buf.full().to_vec();
    let mut pos = buf.offset();
    let mut resume = None;
    let mut labels: Vec<String> = Vec::new();
    let mut total_len = 0usize;
    let mut jumps = 0usize;
    let max_jumps = message.len().max(1);

    loop {
        if pos >= message.len() {
            return Err(Error::Malformed("mdns name: cursor out of bounds"));
        }
        let len_byte = message[pos];
        if len_byte == 0 {
            pos += 1;
            if resume.is_none() {
                resume = Some(pos);
            }
            break;
        }
        if len_byte & 0xC0 == 0xC0 {
            if pos + 1 >= message.len() {
                return Err(Error::Malformed("mdns name: truncated pointer"));
            }
            let offset = ((u16::from(len_byte & 0x3F) << 8) | u16::from(message[pos + 1])) as usize;
            if resume.is_none() {
                resume = Some(pos + 2);
            }
            jumps += 1;
            if jumps > max_jumps || offset >= message.len() {
                return Err(Error::Malformed("mdns name: bad or cyclic compression pointer"));
            }
            pos = offset;
            continue;
        }
        if len_byte & 0xC0 != 0 {
            return Err(Error::Malformed("mdns name: reserved label length bits"));
        }
        let len = len_byte as usize;
        pos += 1;
        if pos + len > message.len() {
            return Err(Error::Malformed("mdns name: truncated label"));
        }
        let label = std::str::from_utf8(&message[pos..pos + len])
            .map_err(|_| Error::Malformed("mdns name: label is not utf8"))?;
        labels.push(label.to_owned());
        pos += len;
        total_len += len + 1;
        if total_len > 255 {
            return Err(Error::Malformed("mdns name: assembled name exceeds 255 bytes"));
        }
    }

    let resume = resume.ok_or(Error::Malformed("mdns name: empty"))?;
    buf.seek(resume);
    Ok(labels.join("."))
}

pub fn format_ipv4(bytes: &[u8]) -> String {
    format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
}

/// Colon-delimited hextets, leading zeros suppressed within each hextet.
/// Per spec §9-3 this does not implement RFC 5952 `::` zero-run
/// compression; a zero-valued hextet renders as an empty string between
/// colons, matching the source's literal (buggy) behavior.
pub fn format_ipv6(bytes: &[u8]) -> String {
    (0..8)
        .map(|i| {
            let v = BigEndian::read_u16(&bytes[i * 2..i * 2 + 2]);
            if v == 0 {
                String::new()
            } else {
                format!("{:x}", v)
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_name(buf: &mut Vec<u8>, labels: &[&str]) {
        for label in labels {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
        buf.push(0);
    }

    fn base_header(ancount: u16, nscount: u16, arcount: u16) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend_from_slice(&TXID.to_be_bytes());
        h.extend_from_slice(&RESPONSE_FLAGS.to_be_bytes());
        h.extend_from_slice(&0u16.to_be_bytes());
        h.extend_from_slice(&ancount.to_be_bytes());
        h.extend_from_slice(&nscount.to_be_bytes());
        h.extend_from_slice(&arcount.to_be_bytes());
        h
    }

    #[test]
    fn query_has_expected_header_and_question() {
        let query = encode_query();
        assert_eq!(BigEndian::read_u16(&query[0..2]), TXID);
        assert_eq!(BigEndian::read_u16(&query[2..4]), 0);
        assert_eq!(BigEndian::read_u16(&query[4..6]), 1);
        assert!(query.ends_with(&QCLASS_IN_UNICAST_RESPONSE.to_be_bytes()));
    }

    #[test]
    fn decodes_minimal_response_with_txt_srv_a() {
        let mut msg = base_header(1, 0, 2);
        push_name(&mut msg, &["_googlecast", "_tcp", "local"]);
        msg.extend_from_slice(&QTYPE_PTR.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&120u32.to_be_bytes());
        let rdata_pos = msg.len();
        msg.extend_from_slice(&0u16.to_be_bytes()); // rdlength placeholder
        let name_start = msg.len();
        push_name(&mut msg, &["Den TV", "_googlecast", "_tcp", "local"]);
        let rdlength = (msg.len() - name_start) as u16;
        BigEndian::write_u16(&mut msg[rdata_pos..rdata_pos + 2], rdlength);

        // TXT additional record
        push_name(&mut msg, &["_googlecast", "_tcp", "local"]);
        msg.extend_from_slice(&TYPE_TXT.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&120u32.to_be_bytes());
        let mut txt = Vec::new();
        for s in &["id=abc123", "fn=Den TV", "md=Chromecast"] {
            txt.push(s.len() as u8);
            txt.extend_from_slice(s.as_bytes());
        }
        msg.extend_from_slice(&(txt.len() as u16).to_be_bytes());
        msg.extend_from_slice(&txt);

        // A additional record
        push_name(&mut msg, &["_googlecast", "_tcp", "local"]);
        msg.extend_from_slice(&TYPE_A.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&120u32.to_be_bytes());
        msg.extend_from_slice(&4u16.to_be_bytes());
        msg.extend_from_slice(&[10, 12, 1, 141]);

        let resp = decode_response(&msg).expect("decode");
        assert_eq!(resp.id.as_deref(), Some("abc123"));
        assert_eq!(resp.friendly_name.as_deref(), Some("Den TV"));
        assert_eq!(resp.model.as_deref(), Some("Chromecast"));
        assert_eq!(resp.ipv4.as_deref(), Some("10.12.1.141"));
    }

    #[test]
    fn wrong_txid_is_rejected() {
        let mut msg = base_header(1, 0, 0);
        msg[0] = 0;
        msg[1] = 0;
        assert!(decode_response(&msg).is_err());
    }

    #[test]
    fn txt_segment_overrunning_record_stops_record_not_response() {
        let mut msg = base_header(1, 0, 1);
        push_name(&mut msg, &["_googlecast", "_tcp", "local"]);
        msg.extend_from_slice(&QTYPE_PTR.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&120u32.to_be_bytes());
        let rdata_pos = msg.len();
        msg.extend_from_slice(&0u16.to_be_bytes());
        let name_start = msg.len();
        push_name(&mut msg, &["Kitchen"]);
        let rdlength = (msg.len() - name_start) as u16;
        BigEndian::write_u16(&mut msg[rdata_pos..rdata_pos + 2], rdlength);

        push_name(&mut msg, &["_googlecast", "_tcp", "local"]);
        msg.extend_from_slice(&TYPE_TXT.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&120u32.to_be_bytes());
        // declared segment length (200) is longer than the 9 bytes of rdata.
        let mut txt = vec![200u8];
        txt.extend_from_slice(b"id=short");
        msg.extend_from_slice(&(txt.len() as u16).to_be_bytes());
        msg.extend_from_slice(&txt);

        let resp = decode_response(&msg).expect("response still decodes");
        assert_eq!(resp.id, None);
        assert_eq!(resp.ptr_name, "Kitchen");
    }

    #[test]
    fn ipv6_hextets_format_with_zero_suppression() {
        let mut bytes = [0u8; 16];
        // 2016:0cd8:4567:2cd0:0000:0000:0000:0012
        bytes[0] = 0x20;
        bytes[1] = 0x16;
        bytes[2] = 0x0c;
        bytes[3] = 0xd8;
        bytes[4] = 0x45;
        bytes[5] = 0x67;
        bytes[6] = 0x2c;
        bytes[7] = 0xd0;
        bytes[15] = 0x12;
        assert_eq!(format_ipv6(&bytes), "2016:cd8:4567:2cd0::::12");
    }

    #[test]
    fn compressed_additional_record_names_decode_like_uncompressed() {
        let mut msg = base_header(1, 0, 1);
        push_name(&mut msg, &["_googlecast", "_tcp", "local"]);
        msg.extend_from_slice(&QTYPE_PTR.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&120u32.to_be_bytes());
        let rdata_pos = msg.len();
        msg.extend_from_slice(&0u16.to_be_bytes());
        let name_start = msg.len();
        push_name(&mut msg, &["Office"]);
        let rdlength = (msg.len() - name_start) as u16;
        BigEndian::write_u16(&mut msg[rdata_pos..rdata_pos + 2], rdlength);

        // Pointer back to offset 12 (the start of "_googlecast._tcp.local").
        let pointer: u16 = 0xC000 | 12;
        msg.extend_from_slice(&pointer.to_be_bytes());
        msg.extend_from_slice(&TYPE_SRV.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&120u32.to_be_bytes());
        msg.extend_from_slice(&6u16.to_be_bytes());
        msg.extend_from_slice(&0u16.to_be_bytes());
        msg.extend_from_slice(&0u16.to_be_bytes());
        msg.extend_from_slice(&8009u16.to_be_bytes());

        let resp = decode_response(&msg).expect("decode with compressed owner name");
        assert_eq!(resp.port, Some(8009));
    }
}
