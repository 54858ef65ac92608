//! Minimal RFC 1035 message codec: one-question queries and the answer
//! section of replies.

use super::QueryType;
use super::error::DnsError;
use smallvec::SmallVec;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const HEADER_LEN: usize = 12;
const CLASS_IN: u16 = 1;
const FLAG_RD: u16 = 0x0100;
const FLAG_QR: u16 = 0x8000;
const FLAG_TC: u16 = 0x0200;
const MAX_LABEL: usize = 63;
const MAX_NAME: usize = 253;
const MAX_POINTER_HOPS: usize = 16;

/// One resource record from the answer section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Record type.
    pub rtype: u16,
    /// Time to live in seconds.
    pub ttl: u32,
    /// Address for A and AAAA records.
    pub address: Option<IpAddr>,
}

/// A parsed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Transaction id.
    pub id: u16,
    /// Response code from the header.
    pub rcode: u8,
    /// TC bit.
    pub truncated: bool,
    /// Answer records in wire order.
    pub answers: Vec<Answer>,
}

impl Response {
    /// Addresses of `qtype` records, in wire order.
    pub fn addresses(&self, qtype: QueryType) -> Vec<IpAddr> {
        self.answers
            .iter()
            .filter(|a| a.rtype == qtype.code())
            .filter_map(|a| a.address)
            .collect()
    }
}

/// Builds a recursive query for `name`.
pub fn encode_query(id: u16, name: &str, qtype: QueryType) -> Result<Vec<u8>, DnsError> {
    let name = name.trim_end_matches('.');
    if name.is_empty() || name.len() > MAX_NAME {
        return Err(DnsError::InvalidHost(name.to_owned()));
    }
    let mut out = Vec::with_capacity(HEADER_LEN + name.len() + 6);
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&FLAG_RD.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    out.extend_from_slice(&[0; 6]); // ancount, nscount, arcount
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL {
            return Err(DnsError::InvalidHost(name.to_owned()));
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out.extend_from_slice(&qtype.code().to_be_bytes());
    out.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(out)
}

/// Parses a reply, keeping only the answer section.
pub fn decode_response(buf: &[u8]) -> Result<Response, DnsError> {
    let mut reader = Reader { buf, pos: 0 };
    let id = reader.u16()?;
    let flags = reader.u16()?;
    if flags & FLAG_QR == 0 {
        return Err(DnsError::Malformed("not a response"));
    }
    let qdcount = reader.u16()?;
    let ancount = reader.u16()?;
    reader.skip(4)?; // nscount, arcount

    for _ in 0..qdcount {
        reader.skip_name()?;
        reader.skip(4)?;
    }
    let mut answers = Vec::with_capacity(usize::from(ancount));
    for _ in 0..ancount {
        reader.skip_name()?;
        let rtype = reader.u16()?;
        let _class = reader.u16()?;
        let ttl = reader.u32()?;
        let rdlen = usize::from(reader.u16()?);
        let rdata = reader.take(rdlen)?;
        let address = match (rtype, rdlen) {
            (1, 4) => Some(IpAddr::V4(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]))),
            (28, 16) => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(rdata);
                Some(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            (1 | 28, _) => return Err(DnsError::Malformed("bad address length")),
            _ => None,
        };
        answers.push(Answer {
            rtype,
            ttl,
            address,
        });
    }
    Ok(Response {
        id,
        rcode: (flags & 0x000f) as u8,
        truncated: flags & FLAG_TC != 0,
        answers,
    })
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DnsError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        let end = end.ok_or(DnsError::Malformed("short message"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), DnsError> {
        self.take(n).map(|_| ())
    }

    fn u16(&mut self) -> Result<u16, DnsError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DnsError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Skips an encoded name; a compression pointer ends it.
    fn skip_name(&mut self) -> Result<(), DnsError> {
        loop {
            let len = self.take(1)?[0];
            match len {
                0 => return Ok(()),
                l if l & 0xc0 == 0xc0 => return self.skip(1),
                l if l & 0xc0 == 0 => self.skip(usize::from(l))?,
                _ => return Err(DnsError::Malformed("bad label")),
            }
        }
    }
}

/// Decodes the name at `pos`, following compression pointers.
pub fn read_name(buf: &[u8], mut pos: usize) -> Result<String, DnsError> {
    let mut labels: SmallVec<[&str; 8]> = SmallVec::new();
    let mut hops = 0;
    loop {
        let len = *buf.get(pos).ok_or(DnsError::Malformed("short name"))?;
        if len == 0 {
            break;
        }
        if len & 0xc0 == 0xc0 {
            let low = *buf.get(pos + 1).ok_or(DnsError::Malformed("short pointer"))?;
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(DnsError::Malformed("pointer loop"));
            }
            pos = usize::from(u16::from_be_bytes([len & 0x3f, low]));
            continue;
        }
        let start = pos + 1;
        let end = start + usize::from(len);
        let label = buf
            .get(start..end)
            .and_then(|b| std::str::from_utf8(b).ok())
            .ok_or(DnsError::Malformed("bad label"))?;
        labels.push(label);
        pos = end;
    }
    Ok(labels.join("."))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a reply to `query` carrying `addrs`.
    pub(crate) fn reply(query: &[u8], rcode: u8, addrs: &[IpAddr]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&query[0..2]);
        out.extend_from_slice(&(FLAG_QR | FLAG_RD | 0x0080 | u16::from(rcode)).to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(addrs.len() as u16).to_be_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&query[HEADER_LEN..]);
        for addr in addrs {
            out.extend_from_slice(&[0xc0, 0x0c]);
            let (rtype, data): (u16, Vec<u8>) = match addr {
                IpAddr::V4(v4) => (1, v4.octets().to_vec()),
                IpAddr::V6(v6) => (28, v6.octets().to_vec()),
            };
            out.extend_from_slice(&rtype.to_be_bytes());
            out.extend_from_slice(&CLASS_IN.to_be_bytes());
            out.extend_from_slice(&300u32.to_be_bytes());
            out.extend_from_slice(&(data.len() as u16).to_be_bytes());
            out.extend_from_slice(&data);
        }
        out
    }

    #[test]
    fn query_layout() {
        let q = encode_query(0xabcd, "example.com.", QueryType::Aaaa).expect("encode");
        assert_eq!(&q[0..2], &[0xab, 0xcd]);
        assert_eq!(&q[2..4], &[0x01, 0x00]);
        assert_eq!(&q[4..6], &[0, 1]);
        assert_eq!(&q[12..25], b"\x07example\x03com\x00");
        assert_eq!(&q[25..], &[0, 28, 0, 1]);
        assert_eq!(read_name(&q, HEADER_LEN).expect("name"), "example.com");
    }

    #[test]
    fn rejects_bad_names() {
        assert!(encode_query(1, "", QueryType::A).is_err());
        assert!(encode_query(1, "a..b", QueryType::A).is_err());
        let long = "x".repeat(64);
        assert!(encode_query(1, &long, QueryType::A).is_err());
    }

    #[test]
    fn parses_compressed_answers() {
        let q = encode_query(7, "example.org", QueryType::A).expect("encode");
        let addrs = [
            IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        ];
        let resp = decode_response(&reply(&q, 0, &addrs)).expect("decode");
        assert_eq!(resp.id, 7);
        assert_eq!(resp.rcode, 0);
        assert!(!resp.truncated);
        assert_eq!(resp.addresses(QueryType::A), addrs.to_vec());
        assert!(resp.addresses(QueryType::Aaaa).is_empty());
        assert_eq!(resp.answers[0].ttl, 300);
    }

    #[test]
    fn reports_rcode_and_rejects_garbage() {
        let q = encode_query(9, "nx.example", QueryType::A).expect("encode");
        let resp = decode_response(&reply(&q, 3, &[])).expect("decode");
        assert_eq!(resp.rcode, 3);
        assert!(decode_response(&q).is_err(), "queries are not responses");
        assert!(decode_response(&[0, 1, 0x80]).is_err());
    }

    #[test]
    fn pointer_loops_are_rejected() {
        let buf = [0xc0, 0x00];
        assert_eq!(read_name(&buf, 0), Err(DnsError::Malformed("pointer loop")));
    }
}
