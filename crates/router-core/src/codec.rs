//! Wire format for the three message kinds the engine speaks.
//!
//! Every message is a single UTF-8 string carried in one datagram; the
//! first byte selects the kind:
//!
//! - `@<addr>` — presence: the sender announces itself as a live router.
//! - `!<origin>;<dest>;<payload>` — text: an application message, parsed by
//!   splitting on the first two `;` only (so `payload` may itself contain
//!   `;`).
//! - anything else — route-vector: zero or more `*<addr>;<metric>` records
//!   concatenated with no separator, `*` itself being the record delimiter.
//!
//! Parsing is tolerant: a malformed presence or text message is reported as
//! a [`CodecError`] for the caller to log and drop, while a route-vector
//! never fails outright — individual malformed records are skipped and
//! logged, the rest of the vector still decodes.

use std::collections::HashMap;
use std::net::IpAddr;

use thiserror::Error;

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `@<addr>` — the sender is alive at `addr` (normally the sender's own
    /// identity, confirmed by the kernel-reported source address).
    Presence(IpAddr),
    /// `!<origin>;<dest>;<payload>` — an application-level text message.
    Text {
        origin: IpAddr,
        dest: IpAddr,
        payload: String,
    },
    /// A parsed route-vector: destination -> advertised metric. Malformed
    /// records were already dropped during parsing.
    RouteVector(HashMap<IpAddr, u32>),
}

/// Why a presence or text message failed to decode.
///
/// Route-vectors never produce this error: malformed records inside one are
/// dropped individually (see [`decode`]'s handling of the `*`-delimited
/// fallback case).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("presence message has no address: {0:?}")]
    EmptyPresenceAddr(String),
    #[error("presence address {0:?} is not a valid IP address")]
    BadPresenceAddr(String),
    #[error("text message {0:?} does not have the form origin;dest;payload")]
    MalformedText(String),
    #[error("text message origin {0:?} is not a valid IP address")]
    BadTextOrigin(String),
    #[error("text message dest {0:?} is not a valid IP address")]
    BadTextDest(String),
}

const PRESENCE_PREFIX: char = '@';
const TEXT_PREFIX: char = '!';
const ROUTE_RECORD_PREFIX: char = '*';

/// Decode one datagram's payload into a [`Message`].
///
/// Only presence and text parsing can fail; anything that isn't prefixed
/// with `@` or `!` is always accepted as a (possibly empty) route-vector.
pub fn decode(raw: &str) -> Result<Message, CodecError> {
    if let Some(addr) = raw.strip_prefix(PRESENCE_PREFIX) {
        return decode_presence(addr);
    }
    if let Some(body) = raw.strip_prefix(TEXT_PREFIX) {
        return decode_text(body);
    }
    Ok(Message::RouteVector(decode_route_vector(raw)))
}

fn decode_presence(addr: &str) -> Result<Message, CodecError> {
    if addr.is_empty() {
        return Err(CodecError::EmptyPresenceAddr(addr.to_string()));
    }
    addr.parse::<IpAddr>()
        .map(Message::Presence)
        .map_err(|_| CodecError::BadPresenceAddr(addr.to_string()))
}

fn decode_text(body: &str) -> Result<Message, CodecError> {
    let mut parts = body.splitn(3, ';');
    let (origin, dest, payload) = match (parts.next(), parts.next(), parts.next()) {
        (Some(o), Some(d), Some(p)) => (o, d, p),
        _ => return Err(CodecError::MalformedText(body.to_string())),
    };
    let origin = origin
        .parse::<IpAddr>()
        .map_err(|_| CodecError::BadTextOrigin(origin.to_string()))?;
    let dest = dest
        .parse::<IpAddr>()
        .map_err(|_| CodecError::BadTextDest(dest.to_string()))?;
    Ok(Message::Text {
        origin,
        dest,
        payload: payload.to_string(),
    })
}

/// Parse `*addr;metric*addr;metric...` into a destination -> metric map.
///
/// Each `*`-delimited record that doesn't parse as `addr;metric` with a
/// valid IP address and non-negative integer metric is skipped with a
/// warning; the rest of the vector is still honored.
fn decode_route_vector(raw: &str) -> HashMap<IpAddr, u32> {
    let mut out = HashMap::new();
    for record in raw.split(ROUTE_RECORD_PREFIX).filter(|r| !r.is_empty()) {
        match parse_route_record(record) {
            Some((addr, metric)) => {
                out.insert(addr, metric);
            }
            None => {
                tracing::warn!(record, "dropping malformed route-vector record");
            }
        }
    }
    out
}

fn parse_route_record(record: &str) -> Option<(IpAddr, u32)> {
    let (addr, metric) = record.split_once(';')?;
    let addr = addr.parse::<IpAddr>().ok()?;
    let metric = metric.parse::<u32>().ok()?;
    Some((addr, metric))
}

/// Encode a presence announcement: `@<self_addr>`.
pub fn encode_presence(self_addr: IpAddr) -> String {
    format!("{PRESENCE_PREFIX}{self_addr}")
}

/// Encode a text message: `!<origin>;<dest>;<payload>`.
pub fn encode_text(origin: IpAddr, dest: IpAddr, payload: &str) -> String {
    format!("{TEXT_PREFIX}{origin};{dest};{payload}")
}

/// Encode a route-vector from an ordered sequence of `(dest, metric)` pairs.
///
/// Callers control ordering (the table iterates destinations sorted) so the
/// wire payload is deterministic for a given snapshot; the format itself
/// carries no ordering requirement.
pub fn encode_route_vector<'a>(entries: impl Iterator<Item = (&'a IpAddr, u32)>) -> String {
    let mut out = String::new();
    for (addr, metric) in entries {
        out.push(ROUTE_RECORD_PREFIX);
        out.push_str(&addr.to_string());
        out.push(';');
        out.push_str(&metric.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn decodes_presence() {
        let msg = decode("@10.0.0.1").unwrap();
        assert_eq!(msg, Message::Presence(ip("10.0.0.1")));
    }

    #[test]
    fn rejects_empty_presence() {
        assert!(decode("@").is_err());
    }

    #[test]
    fn rejects_non_ip_presence() {
        assert!(decode("@not-an-ip").is_err());
    }

    #[test]
    fn decodes_text_with_semicolons_in_payload() {
        let msg = decode("!10.0.0.1;10.0.0.3;hello;world").unwrap();
        assert_eq!(
            msg,
            Message::Text {
                origin: ip("10.0.0.1"),
                dest: ip("10.0.0.3"),
                payload: "hello;world".to_string(),
            }
        );
    }

    #[test]
    fn rejects_text_missing_fields() {
        assert!(matches!(
            decode("!10.0.0.1;10.0.0.3"),
            Err(CodecError::MalformedText(_))
        ));
    }

    #[test]
    fn decodes_empty_route_vector() {
        let msg = decode("").unwrap();
        assert_eq!(msg, Message::RouteVector(HashMap::new()));
    }

    #[test]
    fn decodes_route_vector_and_skips_malformed_records() {
        let msg = decode("*10.0.0.1;1*garbage*10.0.0.2;3").unwrap();
        let Message::RouteVector(map) = msg else {
            panic!("expected route vector");
        };
        assert_eq!(map.len(), 2);
        assert_eq!(map[&ip("10.0.0.1")], 1);
        assert_eq!(map[&ip("10.0.0.2")], 3);
    }

    #[test]
    fn route_vector_round_trip() {
        let entries = vec![(ip("10.0.0.1"), 1u32), (ip("10.0.0.2"), 4u32)];
        let encoded = encode_route_vector(entries.iter().map(|(a, m)| (a, *m)));
        let Message::RouteVector(decoded) = decode(&encoded).unwrap() else {
            panic!("expected route vector");
        };
        for (addr, metric) in &entries {
            assert_eq!(decoded[addr], *metric);
        }
    }

    #[test]
    fn presence_round_trip() {
        let encoded = encode_presence(ip("192.168.1.1"));
        assert_eq!(decode(&encoded).unwrap(), Message::Presence(ip("192.168.1.1")));
    }

    #[test]
    fn text_round_trip() {
        let encoded = encode_text(ip("10.0.0.1"), ip("10.0.0.2"), "payload;with;semis");
        assert_eq!(
            decode(&encoded).unwrap(),
            Message::Text {
                origin: ip("10.0.0.1"),
                dest: ip("10.0.0.2"),
                payload: "payload;with;semis".to_string(),
            }
        );
    }
}
