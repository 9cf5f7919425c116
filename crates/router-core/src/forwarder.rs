//! Deliver-locally vs forward-to-next-hop decision for text messages.
//!
//! Kept as a pure function so it is directly unit-testable without a
//! socket or a running engine: it takes the decoded message plus a
//! next-hop lookup and returns an action for the caller to execute. The
//! forwarder itself never does I/O, never rewrites `origin`, and never
//! touches the routing table — callers pass in whatever snapshot or live
//! lookup they have.

use std::net::IpAddr;

/// What the engine should do with one text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardAction {
    /// `dest` is this node; hand `origin`/`payload` to the operator sink.
    DeliverLocally { origin: IpAddr, payload: String },
    /// Forward the original, unmodified datagram to `next_hop`.
    ForwardTo { next_hop: IpAddr, raw: String },
    /// No route to `dest`; the message is dropped.
    NoRoute { dest: IpAddr },
}

/// Decide what to do with a text message `!origin;dest;payload` whose raw
/// wire form was `raw`.
///
/// `next_hop_for` is a lookup over the current routing table (a closure so
/// callers can pass either a live table reference or a cheap snapshot).
/// There is no hop-count field in the text format: loop prevention relies
/// entirely on the table being loop-free (see `table::RoutingTable`), not
/// on anything the forwarder does.
pub fn forward(
    self_addr: IpAddr,
    origin: IpAddr,
    dest: IpAddr,
    payload: &str,
    raw: &str,
    next_hop_for: impl FnOnce(&IpAddr) -> Option<IpAddr>,
) -> ForwardAction {
    if dest == self_addr {
        return ForwardAction::DeliverLocally {
            origin,
            payload: payload.to_string(),
        };
    }
    match next_hop_for(&dest) {
        Some(next_hop) => ForwardAction::ForwardTo {
            next_hop,
            raw: raw.to_string(),
        },
        None => ForwardAction::NoRoute { dest },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn delivers_locally_when_dest_is_self() {
        let action = forward(
            ip("10.0.0.3"),
            ip("10.0.0.1"),
            ip("10.0.0.3"),
            "hello",
            "!10.0.0.1;10.0.0.3;hello",
            |_| Some(ip("10.0.0.2")),
        );
        assert_eq!(
            action,
            ForwardAction::DeliverLocally {
                origin: ip("10.0.0.1"),
                payload: "hello".to_string(),
            }
        );
    }

    #[test]
    fn forwards_verbatim_via_next_hop() {
        let raw = "!10.0.0.1;10.0.0.3;hello";
        let action = forward(
            ip("10.0.0.2"),
            ip("10.0.0.1"),
            ip("10.0.0.3"),
            "hello",
            raw,
            |dest| {
                assert_eq!(*dest, ip("10.0.0.3"));
                Some(ip("10.0.0.5"))
            },
        );
        assert_eq!(
            action,
            ForwardAction::ForwardTo {
                next_hop: ip("10.0.0.5"),
                raw: raw.to_string(),
            }
        );
    }

    #[test]
    fn drops_when_no_route() {
        let action = forward(
            ip("10.0.0.2"),
            ip("10.0.0.1"),
            ip("10.0.0.9"),
            "hello",
            "!10.0.0.1;10.0.0.9;hello",
            |_| None,
        );
        assert_eq!(action, ForwardAction::NoRoute { dest: ip("10.0.0.9") });
    }
}
