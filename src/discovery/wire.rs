//! Discovery message codec.
//!
//! ```text
//! [msg_type:1][txid:4 LE][body]
//!
//! 0x40 FindSupernode    (no body)
//! 0x41 GetPeers         (no body)
//! 0x42 SupernodeReply   [count:1][addr]*
//! 0x43 PeersReply       [count:1][addr]*
//!
//! addr = [family:1 (4|6)][ip:4|16][port:2 BE]
//! ```

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;

pub const MSG_FIND_SUPERNODE: u8 = 0x40;
pub const MSG_GET_PEERS: u8 = 0x41;
pub const MSG_SUPERNODE_REPLY: u8 = 0x42;
pub const MSG_PEERS_REPLY: u8 = 0x43;

/// Most addresses one message can carry.
pub const MAX_ADDRS_PER_MESSAGE: usize = u8::MAX as usize;

const HEADER_SIZE: usize = 5;

/// Errors decoding discovery messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid message type: 0x{0:02x}")]
    InvalidMessageType(u8),

    #[error("message too short: expected at least {expected}, got {got}")]
    MessageTooShort { expected: usize, got: usize },

    #[error("malformed message: {0}")]
    Malformed(String),
}

/// What a query asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Phase 1: "do you know a supernode?"
    FindSupernode,
    /// Phase 2: "who are your peers?"
    GetPeers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Query {
    pub txid: u32,
    pub kind: QueryKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyBody {
    /// Supernodes known to the responder; empty if none.
    Supernodes(Vec<SocketAddr>),
    /// The responder's peers.
    Peers(Vec<SocketAddr>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub txid: u32,
    pub body: ReplyBody,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoveryMessage {
    Query(Query),
    Reply(Reply),
}

impl DiscoveryMessage {
    /// Encode to wire format. Address lists are cut at
    /// [`MAX_ADDRS_PER_MESSAGE`].
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + 1);
        match self {
            DiscoveryMessage::Query(query) => {
                buf.push(match query.kind {
                    QueryKind::FindSupernode => MSG_FIND_SUPERNODE,
                    QueryKind::GetPeers => MSG_GET_PEERS,
                });
                buf.extend_from_slice(&query.txid.to_le_bytes());
            }
            DiscoveryMessage::Reply(reply) => {
                let (msg_type, addrs) = match &reply.body {
                    ReplyBody::Supernodes(addrs) => (MSG_SUPERNODE_REPLY, addrs),
                    ReplyBody::Peers(addrs) => (MSG_PEERS_REPLY, addrs),
                };
                buf.push(msg_type);
                buf.extend_from_slice(&reply.txid.to_le_bytes());
                let count = addrs.len().min(MAX_ADDRS_PER_MESSAGE);
                buf.push(count as u8);
                for addr in &addrs[..count] {
                    encode_addr(addr, &mut buf);
                }
            }
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::MessageTooShort {
                expected: HEADER_SIZE,
                got: data.len(),
            });
        }
        let msg_type = data[0];
        let txid = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
        let body = &data[HEADER_SIZE..];

        let query = |kind| {
            if body.is_empty() {
                Ok(DiscoveryMessage::Query(Query { txid, kind }))
            } else {
                Err(ProtocolError::Malformed(format!(
                    "{} trailing bytes after query",
                    body.len()
                )))
            }
        };

        match msg_type {
            MSG_FIND_SUPERNODE => query(QueryKind::FindSupernode),
            MSG_GET_PEERS => query(QueryKind::GetPeers),
            MSG_SUPERNODE_REPLY => Ok(DiscoveryMessage::Reply(Reply {
                txid,
                body: ReplyBody::Supernodes(decode_addr_list(body)?),
            })),
            MSG_PEERS_REPLY => Ok(DiscoveryMessage::Reply(Reply {
                txid,
                body: ReplyBody::Peers(decode_addr_list(body)?),
            })),
            other => Err(ProtocolError::InvalidMessageType(other)),
        }
    }
}

fn encode_addr(addr: &SocketAddr, buf: &mut Vec<u8>) {
    match addr.ip() {
        IpAddr::V4(ip) => {
            buf.push(4);
            buf.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.push(6);
            buf.extend_from_slice(&ip.octets());
        }
    }
    buf.extend_from_slice(&addr.port().to_be_bytes());
}

fn decode_addr_list(body: &[u8]) -> Result<Vec<SocketAddr>, ProtocolError> {
    let (&count, mut rest) = body.split_first().ok_or(ProtocolError::MessageTooShort {
        expected: HEADER_SIZE + 1,
        got: HEADER_SIZE,
    })?;

    let mut addrs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (addr, consumed) = decode_addr(rest)?;
        addrs.push(addr);
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        return Err(ProtocolError::Malformed(format!(
            "{} trailing bytes after address list",
            rest.len()
        )));
    }
    Ok(addrs)
}

fn decode_addr(data: &[u8]) -> Result<(SocketAddr, usize), ProtocolError> {
    let family = *data.first().ok_or_else(|| ProtocolError::Malformed("missing address".into()))?;
    let ip_len = match family {
        4 => 4,
        6 => 16,
        other => return Err(ProtocolError::Malformed(format!("address family {other}"))),
    };
    let total = 1 + ip_len + 2;
    if data.len() < total {
        return Err(ProtocolError::Malformed(format!(
            "address needs {total} bytes, have {}",
            data.len()
        )));
    }

    let ip = if family == 4 {
        let mut octets = [0u8; 4];
        octets.copy_from_slice(&data[1..5]);
        IpAddr::V4(Ipv4Addr::from(octets))
    } else {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&data[1..17]);
        IpAddr::V6(Ipv6Addr::from(octets))
    };
    let port = u16::from_be_bytes([data[1 + ip_len], data[2 + ip_len]]);
    Ok((SocketAddr::new(ip, port), total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_layout() {
        let msg = DiscoveryMessage::Query(Query {
            txid: 0x0102_0304,
            kind: QueryKind::GetPeers,
        });
        assert_eq!(msg.encode(), vec![MSG_GET_PEERS, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(DiscoveryMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_reply_layout() {
        let msg = DiscoveryMessage::Reply(Reply {
            txid: 7,
            body: ReplyBody::Peers(vec![
                "192.0.2.1:4000".parse().unwrap(),
                "[2001:db8::2]:443".parse().unwrap(),
            ]),
        });
        let bytes = msg.encode();
        assert_eq!(bytes.len(), 5 + 1 + 7 + 19);
        assert_eq!(&bytes[5..13], &[2, 4, 192, 0, 2, 1, 0x0f, 0xa0]);
        assert_eq!(DiscoveryMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_empty_supernode_reply() {
        let msg = DiscoveryMessage::Reply(Reply {
            txid: 1,
            body: ReplyBody::Supernodes(Vec::new()),
        });
        assert_eq!(msg.encode(), vec![MSG_SUPERNODE_REPLY, 1, 0, 0, 0, 0]);
        assert_eq!(DiscoveryMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            DiscoveryMessage::decode(&[MSG_GET_PEERS, 0, 0]),
            Err(ProtocolError::MessageTooShort {
                expected: 5,
                got: 3
            })
        );
        assert_eq!(
            DiscoveryMessage::decode(&[0x99, 0, 0, 0, 0]),
            Err(ProtocolError::InvalidMessageType(0x99))
        );
        // Count says one address, none present.
        assert!(matches!(
            DiscoveryMessage::decode(&[MSG_PEERS_REPLY, 0, 0, 0, 0, 1]),
            Err(ProtocolError::Malformed(_))
        ));
        // Unknown family.
        assert!(matches!(
            DiscoveryMessage::decode(&[MSG_PEERS_REPLY, 0, 0, 0, 0, 1, 5, 0, 0]),
            Err(ProtocolError::Malformed(_))
        ));
        // Trailing bytes.
        assert!(matches!(
            DiscoveryMessage::decode(&[MSG_FIND_SUPERNODE, 0, 0, 0, 0, 1]),
            Err(ProtocolError::Malformed(_))
        ));
    }
}
