//! IPv6 fixed header.

use std::net::Ipv6Addr;

use super::FormatError;

/// Size of the IPv6 fixed header.
pub const IP6_HEADER_SIZE: usize = 40;

/// Next-header value marking a control-plane payload.
///
/// Taken from the experimental range (RFC 3692), so it never collides with
/// real upper-layer protocols carried for the tunnel.
pub const CONTROL_NEXT_HEADER: u8 = 0xfe;

/// Hop limit written on headers this node builds.
pub const DEFAULT_HOP_LIMIT: u8 = 42;

/// Parsed IPv6 fixed header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ip6Header {
    pub traffic_class: u8,
    /// Flow label (20 bits).
    pub flow_label: u32,
    pub payload_length: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
}

impl Ip6Header {
    /// A header for `payload_len` bytes from `source` to `destination`.
    pub fn new(
        source: Ipv6Addr,
        destination: Ipv6Addr,
        next_header: u8,
        payload_len: usize,
    ) -> Result<Self, FormatError> {
        let payload_length =
            u16::try_from(payload_len).map_err(|_| FormatError::PayloadTooLarge(payload_len))?;
        Ok(Self {
            traffic_class: 0,
            flow_label: 0,
            payload_length,
            next_header,
            hop_limit: DEFAULT_HOP_LIMIT,
            source,
            destination,
        })
    }

    /// Parse the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        if data.len() < IP6_HEADER_SIZE {
            return Err(FormatError::Truncated {
                layer: "IPv6 header",
                expected: IP6_HEADER_SIZE,
                got: data.len(),
            });
        }
        let version = data[0] >> 4;
        if version != 6 {
            return Err(FormatError::BadIpVersion(version));
        }

        let word = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let mut source = [0u8; 16];
        source.copy_from_slice(&data[8..24]);
        let mut destination = [0u8; 16];
        destination.copy_from_slice(&data[24..40]);

        Ok(Self {
            traffic_class: ((word >> 20) & 0xff) as u8,
            flow_label: word & 0x000f_ffff,
            payload_length: u16::from_be_bytes([data[4], data[5]]),
            next_header: data[6],
            hop_limit: data[7],
            source: Ipv6Addr::from(source),
            destination: Ipv6Addr::from(destination),
        })
    }

    /// Parse a complete packet and check the declared payload length
    /// against the bytes actually present.
    pub fn parse_packet(packet: &[u8]) -> Result<Self, FormatError> {
        let header = Self::parse(packet)?;
        let actual = packet.len() - IP6_HEADER_SIZE;
        if header.payload_length as usize != actual {
            return Err(FormatError::PayloadLengthMismatch {
                declared: header.payload_length as usize,
                actual,
            });
        }
        Ok(header)
    }

    /// Whether this header carries a control-plane payload.
    pub fn is_control(&self) -> bool {
        self.next_header == CONTROL_NEXT_HEADER
    }

    /// Serialize to wire format.
    pub fn encode(&self) -> [u8; IP6_HEADER_SIZE] {
        let mut out = [0u8; IP6_HEADER_SIZE];
        let word = (6u32 << 28)
            | ((self.traffic_class as u32) << 20)
            | (self.flow_label & 0x000f_ffff);
        out[0..4].copy_from_slice(&word.to_be_bytes());
        out[4..6].copy_from_slice(&self.payload_length.to_be_bytes());
        out[6] = self.next_header;
        out[7] = self.hop_limit;
        out[8..24].copy_from_slice(&self.source.octets());
        out[24..40].copy_from_slice(&self.destination.octets());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Ipv6Addr {
        Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, last as u16)
    }

    #[test]
    fn test_encode_parse() {
        let mut header = Ip6Header::new(addr(1), addr(2), 17, 8).unwrap();
        header.traffic_class = 0xb8;
        header.flow_label = 0x12345;

        let bytes = header.encode();
        assert_eq!(bytes[0] >> 4, 6);
        assert_eq!(&bytes[4..6], &[0, 8]);
        assert_eq!(Ip6Header::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_rejects_ipv4() {
        let mut bytes = Ip6Header::new(addr(1), addr(2), 17, 0).unwrap().encode();
        bytes[0] = 0x45;
        assert_eq!(Ip6Header::parse(&bytes), Err(FormatError::BadIpVersion(4)));
    }

    #[test]
    fn test_parse_packet_checks_length() {
        let header = Ip6Header::new(addr(1), addr(2), 17, 4).unwrap();
        let mut packet = header.encode().to_vec();
        packet.extend_from_slice(&[1, 2, 3]);

        assert_eq!(
            Ip6Header::parse_packet(&packet),
            Err(FormatError::PayloadLengthMismatch {
                declared: 4,
                actual: 3
            })
        );

        packet.push(4);
        assert_eq!(Ip6Header::parse_packet(&packet).unwrap(), header);
    }

    #[test]
    fn test_payload_too_large() {
        assert_eq!(
            Ip6Header::new(addr(1), addr(2), 17, 70_000),
            Err(FormatError::PayloadTooLarge(70_000))
        );
    }
}
