//! MPEG-TS packet header decoding.

/// TS packet size in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// TS sync byte (0x47).
pub const SYNC_BYTE: u8 = 0x47;

/// Null packet PID (stuffing).
pub const NULL_PID: u16 = 0x1FFF;

/// The 4-byte header of a TS packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    /// Transport error indicator.
    pub transport_error: bool,
    /// Payload unit start indicator.
    pub payload_unit_start: bool,
    /// Packet Identifier (13 bits).
    pub pid: u16,
    /// Transport scrambling control (2 bits).
    pub scrambling_control: u8,
    /// Adaptation field control (2 bits).
    pub adaptation_field_control: u8,
    /// Continuity counter (4 bits).
    pub continuity_counter: u8,
}

impl TsHeader {
    /// Decode the header of `packet`. `None` if it is short or lacks the sync byte.
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < 4 || packet[0] != SYNC_BYTE {
            return None;
        }
        Some(Self {
            transport_error: packet[1] & 0x80 != 0,
            payload_unit_start: packet[1] & 0x40 != 0,
            pid: ((packet[1] as u16 & 0x1F) << 8) | packet[2] as u16,
            scrambling_control: (packet[3] >> 6) & 0x03,
            adaptation_field_control: (packet[3] >> 4) & 0x03,
            continuity_counter: packet[3] & 0x0F,
        })
    }

    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control & 0x02 != 0
    }

    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0x01 != 0
    }

    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control != 0
    }
}

/// Payload bytes of a full 188-byte packet, after any adaptation field.
pub fn payload(packet: &[u8]) -> &[u8] {
    let Some(header) = TsHeader::parse(packet) else {
        return &[];
    };
    if !header.has_payload() || packet.len() < TS_PACKET_SIZE {
        return &[];
    }
    let offset = if header.has_adaptation_field() {
        5 + packet[4] as usize
    } else {
        4
    };
    if offset >= TS_PACKET_SIZE {
        return &[];
    }
    &packet[offset..TS_PACKET_SIZE]
}

/// Build a packet for `pid` whose payload is `fill`. Used by tests across the crate.
#[cfg(test)]
pub(crate) fn make_packet(pid: u16, pusi: bool, cc: u8, fill: u8) -> Vec<u8> {
    let mut packet = vec![fill; TS_PACKET_SIZE];
    packet[0] = SYNC_BYTE;
    packet[1] = ((pid >> 8) as u8 & 0x1F) | if pusi { 0x40 } else { 0 };
    packet[2] = pid as u8;
    packet[3] = 0x10 | (cc & 0x0F);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_null_packet() {
        let mut packet = [0u8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x1F;
        packet[2] = 0xFF;
        packet[3] = 0x10;

        let header = TsHeader::parse(&packet).unwrap();
        assert_eq!(header.pid, NULL_PID);
        assert!(!header.transport_error);
        assert!(header.has_payload());
        assert!(!header.has_adaptation_field());
    }

    #[test]
    fn test_parse_flags() {
        let mut packet = [0u8; 188];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x80 | 0x40 | 0x01; // error, PUSI, PID high bits
        packet[2] = 0x00;
        packet[3] = 0xC0 | 0x30 | 0x07;

        let header = TsHeader::parse(&packet).unwrap();
        assert!(header.transport_error);
        assert!(header.payload_unit_start);
        assert_eq!(header.pid, 0x0100);
        assert_eq!(header.scrambling_control, 3);
        assert!(header.is_scrambled());
        assert!(header.has_adaptation_field());
        assert_eq!(header.continuity_counter, 7);
    }

    #[test]
    fn test_invalid_sync_byte() {
        let packet = [0u8; 188];
        assert!(TsHeader::parse(&packet).is_none());
        assert!(TsHeader::parse(&[SYNC_BYTE, 0, 0]).is_none());
    }

    #[test]
    fn test_payload_skips_adaptation_field() {
        let mut packet = make_packet(0x100, true, 0, 0xAA);
        packet[3] = 0x30;
        packet[4] = 7;
        assert_eq!(payload(&packet).len(), 188 - 5 - 7);

        packet[3] = 0x20;
        assert!(payload(&packet).is_empty());

        let plain = make_packet(0x100, false, 0, 0xAA);
        assert_eq!(payload(&plain).len(), 184);
    }
}
