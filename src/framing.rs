//! Packet framing: given the raw bytes BlueZ hands back from a
//! `recv()` on an HCI socket (the first byte is always the packet-type
//! tag), work out how many bytes make up one complete frame.
//!
//! This is the direct counterpart of `bluetool.core.get_hci_pkt_size`,
//! which dispatches on the same four tags.

use crate::error::{HciError, Result};

pub const HCI_COMMAND_PKT: u8 = 0x01;
pub const HCI_ACLDATA_PKT: u8 = 0x02;
pub const HCI_SCODATA_PKT: u8 = 0x03;
pub const HCI_EVENT_PKT: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Command,
    AclData,
    ScoData,
    Event,
}

impl PacketType {
    pub fn tag(self) -> u8 {
        match self {
            PacketType::Command => HCI_COMMAND_PKT,
            PacketType::AclData => HCI_ACLDATA_PKT,
            PacketType::ScoData => HCI_SCODATA_PKT,
            PacketType::Event => HCI_EVENT_PKT,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            HCI_COMMAND_PKT => Ok(PacketType::Command),
            HCI_ACLDATA_PKT => Ok(PacketType::AclData),
            HCI_SCODATA_PKT => Ok(PacketType::ScoData),
            HCI_EVENT_PKT => Ok(PacketType::Event),
            other => Err(HciError::ProtocolError(other)),
        }
    }
}

/// Work out how many bytes, starting at `buf[0]` (the type tag), make up one
/// complete frame. Returns `Ok(None)` when `buf` doesn't yet contain enough
/// header bytes to know the answer — the caller should read more and try
/// again, exactly as `bluetool.core.HCISock.has_hci_pkt_in_buf` does against
/// its reassembly buffer.
pub fn frame_size(buf: &[u8]) -> Result<Option<usize>> {
    if buf.is_empty() {
        return Ok(None);
    }
    let ptype = PacketType::from_tag(buf[0])?;
    let header_len = match ptype {
        PacketType::Command => 4, // tag + opcode(2) + plen(1)
        PacketType::AclData => 5, // tag + handle/flags(2) + data_len(2)
        PacketType::ScoData => 4, // tag + handle/flags(2) + data_len(1)
        PacketType::Event => 3,   // tag + event code(1) + plen(1)
    };
    if buf.len() < header_len {
        return Ok(None);
    }
    let payload_len = match ptype {
        PacketType::Command => buf[3] as usize,
        PacketType::AclData => u16::from_le_bytes([buf[3], buf[4]]) as usize,
        PacketType::ScoData => buf[3] as usize,
        PacketType::Event => buf[2] as usize,
    };
    Ok(Some(header_len + payload_len))
}

/// Split the first complete frame off the front of `buf`, returning
/// `(packet_type, frame_bytes, remainder)`, or `None` if `buf` does not yet
/// contain a complete frame.
pub fn split_frame(buf: &[u8]) -> Result<Option<(PacketType, &[u8], &[u8])>> {
    match frame_size(buf)? {
        Some(size) if buf.len() >= size => {
            let ptype = PacketType::from_tag(buf[0])?;
            Ok(Some((ptype, &buf[..size], &buf[size..])))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_frame_size_matches_plen() {
        // type=event, code=0x0e, plen=4, then 4 bytes of payload.
        let buf = [HCI_EVENT_PKT, 0x0e, 4, 1, 2, 3, 4];
        assert_eq!(frame_size(&buf).unwrap(), Some(7));
    }

    #[test]
    fn partial_header_reports_unknown_size() {
        let buf = [HCI_EVENT_PKT, 0x0e];
        assert_eq!(frame_size(&buf).unwrap(), None);
    }

    #[test]
    fn partial_payload_reports_not_yet_complete() {
        let buf = [HCI_EVENT_PKT, 0x0e, 4, 1, 2];
        assert_eq!(split_frame(&buf).unwrap(), None);
    }

    #[test]
    fn acl_frame_size_uses_16_bit_length() {
        let mut buf = vec![HCI_ACLDATA_PKT, 0x01, 0x20, 3, 0];
        buf.extend_from_slice(&[1, 2, 3]);
        assert_eq!(frame_size(&buf).unwrap(), Some(8));
    }

    #[test]
    fn unknown_tag_is_a_protocol_error() {
        let buf = [0x7f, 0, 0, 0];
        assert!(matches!(frame_size(&buf), Err(HciError::ProtocolError(0x7f))));
    }

    #[test]
    fn split_frame_leaves_remainder_for_next_packet() {
        let buf = [HCI_EVENT_PKT, 0x0e, 1, 0xaa, HCI_EVENT_PKT, 0x0e, 0];
        let (ptype, frame, rest) = split_frame(&buf).unwrap().unwrap();
        assert_eq!(ptype, PacketType::Event);
        assert_eq!(frame, &buf[..4]);
        assert_eq!(rest, &buf[4..]);
    }
}
