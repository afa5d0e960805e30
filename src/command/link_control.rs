//! Link Control commands (OGF 0x01).

use crate::codec::WriteTo;
use crate::command::Command;

pub const OGF: u16 = 0x01;

pub const OCF_INQUIRY: u16 = 0x0001;
pub const OCF_CREATE_CONNECTION: u16 = 0x0005;
pub const OCF_DISCONNECT: u16 = 0x0006;
pub const OCF_ACCEPT_CONNECTION_REQUEST: u16 = 0x0009;
pub const OCF_READ_REMOTE_VERSION_INFORMATION: u16 = 0x001d;

/// General/limited inquiry access code, inquiry length in 1.28s units, and
/// the maximum number of responses (0 = unlimited).
#[derive(Debug, Clone, Copy)]
pub struct Inquiry {
    pub lap: u32,
    pub inquiry_length: u8,
    pub num_responses: u8,
}

impl Command for Inquiry {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_INQUIRY)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(5);
        crate::codec::write_u24(self.lap & 0x00ff_ffff, &mut buf).ok()?;
        buf.write_as(self.inquiry_length).ok()?;
        buf.write_as(self.num_responses).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CreateConnection {
    pub bd_addr: [u8; 6],
    pub packet_type: u16,
    pub page_scan_repetition_mode: u8,
    pub clock_offset: u16,
    pub allow_role_switch: bool,
}

impl Command for CreateConnection {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_CREATE_CONNECTION)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(13);
        buf.write_as(self.bd_addr).ok()?;
        buf.write_as(self.packet_type).ok()?;
        buf.write_as(self.page_scan_repetition_mode).ok()?;
        buf.write_as(0u8).ok()?; // reserved
        buf.write_as(self.clock_offset).ok()?;
        buf.write_as(self.allow_role_switch as u8).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Disconnect {
    pub connection_handle: u16,
    pub reason: u8,
}

impl Command for Disconnect {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_DISCONNECT)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(3);
        buf.write_as(self.connection_handle).ok()?;
        buf.write_as(self.reason).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AcceptConnectionRequest {
    pub bd_addr: [u8; 6],
    pub role: u8,
}

impl Command for AcceptConnectionRequest {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_ACCEPT_CONNECTION_REQUEST)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(7);
        buf.write_as(self.bd_addr).ok()?;
        buf.write_as(self.role).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadRemoteVersionInformation {
    pub connection_handle: u16,
}

impl Command for ReadRemoteVersionInformation {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_READ_REMOTE_VERSION_INFORMATION)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(2);
        buf.write_as(self.connection_handle).ok()?;
        Some(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inquiry_serialises_lap_as_three_bytes() {
        let cmd = Inquiry {
            lap: 0x9e8b33,
            inquiry_length: 8,
            num_responses: 0,
        };
        assert_eq!(cmd.serialize_params().unwrap(), vec![0x33, 0x8b, 0x9e, 8, 0]);
    }

    #[test]
    fn disconnect_opcode_matches_ogf_ocf() {
        let cmd = Disconnect {
            connection_handle: 0x0001,
            reason: 0x13,
        };
        assert_eq!(cmd.opcode(), crate::command::opcode_pack(OGF, OCF_DISCONNECT));
    }
}
