//! Link Policy commands (OGF 0x02).

use crate::codec::WriteTo;
use crate::command::Command;

pub const OGF: u16 = 0x02;

pub const OCF_SNIFF_MODE: u16 = 0x0003;
pub const OCF_EXIT_SNIFF_MODE: u16 = 0x0004;
pub const OCF_WRITE_LINK_POLICY_SETTINGS: u16 = 0x000d;

#[derive(Debug, Clone, Copy)]
pub struct SniffMode {
    pub connection_handle: u16,
    pub sniff_max_interval: u16,
    pub sniff_min_interval: u16,
    pub sniff_attempt: u16,
    pub sniff_timeout: u16,
}

impl Command for SniffMode {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_SNIFF_MODE)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(10);
        buf.write_as(self.connection_handle).ok()?;
        buf.write_as(self.sniff_max_interval).ok()?;
        buf.write_as(self.sniff_min_interval).ok()?;
        buf.write_as(self.sniff_attempt).ok()?;
        buf.write_as(self.sniff_timeout).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExitSniffMode {
    pub connection_handle: u16,
}

impl Command for ExitSniffMode {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_EXIT_SNIFF_MODE)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(2);
        buf.write_as(self.connection_handle).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteLinkPolicySettings {
    pub connection_handle: u16,
    pub link_policy_settings: u16,
}

impl Command for WriteLinkPolicySettings {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_WRITE_LINK_POLICY_SETTINGS)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(4);
        buf.write_as(self.connection_handle).ok()?;
        buf.write_as(self.link_policy_settings).ok()?;
        Some(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_sniff_mode_has_two_byte_body() {
        let cmd = ExitSniffMode {
            connection_handle: 0x0041,
        };
        assert_eq!(cmd.serialize_params().unwrap().len(), 2);
    }
}
