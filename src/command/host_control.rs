//! Host Controller & Baseband commands (OGF 0x03).

use crate::codec::WriteTo;
use crate::command::{unit_command, Command};

pub const OGF: u16 = 0x03;

pub const OCF_SET_EVENT_MASK: u16 = 0x0001;
pub const OCF_RESET: u16 = 0x0003;
pub const OCF_READ_STORED_LINK_KEY: u16 = 0x000d;
pub const OCF_WRITE_PAGE_TIMEOUT: u16 = 0x0018;
pub const OCF_READ_SCAN_ENABLE: u16 = 0x0019;
pub const OCF_WRITE_SCAN_ENABLE: u16 = 0x001a;
pub const OCF_WRITE_PAGE_SCAN_ACTIVITY: u16 = 0x001c;
pub const OCF_READ_INQUIRY_MODE: u16 = 0x0044;
pub const OCF_WRITE_INQUIRY_MODE: u16 = 0x0045;

unit_command!(
    /// Resets the link layer, link manager and the controller's internal
    /// state. The very first thing any BR/EDR or LE scenario does.
    Reset,
    OGF,
    OCF_RESET
);

unit_command!(ReadScanEnable, OGF, OCF_READ_SCAN_ENABLE);
unit_command!(ReadInquiryMode, OGF, OCF_READ_INQUIRY_MODE);

#[derive(Debug, Clone, Copy)]
pub struct SetEventMask {
    pub mask: u64,
}

impl Command for SetEventMask {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_SET_EVENT_MASK)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(8);
        buf.write_as(self.mask).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadStoredLinkKey {
    pub bd_addr: [u8; 6],
    pub read_all_flag: u8,
}

impl Command for ReadStoredLinkKey {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_READ_STORED_LINK_KEY)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(7);
        buf.write_as(self.bd_addr).ok()?;
        buf.write_as(self.read_all_flag).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WritePageTimeout {
    pub timeout: u16,
}

impl Command for WritePageTimeout {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_WRITE_PAGE_TIMEOUT)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(2);
        buf.write_as(self.timeout).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteScanEnable {
    pub scan_enable: u8,
}

impl Command for WriteScanEnable {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_WRITE_SCAN_ENABLE)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(1);
        buf.write_as(self.scan_enable).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WritePageScanActivity {
    pub interval: u16,
    pub window: u16,
}

impl Command for WritePageScanActivity {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_WRITE_PAGE_SCAN_ACTIVITY)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(4);
        buf.write_as(self.interval).ok()?;
        buf.write_as(self.window).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteInquiryMode {
    pub mode: u8,
}

impl Command for WriteInquiryMode {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_WRITE_INQUIRY_MODE)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(1);
        buf.write_as(self.mode).ok()?;
        Some(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_has_no_parameters() {
        assert_eq!(Reset.serialize_params(), None);
    }

    #[test]
    fn set_event_mask_is_eight_bytes() {
        let cmd = SetEventMask { mask: 0xffff_ffff_ffff_ffff };
        assert_eq!(cmd.serialize_params().unwrap().len(), 8);
    }
}
