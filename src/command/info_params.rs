//! Informational Parameters commands (OGF 0x04).

use crate::codec::WriteTo;
use crate::command::{unit_command, Command};

pub const OGF: u16 = 0x04;

pub const OCF_READ_LOCAL_SUPPORTED_FEATURES: u16 = 0x0003;
pub const OCF_READ_LOCAL_EXTENDED_FEATURES: u16 = 0x0004;
pub const OCF_READ_BD_ADDR: u16 = 0x0009;

unit_command!(ReadLocalSupportedFeatures, OGF, OCF_READ_LOCAL_SUPPORTED_FEATURES);
unit_command!(
    /// The coordinator's bootstrap step for every device it opens:
    /// establish the adapter's own address before spawning a worker.
    ReadBdAddr,
    OGF,
    OCF_READ_BD_ADDR
);

#[derive(Debug, Clone, Copy)]
pub struct ReadLocalExtendedFeatures {
    pub page_number: u8,
}

impl Command for ReadLocalExtendedFeatures {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, OCF_READ_LOCAL_EXTENDED_FEATURES)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(1);
        buf.write_as(self.page_number).ok()?;
        Some(buf)
    }
}
