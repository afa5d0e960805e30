//! Vendor-specific commands (OGF 0x3f). Controllers are free to define
//! whatever they like here; this crate can send the bytes but has no
//! built-in decoder for the return parameters — callers register one with
//! [`crate::event::CommandCompleteRegistry::register`] keyed by the
//! command's opcode.

use crate::command::Command;

pub const OGF: u16 = 0x3f;

#[derive(Debug, Clone)]
pub struct VendorCommand {
    pub ocf: u16,
    pub params: Vec<u8>,
}

impl Command for VendorCommand {
    fn opcode(&self) -> u16 {
        crate::command::opcode_pack(OGF, self.ocf)
    }

    fn serialize_params(&self) -> Option<Vec<u8>> {
        if self.params.is_empty() {
            None
        } else {
            Some(self.params.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_opcode_uses_ogf_3f() {
        let cmd = VendorCommand {
            ocf: 0x0001,
            params: vec![],
        };
        assert_eq!(cmd.opcode() >> 10, OGF);
    }
}
