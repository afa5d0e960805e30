//! Command Complete return-parameter parsing.
//!
//! BlueZ's Command Complete event carries an opcode and then an
//! opcode-specific payload; the decoder for that payload cannot be chosen
//! by the event code alone. `bluetool.event` solves this with a dict
//! keyed by `cmd_opcode` (`_cmd_complt_evt_param_parser`); this module is
//! the same idea with a `HashMap` and `fn` pointers, extensible at runtime
//! so a vendor command's caller can register its own parser.

use std::collections::HashMap;

use crate::codec::ReadAs;
use crate::command::{host_control, info_params, le, link_control};
use crate::error::{HciError, Result};

#[derive(Debug, Clone)]
pub enum ReturnParams {
    /// Every command whose only return value is the status byte.
    Status { status: u8 },
    ReadBdAddr { status: u8, bd_addr: [u8; 6] },
    ReadLocalSupportedFeatures { status: u8, features: [u8; 8] },
    ReadLocalExtendedFeatures {
        status: u8,
        page_number: u8,
        max_page_number: u8,
        features: [u8; 8],
    },
    ReadStoredLinkKey {
        status: u8,
        max_num_keys: u16,
        num_keys_read: u16,
    },
    ReadScanEnable { status: u8, scan_enable: u8 },
    ReadInquiryMode { status: u8, mode: u8 },
    LeReadBufferSize {
        status: u8,
        le_acl_data_packet_length: u16,
        total_num_le_acl_data_packets: u8,
    },
    LeReadWhiteListSize { status: u8, size: u8 },
    LeReadSuggestedDefaultDataLength {
        status: u8,
        tx_octets: u16,
        tx_time: u16,
    },
    LeReadMaximumAdvertisingDataLength { status: u8, max_advertising_data_length: u16 },
    LeReadNumberOfSupportedAdvertisingSets { status: u8, num_supported_advertising_sets: u8 },
    LeConnectionHandle { status: u8, connection_handle: u16 },
    /// A vendor command whose caller registered a parser returning
    /// arbitrary decoded bytes rather than one of the named shapes above.
    Raw { status: u8, payload: Vec<u8> },
}

pub type ReturnParamsParser = fn(&[u8]) -> Result<ReturnParams>;

fn parse_status(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("status", 1, buf)?;
    Ok(ReturnParams::Status { status: buf[0] })
}

fn parse_read_bd_addr(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("read_bd_addr return params", 7, buf)?;
    let mut cursor = buf;
    let (status, _): (u8, _) = cursor.read_as()?;
    let (bd_addr, _): ([u8; 6], _) = crate::codec::read_array(&mut cursor)?;
    Ok(ReturnParams::ReadBdAddr { status, bd_addr })
}

fn parse_read_local_supported_features(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("read_local_supported_features return params", 9, buf)?;
    let mut cursor = buf;
    let (status, _): (u8, _) = cursor.read_as()?;
    let (features, _): ([u8; 8], _) = crate::codec::read_array(&mut cursor)?;
    Ok(ReturnParams::ReadLocalSupportedFeatures { status, features })
}

fn parse_read_local_extended_features(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("read_local_extended_features return params", 11, buf)?;
    let mut cursor = buf;
    let (status, _): (u8, _) = cursor.read_as()?;
    let (page_number, _): (u8, _) = cursor.read_as()?;
    let (max_page_number, _): (u8, _) = cursor.read_as()?;
    let (features, _): ([u8; 8], _) = crate::codec::read_array(&mut cursor)?;
    Ok(ReturnParams::ReadLocalExtendedFeatures {
        status,
        page_number,
        max_page_number,
        features,
    })
}

fn parse_read_stored_link_key(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("read_stored_link_key return params", 5, buf)?;
    let mut cursor = buf;
    let (status, _): (u8, _) = cursor.read_as()?;
    let (max_num_keys, _): (u16, _) = cursor.read_as()?;
    let (num_keys_read, _): (u16, _) = cursor.read_as()?;
    Ok(ReturnParams::ReadStoredLinkKey {
        status,
        max_num_keys,
        num_keys_read,
    })
}

fn parse_read_scan_enable(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("read_scan_enable return params", 2, buf)?;
    Ok(ReturnParams::ReadScanEnable {
        status: buf[0],
        scan_enable: buf[1],
    })
}

fn parse_read_inquiry_mode(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("read_inquiry_mode return params", 2, buf)?;
    Ok(ReturnParams::ReadInquiryMode {
        status: buf[0],
        mode: buf[1],
    })
}

fn parse_le_read_buffer_size(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("le_read_buffer_size return params", 4, buf)?;
    let mut cursor = buf;
    let (status, _): (u8, _) = cursor.read_as()?;
    let (le_acl_data_packet_length, _): (u16, _) = cursor.read_as()?;
    let (total_num_le_acl_data_packets, _): (u8, _) = cursor.read_as()?;
    Ok(ReturnParams::LeReadBufferSize {
        status,
        le_acl_data_packet_length,
        total_num_le_acl_data_packets,
    })
}

fn parse_le_read_local_supported_features(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("le_read_local_supported_features return params", 9, buf)?;
    let mut cursor = buf;
    let (status, _): (u8, _) = cursor.read_as()?;
    let (features, _): ([u8; 8], _) = crate::codec::read_array(&mut cursor)?;
    Ok(ReturnParams::ReadLocalSupportedFeatures { status, features })
}

fn parse_le_read_white_list_size(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("le_read_white_list_size return params", 2, buf)?;
    Ok(ReturnParams::LeReadWhiteListSize {
        status: buf[0],
        size: buf[1],
    })
}

fn parse_le_read_suggested_default_data_length(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("le_read_suggested_default_data_length return params", 5, buf)?;
    let mut cursor = buf;
    let (status, _): (u8, _) = cursor.read_as()?;
    let (tx_octets, _): (u16, _) = cursor.read_as()?;
    let (tx_time, _): (u16, _) = cursor.read_as()?;
    Ok(ReturnParams::LeReadSuggestedDefaultDataLength {
        status,
        tx_octets,
        tx_time,
    })
}

fn parse_le_read_maximum_advertising_data_length(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("le_read_maximum_advertising_data_length return params", 3, buf)?;
    let mut cursor = buf;
    let (status, _): (u8, _) = cursor.read_as()?;
    let (max_advertising_data_length, _): (u16, _) = cursor.read_as()?;
    Ok(ReturnParams::LeReadMaximumAdvertisingDataLength {
        status,
        max_advertising_data_length,
    })
}

fn parse_le_read_number_of_supported_advertising_sets(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require(
        "le_read_number_of_supported_advertising_sets return params",
        2,
        buf,
    )?;
    Ok(ReturnParams::LeReadNumberOfSupportedAdvertisingSets {
        status: buf[0],
        num_supported_advertising_sets: buf[1],
    })
}

fn parse_le_connection_handle(buf: &[u8]) -> Result<ReturnParams> {
    crate::codec::require("le return params with connection handle", 3, buf)?;
    let mut cursor = buf;
    let (status, _): (u8, _) = cursor.read_as()?;
    let (connection_handle, _): (u16, _) = cursor.read_as()?;
    Ok(ReturnParams::LeConnectionHandle {
        status,
        connection_handle,
    })
}

/// Maps command opcodes to the parser for their Command Complete return
/// parameters. Populated with every built-in command that returns more
/// than a bare status byte; extended at runtime for vendor commands.
pub struct CommandCompleteRegistry {
    parsers: HashMap<u16, ReturnParamsParser>,
}

impl CommandCompleteRegistry {
    pub fn with_defaults() -> Self {
        let mut reg = CommandCompleteRegistry {
            parsers: HashMap::new(),
        };
        reg.register(
            crate::command::opcode_pack(host_control::OGF, host_control::OCF_READ_STORED_LINK_KEY),
            parse_read_stored_link_key,
        );
        reg.register(
            crate::command::opcode_pack(host_control::OGF, host_control::OCF_READ_SCAN_ENABLE),
            parse_read_scan_enable,
        );
        reg.register(
            crate::command::opcode_pack(host_control::OGF, host_control::OCF_READ_INQUIRY_MODE),
            parse_read_inquiry_mode,
        );
        reg.register(
            crate::command::opcode_pack(
                info_params::OGF,
                info_params::OCF_READ_LOCAL_SUPPORTED_FEATURES,
            ),
            parse_read_local_supported_features,
        );
        reg.register(
            crate::command::opcode_pack(
                info_params::OGF,
                info_params::OCF_READ_LOCAL_EXTENDED_FEATURES,
            ),
            parse_read_local_extended_features,
        );
        reg.register(
            crate::command::opcode_pack(info_params::OGF, info_params::OCF_READ_BD_ADDR),
            parse_read_bd_addr,
        );
        reg.register(
            crate::command::opcode_pack(le::OGF, le::OCF_READ_BUFFER_SIZE),
            parse_le_read_buffer_size,
        );
        reg.register(
            crate::command::opcode_pack(le::OGF, le::OCF_READ_LOCAL_SUPPORTED_FEATURES),
            parse_le_read_local_supported_features,
        );
        reg.register(
            crate::command::opcode_pack(le::OGF, le::OCF_READ_WHITE_LIST_SIZE),
            parse_le_read_white_list_size,
        );
        reg.register(
            crate::command::opcode_pack(
                le::OGF,
                le::OCF_READ_SUGGESTED_DEFAULT_DATA_LENGTH,
            ),
            parse_le_read_suggested_default_data_length,
        );
        reg.register(
            crate::command::opcode_pack(
                le::OGF,
                le::OCF_READ_MAXIMUM_ADVERTISING_DATA_LENGTH,
            ),
            parse_le_read_maximum_advertising_data_length,
        );
        reg.register(
            crate::command::opcode_pack(
                le::OGF,
                le::OCF_READ_NUMBER_OF_SUPPORTED_ADVERTISING_SETS,
            ),
            parse_le_read_number_of_supported_advertising_sets,
        );
        reg.register(
            crate::command::opcode_pack(le::OGF, le::OCF_LONG_TERM_KEY_REQUEST_REPLY),
            parse_le_connection_handle,
        );
        reg.register(
            crate::command::opcode_pack(
                le::OGF,
                le::OCF_LONG_TERM_KEY_REQUEST_NEGATIVE_REPLY,
            ),
            parse_le_connection_handle,
        );
        reg.register(
            crate::command::opcode_pack(le::OGF, le::OCF_SET_DATA_LENGTH),
            parse_le_connection_handle,
        );
        reg.register(
            crate::command::opcode_pack(
                link_control::OGF,
                link_control::OCF_READ_REMOTE_VERSION_INFORMATION,
            ),
            parse_status,
        );
        reg
    }

    pub fn register(&mut self, opcode: u16, parser: ReturnParamsParser) {
        self.parsers.insert(opcode, parser);
    }

    /// Parse the return parameters for a Command Complete whose command
    /// opcode is `opcode`. Any opcode not covered by a default or
    /// registered parser, but whose payload is exactly one byte, is
    /// assumed to be status-only (the overwhelmingly common shape);
    /// anything else with no registered parser is an error.
    pub fn parse(&self, opcode: u16, payload: &[u8]) -> Result<ReturnParams> {
        if let Some(parser) = self.parsers.get(&opcode) {
            return parser(payload);
        }
        if payload.len() == 1 {
            return parse_status(payload);
        }
        Err(HciError::CommandCompleteNotImplemented { opcode })
    }
}

impl Default for CommandCompleteRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_multi_byte_opcode_is_an_error() {
        let reg = CommandCompleteRegistry::with_defaults();
        let err = reg.parse(0x3f01, &[0, 1, 2]).unwrap_err();
        assert!(matches!(
            err,
            HciError::CommandCompleteNotImplemented { opcode: 0x3f01 }
        ));
    }

    #[test]
    fn single_byte_payload_defaults_to_status() {
        let reg = CommandCompleteRegistry::with_defaults();
        let parsed = reg.parse(0x3f01, &[0]).unwrap();
        assert!(matches!(parsed, ReturnParams::Status { status: 0 }));
    }

    #[test]
    fn read_bd_addr_is_registered_by_default() {
        let reg = CommandCompleteRegistry::with_defaults();
        let opcode = crate::command::opcode_pack(info_params::OGF, info_params::OCF_READ_BD_ADDR);
        let payload = [0u8, 1, 2, 3, 4, 5, 6];
        let parsed = reg.parse(opcode, &payload).unwrap();
        match parsed {
            ReturnParams::ReadBdAddr { status, bd_addr } => {
                assert_eq!(status, 0);
                assert_eq!(bd_addr, [1, 2, 3, 4, 5, 6]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn vendor_parser_can_be_registered_at_runtime() {
        let mut reg = CommandCompleteRegistry::with_defaults();
        fn vendor_parser(buf: &[u8]) -> Result<ReturnParams> {
            Ok(ReturnParams::Raw {
                status: buf[0],
                payload: buf[1..].to_vec(),
            })
        }
        reg.register(0x3f02, vendor_parser);
        let parsed = reg.parse(0x3f02, &[0, 0xaa, 0xbb]).unwrap();
        match parsed {
            ReturnParams::Raw { status, payload } => {
                assert_eq!(status, 0);
                assert_eq!(payload, vec![0xaa, 0xbb]);
            }
            _ => panic!("wrong variant"),
        }
    }
}
