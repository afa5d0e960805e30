//! The event catalogue: decodes the body of an HCI Event packet (the bytes
//! after the `[type_tag, event_code, plen]` header `framing` already
//! stripped off).
//!
//! Dispatch mirrors `bluetool.event.parse_hci_event`: check for the LE
//! Meta Event first, then fall back to the flat per-code table.

pub mod le;
pub mod return_params;

use crate::codec::ReadAs;
use crate::error::{HciError, Result};
pub use return_params::{CommandCompleteRegistry, ReturnParams};

pub const EVT_INQUIRY_COMPLETE: u8 = 0x01;
pub const EVT_CONNECTION_COMPLETE: u8 = 0x03;
pub const EVT_CONNECTION_REQUEST: u8 = 0x04;
pub const EVT_DISCONNECTION_COMPLETE: u8 = 0x05;
pub const EVT_REMOTE_NAME_REQUEST_COMPLETE: u8 = 0x07;
pub const EVT_ENCRYPTION_CHANGE: u8 = 0x08;
pub const EVT_READ_REMOTE_FEATURES_COMPLETE: u8 = 0x0b;
pub const EVT_READ_REMOTE_VERSION_COMPLETE: u8 = 0x0c;
pub const EVT_COMMAND_COMPLETE: u8 = 0x0e;
pub const EVT_COMMAND_STATUS: u8 = 0x0f;
pub const EVT_ROLE_CHANGE: u8 = 0x12;
pub const EVT_NUMBER_OF_COMPLETED_PACKETS: u8 = 0x13;
pub const EVT_MODE_CHANGE: u8 = 0x14;
pub const EVT_MAX_SLOTS_CHANGE: u8 = 0x1b;
pub const EVT_PAGE_SCAN_REPETITION_MODE_CHANGE: u8 = 0x20;
pub const EVT_INQUIRY_RESULT_WITH_RSSI: u8 = 0x22;
pub const EVT_READ_REMOTE_EXT_FEATURES_COMPLETE: u8 = 0x23;
pub const EVT_LE_META_EVENT: u8 = 0x3e;
pub const EVT_VENDOR: u8 = 0xff;

#[derive(Debug, Clone)]
pub struct InquiryResultWithRssiItem {
    pub bd_addr: [u8; 6],
    pub page_scan_repetition_mode: u8,
    pub reserved: u8,
    pub class_of_device: u32,
    pub clock_offset: u16,
    pub rssi: i8,
}

#[derive(Debug, Clone)]
pub enum Event {
    InquiryComplete {
        status: u8,
    },
    InquiryResultWithRssi {
        responses: Vec<InquiryResultWithRssiItem>,
    },
    ConnectionComplete {
        status: u8,
        connection_handle: u16,
        bd_addr: [u8; 6],
        link_type: u8,
        encryption_enabled: bool,
    },
    ConnectionRequest {
        bd_addr: [u8; 6],
        class_of_device: u32,
        link_type: u8,
    },
    DisconnectionComplete {
        status: u8,
        connection_handle: u16,
        reason: u8,
    },
    RemoteNameRequestComplete {
        status: u8,
        bd_addr: [u8; 6],
        remote_name: Vec<u8>,
    },
    EncryptionChange {
        status: u8,
        connection_handle: u16,
        encryption_enabled: u8,
    },
    ReadRemoteFeaturesComplete {
        status: u8,
        connection_handle: u16,
        lmp_features: [u8; 8],
    },
    ReadRemoteVersionComplete {
        status: u8,
        connection_handle: u16,
        version: u8,
        manufacturer_name: u16,
        subversion: u16,
    },
    CommandComplete {
        num_hci_command_packets: u8,
        opcode: u16,
        return_params: ReturnParams,
    },
    CommandStatus {
        status: u8,
        num_hci_command_packets: u8,
        opcode: u16,
    },
    RoleChange {
        status: u8,
        bd_addr: [u8; 6],
        new_role: u8,
    },
    NumberOfCompletedPackets {
        handles: Vec<(u16, u16)>,
    },
    ModeChange {
        status: u8,
        connection_handle: u16,
        current_mode: u8,
        interval: u16,
    },
    PageScanRepetitionModeChange {
        bd_addr: [u8; 6],
        page_scan_repetition_mode: u8,
    },
    MaxSlotsChange {
        connection_handle: u16,
        lmp_max_slots: u8,
    },
    ReadRemoteExtendedFeaturesComplete {
        status: u8,
        connection_handle: u16,
        page_number: u8,
        max_page_number: u8,
        features: [u8; 8],
    },
    LeMeta(le::LeMetaEvent),
    Vendor {
        payload: Vec<u8>,
    },
    Unknown {
        code: u8,
        payload: Vec<u8>,
    },
}

/// Decode an event body. `code` is the event code from the packet header;
/// `payload` is everything after `[type_tag, event_code, plen]`.
pub fn parse(code: u8, payload: &[u8], registry: &CommandCompleteRegistry) -> Result<Event> {
    if code == EVT_LE_META_EVENT {
        crate::codec::require("LE Meta Event subevent code", 1, payload)?;
        let subcode = payload[0];
        return Ok(Event::LeMeta(le::parse(subcode, &payload[1..])?));
    }
    let mut cursor = payload;
    match code {
        EVT_INQUIRY_COMPLETE => {
            crate::codec::require("Inquiry Complete", 1, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            Ok(Event::InquiryComplete { status })
        }
        EVT_CONNECTION_COMPLETE => {
            crate::codec::require("Connection Complete", 11, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (bd_addr, _): ([u8; 6], _) = crate::codec::read_array(&mut cursor)?;
            let (link_type, _): (u8, _) = cursor.read_as()?;
            let (encryption_enabled, _): (u8, _) = cursor.read_as()?;
            Ok(Event::ConnectionComplete {
                status,
                connection_handle,
                bd_addr,
                link_type,
                encryption_enabled: encryption_enabled != 0,
            })
        }
        EVT_CONNECTION_REQUEST => {
            crate::codec::require("Connection Request", 10, payload)?;
            let (bd_addr, _): ([u8; 6], _) = crate::codec::read_array(&mut cursor)?;
            let (class_of_device, _) = crate::codec::read_u24(&mut cursor)?;
            let (link_type, _): (u8, _) = cursor.read_as()?;
            Ok(Event::ConnectionRequest {
                bd_addr,
                class_of_device,
                link_type,
            })
        }
        EVT_DISCONNECTION_COMPLETE => {
            crate::codec::require("Disconnection Complete", 4, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (reason, _): (u8, _) = cursor.read_as()?;
            Ok(Event::DisconnectionComplete {
                status,
                connection_handle,
                reason,
            })
        }
        EVT_REMOTE_NAME_REQUEST_COMPLETE => {
            crate::codec::require("Remote Name Request Complete", 7, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (bd_addr, _): ([u8; 6], _) = crate::codec::read_array(&mut cursor)?;
            let remote_name = crate::codec::read_remainder(&mut cursor)?;
            Ok(Event::RemoteNameRequestComplete {
                status,
                bd_addr,
                remote_name,
            })
        }
        EVT_ENCRYPTION_CHANGE => {
            crate::codec::require("Encryption Change", 4, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (encryption_enabled, _): (u8, _) = cursor.read_as()?;
            Ok(Event::EncryptionChange {
                status,
                connection_handle,
                encryption_enabled,
            })
        }
        EVT_READ_REMOTE_FEATURES_COMPLETE => {
            crate::codec::require("Read Remote Features Complete", 11, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (lmp_features, _): ([u8; 8], _) = crate::codec::read_array(&mut cursor)?;
            Ok(Event::ReadRemoteFeaturesComplete {
                status,
                connection_handle,
                lmp_features,
            })
        }
        EVT_READ_REMOTE_VERSION_COMPLETE => {
            crate::codec::require("Read Remote Version Complete", 8, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (version, _): (u8, _) = cursor.read_as()?;
            let (manufacturer_name, _): (u16, _) = cursor.read_as()?;
            let (subversion, _): (u16, _) = cursor.read_as()?;
            Ok(Event::ReadRemoteVersionComplete {
                status,
                connection_handle,
                version,
                manufacturer_name,
                subversion,
            })
        }
        EVT_COMMAND_COMPLETE => {
            crate::codec::require("Command Complete header", 3, payload)?;
            let (num_hci_command_packets, _): (u8, _) = cursor.read_as()?;
            let (opcode, _): (u16, _) = cursor.read_as()?;
            let return_params = registry.parse(opcode, cursor)?;
            Ok(Event::CommandComplete {
                num_hci_command_packets,
                opcode,
                return_params,
            })
        }
        EVT_COMMAND_STATUS => {
            crate::codec::require("Command Status", 4, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (num_hci_command_packets, _): (u8, _) = cursor.read_as()?;
            let (opcode, _): (u16, _) = cursor.read_as()?;
            Ok(Event::CommandStatus {
                status,
                num_hci_command_packets,
                opcode,
            })
        }
        EVT_ROLE_CHANGE => {
            crate::codec::require("Role Change", 8, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (bd_addr, _): ([u8; 6], _) = crate::codec::read_array(&mut cursor)?;
            let (new_role, _): (u8, _) = cursor.read_as()?;
            Ok(Event::RoleChange {
                status,
                bd_addr,
                new_role,
            })
        }
        EVT_NUMBER_OF_COMPLETED_PACKETS => {
            crate::codec::require("Number Of Completed Packets count", 1, payload)?;
            let (num_handles, _): (u8, _) = cursor.read_as()?;
            let mut handle_list = Vec::with_capacity(num_handles as usize);
            for _ in 0..num_handles {
                let (h, _): (u16, _) = cursor.read_as()?;
                handle_list.push(h);
            }
            let mut counts = Vec::with_capacity(num_handles as usize);
            for _ in 0..num_handles {
                let (c, _): (u16, _) = cursor.read_as()?;
                counts.push(c);
            }
            let handles = handle_list.into_iter().zip(counts).collect();
            Ok(Event::NumberOfCompletedPackets { handles })
        }
        EVT_MODE_CHANGE => {
            crate::codec::require("Mode Change", 6, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (current_mode, _): (u8, _) = cursor.read_as()?;
            let (interval, _): (u16, _) = cursor.read_as()?;
            Ok(Event::ModeChange {
                status,
                connection_handle,
                current_mode,
                interval,
            })
        }
        EVT_PAGE_SCAN_REPETITION_MODE_CHANGE => {
            crate::codec::require("Page Scan Repetition Mode Change", 7, payload)?;
            let (bd_addr, _): ([u8; 6], _) = crate::codec::read_array(&mut cursor)?;
            let (page_scan_repetition_mode, _): (u8, _) = cursor.read_as()?;
            Ok(Event::PageScanRepetitionModeChange {
                bd_addr,
                page_scan_repetition_mode,
            })
        }
        EVT_MAX_SLOTS_CHANGE => {
            crate::codec::require("Max Slots Change", 3, payload)?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (lmp_max_slots, _): (u8, _) = cursor.read_as()?;
            Ok(Event::MaxSlotsChange {
                connection_handle,
                lmp_max_slots,
            })
        }
        EVT_INQUIRY_RESULT_WITH_RSSI => {
            crate::codec::require("Inquiry Result With RSSI count", 1, payload)?;
            let (num_responses, _): (u8, _) = cursor.read_as()?;
            let mut responses = Vec::with_capacity(num_responses as usize);
            for _ in 0..num_responses {
                crate::codec::require("Inquiry Result With RSSI entry", 14, cursor)?;
                let (bd_addr, _): ([u8; 6], _) = crate::codec::read_array(&mut cursor)?;
                let (page_scan_repetition_mode, _): (u8, _) = cursor.read_as()?;
                let (reserved, _): (u8, _) = cursor.read_as()?;
                let (class_of_device, _) = crate::codec::read_u24(&mut cursor)?;
                let (clock_offset, _): (u16, _) = cursor.read_as()?;
                let (rssi, _): (i8, _) = cursor.read_as()?;
                responses.push(InquiryResultWithRssiItem {
                    bd_addr,
                    page_scan_repetition_mode,
                    reserved,
                    class_of_device,
                    clock_offset,
                    rssi,
                });
            }
            Ok(Event::InquiryResultWithRssi { responses })
        }
        EVT_READ_REMOTE_EXT_FEATURES_COMPLETE => {
            crate::codec::require("Read Remote Extended Features Complete", 13, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (page_number, _): (u8, _) = cursor.read_as()?;
            let (max_page_number, _): (u8, _) = cursor.read_as()?;
            let (features, _): ([u8; 8], _) = crate::codec::read_array(&mut cursor)?;
            Ok(Event::ReadRemoteExtendedFeaturesComplete {
                status,
                connection_handle,
                page_number,
                max_page_number,
                features,
            })
        }
        EVT_VENDOR => Ok(Event::Vendor {
            payload: payload.to_vec(),
        }),
        other => {
            log::info!("ignoring event with no decoder: code={:#04x}", other);
            Ok(Event::Unknown {
                code: other,
                payload: payload.to_vec(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inquiry_complete_round_trips() {
        let registry = CommandCompleteRegistry::with_defaults();
        let event = parse(EVT_INQUIRY_COMPLETE, &[0], &registry).unwrap();
        assert!(matches!(event, Event::InquiryComplete { status: 0 }));
    }

    #[test]
    fn command_complete_dispatches_through_registry() {
        let registry = CommandCompleteRegistry::with_defaults();
        let opcode = crate::command::opcode_pack(
            crate::command::info_params::OGF,
            crate::command::info_params::OCF_READ_BD_ADDR,
        );
        let mut payload = vec![1u8];
        payload.extend_from_slice(&opcode.to_le_bytes());
        payload.push(0); // status
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        let event = parse(EVT_COMMAND_COMPLETE, &payload, &registry).unwrap();
        match event {
            Event::CommandComplete {
                opcode: got_opcode,
                return_params,
                ..
            } => {
                assert_eq!(got_opcode, opcode);
                assert!(matches!(return_params, ReturnParams::ReadBdAddr { .. }));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_event_code_is_kept_not_erred() {
        let registry = CommandCompleteRegistry::with_defaults();
        let event = parse(0x7f, &[1, 2, 3], &registry).unwrap();
        assert!(matches!(event, Event::Unknown { code: 0x7f, .. }));
    }

    #[test]
    fn truncated_payload_is_an_underflow_not_a_panic() {
        let registry = CommandCompleteRegistry::with_defaults();
        let err = parse(EVT_CONNECTION_COMPLETE, &[0, 1], &registry).unwrap_err();
        assert!(matches!(err, HciError::Underflow { .. }));
    }

    #[test]
    fn le_meta_event_delegates_to_le_module() {
        let registry = CommandCompleteRegistry::with_defaults();
        let event = parse(EVT_LE_META_EVENT, &[0x7f, 1, 2], &registry).unwrap();
        match event {
            Event::LeMeta(le::LeMetaEvent::Unknown { subcode, .. }) => {
                assert_eq!(subcode, 0x7f)
            }
            _ => panic!("wrong variant"),
        }
    }
}
