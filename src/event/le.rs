//! LE Meta Event sub-events (event code 0x3e, dispatched on the first
//! payload byte). Field layouts and sub-event codes follow
//! `bluetool.event`'s `LEMetaEvent`/`LEConnectionCompleteEvent` and the
//! `_le_evt_table` dispatch it builds from.

use crate::codec::ReadAs;
use crate::error::Result;

pub const SUBEVT_CONNECTION_COMPLETE: u8 = 0x01;
pub const SUBEVT_ADVERTISING_REPORT: u8 = 0x02;
pub const SUBEVT_CONNECTION_UPDATE_COMPLETE: u8 = 0x03;
pub const SUBEVT_READ_REMOTE_USED_FEATURES_COMPLETE: u8 = 0x04;
pub const SUBEVT_LONG_TERM_KEY_REQUEST: u8 = 0x05;
pub const SUBEVT_DATA_LENGTH_CHANGE: u8 = 0x07;
pub const SUBEVT_ENHANCED_CONNECTION_COMPLETE: u8 = 0x0a;

#[derive(Debug, Clone)]
pub struct AdvertisingReportItem {
    pub event_type: u8,
    pub address_type: u8,
    pub address: [u8; 6],
    pub data: Vec<u8>,
    pub rssi: i8,
}

#[derive(Debug, Clone)]
pub enum LeMetaEvent {
    ConnectionComplete {
        status: u8,
        connection_handle: u16,
        role: u8,
        peer_address_type: u8,
        peer_address: [u8; 6],
        conn_interval: u16,
        conn_latency: u16,
        supervision_timeout: u16,
        master_clock_accuracy: u8,
    },
    AdvertisingReport {
        reports: Vec<AdvertisingReportItem>,
    },
    ConnectionUpdateComplete {
        status: u8,
        connection_handle: u16,
        conn_interval: u16,
        conn_latency: u16,
        supervision_timeout: u16,
    },
    ReadRemoteUsedFeaturesComplete {
        status: u8,
        connection_handle: u16,
        features: [u8; 8],
    },
    LongTermKeyRequest {
        connection_handle: u16,
        random_number: u64,
        encrypted_diversifier: u16,
    },
    DataLengthChange {
        connection_handle: u16,
        max_tx_octets: u16,
        max_tx_time: u16,
        max_rx_octets: u16,
        max_rx_time: u16,
    },
    EnhancedConnectionComplete {
        status: u8,
        connection_handle: u16,
        role: u8,
        peer_address_type: u8,
        peer_address: [u8; 6],
        local_resolvable_private_address: [u8; 6],
        peer_resolvable_private_address: [u8; 6],
        conn_interval: u16,
        conn_latency: u16,
        supervision_timeout: u16,
        master_clock_accuracy: u8,
    },
    Unknown {
        subcode: u8,
        payload: Vec<u8>,
    },
}

pub fn parse(subcode: u8, payload: &[u8]) -> Result<LeMetaEvent> {
    let mut cursor = payload;
    match subcode {
        SUBEVT_CONNECTION_COMPLETE => {
            crate::codec::require("LE Connection Complete", 18, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (role, _): (u8, _) = cursor.read_as()?;
            let (peer_address_type, _): (u8, _) = cursor.read_as()?;
            let (peer_address, _): ([u8; 6], _) = crate::codec::read_array(&mut cursor)?;
            let (conn_interval, _): (u16, _) = cursor.read_as()?;
            let (conn_latency, _): (u16, _) = cursor.read_as()?;
            let (supervision_timeout, _): (u16, _) = cursor.read_as()?;
            let (master_clock_accuracy, _): (u8, _) = cursor.read_as()?;
            Ok(LeMetaEvent::ConnectionComplete {
                status,
                connection_handle,
                role,
                peer_address_type,
                peer_address,
                conn_interval,
                conn_latency,
                supervision_timeout,
                master_clock_accuracy,
            })
        }
        SUBEVT_ADVERTISING_REPORT => {
            crate::codec::require("LE Advertising Report count", 1, payload)?;
            let (num_reports, _): (u8, _) = cursor.read_as()?;
            let mut reports = Vec::with_capacity(num_reports as usize);
            // Event type, address type and address come packed as parallel
            // arrays of length `num_reports`, then one length-prefixed data
            // block per report, then one RSSI byte per report — this is
            // the repeated-block shape bluetool.event keeps as a Python
            // list of dicts rather than flattening.
            let mut event_types = Vec::with_capacity(num_reports as usize);
            for _ in 0..num_reports {
                let (v, _): (u8, _) = cursor.read_as()?;
                event_types.push(v);
            }
            let mut address_types = Vec::with_capacity(num_reports as usize);
            for _ in 0..num_reports {
                let (v, _): (u8, _) = cursor.read_as()?;
                address_types.push(v);
            }
            let mut addresses = Vec::with_capacity(num_reports as usize);
            for _ in 0..num_reports {
                let (v, _): ([u8; 6], _) = crate::codec::read_array(&mut cursor)?;
                addresses.push(v);
            }
            let mut data_blocks = Vec::with_capacity(num_reports as usize);
            for _ in 0..num_reports {
                let (len, _): (u8, _) = cursor.read_as()?;
                crate::codec::require("LE Advertising Report data", len as usize, cursor)?;
                let (block, _): (Vec<u8>, usize) = {
                    let mut data = vec![0u8; len as usize];
                    std::io::Read::read_exact(&mut cursor, &mut data)?;
                    (data, len as usize)
                };
                data_blocks.push(block);
            }
            let mut rssis = Vec::with_capacity(num_reports as usize);
            for _ in 0..num_reports {
                let (v, _): (i8, _) = cursor.read_as()?;
                rssis.push(v);
            }
            for i in 0..num_reports as usize {
                reports.push(AdvertisingReportItem {
                    event_type: event_types[i],
                    address_type: address_types[i],
                    address: addresses[i],
                    data: data_blocks[i].clone(),
                    rssi: rssis[i],
                });
            }
            Ok(LeMetaEvent::AdvertisingReport { reports })
        }
        SUBEVT_CONNECTION_UPDATE_COMPLETE => {
            crate::codec::require("LE Connection Update Complete", 9, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (conn_interval, _): (u16, _) = cursor.read_as()?;
            let (conn_latency, _): (u16, _) = cursor.read_as()?;
            let (supervision_timeout, _): (u16, _) = cursor.read_as()?;
            Ok(LeMetaEvent::ConnectionUpdateComplete {
                status,
                connection_handle,
                conn_interval,
                conn_latency,
                supervision_timeout,
            })
        }
        SUBEVT_READ_REMOTE_USED_FEATURES_COMPLETE => {
            crate::codec::require("LE Read Remote Used Features Complete", 11, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (features, _): ([u8; 8], _) = crate::codec::read_array(&mut cursor)?;
            Ok(LeMetaEvent::ReadRemoteUsedFeaturesComplete {
                status,
                connection_handle,
                features,
            })
        }
        SUBEVT_LONG_TERM_KEY_REQUEST => {
            crate::codec::require("LE Long Term Key Request", 12, payload)?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (random_number, _): (u64, _) = cursor.read_as()?;
            let (encrypted_diversifier, _): (u16, _) = cursor.read_as()?;
            Ok(LeMetaEvent::LongTermKeyRequest {
                connection_handle,
                random_number,
                encrypted_diversifier,
            })
        }
        SUBEVT_DATA_LENGTH_CHANGE => {
            crate::codec::require("LE Data Length Change", 10, payload)?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (max_tx_octets, _): (u16, _) = cursor.read_as()?;
            let (max_tx_time, _): (u16, _) = cursor.read_as()?;
            let (max_rx_octets, _): (u16, _) = cursor.read_as()?;
            let (max_rx_time, _): (u16, _) = cursor.read_as()?;
            Ok(LeMetaEvent::DataLengthChange {
                connection_handle,
                max_tx_octets,
                max_tx_time,
                max_rx_octets,
                max_rx_time,
            })
        }
        SUBEVT_ENHANCED_CONNECTION_COMPLETE => {
            crate::codec::require("LE Enhanced Connection Complete", 30, payload)?;
            let (status, _): (u8, _) = cursor.read_as()?;
            let (connection_handle, _): (u16, _) = cursor.read_as()?;
            let (role, _): (u8, _) = cursor.read_as()?;
            let (peer_address_type, _): (u8, _) = cursor.read_as()?;
            let (peer_address, _): ([u8; 6], _) = crate::codec::read_array(&mut cursor)?;
            let (local_resolvable_private_address, _): ([u8; 6], _) =
                crate::codec::read_array(&mut cursor)?;
            let (peer_resolvable_private_address, _): ([u8; 6], _) =
                crate::codec::read_array(&mut cursor)?;
            let (conn_interval, _): (u16, _) = cursor.read_as()?;
            let (conn_latency, _): (u16, _) = cursor.read_as()?;
            let (supervision_timeout, _): (u16, _) = cursor.read_as()?;
            let (master_clock_accuracy, _): (u8, _) = cursor.read_as()?;
            Ok(LeMetaEvent::EnhancedConnectionComplete {
                status,
                connection_handle,
                role,
                peer_address_type,
                peer_address,
                local_resolvable_private_address,
                peer_resolvable_private_address,
                conn_interval,
                conn_latency,
                supervision_timeout,
                master_clock_accuracy,
            })
        }
        other => Ok(LeMetaEvent::Unknown {
            subcode: other,
            payload: payload.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connection_complete() {
        let mut payload = vec![0u8, 0x01, 0x00, 0x00, 0x00];
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        payload.extend_from_slice(&[0x18, 0x00, 0, 0, 0x64, 0, 5]);
        let parsed = parse(SUBEVT_CONNECTION_COMPLETE, &payload).unwrap();
        match parsed {
            LeMetaEvent::ConnectionComplete {
                status,
                connection_handle,
                peer_address,
                ..
            } => {
                assert_eq!(status, 0);
                assert_eq!(connection_handle, 1);
                assert_eq!(peer_address, [1, 2, 3, 4, 5, 6]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_subevent_is_kept_as_unknown() {
        let parsed = parse(0x7f, &[1, 2, 3]).unwrap();
        assert!(matches!(parsed, LeMetaEvent::Unknown { subcode: 0x7f, .. }));
    }

    #[test]
    fn advertising_report_with_zero_reports_parses() {
        let parsed = parse(SUBEVT_ADVERTISING_REPORT, &[0]).unwrap();
        match parsed {
            LeMetaEvent::AdvertisingReport { reports } => assert!(reports.is_empty()),
            _ => panic!("wrong variant"),
        }
    }
}
