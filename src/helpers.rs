//! Protocol helpers: thin, named recipes built on top of [`HciTask`],
//! each a short fixed sequence of command/response round trips.
//!
//! Grounded on `test/whitelist.py`'s `LEHelper` (`reset`,
//! `add_device_to_white_list`, `create_connect_by_white_list`,
//! `disconnect`, `start_advertising`/`stop_advertising`) and
//! `test/sniff.py`'s sniff-mode recipe, generalised from one
//! scenario-specific helper class into the crate's shared toolbox.

use crate::command::{host_control, le, link_control, link_policy};
use crate::error::{HciError, Result};
use crate::event::{le as le_event, Event};
use crate::socket::RawChannel;
use crate::task::HciTask;

/// BR/EDR Set Event Mask value used by the reset recipe: every event
/// except the vendor-specific ones and page-2 extensions.
pub const BREDR_EVENT_MASK: u64 = 0x20001FFFFFFFFFFF;

/// Standard page scan activity (interval, window) used by the reset
/// recipe: interval 1280ms (0x0800 * 0.625ms), window 11.25ms (0x0012).
pub const PAGE_SCAN_INTERVAL: u16 = 0x0800;
pub const PAGE_SCAN_WINDOW: u16 = 0x0012;

/// `WriteScanEnable` value meaning "page and inquiry scan both enabled".
pub const SCAN_ENABLE_BOTH: u8 = 0x02;

/// Reset → Set Event Mask → Write Page Scan Activity → Write Scan
/// Enable, checking every step's status is 0. The first thing a BR/EDR
/// scenario does to a freshly opened adapter.
pub fn bredr_reset<C: RawChannel>(task: &mut HciTask<C>) -> Result<()> {
    task.send_cmd_wait_complete_check_status(&host_control::Reset)?;
    task.send_cmd_wait_complete_check_status(&host_control::SetEventMask {
        mask: BREDR_EVENT_MASK,
    })?;
    task.send_cmd_wait_complete_check_status(&host_control::WritePageScanActivity {
        interval: PAGE_SCAN_INTERVAL,
        window: PAGE_SCAN_WINDOW,
    })?;
    task.send_cmd_wait_complete_check_status(&host_control::WriteScanEnable {
        scan_enable: SCAN_ENABLE_BOTH,
    })?;
    Ok(())
}

/// LE Set Event Mask base value; individual feature bits are OR'd in by
/// [`le_event_mask_for_features`].
pub const LE_EVENT_MASK_BASE: u64 = 0x1F;

/// Derive the LE Set Event Mask value from the octets returned by LE Read
/// Local Supported Features, per the fixed feature-bit-to-mask-bit table:
/// conn-param request (bit 1) -> `0x20`, LE data length extension (bit 5)
/// -> `0x40`, LL privacy (bit 6) -> `0x780`, LE 2M or Coded PHY (bit 8 or
/// 11) -> `0x800`, extended advertising (bit 12) -> `0x71000`, periodic
/// advertising (bit 13) -> `0xE000`, channel selection algorithm 2 (bit
/// 14) -> `0x80000`.
pub fn le_event_mask_for_features(features: [u8; 8]) -> u64 {
    let bits = u64::from_le_bytes(features);
    let has = |bit: u32| bits & (1 << bit) != 0;

    let mut mask = LE_EVENT_MASK_BASE;
    if has(1) {
        mask |= 0x20;
    }
    if has(5) {
        mask |= 0x40;
    }
    if has(6) {
        mask |= 0x780;
    }
    if has(8) || has(11) {
        mask |= 0x800;
    }
    if has(12) {
        mask |= 0x71000;
    }
    if has(13) {
        mask |= 0xE000;
    }
    if has(14) {
        mask |= 0x80000;
    }
    mask
}

/// Reset → Set Event Mask → Read LE Local Supported Features → compute
/// the LE event mask from the advertised features → LE Set Event Mask ->
/// LE Clear White List.
pub fn le_reset<C: RawChannel>(task: &mut HciTask<C>) -> Result<()> {
    task.send_cmd_wait_complete_check_status(&host_control::Reset)?;
    task.send_cmd_wait_complete_check_status(&host_control::SetEventMask {
        mask: BREDR_EVENT_MASK,
    })?;

    let event = task.send_cmd_wait_complete_check_status(&le::ReadLocalSupportedFeatures)?;
    let features = match event {
        Event::CommandComplete {
            return_params: crate::event::ReturnParams::ReadLocalSupportedFeatures { features, .. },
            ..
        } => features,
        other => {
            return Err(HciError::Protocol(format!(
                "unexpected response reading LE local supported features: {other:?}"
            )))
        }
    };

    let le_mask = le_event_mask_for_features(features);
    task.send_cmd_wait_complete_check_status(&le::SetEventMask { mask: le_mask })?;
    task.send_cmd_wait_complete_check_status(&le::ClearWhiteList)?;
    Ok(())
}

/// Issue LE Create Connection to `peer_address`, then wait for the
/// matching Connection Complete LE sub-event (accepting either the
/// legacy or enhanced variant).
pub fn create_le_connection_by_peer<C: RawChannel>(
    task: &mut HciTask<C>,
    peer_address_type: u8,
    peer_address: [u8; 6],
    conn_interval: u16,
    timeout_ms: Option<u32>,
) -> Result<Event> {
    let cmd = le::CreateConnection {
        scan_interval: 96,
        scan_window: 48,
        init_filter_policy: 0,
        peer_address_type,
        peer_address,
        own_address_type: 0,
        conn_interval_min: conn_interval,
        conn_interval_max: conn_interval,
        conn_latency: 0,
        supervision_timeout: 100,
        min_ce_length: 0,
        max_ce_length: 0,
    };
    task.send_cmd_wait_status_check(&cmd)?;
    wait_le_connection_complete(task, timeout_ms)
}

/// Issue LE Create Connection with the "use white list" initiator filter
/// policy, then wait for the matching Connection Complete LE sub-event.
pub fn create_le_connection_by_white_list<C: RawChannel>(
    task: &mut HciTask<C>,
    conn_interval: u16,
    timeout_ms: Option<u32>,
) -> Result<Event> {
    let cmd = le::CreateConnection {
        scan_interval: 96,
        scan_window: 24,
        init_filter_policy: 1,
        peer_address_type: 0,
        peer_address: [0; 6],
        own_address_type: 0,
        conn_interval_min: conn_interval,
        conn_interval_max: conn_interval,
        conn_latency: 0,
        supervision_timeout: 100,
        min_ce_length: 0,
        max_ce_length: 0,
    };
    task.send_cmd_wait_status_check(&cmd)?;
    wait_le_connection_complete(task, timeout_ms)
}

/// LE Create Connection Cancel, with status checked.
pub fn create_le_connection_cancel<C: RawChannel>(task: &mut HciTask<C>) -> Result<()> {
    task.send_cmd_wait_complete_check_status(&le::CreateConnectionCancel)?;
    Ok(())
}

/// Block until the LE Meta Event sub-event matches `subcode`.
pub fn wait_le_event<C: RawChannel>(
    task: &mut HciTask<C>,
    subcode: u8,
    timeout_ms: Option<u32>,
) -> Result<Event> {
    task.wait_event(
        |ev| matches!(ev, Event::LeMeta(meta) if le_subevt_code(meta) == subcode),
        timeout_ms,
    )
}

/// Block until either an LE Connection Complete or LE Enhanced
/// Connection Complete sub-event arrives — the two controllers use
/// interchangeably depending on whether extended advertising is
/// supported.
pub fn wait_le_connection_complete<C: RawChannel>(
    task: &mut HciTask<C>,
    timeout_ms: Option<u32>,
) -> Result<Event> {
    task.wait_event(
        |ev| {
            matches!(
                ev,
                Event::LeMeta(le_event::LeMetaEvent::ConnectionComplete { .. })
                    | Event::LeMeta(le_event::LeMetaEvent::EnhancedConnectionComplete { .. })
            )
        },
        timeout_ms,
    )
}

fn le_subevt_code(meta: &le_event::LeMetaEvent) -> u8 {
    use le_event::LeMetaEvent::*;
    match meta {
        ConnectionComplete { .. } => le_event::SUBEVT_CONNECTION_COMPLETE,
        AdvertisingReport { .. } => le_event::SUBEVT_ADVERTISING_REPORT,
        ConnectionUpdateComplete { .. } => le_event::SUBEVT_CONNECTION_UPDATE_COMPLETE,
        ReadRemoteUsedFeaturesComplete { .. } => le_event::SUBEVT_READ_REMOTE_USED_FEATURES_COMPLETE,
        LongTermKeyRequest { .. } => le_event::SUBEVT_LONG_TERM_KEY_REQUEST,
        DataLengthChange { .. } => le_event::SUBEVT_DATA_LENGTH_CHANGE,
        EnhancedConnectionComplete { .. } => le_event::SUBEVT_ENHANCED_CONNECTION_COMPLETE,
        Unknown { subcode, .. } => *subcode,
    }
}

/// Disconnect(conn_handle, reason), command-status checked.
pub fn disconnect<C: RawChannel>(task: &mut HciTask<C>, connection_handle: u16, reason: u8) -> Result<()> {
    task.send_cmd_wait_status_check(&link_control::Disconnect {
        connection_handle,
        reason,
    })?;
    Ok(())
}

/// `tx_time = (tx_octets + 14) * 8` microseconds (14 bytes covers the
/// ACL header and CRC the air interface adds around the payload).
pub fn data_length_tx_time(tx_octets: u16) -> u16 {
    (tx_octets + 14) * 8
}

/// Issue LE Set Data Length with `tx_time` derived from `tx_octets` by
/// [`data_length_tx_time`].
pub fn set_data_length<C: RawChannel>(task: &mut HciTask<C>, connection_handle: u16, tx_octets: u16) -> Result<()> {
    task.send_cmd_wait_complete_check_status(&le::SetDataLength {
        connection_handle,
        tx_octets,
        tx_time: data_length_tx_time(tx_octets),
    })?;
    Ok(())
}

/// Enter sniff mode, status-checked, then wait for the Mode Change event
/// confirming the switch.
pub fn sniff_mode<C: RawChannel>(
    task: &mut HciTask<C>,
    connection_handle: u16,
    sniff_max_interval: u16,
    sniff_min_interval: u16,
    sniff_attempt: u16,
    sniff_timeout: u16,
    timeout_ms: Option<u32>,
) -> Result<Event> {
    task.send_cmd_wait_status_check(&link_policy::SniffMode {
        connection_handle,
        sniff_max_interval,
        sniff_min_interval,
        sniff_attempt,
        sniff_timeout,
    })?;
    wait_mode_change(task, connection_handle, timeout_ms)
}

/// Exit sniff mode, status-checked, then wait for the Mode Change event
/// confirming the switch back to active mode.
pub fn exit_sniff_mode<C: RawChannel>(
    task: &mut HciTask<C>,
    connection_handle: u16,
    timeout_ms: Option<u32>,
) -> Result<Event> {
    task.send_cmd_wait_status_check(&link_policy::ExitSniffMode { connection_handle })?;
    wait_mode_change(task, connection_handle, timeout_ms)
}

fn wait_mode_change<C: RawChannel>(task: &mut HciTask<C>, connection_handle: u16, timeout_ms: Option<u32>) -> Result<Event> {
    task.wait_event(
        |ev| matches!(ev, Event::ModeChange { connection_handle: h, .. } if *h == connection_handle),
        timeout_ms,
    )
}

/// LE Set Advertising Parameters(interval, interval, ...) -> LE Set
/// Advertise Enable(1). `advertising_type` 0 is ADV_IND; channel map
/// 0x7 enables all three advertising channels; filter policy 0 allows
/// scan/connect from any device.
pub fn advertise_start<C: RawChannel>(task: &mut HciTask<C>, interval: u16) -> Result<()> {
    task.send_cmd_wait_complete_check_status(&le::SetAdvertisingParameters {
        advertising_interval_min: interval,
        advertising_interval_max: interval,
        advertising_type: 0,
        own_address_type: 0,
        peer_address_type: 0,
        peer_address: [0; 6],
        advertising_channel_map: 0x7,
        advertising_filter_policy: 0,
    })?;
    task.send_cmd_wait_complete_check_status(&le::SetAdvertiseEnable { enable: true })?;
    Ok(())
}

/// LE Set Advertise Enable(0).
pub fn advertise_stop<C: RawChannel>(task: &mut HciTask<C>) -> Result<()> {
    task.send_cmd_wait_complete_check_status(&le::SetAdvertiseEnable { enable: false })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HciError;
    use crate::framing;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct MockChannel {
        inbound: RefCell<VecDeque<u8>>,
        sent: RefCell<Vec<Vec<u8>>>,
    }

    impl MockChannel {
        fn new(inbound: Vec<u8>) -> Self {
            MockChannel {
                inbound: RefCell::new(inbound.into()),
                sent: RefCell::new(Vec::new()),
            }
        }
    }

    impl RawChannel for MockChannel {
        fn send(&self, buf: &[u8]) -> Result<usize> {
            self.sent.borrow_mut().push(buf.to_vec());
            Ok(buf.len())
        }

        fn recv(&self, buf: &mut [u8], _timeout_ms: Option<u32>) -> Result<usize> {
            let mut inbound = self.inbound.borrow_mut();
            if inbound.is_empty() {
                return Err(HciError::Timeout { what: "mock channel exhausted" });
            }
            let n = buf.len().min(inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = inbound.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    fn command_complete_bytes(opcode: u16, return_params: &[u8]) -> Vec<u8> {
        let mut buf = vec![framing::HCI_EVENT_PKT, crate::event::EVT_COMMAND_COMPLETE];
        let mut body = vec![1u8];
        body.extend_from_slice(&opcode.to_le_bytes());
        body.extend_from_slice(return_params);
        buf.push(body.len() as u8);
        buf.extend_from_slice(&body);
        buf
    }

    #[test]
    fn data_length_tx_time_matches_s2() {
        assert_eq!(data_length_tx_time(251), 2120);
    }

    #[test]
    fn set_data_length_emits_s2_bytes() {
        let mut task = HciTask::new(MockChannel::new(command_complete_bytes(
            crate::command::opcode_pack(le::OGF, le::OCF_SET_DATA_LENGTH),
            &[0, 0x40, 0],
        )));
        set_data_length(&mut task, 0x0040, 251).unwrap();
        let sent = task.channel().sent.borrow();
        let params = &sent[0][4..];
        assert_eq!(params, &[0x40, 0x00, 0xFB, 0x00, 0x28, 0x08]);
    }

    #[test]
    fn le_event_mask_base_only() {
        assert_eq!(le_event_mask_for_features([0; 8]), 0x1F);
    }

    #[test]
    fn le_event_mask_s3_conn_param_request_only() {
        // bit 1 set: byte 0 = 0x02.
        let features = [0x02, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(le_event_mask_for_features(features), 0x3F);
    }

    #[test]
    fn le_event_mask_accumulates_every_documented_bit() {
        // bits 1, 5, 6, 8, 11, 12, 13, 14 all set.
        let bits: u64 = (1 << 1) | (1 << 5) | (1 << 6) | (1 << 8) | (1 << 11) | (1 << 12) | (1 << 13) | (1 << 14);
        let features = bits.to_le_bytes();
        let expected = 0x1F | 0x20 | 0x40 | 0x780 | 0x800 | 0x71000 | 0xE000 | 0x80000;
        assert_eq!(le_event_mask_for_features(features), expected);
    }

    #[test]
    fn disconnect_checks_status() {
        let mut bytes = vec![framing::HCI_EVENT_PKT, crate::event::EVT_COMMAND_STATUS];
        let opcode = crate::command::opcode_pack(link_control::OGF, link_control::OCF_DISCONNECT);
        let mut body = vec![0x0c, 1];
        body.extend_from_slice(&opcode.to_le_bytes());
        bytes.push(body.len() as u8);
        bytes.extend_from_slice(&body);

        let mut task = HciTask::new(MockChannel::new(bytes));
        let err = disconnect(&mut task, 0x0001, 0x13).unwrap_err();
        assert!(matches!(err, HciError::CommandError { status: 0x0c, .. }));
    }
}
