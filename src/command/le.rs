//! LE Controller commands (OGF 0x08), including the Bluetooth 5.0 extended
//! advertising family. Grouped as BlueZ's own constant tables group them;
//! parameter shapes follow `bluetool.command`/`bluetool.bluez` where the
//! original implements the command, and the Core Specification structure
//! mirrored (but never implemented) by `bo-tie`'s `hci::le` module stubs
//! for the rest.

use crate::codec::WriteTo;
use crate::command::{unit_command, Command};

pub const OGF: u16 = 0x08;

pub const OCF_SET_EVENT_MASK: u16 = 0x0001;
pub const OCF_READ_BUFFER_SIZE: u16 = 0x0002;
pub const OCF_READ_LOCAL_SUPPORTED_FEATURES: u16 = 0x0003;
pub const OCF_SET_ADVERTISING_PARAMETERS: u16 = 0x0006;
pub const OCF_SET_ADVERTISING_DATA: u16 = 0x0008;
pub const OCF_SET_SCAN_RESPONSE_DATA: u16 = 0x0009;
pub const OCF_SET_ADVERTISE_ENABLE: u16 = 0x000a;
pub const OCF_SET_SCAN_PARAMETERS: u16 = 0x000b;
pub const OCF_SET_SCAN_ENABLE: u16 = 0x000c;
pub const OCF_CREATE_CONNECTION: u16 = 0x000d;
pub const OCF_CREATE_CONNECTION_CANCEL: u16 = 0x000e;
pub const OCF_READ_WHITE_LIST_SIZE: u16 = 0x000f;
pub const OCF_CLEAR_WHITE_LIST: u16 = 0x0010;
pub const OCF_ADD_DEVICE_TO_WHITE_LIST: u16 = 0x0011;
pub const OCF_REMOVE_DEVICE_FROM_WHITE_LIST: u16 = 0x0012;
pub const OCF_CONNECTION_UPDATE: u16 = 0x0013;
pub const OCF_SET_HOST_CHANNEL_CLASSIFICATION: u16 = 0x0014;
pub const OCF_START_ENCRYPTION: u16 = 0x0019;
pub const OCF_LONG_TERM_KEY_REQUEST_REPLY: u16 = 0x001a;
pub const OCF_LONG_TERM_KEY_REQUEST_NEGATIVE_REPLY: u16 = 0x001b;
pub const OCF_SET_DATA_LENGTH: u16 = 0x0022;
pub const OCF_READ_SUGGESTED_DEFAULT_DATA_LENGTH: u16 = 0x0023;
pub const OCF_WRITE_SUGGESTED_DEFAULT_DATA_LENGTH: u16 = 0x0024;
pub const OCF_SET_EXTENDED_ADVERTISING_PARAMETERS: u16 = 0x0036;
pub const OCF_SET_EXTENDED_ADVERTISING_DATA: u16 = 0x0037;
pub const OCF_SET_EXTENDED_SCAN_RESPONSE_DATA: u16 = 0x0038;
pub const OCF_SET_EXTENDED_ADVERTISING_ENABLE: u16 = 0x0039;
pub const OCF_READ_MAXIMUM_ADVERTISING_DATA_LENGTH: u16 = 0x003a;
pub const OCF_READ_NUMBER_OF_SUPPORTED_ADVERTISING_SETS: u16 = 0x003b;
pub const OCF_REMOVE_ADVERTISING_SET: u16 = 0x003c;
pub const OCF_CLEAR_ADVERTISING_SETS: u16 = 0x003d;
pub const OCF_SET_EXTENDED_SCAN_PARAMETERS: u16 = 0x0041;
pub const OCF_SET_EXTENDED_SCAN_ENABLE: u16 = 0x0042;
pub const OCF_EXTENDED_CREATE_CONNECTION: u16 = 0x0043;

fn opcode(ocf: u16) -> u16 {
    crate::command::opcode_pack(OGF, ocf)
}

unit_command!(ReadBufferSize, OGF, OCF_READ_BUFFER_SIZE);
unit_command!(ReadLocalSupportedFeatures, OGF, OCF_READ_LOCAL_SUPPORTED_FEATURES);
unit_command!(CreateConnectionCancel, OGF, OCF_CREATE_CONNECTION_CANCEL);
unit_command!(ReadWhiteListSize, OGF, OCF_READ_WHITE_LIST_SIZE);
unit_command!(ClearWhiteList, OGF, OCF_CLEAR_WHITE_LIST);
unit_command!(ReadSuggestedDefaultDataLength, OGF, OCF_READ_SUGGESTED_DEFAULT_DATA_LENGTH);
unit_command!(ReadMaximumAdvertisingDataLength, OGF, OCF_READ_MAXIMUM_ADVERTISING_DATA_LENGTH);
unit_command!(ReadNumberOfSupportedAdvertisingSets, OGF, OCF_READ_NUMBER_OF_SUPPORTED_ADVERTISING_SETS);
unit_command!(ClearAdvertisingSets, OGF, OCF_CLEAR_ADVERTISING_SETS);

#[derive(Debug, Clone, Copy)]
pub struct SetEventMask {
    pub mask: u64,
}

impl Command for SetEventMask {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_EVENT_MASK)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(8);
        buf.write_as(self.mask).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetAdvertisingParameters {
    pub advertising_interval_min: u16,
    pub advertising_interval_max: u16,
    pub advertising_type: u8,
    pub own_address_type: u8,
    pub peer_address_type: u8,
    pub peer_address: [u8; 6],
    pub advertising_channel_map: u8,
    pub advertising_filter_policy: u8,
}

impl Command for SetAdvertisingParameters {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_ADVERTISING_PARAMETERS)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(15);
        buf.write_as(self.advertising_interval_min).ok()?;
        buf.write_as(self.advertising_interval_max).ok()?;
        buf.write_as(self.advertising_type).ok()?;
        buf.write_as(self.own_address_type).ok()?;
        buf.write_as(self.peer_address_type).ok()?;
        buf.write_as(self.peer_address).ok()?;
        buf.write_as(self.advertising_channel_map).ok()?;
        buf.write_as(self.advertising_filter_policy).ok()?;
        Some(buf)
    }
}

fn pad_to_31(data: &[u8]) -> [u8; 31] {
    let mut out = [0u8; 31];
    let n = data.len().min(31);
    out[..n].copy_from_slice(&data[..n]);
    out
}

#[derive(Debug, Clone)]
pub struct SetAdvertisingData {
    pub data: Vec<u8>,
}

impl Command for SetAdvertisingData {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_ADVERTISING_DATA)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(32);
        buf.write_as(self.data.len().min(31) as u8).ok()?;
        buf.write_as(pad_to_31(&self.data)).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone)]
pub struct SetScanResponseData {
    pub data: Vec<u8>,
}

impl Command for SetScanResponseData {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_SCAN_RESPONSE_DATA)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(32);
        buf.write_as(self.data.len().min(31) as u8).ok()?;
        buf.write_as(pad_to_31(&self.data)).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetAdvertiseEnable {
    pub enable: bool,
}

impl Command for SetAdvertiseEnable {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_ADVERTISE_ENABLE)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(1);
        buf.write_as(self.enable as u8).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetScanParameters {
    pub scan_type: u8,
    pub scan_interval: u16,
    pub scan_window: u16,
    pub own_address_type: u8,
    pub scanning_filter_policy: u8,
}

impl Command for SetScanParameters {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_SCAN_PARAMETERS)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(7);
        buf.write_as(self.scan_type).ok()?;
        buf.write_as(self.scan_interval).ok()?;
        buf.write_as(self.scan_window).ok()?;
        buf.write_as(self.own_address_type).ok()?;
        buf.write_as(self.scanning_filter_policy).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetScanEnable {
    pub enable: bool,
    pub filter_duplicates: bool,
}

impl Command for SetScanEnable {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_SCAN_ENABLE)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(2);
        buf.write_as(self.enable as u8).ok()?;
        buf.write_as(self.filter_duplicates as u8).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CreateConnection {
    pub scan_interval: u16,
    pub scan_window: u16,
    pub init_filter_policy: u8,
    pub peer_address_type: u8,
    pub peer_address: [u8; 6],
    pub own_address_type: u8,
    pub conn_interval_min: u16,
    pub conn_interval_max: u16,
    pub conn_latency: u16,
    pub supervision_timeout: u16,
    pub min_ce_length: u16,
    pub max_ce_length: u16,
}

impl Command for CreateConnection {
    fn opcode(&self) -> u16 {
        opcode(OCF_CREATE_CONNECTION)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(25);
        buf.write_as(self.scan_interval).ok()?;
        buf.write_as(self.scan_window).ok()?;
        buf.write_as(self.init_filter_policy).ok()?;
        buf.write_as(self.peer_address_type).ok()?;
        buf.write_as(self.peer_address).ok()?;
        buf.write_as(self.own_address_type).ok()?;
        buf.write_as(self.conn_interval_min).ok()?;
        buf.write_as(self.conn_interval_max).ok()?;
        buf.write_as(self.conn_latency).ok()?;
        buf.write_as(self.supervision_timeout).ok()?;
        buf.write_as(self.min_ce_length).ok()?;
        buf.write_as(self.max_ce_length).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AddDeviceToWhiteList {
    pub address_type: u8,
    pub address: [u8; 6],
}

impl Command for AddDeviceToWhiteList {
    fn opcode(&self) -> u16 {
        opcode(OCF_ADD_DEVICE_TO_WHITE_LIST)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(7);
        buf.write_as(self.address_type).ok()?;
        buf.write_as(self.address).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RemoveDeviceFromWhiteList {
    pub address_type: u8,
    pub address: [u8; 6],
}

impl Command for RemoveDeviceFromWhiteList {
    fn opcode(&self) -> u16 {
        opcode(OCF_REMOVE_DEVICE_FROM_WHITE_LIST)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(7);
        buf.write_as(self.address_type).ok()?;
        buf.write_as(self.address).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionUpdate {
    pub connection_handle: u16,
    pub conn_interval_min: u16,
    pub conn_interval_max: u16,
    pub conn_latency: u16,
    pub supervision_timeout: u16,
    pub min_ce_length: u16,
    pub max_ce_length: u16,
}

impl Command for ConnectionUpdate {
    fn opcode(&self) -> u16 {
        opcode(OCF_CONNECTION_UPDATE)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(14);
        buf.write_as(self.connection_handle).ok()?;
        buf.write_as(self.conn_interval_min).ok()?;
        buf.write_as(self.conn_interval_max).ok()?;
        buf.write_as(self.conn_latency).ok()?;
        buf.write_as(self.supervision_timeout).ok()?;
        buf.write_as(self.min_ce_length).ok()?;
        buf.write_as(self.max_ce_length).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetHostChannelClassification {
    pub channel_map: [u8; 5],
}

impl Command for SetHostChannelClassification {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_HOST_CHANNEL_CLASSIFICATION)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(5);
        buf.write_as(self.channel_map).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StartEncryption {
    pub connection_handle: u16,
    pub random_number: u64,
    pub encrypted_diversifier: u16,
    pub long_term_key: [u8; 16],
}

impl Command for StartEncryption {
    fn opcode(&self) -> u16 {
        opcode(OCF_START_ENCRYPTION)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(28);
        buf.write_as(self.connection_handle).ok()?;
        buf.write_as(self.random_number).ok()?;
        buf.write_as(self.encrypted_diversifier).ok()?;
        buf.write_as(self.long_term_key).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LongTermKeyRequestReply {
    pub connection_handle: u16,
    pub long_term_key: [u8; 16],
}

impl Command for LongTermKeyRequestReply {
    fn opcode(&self) -> u16 {
        opcode(OCF_LONG_TERM_KEY_REQUEST_REPLY)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(18);
        buf.write_as(self.connection_handle).ok()?;
        buf.write_as(self.long_term_key).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LongTermKeyRequestNegativeReply {
    pub connection_handle: u16,
}

impl Command for LongTermKeyRequestNegativeReply {
    fn opcode(&self) -> u16 {
        opcode(OCF_LONG_TERM_KEY_REQUEST_NEGATIVE_REPLY)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(2);
        buf.write_as(self.connection_handle).ok()?;
        Some(buf)
    }
}

/// `tx_time` is derived from `tx_octets` by `helpers::data_length_tx_time`
/// when the caller does not want to pick it by hand.
#[derive(Debug, Clone, Copy)]
pub struct SetDataLength {
    pub connection_handle: u16,
    pub tx_octets: u16,
    pub tx_time: u16,
}

impl Command for SetDataLength {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_DATA_LENGTH)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(6);
        buf.write_as(self.connection_handle).ok()?;
        buf.write_as(self.tx_octets).ok()?;
        buf.write_as(self.tx_time).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteSuggestedDefaultDataLength {
    pub tx_octets: u16,
    pub tx_time: u16,
}

impl Command for WriteSuggestedDefaultDataLength {
    fn opcode(&self) -> u16 {
        opcode(OCF_WRITE_SUGGESTED_DEFAULT_DATA_LENGTH)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(4);
        buf.write_as(self.tx_octets).ok()?;
        buf.write_as(self.tx_time).ok()?;
        Some(buf)
    }
}

// --- Extended advertising family (Core v5.0+) ---

#[derive(Debug, Clone, Copy)]
pub struct SetExtendedAdvertisingParameters {
    pub advertising_handle: u8,
    pub advertising_event_properties: u16,
    pub primary_advertising_interval_min: u32,
    pub primary_advertising_interval_max: u32,
    pub primary_advertising_channel_map: u8,
    pub own_address_type: u8,
    pub peer_address_type: u8,
    pub peer_address: [u8; 6],
    pub advertising_filter_policy: u8,
    pub advertising_tx_power: i8,
    pub primary_advertising_phy: u8,
    pub secondary_advertising_max_skip: u8,
    pub secondary_advertising_phy: u8,
    pub advertising_sid: u8,
    pub scan_request_notification_enable: bool,
}

impl Command for SetExtendedAdvertisingParameters {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_EXTENDED_ADVERTISING_PARAMETERS)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(25);
        buf.write_as(self.advertising_handle).ok()?;
        buf.write_as(self.advertising_event_properties).ok()?;
        crate::codec::write_u24(self.primary_advertising_interval_min & 0x00ff_ffff, &mut buf).ok()?;
        crate::codec::write_u24(self.primary_advertising_interval_max & 0x00ff_ffff, &mut buf).ok()?;
        buf.write_as(self.primary_advertising_channel_map).ok()?;
        buf.write_as(self.own_address_type).ok()?;
        buf.write_as(self.peer_address_type).ok()?;
        buf.write_as(self.peer_address).ok()?;
        buf.write_as(self.advertising_filter_policy).ok()?;
        buf.write_as(self.advertising_tx_power).ok()?;
        buf.write_as(self.primary_advertising_phy).ok()?;
        buf.write_as(self.secondary_advertising_max_skip).ok()?;
        buf.write_as(self.secondary_advertising_phy).ok()?;
        buf.write_as(self.advertising_sid).ok()?;
        buf.write_as(self.scan_request_notification_enable as u8).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone)]
pub struct SetExtendedAdvertisingData {
    pub advertising_handle: u8,
    pub operation: u8,
    pub fragment_preference: u8,
    pub advertising_data: Vec<u8>,
}

impl Command for SetExtendedAdvertisingData {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_EXTENDED_ADVERTISING_DATA)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(4 + self.advertising_data.len());
        buf.write_as(self.advertising_handle).ok()?;
        buf.write_as(self.operation).ok()?;
        buf.write_as(self.fragment_preference).ok()?;
        buf.write_as(self.advertising_data.len() as u8).ok()?;
        buf.extend_from_slice(&self.advertising_data);
        Some(buf)
    }
}

#[derive(Debug, Clone)]
pub struct SetExtendedScanResponseData {
    pub advertising_handle: u8,
    pub operation: u8,
    pub fragment_preference: u8,
    pub scan_response_data: Vec<u8>,
}

impl Command for SetExtendedScanResponseData {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_EXTENDED_SCAN_RESPONSE_DATA)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(4 + self.scan_response_data.len());
        buf.write_as(self.advertising_handle).ok()?;
        buf.write_as(self.operation).ok()?;
        buf.write_as(self.fragment_preference).ok()?;
        buf.write_as(self.scan_response_data.len() as u8).ok()?;
        buf.extend_from_slice(&self.scan_response_data);
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtendedAdvertisingSet {
    pub advertising_handle: u8,
    pub duration: u16,
    pub max_extended_advertising_events: u8,
}

#[derive(Debug, Clone)]
pub struct SetExtendedAdvertisingEnable {
    pub enable: bool,
    pub sets: Vec<ExtendedAdvertisingSet>,
}

impl Command for SetExtendedAdvertisingEnable {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_EXTENDED_ADVERTISING_ENABLE)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(2 + self.sets.len() * 4);
        buf.write_as(self.enable as u8).ok()?;
        buf.write_as(self.sets.len() as u8).ok()?;
        for set in &self.sets {
            buf.write_as(set.advertising_handle).ok()?;
            buf.write_as(set.duration).ok()?;
            buf.write_as(set.max_extended_advertising_events).ok()?;
        }
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RemoveAdvertisingSet {
    pub advertising_handle: u8,
}

impl Command for RemoveAdvertisingSet {
    fn opcode(&self) -> u16 {
        opcode(OCF_REMOVE_ADVERTISING_SET)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(1);
        buf.write_as(self.advertising_handle).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtendedScanPhyParameters {
    pub scan_type: u8,
    pub scan_interval: u16,
    pub scan_window: u16,
}

#[derive(Debug, Clone)]
pub struct SetExtendedScanParameters {
    pub own_address_type: u8,
    pub scanning_filter_policy: u8,
    pub scanning_phys: u8,
    pub phy_params: Vec<ExtendedScanPhyParameters>,
}

impl Command for SetExtendedScanParameters {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_EXTENDED_SCAN_PARAMETERS)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(3 + self.phy_params.len() * 5);
        buf.write_as(self.own_address_type).ok()?;
        buf.write_as(self.scanning_filter_policy).ok()?;
        buf.write_as(self.scanning_phys).ok()?;
        for p in &self.phy_params {
            buf.write_as(p.scan_type).ok()?;
            buf.write_as(p.scan_interval).ok()?;
            buf.write_as(p.scan_window).ok()?;
        }
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetExtendedScanEnable {
    pub enable: bool,
    pub filter_duplicates: u8,
    pub duration: u16,
    pub period: u16,
}

impl Command for SetExtendedScanEnable {
    fn opcode(&self) -> u16 {
        opcode(OCF_SET_EXTENDED_SCAN_ENABLE)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(6);
        buf.write_as(self.enable as u8).ok()?;
        buf.write_as(self.filter_duplicates).ok()?;
        buf.write_as(self.duration).ok()?;
        buf.write_as(self.period).ok()?;
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtendedCreateConnectionPhyParameters {
    pub scan_interval: u16,
    pub scan_window: u16,
    pub conn_interval_min: u16,
    pub conn_interval_max: u16,
    pub conn_latency: u16,
    pub supervision_timeout: u16,
    pub min_ce_length: u16,
    pub max_ce_length: u16,
}

#[derive(Debug, Clone)]
pub struct ExtendedCreateConnection {
    pub init_filter_policy: u8,
    pub own_address_type: u8,
    pub peer_address_type: u8,
    pub peer_address: [u8; 6],
    pub initiating_phys: u8,
    pub phy_params: Vec<ExtendedCreateConnectionPhyParameters>,
}

impl Command for ExtendedCreateConnection {
    fn opcode(&self) -> u16 {
        opcode(OCF_EXTENDED_CREATE_CONNECTION)
    }
    fn serialize_params(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(10 + self.phy_params.len() * 16);
        buf.write_as(self.init_filter_policy).ok()?;
        buf.write_as(self.own_address_type).ok()?;
        buf.write_as(self.peer_address_type).ok()?;
        buf.write_as(self.peer_address).ok()?;
        buf.write_as(self.initiating_phys).ok()?;
        for p in &self.phy_params {
            buf.write_as(p.scan_interval).ok()?;
            buf.write_as(p.scan_window).ok()?;
            buf.write_as(p.conn_interval_min).ok()?;
            buf.write_as(p.conn_interval_max).ok()?;
            buf.write_as(p.conn_latency).ok()?;
            buf.write_as(p.supervision_timeout).ok()?;
            buf.write_as(p.min_ce_length).ok()?;
            buf.write_as(p.max_ce_length).ok()?;
        }
        Some(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertising_data_is_padded_to_31_bytes() {
        let cmd = SetAdvertisingData { data: vec![1, 2, 3] };
        let params = cmd.serialize_params().unwrap();
        assert_eq!(params.len(), 32);
        assert_eq!(params[0], 3);
        assert_eq!(&params[1..4], &[1, 2, 3]);
        assert!(params[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn extended_advertising_data_is_not_padded() {
        let cmd = SetExtendedAdvertisingData {
            advertising_handle: 0,
            operation: 0x03,
            fragment_preference: 0,
            advertising_data: vec![9, 9],
        };
        let params = cmd.serialize_params().unwrap();
        assert_eq!(params, vec![0, 0x03, 0, 2, 9, 9]);
    }

    #[test]
    fn create_connection_opcode() {
        let ocf_bits = opcode(OCF_CREATE_CONNECTION) & 0x03ff;
        assert_eq!(ocf_bits, OCF_CREATE_CONNECTION);
    }
}
