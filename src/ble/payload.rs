//! Beacon advertising payload.
//!
//! The payload is a sequence of length-prefixed AD structures:
//!
//! ```text
//! [len][type][value...] [len][type][value...] ...
//! ```
//!
//! `len` counts the type byte plus the value. The minimal beacon carries a
//! flags record and a complete list of 16-bit service UUIDs:
//!
//! ```
//! use twt_beacon_esp32::ble::{BeaconPayload, ServiceIdentifier};
//!
//! let payload = BeaconPayload::for_service(ServiceIdentifier::new(0x181A));
//! assert_eq!(payload.to_bytes(), [0x02, 0x01, 0x06, 0x03, 0x03, 0x1A, 0x18]);
//! ```

use std::fmt;

/// AD type: flags.
pub const AD_TYPE_FLAGS: u8 = 0x01;

/// AD type: complete list of 16-bit service UUIDs.
pub const AD_TYPE_COMPLETE_UUID16: u8 = 0x03;

/// Flags bit: LE General Discoverable Mode.
pub const FLAG_LE_GENERAL_DISCOVERABLE: u8 = 0x02;

/// Flags bit: BR/EDR not supported.
pub const FLAG_BR_EDR_NOT_SUPPORTED: u8 = 0x04;

/// Largest payload accepted by the builder (legacy advertising data size).
pub const MAX_PAYLOAD_LEN: usize = 31;

/// 16-bit Bluetooth SIG service UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceIdentifier(u16);

impl ServiceIdentifier {
    /// Environmental Sensing service.
    pub const ENVIRONMENTAL_SENSING: Self = Self(0x181A);

    pub const fn new(uuid: u16) -> Self {
        Self(uuid)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// One AD structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdRecord {
    /// Discoverability flags.
    Flags(u8),
    /// Complete list of 16-bit service UUIDs.
    CompleteServiceUuids16(Vec<ServiceIdentifier>),
}

impl AdRecord {
    fn ad_type(&self) -> u8 {
        match self {
            Self::Flags(_) => AD_TYPE_FLAGS,
            Self::CompleteServiceUuids16(_) => AD_TYPE_COMPLETE_UUID16,
        }
    }

    fn value_len(&self) -> usize {
        match self {
            Self::Flags(_) => 1,
            Self::CompleteServiceUuids16(uuids) => uuids.len() * 2,
        }
    }

    /// Bytes on the air, including the length prefix.
    pub fn encoded_len(&self) -> usize {
        2 + self.value_len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push((1 + self.value_len()) as u8);
        out.push(self.ad_type());
        match self {
            Self::Flags(flags) => out.push(*flags),
            Self::CompleteServiceUuids16(uuids) => {
                for uuid in uuids {
                    out.extend_from_slice(&uuid.as_u16().to_le_bytes());
                }
            }
        }
    }
}

/// Errors while assembling a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Adding the record would exceed the payload budget.
    TooLong { len: usize, max: usize },
    /// A UUID list record must carry at least one UUID.
    EmptyUuidList,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong { len, max } => {
                write!(f, "advertising payload too long: {} bytes (max {})", len, max)
            }
            Self::EmptyUuidList => write!(f, "service UUID list is empty"),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Ordered AD records making up the beacon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeaconPayload {
    records: Vec<AdRecord>,
}

impl BeaconPayload {
    /// Empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimal discoverable beacon: flags (general discoverable, no BR/EDR)
    /// followed by the service UUID. Always 7 bytes.
    pub fn for_service(service: ServiceIdentifier) -> Self {
        Self {
            records: vec![
                AdRecord::Flags(FLAG_LE_GENERAL_DISCOVERABLE | FLAG_BR_EDR_NOT_SUPPORTED),
                AdRecord::CompleteServiceUuids16(vec![service]),
            ],
        }
    }

    /// Append a record, enforcing the payload budget.
    pub fn with_record(mut self, record: AdRecord) -> Result<Self, PayloadError> {
        if matches!(&record, AdRecord::CompleteServiceUuids16(uuids) if uuids.is_empty()) {
            return Err(PayloadError::EmptyUuidList);
        }
        let len = self.encoded_len() + record.encoded_len();
        if len > MAX_PAYLOAD_LEN {
            return Err(PayloadError::TooLong {
                len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        self.records.push(record);
        Ok(self)
    }

    pub fn records(&self) -> &[AdRecord] {
        &self.records
    }

    /// Total encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        self.records.iter().map(AdRecord::encoded_len).sum()
    }

    /// Serialize to the advertising data wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for record in &self.records {
            record.encode_into(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environmental_sensing_beacon_bytes() {
        let payload = BeaconPayload::for_service(ServiceIdentifier::ENVIRONMENTAL_SENSING);
        assert_eq!(
            payload.to_bytes(),
            vec![0x02, 0x01, 0x06, 0x03, 0x03, 0x1A, 0x18]
        );
        assert_eq!(payload.encoded_len(), 7);
    }

    #[test]
    fn test_minimal_beacon_fits_eight_bytes() {
        for uuid in [0x0000, 0x180F, 0xFFFF] {
            let payload = BeaconPayload::for_service(ServiceIdentifier::new(uuid));
            assert!(payload.to_bytes().len() <= 8);
        }
    }

    #[test]
    fn test_uuid_is_little_endian() {
        let bytes = BeaconPayload::for_service(ServiceIdentifier::new(0xABCD)).to_bytes();
        assert_eq!(&bytes[5..], &[0xCD, 0xAB]);
    }

    #[test]
    fn test_record_order_preserved() {
        let payload = BeaconPayload::new()
            .with_record(AdRecord::Flags(0x06))
            .unwrap()
            .with_record(AdRecord::CompleteServiceUuids16(vec![
                ServiceIdentifier::new(0x180F),
                ServiceIdentifier::new(0x181A),
            ]))
            .unwrap();
        assert_eq!(
            payload.to_bytes(),
            vec![0x02, 0x01, 0x06, 0x05, 0x03, 0x0F, 0x18, 0x1A, 0x18]
        );
        assert_eq!(payload.records().len(), 2);
    }

    #[test]
    fn test_budget_enforced() {
        let uuids: Vec<_> = (0..14).map(ServiceIdentifier::new).collect();
        // 2 + 28 = 30 bytes fits
        let payload = BeaconPayload::new()
            .with_record(AdRecord::CompleteServiceUuids16(uuids))
            .unwrap();
        assert_eq!(
            payload.with_record(AdRecord::Flags(0x06)),
            Err(PayloadError::TooLong { len: 33, max: 31 })
        );
    }

    #[test]
    fn test_empty_uuid_list_rejected() {
        assert_eq!(
            BeaconPayload::new().with_record(AdRecord::CompleteServiceUuids16(vec![])),
            Err(PayloadError::EmptyUuidList)
        );
    }

    #[test]
    fn test_service_identifier_display() {
        assert_eq!(ServiceIdentifier::new(0x181A).to_string(), "0x181A");
    }
}
