//! BLE long-range beacon.
//!
//! - `payload` - advertising data builder
//! - `params` - extended advertising parameters
//! - `sequencer` - setup state machine (params, data, start)

mod params;
mod payload;
mod sequencer;

pub use params::{
    AddressType, AdvertisingMode, AdvertisingParameters, FilterPolicy, PrimaryPhy, SecondaryPhy,
    TxPower, ALL_CHANNELS, DEFAULT_INSTANCE, DEFAULT_INTERVAL,
};
pub use payload::{
    AdRecord, BeaconPayload, PayloadError, ServiceIdentifier, AD_TYPE_COMPLETE_UUID16,
    AD_TYPE_FLAGS, MAX_PAYLOAD_LEN,
};
pub use sequencer::{
    AdvCommand, AdvCompletion, AdvProgress, AdvStep, AdvertisingError, AdvertisingSequencer,
    AdvertisingState, StepStatus,
};
