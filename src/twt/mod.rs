//! Wi-Fi 6 individual Target Wake Time.
//!
//! - `request` - setup request and schedule encoding
//! - `negotiator` - agreement lifecycle per connection epoch

mod negotiator;
mod request;

pub use negotiator::{DutyCycleState, NegotiationError, Negotiator, SetupStatus, TwtEvent};
pub use request::{
    encode_micros, AgreedSchedule, DutyCycleRequest, NegotiationMode, MAX_EXPONENT, TU_MICROS,
};
