use postcard_schema::Schema;
use serde::{Deserialize, Serialize};

use crate::InvalidDiscriminant;

define_wire_enum!(BatteryStatus, pemf_core::BatteryState, {
    Low,
    Normal,
    Charging,
    Full,
    Fault,
});

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryReport {
    /// Milliseconds since boot.
    pub ts: u64,
    pub raw: u16,
    pub millivolts: u16,
    pub status: BatteryStatus,
}

impl From<pemf_core::BatteryReading> for BatteryReport {
    fn from(value: pemf_core::BatteryReading) -> Self {
        Self {
            ts: value.timestamp.as_millis(),
            raw: value.raw_sample,
            millivolts: value.voltage_mv,
            status: value.state.into(),
        }
    }
}
