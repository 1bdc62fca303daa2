use pemf_core::{SafetyFlag, SafetySnapshot};
use postcard_schema::Schema;
use serde::{Deserialize, Serialize};

use crate::RejectReason;

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetyReport {
    pub bits: u8,
    pub over_voltage: bool,
    pub under_voltage: bool,
    pub over_current: bool,
    pub over_temperature: bool,
    pub emergency_stop: bool,
}

impl From<SafetySnapshot> for SafetyReport {
    fn from(value: SafetySnapshot) -> Self {
        Self {
            bits: value.bits(),
            over_voltage: value.contains(SafetyFlag::OverVoltage),
            under_voltage: value.contains(SafetyFlag::UnderVoltage),
            over_current: value.contains(SafetyFlag::OverCurrent),
            over_temperature: value.contains(SafetyFlag::OverTemperature),
            emergency_stop: value.emergency_stop(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetResponse {
    /// Flags that were set before the reset.
    Cleared(SafetyReport),
    Rejected(RejectReason),
}

impl From<Result<SafetySnapshot, pemf_core::EntryRejected>> for ResetResponse {
    fn from(value: Result<SafetySnapshot, pemf_core::EntryRejected>) -> Self {
        match value {
            Ok(cleared) => Self::Cleared(cleared.into()),
            Err(e) => Self::Rejected(e.into()),
        }
    }
}
