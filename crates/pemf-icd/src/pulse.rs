use pemf_core::{PulseStats, WaveformParams};
use postcard_schema::Schema;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaveformConfig {
    pub period_ms: u32,
    /// Active share of the period, 1..=999.
    pub duty_permille: u16,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        WaveformParams::default().into()
    }
}

impl From<WaveformParams> for WaveformConfig {
    fn from(value: WaveformParams) -> Self {
        Self {
            period_ms: value.period.as_millis() as u32,
            duty_permille: value.duty_permille,
        }
    }
}

impl From<WaveformConfig> for WaveformParams {
    fn from(value: WaveformConfig) -> Self {
        WaveformParams::from_millis(value.period_ms, value.duty_permille)
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Schema, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseReport {
    pub cycles: u32,
    pub suppressed: u32,
    pub last_period_us: u64,
    pub last_active_us: u64,
    pub worst_period_ppm: u32,
    pub worst_active_ppm: u32,
    pub within_tolerance: bool,
}

impl From<PulseStats> for PulseReport {
    fn from(value: PulseStats) -> Self {
        Self {
            cycles: value.cycles,
            suppressed: value.suppressed,
            last_period_us: value.last_period.as_micros(),
            last_active_us: value.last_active.as_micros(),
            worst_period_ppm: value.worst_period_ppm,
            worst_active_ppm: value.worst_active_ppm,
            within_tolerance: value.within_tolerance(),
        }
    }
}
