use embassy_time::Duration;

use crate::error::ConfigError;

/// Length of the shared secret carried by entry and reset commands.
pub const ENTRY_KEY_LEN: usize = 16;

/// Shortest phase, in timer ticks, the pulse generator is asked to hold.
/// One tick of wake-up latency is then at most 1 % of the phase.
pub const MIN_PHASE_TICKS: u64 = 100;

/// Whether a period of `period_ticks` at `duty_permille` splits into two
/// phases the timer can hold within 1 %: neither is shorter than
/// [`MIN_PHASE_TICKS`] and truncating the active phase to whole ticks loses
/// at most 1 % of it.
pub const fn phases_resolvable(period_ticks: u64, duty_permille: u16) -> bool {
    // Thousandths of a tick.
    let exact = period_ticks * duty_permille as u64;
    let active = exact / 1000;
    if active > period_ticks {
        return false;
    }
    let idle = period_ticks - active;
    if active < MIN_PHASE_TICKS || idle < MIN_PHASE_TICKS {
        return false;
    }
    (exact - active * 1000) * 100 <= exact
}

/// Output waveform: total period and the active share of it in per-mille.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaveformParams {
    pub period: Duration,
    pub duty_permille: u16,
}

impl WaveformParams {
    /// 100 Hz.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);
    /// 0.1 Hz.
    pub const MAX_PERIOD: Duration = Duration::from_secs(10);
    pub const MIN_DUTY_PERMILLE: u16 = 1;
    pub const MAX_DUTY_PERMILLE: u16 = 999;

    pub const fn new(period: Duration, duty_permille: u16) -> Self {
        Self { period, duty_permille }
    }

    pub const fn from_millis(period_ms: u32, duty_permille: u16) -> Self {
        Self::new(Duration::from_millis(period_ms as u64), duty_permille)
    }

    /// Length of the energized phase.
    pub const fn active_time(&self) -> Duration {
        Duration::from_ticks(
            self.period.as_ticks() * self.duty_permille as u64 / 1000,
        )
    }

    /// Length of the de-energized phase.
    pub const fn idle_time(&self) -> Duration {
        Duration::from_ticks(
            self.period.as_ticks() - self.active_time().as_ticks(),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period < Self::MIN_PERIOD || self.period > Self::MAX_PERIOD {
            return Err(ConfigError::InvalidPeriod);
        }
        if !(Self::MIN_DUTY_PERMILLE..=Self::MAX_DUTY_PERMILLE)
            .contains(&self.duty_permille)
        {
            return Err(ConfigError::InvalidDutyCycle);
        }
        if !phases_resolvable(self.period.as_ticks(), self.duty_permille) {
            return Err(ConfigError::PhaseTooShort);
        }
        Ok(())
    }
}

impl Default for WaveformParams {
    /// 2 Hz with a 5 ms active phase.
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 10)
    }
}

/// Classification thresholds in raw 12-bit ADC counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryThresholds {
    /// At or below: `Low`.
    pub low: u16,
    /// At or above: `Charging`.
    pub charging: u16,
    /// At or above: `Full`.
    pub full: u16,
}

impl Default for BatteryThresholds {
    fn default() -> Self {
        Self { low: 1425, charging: 1675, full: 1760 }
    }
}

/// Hard limits in raw ADC counts, outside every classification band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetyLimits {
    /// At or below: under-voltage (about 2.9 V).
    pub under_voltage: u16,
    /// At or above: over-voltage (about 4.3 V).
    pub over_voltage: u16,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self { under_voltage: 1200, over_voltage: 1802 }
    }
}

/// Authentication and pacing for the external entry channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EntryPolicy {
    pub key: [u8; ENTRY_KEY_LEN],
    pub min_interval: Duration,
}

impl Default for EntryPolicy {
    fn default() -> Self {
        Self { key: *b"pemf-loader-key!", min_interval: Duration::from_secs(1) }
    }
}

/// Everything the core needs at start-up. Immutable for the session apart
/// from the waveform, which is updated through
/// [`SharedState::set_waveform`](crate::SharedState::set_waveform).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub waveform: WaveformParams,
    pub thresholds: BatteryThresholds,
    pub limits: SafetyLimits,
    pub battery_interval: Duration,
    /// Emit a periodic battery report every this many samples.
    pub battery_report_every: u32,
    pub shutdown_timeout: Duration,
    pub shutdown_poll: Duration,
    pub diagnostics_interval: Duration,
    pub entry: EntryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            waveform: WaveformParams::default(),
            thresholds: BatteryThresholds::default(),
            limits: SafetyLimits::default(),
            battery_interval: Duration::from_millis(100),
            battery_report_every: 50,
            shutdown_timeout: Duration::from_secs(5),
            shutdown_poll: Duration::from_millis(10),
            diagnostics_interval: Duration::from_millis(100),
            entry: EntryPolicy::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.waveform.validate()?;

        let t = &self.thresholds;
        if !(t.low < t.charging && t.charging < t.full) {
            return Err(ConfigError::ThresholdOrder);
        }
        if self.limits.under_voltage >= t.low
            || self.limits.over_voltage <= t.full
        {
            return Err(ConfigError::LimitMargin);
        }

        let zero = Duration::from_ticks(0);
        if self.battery_interval == zero
            || self.shutdown_timeout == zero
            || self.shutdown_poll == zero
            || self.diagnostics_interval == zero
            || self.battery_report_every == 0
        {
            return Err(ConfigError::InvalidInterval);
        }
        Ok(())
    }
}
