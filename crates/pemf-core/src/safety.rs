//! Latched safety flags and the limit checks that raise them.
//!
//! All flag traffic is `SeqCst` on a single byte so a write from the battery
//! chain is visible to the pulse generator on its very next activation.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use portable_atomic::{AtomicU8, Ordering};

use crate::battery::BatteryReading;
use crate::config::SafetyLimits;
use crate::error::{Error, SafetyLimit};
use crate::log::LogSink;
use crate::shared::SharedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SafetyFlag {
    OverVoltage = 1 << 0,
    UnderVoltage = 1 << 1,
    OverCurrent = 1 << 2,
    OverTemperature = 1 << 3,
    EmergencyStop = 1 << 4,
}

impl From<SafetyLimit> for SafetyFlag {
    fn from(value: SafetyLimit) -> Self {
        match value {
            SafetyLimit::OverVoltage => Self::OverVoltage,
            SafetyLimit::UnderVoltage => Self::UnderVoltage,
            SafetyLimit::OverCurrent => Self::OverCurrent,
            SafetyLimit::OverTemperature => Self::OverTemperature,
        }
    }
}

const CONDITIONS: u8 = SafetyFlag::OverVoltage as u8
    | SafetyFlag::UnderVoltage as u8
    | SafetyFlag::OverCurrent as u8
    | SafetyFlag::OverTemperature as u8;
const ESTOP: u8 = SafetyFlag::EmergencyStop as u8;

/// Point-in-time copy of the flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetySnapshot(u8);

impl SafetySnapshot {
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, flag: SafetyFlag) -> bool {
        self.0 & flag as u8 != 0
    }

    pub const fn emergency_stop(self) -> bool {
        self.contains(SafetyFlag::EmergencyStop)
    }

    /// Any condition other than the emergency stop itself.
    pub const fn any_condition(self) -> bool {
        self.0 & CONDITIONS != 0
    }

    pub const fn is_clear(self) -> bool {
        self.0 == 0
    }
}

/// Independently settable safety conditions plus the emergency stop.
///
/// Nothing in the monitoring path clears a flag. The only way back is
/// [`EntryChannel::supervised_reset`](crate::EntryChannel::supervised_reset)
/// or a fresh boot.
pub struct SafetyFlags {
    bits: AtomicU8,
}

impl SafetyFlags {
    pub const fn new() -> Self {
        Self { bits: AtomicU8::new(0) }
    }

    /// Raise a condition together with the emergency stop in one
    /// read-modify-write. Returns `true` if the condition was not already
    /// set.
    pub fn raise(&self, flag: SafetyFlag) -> bool {
        let prev = self.bits.fetch_or(flag as u8 | ESTOP, Ordering::SeqCst);
        prev & flag as u8 == 0
    }

    /// Record a condition from an external detector. The emergency stop
    /// follows on the next evaluation, at the latest when the pulse
    /// generator starts its next cycle.
    pub fn set(&self, flag: SafetyFlag) {
        self.bits.fetch_or(flag as u8, Ordering::SeqCst);
    }

    /// Enforce "any condition implies emergency stop". Returns the stop
    /// state afterwards.
    pub fn latch_emergency(&self) -> bool {
        let bits = self.bits.load(Ordering::SeqCst);
        if bits & CONDITIONS != 0 && bits & ESTOP == 0 {
            self.bits.fetch_or(ESTOP, Ordering::SeqCst);
            return true;
        }
        bits & ESTOP != 0
    }

    /// Latch the emergency stop with no condition behind it. Used when the
    /// start-up checks fail.
    pub fn force_stop(&self) {
        self.bits.fetch_or(ESTOP, Ordering::SeqCst);
    }

    pub fn emergency_stop(&self) -> bool {
        self.bits.load(Ordering::SeqCst) & ESTOP != 0
    }

    pub fn snapshot(&self) -> SafetySnapshot {
        SafetySnapshot(self.bits.load(Ordering::SeqCst))
    }

    /// Returns what was set before the clear.
    pub(crate) fn clear_all(&self) -> SafetySnapshot {
        SafetySnapshot(self.bits.swap(0, Ordering::SeqCst))
    }
}

impl Default for SafetyFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Hard-limit check for a raw sample.
pub const fn check_limits(
    raw: u16,
    limits: &SafetyLimits,
) -> Option<SafetyLimit> {
    if raw >= limits.over_voltage {
        Some(SafetyLimit::OverVoltage)
    } else if raw <= limits.under_voltage {
        Some(SafetyLimit::UnderVoltage)
    } else {
        None
    }
}

/// Evaluates each fresh reading against the hard limits. Runs inside the
/// battery chain so it is never starved by diagnostics.
pub struct SafetyMonitor<'a, M: RawMutex, L: LogSink> {
    shared: &'a SharedState<M>,
    log: &'a L,
    limits: SafetyLimits,
}

impl<'a, M: RawMutex, L: LogSink> SafetyMonitor<'a, M, L> {
    pub fn new(
        shared: &'a SharedState<M>,
        log: &'a L,
        limits: SafetyLimits,
    ) -> Self {
        Self { shared, log, limits }
    }

    /// Raise the matching flag on a breach. Returns the breach so the
    /// caller can surface it. Latched flags stay set on a good reading.
    pub fn evaluate(&self, reading: &BatteryReading) -> Result<(), Error> {
        let breach = check_limits(reading.raw_sample, &self.limits);
        if let Some(kind) = breach {
            if self.shared.flags().raise(kind.into()) {
                error!("safety limit {:?} at raw {}", kind, reading.raw_sample);
                event!(
                    self.log,
                    reading.timestamp,
                    Error,
                    Safety,
                    "{:?} at {} mV raw {}, emergency stop",
                    kind,
                    reading.voltage_mv,
                    reading.raw_sample
                );
            }
        }
        self.enforce(reading.timestamp);

        match breach {
            Some(kind) => Err(Error::SafetyLimitExceeded { kind }),
            None => Ok(()),
        }
    }

    /// Latch the emergency stop if any condition is set. Returns whether
    /// the stop is active.
    pub fn enforce(&self, now: Instant) -> bool {
        let flags = self.shared.flags();
        let was_stopped = flags.emergency_stop();
        let stopped = flags.latch_emergency();
        if stopped && !was_stopped {
            event!(
                self.log,
                now,
                Error,
                Safety,
                "emergency stop latched, flags {:#04x}",
                flags.snapshot().bits()
            );
        }
        stopped
    }
}
