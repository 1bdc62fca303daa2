//! Battery sampling and classification.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};

use crate::config::{BatteryThresholds, Config, SafetyLimits};
use crate::error::Error;
use crate::hal::{AnalogInput, IndicatorStatus, StatusIndicator};
use crate::log::{LogCategory, LogEvent, LogSink, Severity};
use crate::safety::SafetyMonitor;
use crate::scheduler::{Rearm, Task, TaskId};
use crate::shared::SharedState;

/// 10k/5.1k divider, 3.3 V reference, 12-bit conversion:
/// `mV = raw * 2386 / 1000`.
pub const MILLIVOLTS_PER_KILOCOUNT: u32 = 2386;

/// Saturates at `u16::MAX`.
pub const fn raw_to_millivolts(raw: u16) -> u16 {
    let mv = raw as u32 * MILLIVOLTS_PER_KILOCOUNT / 1000;
    if mv > u16::MAX as u32 {
        u16::MAX
    } else {
        mv as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BatteryState {
    Low = 0,
    Normal = 1,
    Charging = 2,
    Full = 3,
    Fault = 4,
}

impl BatteryState {
    /// Bands on raw counts:
    /// `..=low` Low, `low+1..charging` Normal, `charging..full` Charging,
    /// `full..over_voltage` Full, `over_voltage..` Fault.
    pub const fn classify(
        raw: u16,
        thresholds: &BatteryThresholds,
        limits: &SafetyLimits,
    ) -> Self {
        if raw <= thresholds.low {
            Self::Low
        } else if raw < thresholds.charging {
            Self::Normal
        } else if raw < thresholds.full {
            Self::Charging
        } else if raw < limits.over_voltage {
            Self::Full
        } else {
            Self::Fault
        }
    }
}

impl TryFrom<u8> for BatteryState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Normal),
            2 => Ok(Self::Charging),
            3 => Ok(Self::Full),
            4 => Ok(Self::Fault),
            _ => Err(()),
        }
    }
}

/// Severity of the event logged for a state change.
pub const fn transition_severity(
    from: BatteryState,
    to: BatteryState,
) -> Severity {
    match (from, to) {
        (BatteryState::Normal, BatteryState::Low) => Severity::Warn,
        (_, BatteryState::Fault) => Severity::Warn,
        _ => Severity::Info,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryReading {
    pub timestamp: Instant,
    pub raw_sample: u16,
    pub voltage_mv: u16,
    pub state: BatteryState,
}

impl BatteryReading {
    pub const fn new(
        timestamp: Instant,
        raw_sample: u16,
        thresholds: &BatteryThresholds,
        limits: &SafetyLimits,
    ) -> Self {
        Self {
            timestamp,
            raw_sample,
            voltage_mv: raw_to_millivolts(raw_sample),
            state: BatteryState::classify(raw_sample, thresholds, limits),
        }
    }
}

/// Periodic battery task. Each activation takes a throwaway sample, then
/// classifies the next one, publishes it, and hands it to the
/// [`SafetyMonitor`].
pub struct BatteryMonitor<'a, M, L, A, I>
where
    M: RawMutex,
    L: LogSink,
    A: AnalogInput,
    I: StatusIndicator,
{
    shared: &'a SharedState<M>,
    log: &'a L,
    input: A,
    indicator: I,
    safety: SafetyMonitor<'a, M, L>,
    thresholds: BatteryThresholds,
    limits: SafetyLimits,
    interval: Duration,
    report_every: u32,
    samples: u32,
    failures: u32,
    shown: Option<IndicatorStatus>,
}

impl<'a, M, L, A, I> BatteryMonitor<'a, M, L, A, I>
where
    M: RawMutex,
    L: LogSink,
    A: AnalogInput,
    I: StatusIndicator,
{
    pub fn new(
        shared: &'a SharedState<M>,
        log: &'a L,
        input: A,
        indicator: I,
        config: &Config,
    ) -> Self {
        Self {
            shared,
            log,
            input,
            indicator,
            safety: SafetyMonitor::new(shared, log, config.limits),
            thresholds: config.thresholds,
            limits: config.limits,
            interval: config.battery_interval,
            report_every: config.battery_report_every,
            samples: 0,
            failures: 0,
            shown: None,
        }
    }

    /// Number of failed conversions since start-up.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn sample(&mut self, now: Instant) -> Option<BatteryReading> {
        // The first conversion after idle carries a transient.
        let _ = self.input.sample();

        match self.input.sample() {
            Ok(raw) => Some(BatteryReading::new(
                now,
                raw,
                &self.thresholds,
                &self.limits,
            )),
            Err(_) => {
                self.failures = self.failures.wrapping_add(1);
                match self.shared.battery_reading() {
                    Some(last) => event!(
                        self.log,
                        now,
                        Error,
                        Battery,
                        "adc read failed, last {:?} {} mV raw {}",
                        last.state,
                        last.voltage_mv,
                        last.raw_sample
                    ),
                    None => event!(
                        self.log,
                        now,
                        Error,
                        Battery,
                        "adc read failed, no prior reading"
                    ),
                }
                None
            }
        }
    }

    fn note_transition(&mut self, reading: &BatteryReading) {
        let previous = self.shared.battery_state();
        if previous == Some(reading.state) {
            return;
        }

        let event = match previous {
            Some(from) => LogEvent::new(
                reading.timestamp,
                transition_severity(from, reading.state),
                LogCategory::Battery,
                format_args!(
                    "battery {:?} -> {:?} at {} mV",
                    from, reading.state, reading.voltage_mv
                ),
            ),
            None => LogEvent::new(
                reading.timestamp,
                Severity::Info,
                LogCategory::Battery,
                format_args!(
                    "battery {:?} at {} mV",
                    reading.state, reading.voltage_mv
                ),
            ),
        };
        self.log.push(event);
    }

    fn show(&mut self, status: IndicatorStatus) {
        if self.shown != Some(status) {
            self.indicator.show(status);
            self.shown = Some(status);
        }
    }
}

impl<M, L, A, I> Task for BatteryMonitor<'_, M, L, A, I>
where
    M: RawMutex,
    L: LogSink,
    A: AnalogInput,
    I: StatusIndicator,
{
    fn id(&self) -> TaskId {
        TaskId::BatteryMonitor
    }

    fn run(&mut self, now: Instant) -> Result<Rearm, Error> {
        match self.sample(now) {
            Some(reading) => {
                self.note_transition(&reading);
                self.shared.publish_reading(reading);

                self.samples = self.samples.wrapping_add(1);
                if self.report_every != 0
                    && self.samples % self.report_every == 0
                {
                    event!(
                        self.log,
                        now,
                        Debug,
                        Battery,
                        "battery {:?} {} mV raw {}",
                        reading.state,
                        reading.voltage_mv,
                        reading.raw_sample
                    );
                }

                let breach = self.safety.evaluate(&reading);
                if breach.is_err() || self.shared.flags().emergency_stop() {
                    self.show(IndicatorStatus::Emergency);
                } else {
                    self.show(reading.state.into());
                }
            }
            None => {
                // Nothing new to classify; latched flags still apply.
                if self.safety.enforce(now) {
                    self.show(IndicatorStatus::Emergency);
                }
            }
        }
        Ok(Rearm::After(self.interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_boundaries() {
        let t = BatteryThresholds::default();
        let l = SafetyLimits::default();
        let c = |raw| BatteryState::classify(raw, &t, &l);
        assert_eq!(c(0), BatteryState::Low);
        assert_eq!(c(t.low), BatteryState::Low);
        assert_eq!(c(t.low + 1), BatteryState::Normal);
        assert_eq!(c(t.charging - 1), BatteryState::Normal);
        assert_eq!(c(t.charging), BatteryState::Charging);
        assert_eq!(c(t.full - 1), BatteryState::Charging);
        assert_eq!(c(t.full), BatteryState::Full);
        assert_eq!(c(l.over_voltage - 1), BatteryState::Full);
        assert_eq!(c(l.over_voltage), BatteryState::Fault);
        assert_eq!(c(u16::MAX), BatteryState::Fault);
    }

    #[test]
    fn classification_is_monotonic() {
        let t = BatteryThresholds::default();
        let l = SafetyLimits::default();
        let mut last = BatteryState::Low as u8;
        for raw in 0..=4095u16 {
            let s = BatteryState::classify(raw, &t, &l) as u8;
            assert!(s >= last, "raw {raw} went backwards");
            last = s;
        }
    }

    #[test]
    fn voltage_scale() {
        assert_eq!(raw_to_millivolts(0), 0);
        assert_eq!(raw_to_millivolts(1000), 2386);
        assert_eq!(raw_to_millivolts(1400), 3340);
        assert_eq!(raw_to_millivolts(1802), 4299);
        assert_eq!(raw_to_millivolts(4095), 9770);
        assert_eq!(raw_to_millivolts(27_466), 65_533);
        assert_eq!(raw_to_millivolts(27_467), u16::MAX);
        assert_eq!(raw_to_millivolts(u16::MAX), u16::MAX);
    }

    #[test]
    fn normal_to_low_is_a_warning() {
        use BatteryState::*;
        assert_eq!(transition_severity(Normal, Low), Severity::Warn);
        assert_eq!(transition_severity(Charging, Low), Severity::Info);
        assert_eq!(transition_severity(Low, Normal), Severity::Info);
        assert_eq!(transition_severity(Normal, Charging), Severity::Info);
        assert_eq!(transition_severity(Full, Fault), Severity::Warn);
    }

    #[test]
    fn state_round_trips_through_u8() {
        for s in [
            BatteryState::Low,
            BatteryState::Normal,
            BatteryState::Charging,
            BatteryState::Full,
            BatteryState::Fault,
        ] {
            assert_eq!(BatteryState::try_from(s as u8), Ok(s));
        }
        assert_eq!(BatteryState::try_from(5), Err(()));
    }
}
