use crate::scheduler::TaskId;

/// Which hard safety limit was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SafetyLimit {
    OverVoltage,
    UnderVoltage,
    OverCurrent,
    OverTemperature,
}

/// Failures surfaced by the real-time core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The analog front end failed to produce a sample.
    AnalogReadFailure,
    /// A reading crossed a hard limit. Fatal until a supervised reset.
    SafetyLimitExceeded { kind: SafetyLimit },
    /// A task did not acknowledge a suspension request before the deadline.
    TaskQuiesceTimeout { task: TaskId },
    /// An output was energized when it had to be idle.
    UnsafeHardwareState,
    /// The start-up consistency checks did not pass.
    SelfTestFailure,
}

/// Why a loader-entry sequence was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootloaderError {
    UnsafeHardwareState,
    TaskQuiesceTimeout { task: TaskId },
}

impl From<BootloaderError> for Error {
    fn from(value: BootloaderError) -> Self {
        match value {
            BootloaderError::UnsafeHardwareState => Error::UnsafeHardwareState,
            BootloaderError::TaskQuiesceTimeout { task } => {
                Error::TaskQuiesceTimeout { task }
            }
        }
    }
}

/// Refusals returned by the entry channel before any sequence starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EntryRejected {
    /// The supplied key did not match.
    Unauthorized,
    /// Another attempt arrived inside the minimum interval.
    RateLimited,
    /// A sequence is already pending or in flight.
    Busy,
}

/// Invalid configuration or task table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    InvalidPeriod,
    InvalidDutyCycle,
    /// A phase is too short for the timer to hold within 1 %.
    PhaseTooShort,
    /// Classification thresholds are not strictly increasing.
    ThresholdOrder,
    /// A safety limit falls inside a classification band.
    LimitMargin,
    /// A periodic interval or timeout is zero.
    InvalidInterval,
    /// `PulseGeneration` is missing or held by another task.
    PriorityInvariant,
    DuplicateTask,
}

/// One failed analog conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AnalogError;

impl From<AnalogError> for Error {
    fn from(_: AnalogError) -> Self {
        Error::AnalogReadFailure
    }
}
