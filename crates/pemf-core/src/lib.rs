#![cfg_attr(not(test), no_std)]
//! Real-time concurrency and safety core of the pEMF driver.
//!
//! A fixed-priority dispatcher runs four tasks: the pulse generator (always
//! highest), the battery monitor with its safety monitor, the loader-entry
//! coordinator and diagnostics. Shared state lives in one [`SharedState`]
//! accessed through short critical sections and atomics. Hardware sits
//! behind the traits in [`hal`] so everything here builds and tests on the
//! host.

#[macro_use]
mod fmt;

pub mod battery;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod hal;
pub mod log;
pub mod pulse;
pub mod safety;
pub mod scheduler;
pub mod selftest;
pub mod shared;
pub mod shutdown;

pub use battery::{BatteryMonitor, BatteryReading, BatteryState};
pub use config::{
    phases_resolvable, BatteryThresholds, Config, EntryPolicy, SafetyLimits,
    WaveformParams, ENTRY_KEY_LEN, MIN_PHASE_TICKS,
};
pub use diagnostics::Diagnostics;
pub use error::{
    AnalogError, BootloaderError, ConfigError, EntryRejected, Error,
    SafetyLimit,
};
pub use hal::{
    poll_until, AnalogInput, IndicatorPattern, IndicatorStatus, Loader,
    OutputLine, StatusIndicator,
};
pub use log::{LogCategory, LogEvent, LogQueue, LogSink, Severity};
pub use pulse::{PulseGenerator, PulseStats};
pub use safety::{SafetyFlag, SafetyFlags, SafetyMonitor, SafetySnapshot};
pub use scheduler::{
    Rearm, Scheduler, Task, TaskDecl, TaskId, TaskPriority, TaskStatus,
    TASK_TABLE,
};
pub use shared::{HardwareSafetyState, SharedState};
pub use shutdown::{
    EntryChannel, EntryStatus, Handoff, Progress, ShutdownCoordinator,
    ShutdownState,
};
