//! Boundary traits implemented by the board layer.

use core::future::Future;
use core::pin::pin;

use derive_more::From;
use embassy_futures::poll_once;
use embassy_time::{Duration, Instant};

use crate::battery::BatteryState;
use crate::error::AnalogError;

/// Battery voltage front end. `sample` is bounded in time.
pub trait AnalogInput {
    fn sample(&mut self) -> Result<u16, AnalogError>;
}

/// Poll `fut` in a tight loop until it completes or `deadline` passes.
///
/// Only reads the clock. No timer is registered, so this runs under any
/// waker, including from inside a task of an interrupt executor whose timer
/// queue rejects foreign wakers.
pub fn poll_until<F: Future>(fut: F, deadline: Instant) -> Option<F::Output> {
    let mut fut = pin!(fut);
    loop {
        if let core::task::Poll::Ready(out) = poll_once(fut.as_mut()) {
            return Some(out);
        }
        if Instant::now() >= deadline {
            return None;
        }
    }
}

/// The coil-driver line.
pub trait OutputLine {
    fn set_active(&mut self);
    fn set_idle(&mut self);
    /// Read back whether the line is currently driven.
    fn is_energized(&self) -> bool;
}

/// What the status indicator should convey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, From)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorStatus {
    Battery(BatteryState),
    Emergency,
}

/// Rendered by the indicator driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorPattern {
    Off,
    Solid,
    Flash { on: Duration, off: Duration },
}

impl IndicatorPattern {
    pub const fn for_status(status: IndicatorStatus) -> Self {
        match status {
            IndicatorStatus::Battery(BatteryState::Low) => Self::Flash {
                on: Duration::from_millis(250),
                off: Duration::from_millis(250),
            },
            IndicatorStatus::Battery(BatteryState::Normal) => Self::Off,
            IndicatorStatus::Battery(BatteryState::Charging) => Self::Solid,
            IndicatorStatus::Battery(BatteryState::Full) => Self::Flash {
                on: Duration::from_millis(500),
                off: Duration::from_millis(500),
            },
            IndicatorStatus::Battery(BatteryState::Fault)
            | IndicatorStatus::Emergency => Self::Flash {
                on: Duration::from_millis(62),
                off: Duration::from_millis(63),
            },
        }
    }
}

/// Status LED or equivalent. Written by whoever observes a change.
pub trait StatusIndicator {
    fn show(&mut self, status: IndicatorStatus);
}

/// The platform's one-way jump into the program loader.
pub trait Loader {
    /// Never returns. Program state is discarded.
    fn enter_loader(self) -> !;
}
