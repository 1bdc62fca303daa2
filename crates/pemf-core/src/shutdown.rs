//! Loader-entry sequence.
//!
//! An authenticated request arrives through the [`EntryChannel`]. The
//! [`ShutdownCoordinator`] then validates the hardware, suspends the other
//! tasks strictly from the highest priority down, confirms every output is
//! idle, and hands out a [`Handoff`] that performs the one-way transition.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant};
use subtle::ConstantTimeEq;

use crate::config::{Config, EntryPolicy};
use crate::error::{BootloaderError, EntryRejected, Error};
use crate::hal::{Loader, OutputLine};
use crate::log::LogSink;
use crate::safety::SafetySnapshot;
use crate::scheduler::{Rearm, Scheduler, Task, TaskId};
use crate::shared::SharedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ShutdownState {
    Normal = 0,
    EntryRequested = 1,
    ValidatingHardware = 2,
    ShuttingDownTasks = 3,
    FinalSafetyCheck = 4,
    ReadyForTransition = 5,
    EntryFailed = 6,
}

impl ShutdownState {
    /// Unknown encodings read as `EntryFailed`.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Normal,
            1 => Self::EntryRequested,
            2 => Self::ValidatingHardware,
            3 => Self::ShuttingDownTasks,
            4 => Self::FinalSafetyCheck,
            5 => Self::ReadyForTransition,
            _ => Self::EntryFailed,
        }
    }
}

/// Suspension order, highest priority first.
pub const QUIESCE_ORDER: [TaskId; 3] = [
    TaskId::PulseGenerator,
    TaskId::BatteryMonitor,
    TaskId::Diagnostics,
];

/// Permission to perform the loader transition. Only produced once the
/// final safety check has passed.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Handoff {
    _private: (),
}

impl Handoff {
    pub fn execute<T: Loader>(self, loader: T) -> ! {
        loader.enter_loader()
    }
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    /// No request pending.
    Idle,
    /// Sequence advanced or is waiting; poll again.
    InProgress(ShutdownState),
    Ready(Handoff),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EntryStatus {
    pub state: ShutdownState,
    pub last_error: Option<BootloaderError>,
}

/// Request and query side of loader entry, callable from any context.
pub struct EntryChannel<'a, M: RawMutex, const N: usize> {
    shared: &'a SharedState<M>,
    scheduler: &'a Scheduler<M, N>,
    policy: EntryPolicy,
    last_attempt: Mutex<M, Cell<Option<Instant>>>,
}

impl<'a, M: RawMutex, const N: usize> EntryChannel<'a, M, N> {
    pub fn new(
        shared: &'a SharedState<M>,
        scheduler: &'a Scheduler<M, N>,
        policy: EntryPolicy,
    ) -> Self {
        Self {
            shared,
            scheduler,
            policy,
            last_attempt: Mutex::new(Cell::new(None)),
        }
    }

    /// Rate limit first, then the key. Rate-limited attempts are not
    /// recorded so they cannot extend the window.
    fn admit(&self, key: &[u8], now: Instant) -> Result<(), EntryRejected> {
        let min_interval = self.policy.min_interval;
        self.last_attempt.lock(|last| {
            if let Some(prev) = last.get() {
                if now.saturating_duration_since(prev) < min_interval {
                    return Err(EntryRejected::RateLimited);
                }
            }
            last.set(Some(now));
            Ok(())
        })?;

        if bool::from(key.ct_eq(&self.policy.key)) {
            Ok(())
        } else {
            warn!("entry channel: bad key");
            Err(EntryRejected::Unauthorized)
        }
    }

    /// Ask for the loader transition. The sequence itself runs in the
    /// coordinator; its outcome is visible through [`Self::status`].
    pub fn request_entry(
        &self,
        key: &[u8],
        now: Instant,
    ) -> Result<(), EntryRejected> {
        self.admit(key, now)?;

        if self.shared.shutdown_state() != ShutdownState::Normal
            || !self.shared.post_entry_request()
        {
            return Err(EntryRejected::Busy);
        }
        self.shared.record_entry_error(None);
        self.scheduler.pend(TaskId::ShutdownCoordinator);
        info!("loader entry requested");
        Ok(())
    }

    pub fn status(&self) -> EntryStatus {
        EntryStatus {
            state: self.shared.shutdown_state(),
            last_error: self.shared.last_entry_error(),
        }
    }

    /// Clear every safety flag. Subject to the same key and rate limit as
    /// entry requests. Returns the flags that were set.
    pub fn supervised_reset(
        &self,
        key: &[u8],
        now: Instant,
    ) -> Result<SafetySnapshot, EntryRejected> {
        self.admit(key, now)?;
        let cleared = self.shared.flags().clear_all();
        warn!("safety flags cleared by supervised reset: {}", cleared.bits());
        Ok(cleared)
    }
}

pub struct ShutdownCoordinator<'a, M, L, O, T, const N: usize>
where
    M: RawMutex,
    L: LogSink,
    O: OutputLine,
    T: Loader,
{
    shared: &'a SharedState<M>,
    scheduler: &'a Scheduler<M, N>,
    log: &'a L,
    line: O,
    loader: Option<T>,
    timeout: Duration,
    poll_interval: Duration,
    deadline: Option<Instant>,
    stage: usize,
    /// Tasks this attempt has asked to suspend, in order.
    suspended: heapless::Vec<TaskId, 3>,
}

impl<'a, M, L, O, T, const N: usize> ShutdownCoordinator<'a, M, L, O, T, N>
where
    M: RawMutex,
    L: LogSink,
    O: OutputLine,
    T: Loader,
{
    pub fn new(
        shared: &'a SharedState<M>,
        scheduler: &'a Scheduler<M, N>,
        log: &'a L,
        line: O,
        loader: T,
        config: &Config,
    ) -> Self {
        Self {
            shared,
            scheduler,
            log,
            line,
            loader: Some(loader),
            timeout: config.shutdown_timeout,
            poll_interval: config.shutdown_poll,
            deadline: None,
            stage: 0,
            suspended: heapless::Vec::new(),
        }
    }

    fn enter(&self, state: ShutdownState) -> Progress {
        self.shared.set_shutdown_state(state);
        Progress::InProgress(state)
    }

    fn fail(
        &mut self,
        now: Instant,
        error: BootloaderError,
    ) -> Result<Progress, BootloaderError> {
        self.shared.set_shutdown_state(ShutdownState::EntryFailed);
        self.shared.record_entry_error(Some(error));
        error!("loader entry failed: {:?}", error);
        event!(self.log, now, Error, Shutdown, "entry failed: {:?}", error);

        for &id in self.suspended.iter() {
            self.scheduler.resume(id, now);
        }
        self.suspended.clear();
        self.deadline = None;
        self.stage = 0;
        self.shared.set_shutdown_state(ShutdownState::Normal);
        Err(error)
    }

    fn suspend_next(&mut self) {
        let id = QUIESCE_ORDER[self.stage];
        if self.scheduler.request_suspend(id) {
            // Capacity matches the quiesce order.
            let _ = self.suspended.push(id);
        }
    }

    /// Advance the sequence by at most one state.
    pub fn poll(&mut self, now: Instant) -> Result<Progress, BootloaderError> {
        let state = self.shared.shutdown_state();

        if let Some(deadline) = self.deadline {
            if now > deadline
                && matches!(
                    state,
                    ShutdownState::ShuttingDownTasks
                        | ShutdownState::FinalSafetyCheck
                )
            {
                let task = QUIESCE_ORDER
                    .get(self.stage)
                    .copied()
                    .unwrap_or(TaskId::ShutdownCoordinator);
                return self
                    .fail(now, BootloaderError::TaskQuiesceTimeout { task });
            }
        }

        match state {
            ShutdownState::Normal => {
                if !self.shared.take_entry_request() {
                    return Ok(Progress::Idle);
                }
                self.deadline = Some(now + self.timeout);
                self.stage = 0;
                self.suspended.clear();
                event!(self.log, now, Info, Shutdown, "loader entry requested");
                Ok(self.enter(ShutdownState::EntryRequested))
            }
            ShutdownState::EntryRequested => {
                Ok(self.enter(ShutdownState::ValidatingHardware))
            }
            ShutdownState::ValidatingHardware => {
                self.shared.record_output(self.line.is_energized());
                let hw = self.shared.hardware();
                // A running pulse is interruptible: it is quiesced first. An
                // energized line with no pulse behind it is not ours to stop.
                if hw.output_energized && !hw.pulse_active {
                    return self.fail(now, BootloaderError::UnsafeHardwareState);
                }
                let progress = self.enter(ShutdownState::ShuttingDownTasks);
                self.suspend_next();
                Ok(progress)
            }
            ShutdownState::ShuttingDownTasks => {
                let id = QUIESCE_ORDER[self.stage];
                if !self.scheduler.is_quiesced(id) {
                    return Ok(Progress::InProgress(state));
                }
                event!(self.log, now, Info, Shutdown, "{:?} quiesced", id);
                self.stage += 1;
                if self.stage < QUIESCE_ORDER.len() {
                    self.suspend_next();
                    Ok(Progress::InProgress(state))
                } else {
                    Ok(self.enter(ShutdownState::FinalSafetyCheck))
                }
            }
            ShutdownState::FinalSafetyCheck => {
                self.line.set_idle();
                self.shared.record_output(self.line.is_energized());
                let hw = self.shared.hardware();
                if !hw.is_safe_for_transition() {
                    return self.fail(now, BootloaderError::UnsafeHardwareState);
                }
                self.deadline = None;
                self.shared
                    .set_shutdown_state(ShutdownState::ReadyForTransition);
                info!("outputs idle, ready for loader");
                event!(self.log, now, Info, Shutdown, "ready for transition");
                Ok(Progress::Ready(Handoff { _private: () }))
            }
            ShutdownState::ReadyForTransition => {
                Ok(Progress::Ready(Handoff { _private: () }))
            }
            ShutdownState::EntryFailed => {
                self.shared.set_shutdown_state(ShutdownState::Normal);
                Ok(Progress::Idle)
            }
        }
    }
}

impl<M, L, O, T, const N: usize> Task for ShutdownCoordinator<'_, M, L, O, T, N>
where
    M: RawMutex,
    L: LogSink,
    O: OutputLine,
    T: Loader,
{
    fn id(&self) -> TaskId {
        TaskId::ShutdownCoordinator
    }

    fn run(&mut self, now: Instant) -> Result<Rearm, Error> {
        match self.poll(now) {
            Ok(Progress::Idle) => Ok(Rearm::OnDemand),
            Ok(Progress::InProgress(_)) => Ok(Rearm::After(self.poll_interval)),
            Ok(Progress::Ready(handoff)) => match self.loader.take() {
                Some(loader) => handoff.execute(loader),
                None => Ok(Rearm::OnDemand),
            },
            // Already reported and rolled back.
            Err(_) => Ok(Rearm::OnDemand),
        }
    }
}
