use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

use crate::battery::{BatteryReading, BatteryState};
use crate::config::WaveformParams;
use crate::error::{BootloaderError, ConfigError};
use crate::pulse::PulseStats;
use crate::safety::SafetyFlags;
use crate::shutdown::ShutdownState;

/// Snapshot used to gate the loader transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareSafetyState {
    pub output_energized: bool,
    pub pulse_active: bool,
}

impl HardwareSafetyState {
    pub const fn is_safe_for_transition(&self) -> bool {
        !self.output_energized && !self.pulse_active
    }
}

/// State shared between priority levels.
///
/// Multi-word values sit behind a blocking mutex and are only copied in or
/// out while it is held. Single-word values are atomics. No method holds
/// more than one of them at a time.
pub struct SharedState<M: RawMutex> {
    reading: Mutex<M, Cell<Option<BatteryReading>>>,
    waveform: Mutex<M, Cell<WaveformParams>>,
    pulse_stats: Mutex<M, Cell<PulseStats>>,
    flags: SafetyFlags,
    shutdown: AtomicU8,
    entry_pending: AtomicBool,
    entry_error: Mutex<M, Cell<Option<BootloaderError>>>,
    output_energized: AtomicBool,
    pulse_active: AtomicBool,
}

impl<M: RawMutex> SharedState<M> {
    pub const fn new(waveform: WaveformParams) -> Self {
        Self {
            reading: Mutex::new(Cell::new(None)),
            waveform: Mutex::new(Cell::new(waveform)),
            pulse_stats: Mutex::new(Cell::new(PulseStats::new())),
            flags: SafetyFlags::new(),
            shutdown: AtomicU8::new(ShutdownState::Normal as u8),
            entry_pending: AtomicBool::new(false),
            entry_error: Mutex::new(Cell::new(None)),
            output_energized: AtomicBool::new(false),
            pulse_active: AtomicBool::new(false),
        }
    }

    // Battery

    pub fn battery_reading(&self) -> Option<BatteryReading> {
        self.reading.lock(|r| r.get())
    }

    pub fn battery_state(&self) -> Option<BatteryState> {
        self.battery_reading().map(|r| r.state)
    }

    pub(crate) fn publish_reading(&self, reading: BatteryReading) {
        self.reading.lock(|r| r.set(Some(reading)))
    }

    // Waveform

    pub fn waveform(&self) -> WaveformParams {
        self.waveform.lock(|w| w.get())
    }

    /// Validate and apply. Takes effect at the start of the next cycle.
    pub fn set_waveform(
        &self,
        params: WaveformParams,
    ) -> Result<(), ConfigError> {
        params.validate()?;
        self.waveform.lock(|w| w.set(params));
        Ok(())
    }

    pub fn pulse_stats(&self) -> PulseStats {
        self.pulse_stats.lock(|s| s.get())
    }

    pub(crate) fn publish_pulse_stats(&self, stats: PulseStats) {
        self.pulse_stats.lock(|s| s.set(stats))
    }

    // Safety

    pub fn flags(&self) -> &SafetyFlags {
        &self.flags
    }

    // Shutdown

    pub fn shutdown_state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.shutdown.load(Ordering::SeqCst))
    }

    pub(crate) fn set_shutdown_state(&self, state: ShutdownState) {
        self.shutdown.store(state as u8, Ordering::SeqCst)
    }

    /// Marks a request pending. Returns `false` if one already was.
    pub(crate) fn post_entry_request(&self) -> bool {
        !self.entry_pending.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn take_entry_request(&self) -> bool {
        self.entry_pending.swap(false, Ordering::SeqCst)
    }

    pub fn entry_pending(&self) -> bool {
        self.entry_pending.load(Ordering::SeqCst)
    }

    pub fn last_entry_error(&self) -> Option<BootloaderError> {
        self.entry_error.lock(|e| e.get())
    }

    pub(crate) fn record_entry_error(&self, error: Option<BootloaderError>) {
        self.entry_error.lock(|e| e.set(error))
    }

    // Hardware

    pub fn hardware(&self) -> HardwareSafetyState {
        HardwareSafetyState {
            output_energized: self.output_energized.load(Ordering::SeqCst),
            pulse_active: self.pulse_active.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn record_output(&self, energized: bool) {
        self.output_energized.store(energized, Ordering::SeqCst)
    }

    pub(crate) fn record_pulse(&self, active: bool) {
        self.pulse_active.store(active, Ordering::SeqCst)
    }
}
