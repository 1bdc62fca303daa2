//! Two-phase output generator. Runs at the top priority and never blocks.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};

use crate::config::WaveformParams;
use crate::error::Error;
use crate::hal::OutputLine;
use crate::scheduler::{Rearm, Task, TaskId};
use crate::shared::SharedState;

/// ±1 %.
pub const TOLERANCE_PPM: u32 = 10_000;

fn deviation_ppm(measured: Duration, expected: Duration) -> u32 {
    let expected = expected.as_ticks();
    if expected == 0 {
        return 0;
    }
    let diff = measured.as_ticks().abs_diff(expected);
    (diff.saturating_mul(1_000_000) / expected).min(u32::MAX as u64) as u32
}

/// Timing measured from the generator's own activation instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseStats {
    /// Completed active phases.
    pub cycles: u32,
    /// Cycles held idle by the emergency stop.
    pub suppressed: u32,
    pub last_period: Duration,
    pub last_active: Duration,
    pub worst_period_ppm: u32,
    pub worst_active_ppm: u32,
}

impl PulseStats {
    pub const fn new() -> Self {
        Self {
            cycles: 0,
            suppressed: 0,
            last_period: Duration::from_ticks(0),
            last_active: Duration::from_ticks(0),
            worst_period_ppm: 0,
            worst_active_ppm: 0,
        }
    }

    pub fn within_tolerance(&self) -> bool {
        self.worst_period_ppm <= TOLERANCE_PPM
            && self.worst_active_ppm <= TOLERANCE_PPM
    }

    fn record_period(&mut self, measured: Duration, expected: Duration) {
        self.last_period = measured;
        self.worst_period_ppm =
            self.worst_period_ppm.max(deviation_ppm(measured, expected));
    }

    fn record_active(&mut self, measured: Duration, expected: Duration) {
        self.last_active = measured;
        self.worst_active_ppm =
            self.worst_active_ppm.max(deviation_ppm(measured, expected));
    }
}

impl Default for PulseStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Active,
}

pub struct PulseGenerator<'a, M: RawMutex, O: OutputLine> {
    shared: &'a SharedState<M>,
    output: O,
    phase: Phase,
    /// Parameters latched at the start of the current cycle.
    cycle: WaveformParams,
    cycle_start: Option<Instant>,
    stats: PulseStats,
}

impl<'a, M: RawMutex, O: OutputLine> PulseGenerator<'a, M, O> {
    pub fn new(shared: &'a SharedState<M>, mut output: O) -> Self {
        output.set_idle();
        Self {
            shared,
            output,
            phase: Phase::Idle,
            cycle: shared.waveform(),
            cycle_start: None,
            stats: PulseStats::new(),
        }
    }

    pub fn stats(&self) -> PulseStats {
        self.stats
    }

    fn force_idle(&mut self) {
        self.output.set_idle();
        self.shared.record_pulse(false);
        self.shared.record_output(self.output.is_energized());
        self.phase = Phase::Idle;
    }

    fn start_cycle(&mut self, now: Instant) -> Rearm {
        let params = self.shared.waveform();
        if let Some(prev) = self.cycle_start {
            self.stats.record_period(
                now.saturating_duration_since(prev),
                self.cycle.period,
            );
        }
        self.cycle = params;
        self.cycle_start = Some(now);

        // Latching here makes a bare condition stop this very cycle.
        if self.shared.flags().latch_emergency() {
            self.force_idle();
            self.stats.suppressed = self.stats.suppressed.wrapping_add(1);
            self.shared.publish_pulse_stats(self.stats);
            return Rearm::After(params.period);
        }

        self.output.set_active();
        self.shared.record_pulse(true);
        self.shared.record_output(true);
        self.phase = Phase::Active;
        Rearm::After(params.active_time())
    }

    fn end_active(&mut self, now: Instant) -> Rearm {
        self.force_idle();

        let start = self.cycle_start.unwrap_or(now);
        let elapsed = now.saturating_duration_since(start);
        self.stats.record_active(elapsed, self.cycle.active_time());
        self.stats.cycles = self.stats.cycles.wrapping_add(1);
        self.shared.publish_pulse_stats(self.stats);

        // Relative to now, minus whatever the active phase overran.
        let remaining = self
            .cycle
            .period
            .checked_sub(elapsed)
            .unwrap_or(Duration::from_ticks(0));
        Rearm::After(remaining)
    }
}

impl<M: RawMutex, O: OutputLine> Task for PulseGenerator<'_, M, O> {
    fn id(&self) -> TaskId {
        TaskId::PulseGenerator
    }

    fn run(&mut self, now: Instant) -> Result<Rearm, Error> {
        Ok(match self.phase {
            Phase::Idle => self.start_cycle(now),
            Phase::Active => self.end_active(now),
        })
    }

    fn quiesce(&mut self, _now: Instant) {
        self.force_idle();
        self.cycle_start = None;
    }
}
