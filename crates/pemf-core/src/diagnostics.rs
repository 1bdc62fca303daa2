//! Lowest-priority consumer: drains the event queue to the developer log and
//! reports timing statistics.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};

use crate::error::Error;
use crate::log::{LogEvent, LogQueue, Severity};
use crate::scheduler::{Rearm, Task, TaskId};
use crate::shared::SharedState;

/// Events forwarded per activation.
const DRAIN_BATCH: usize = 16;

/// About once a minute at 2 Hz.
const PULSE_REPORT_CYCLES: u32 = 120;

pub struct Diagnostics<'a, M: RawMutex, const Q: usize> {
    shared: &'a SharedState<M>,
    queue: &'a LogQueue<M, Q>,
    interval: Duration,
    forwarded: u32,
    seen_dropped: u32,
    last_report_cycle: u32,
}

impl<'a, M: RawMutex, const Q: usize> Diagnostics<'a, M, Q> {
    pub fn new(
        shared: &'a SharedState<M>,
        queue: &'a LogQueue<M, Q>,
        interval: Duration,
    ) -> Self {
        Self {
            shared,
            queue,
            interval,
            forwarded: 0,
            seen_dropped: 0,
            last_report_cycle: 0,
        }
    }

    /// Events handed to the developer log so far.
    pub fn forwarded(&self) -> u32 {
        self.forwarded
    }

    fn forward(&mut self, event: &LogEvent) {
        let at = event.timestamp.as_millis();
        let msg = event.message.as_str();
        match event.severity {
            Severity::Debug => debug!("{} {:?} {}", at, event.category, msg),
            Severity::Info => info!("{} {:?} {}", at, event.category, msg),
            Severity::Warn => warn!("{} {:?} {}", at, event.category, msg),
            Severity::Error => error!("{} {:?} {}", at, event.category, msg),
        }
        self.forwarded = self.forwarded.wrapping_add(1);
    }

    /// Forward up to `limit` queued events. Returns how many.
    pub fn drain(&mut self, limit: usize) -> usize {
        let mut n = 0;
        while n < limit {
            let Some(event) = self.queue.pop() else {
                break;
            };
            self.forward(&event);
            n += 1;
        }
        n
    }

    fn report(&mut self) {
        let stats = self.queue.stats();
        if stats.dropped != self.seen_dropped {
            warn!(
                "log queue dropped {} events",
                stats.dropped.wrapping_sub(self.seen_dropped)
            );
            self.seen_dropped = stats.dropped;
        }

        let pulse = self.shared.pulse_stats();
        if pulse.cycles.wrapping_sub(self.last_report_cycle)
            >= PULSE_REPORT_CYCLES
        {
            self.last_report_cycle = pulse.cycles;
            if pulse.within_tolerance() {
                info!(
                    "pulse: {} cycles, worst period {} ppm, active {} ppm",
                    pulse.cycles,
                    pulse.worst_period_ppm,
                    pulse.worst_active_ppm
                );
            } else {
                warn!(
                    "pulse out of tolerance: period {} ppm, active {} ppm",
                    pulse.worst_period_ppm,
                    pulse.worst_active_ppm
                );
            }
        }
    }
}

impl<M: RawMutex, const Q: usize> Task for Diagnostics<'_, M, Q> {
    fn id(&self) -> TaskId {
        TaskId::Diagnostics
    }

    fn run(&mut self, _now: Instant) -> Result<Rearm, Error> {
        self.drain(DRAIN_BATCH);
        self.report();
        Ok(Rearm::After(self.interval))
    }

    /// Flush whatever is queued before the loader takes over.
    fn quiesce(&mut self, _now: Instant) {
        self.drain(Q);
    }
}
