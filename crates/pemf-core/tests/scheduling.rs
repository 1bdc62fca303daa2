mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::{Duration, Instant};
use pemf_core::{
    ConfigError, Diagnostics, Error, LogCategory, LogEvent, LogSink,
    PulseGenerator, Rearm, Scheduler, Severity, SharedState, Task, TaskDecl,
    TaskId, TaskPriority, TaskStatus, WaveformParams, TASK_TABLE,
};

type Shared = SharedState<NoopRawMutex>;
type Sched = Scheduler<NoopRawMutex, 4>;

fn ms(n: u64) -> Instant {
    Instant::from_millis(n)
}

// ---------------------------------------------------------------------------
// Probe task
// ---------------------------------------------------------------------------

struct Probe {
    id: TaskId,
    trace: Rc<RefCell<Vec<(TaskId, &'static str)>>>,
    result: Result<Rearm, Error>,
}

impl Probe {
    fn new(
        id: TaskId,
        trace: &Rc<RefCell<Vec<(TaskId, &'static str)>>>,
    ) -> Self {
        Self { id, trace: trace.clone(), result: Ok(Rearm::OnDemand) }
    }
}

impl Task for Probe {
    fn id(&self) -> TaskId {
        self.id
    }

    fn run(&mut self, _now: Instant) -> Result<Rearm, Error> {
        self.trace.borrow_mut().push((self.id, "run"));
        self.result
    }

    fn quiesce(&mut self, _now: Instant) {
        self.trace.borrow_mut().push((self.id, "quiesce"));
    }
}

fn probes(
    trace: &Rc<RefCell<Vec<(TaskId, &'static str)>>>,
) -> [Probe; 4] {
    [
        Probe::new(TaskId::Diagnostics, trace),
        Probe::new(TaskId::ShutdownCoordinator, trace),
        Probe::new(TaskId::BatteryMonitor, trace),
        Probe::new(TaskId::PulseGenerator, trace),
    ]
}

// ---------------------------------------------------------------------------
// Task table
// ---------------------------------------------------------------------------

#[test]
fn pulse_must_hold_the_top_priority() {
    let table = [
        TaskDecl::new(TaskId::PulseGenerator, TaskPriority::BatteryMonitoring),
        TaskDecl::new(TaskId::Diagnostics, TaskPriority::Diagnostics),
    ];
    assert_eq!(
        Scheduler::<NoopRawMutex, 2>::new(table, no_pend).err(),
        Some(ConfigError::PriorityInvariant)
    );

    let table = [
        TaskDecl::new(TaskId::PulseGenerator, TaskPriority::PulseGeneration),
        TaskDecl::new(TaskId::BatteryMonitor, TaskPriority::PulseGeneration),
    ];
    assert_eq!(
        Scheduler::<NoopRawMutex, 2>::new(table, no_pend).err(),
        Some(ConfigError::PriorityInvariant)
    );
}

#[test]
fn duplicate_tasks_are_rejected() {
    let table = [
        TaskDecl::new(TaskId::PulseGenerator, TaskPriority::PulseGeneration),
        TaskDecl::new(TaskId::Diagnostics, TaskPriority::Diagnostics),
        TaskDecl::new(TaskId::Diagnostics, TaskPriority::Diagnostics),
    ];
    assert_eq!(
        Scheduler::<NoopRawMutex, 3>::new(table, no_pend).err(),
        Some(ConfigError::DuplicateTask)
    );
}

#[test]
fn table_priorities() {
    let sched = Sched::new(TASK_TABLE, no_pend).unwrap();
    let p = |id| sched.priority(id).unwrap();
    assert!(p(TaskId::PulseGenerator) > p(TaskId::BatteryMonitor));
    assert!(p(TaskId::BatteryMonitor) > p(TaskId::ShutdownCoordinator));
    assert!(p(TaskId::ShutdownCoordinator) > p(TaskId::Diagnostics));
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[test]
fn due_tasks_run_highest_priority_first() {
    let trace = Rc::default();
    let sched = Sched::new(TASK_TABLE, no_pend).unwrap();
    let log = Queue::new();
    let [mut d, mut s, mut b, mut p] = probes(&trace);

    for id in [
        TaskId::Diagnostics,
        TaskId::BatteryMonitor,
        TaskId::ShutdownCoordinator,
        TaskId::PulseGenerator,
    ] {
        sched.pend(id);
    }
    let ran =
        sched.dispatch(ms(0), &mut [&mut d, &mut s, &mut b, &mut p], &log);

    assert_eq!(ran, 4);
    let order: Vec<_> = trace.borrow().iter().map(|(id, _)| *id).collect();
    assert_eq!(
        order,
        [
            TaskId::PulseGenerator,
            TaskId::BatteryMonitor,
            TaskId::ShutdownCoordinator,
            TaskId::Diagnostics,
        ]
    );
    assert_eq!(sched.status(TaskId::Diagnostics), Some(TaskStatus::Idle));
}

#[test]
fn tasks_wait_for_their_instant() {
    let trace = Rc::default();
    let sched = Sched::new(TASK_TABLE, no_pend).unwrap();
    let log = Queue::new();
    let [_, _, mut b, _] = probes(&trace);
    b.result = Ok(Rearm::After(Duration::from_millis(100)));

    sched.arm_at(TaskId::BatteryMonitor, ms(50));
    assert_eq!(sched.dispatch(ms(49), &mut [&mut b], &log), 0);
    assert_eq!(
        sched.next_wake(TaskPriority::BatteryMonitoring),
        Some(ms(50))
    );

    assert_eq!(sched.dispatch(ms(50), &mut [&mut b], &log), 1);
    assert_eq!(
        sched.status(TaskId::BatteryMonitor),
        Some(TaskStatus::Armed(ms(150)))
    );
    assert_eq!(sched.next_wake(TaskPriority::PulseGeneration), None);
}

#[test]
fn pend_wakes_the_level() {
    static WAKES: AtomicUsize = AtomicUsize::new(0);
    fn count(priority: TaskPriority) {
        assert_eq!(priority, TaskPriority::Shutdown);
        WAKES.fetch_add(1, Ordering::SeqCst);
    }

    let sched = Sched::new(TASK_TABLE, count).unwrap();
    sched.pend(TaskId::ShutdownCoordinator);
    assert_eq!(WAKES.load(Ordering::SeqCst), 1);
}

#[test]
fn faulted_task_is_not_rearmed() {
    let trace = Rc::default();
    let sched = Sched::new(TASK_TABLE, no_pend).unwrap();
    let log = Queue::new();
    let [mut d, _, _, _] = probes(&trace);
    d.result = Err(Error::SelfTestFailure);

    sched.pend(TaskId::Diagnostics);
    sched.dispatch(ms(0), &mut [&mut d], &log);
    assert_eq!(sched.status(TaskId::Diagnostics), Some(TaskStatus::Faulted));
    assert!(!sched.pend(TaskId::Diagnostics));
    assert_eq!(sched.dispatch(ms(10), &mut [&mut d], &log), 0);

    let events = drain(&log);
    let fault = "Diagnostics faulted";
    assert!(
        find(&events, Severity::Error, LogCategory::Scheduler, fault).is_some()
    );
}

#[test]
fn suspend_quiesces_on_the_tasks_own_turn() {
    let trace = Rc::default();
    let sched = Sched::new(TASK_TABLE, no_pend).unwrap();
    let log = Queue::new();
    let [_, _, mut b, mut p] = probes(&trace);
    p.result = Ok(Rearm::After(Duration::from_millis(2)));

    sched.pend(TaskId::PulseGenerator);
    sched.dispatch(ms(0), &mut [&mut b, &mut p], &log);

    assert!(sched.request_suspend(TaskId::PulseGenerator));
    assert!(!sched.is_quiesced(TaskId::PulseGenerator));
    assert_eq!(
        sched.status(TaskId::PulseGenerator),
        Some(TaskStatus::SuspendRequested)
    );

    sched.dispatch(ms(1), &mut [&mut b, &mut p], &log);
    assert!(sched.is_quiesced(TaskId::PulseGenerator));
    assert_eq!(
        *trace.borrow(),
        [
            (TaskId::PulseGenerator, "run"),
            (TaskId::PulseGenerator, "quiesce")
        ]
    );

    // Suspended tasks ignore pends until resumed.
    assert!(!sched.pend(TaskId::PulseGenerator));
    assert!(sched.resume(TaskId::PulseGenerator, ms(5)));
    assert_eq!(
        sched.status(TaskId::PulseGenerator),
        Some(TaskStatus::Armed(ms(5)))
    );
}

#[test]
fn unregistered_tasks_count_as_quiesced() {
    let table = [
        TaskDecl::new(TaskId::PulseGenerator, TaskPriority::PulseGeneration),
    ];
    let sched = Scheduler::<NoopRawMutex, 1>::new(table, no_pend).unwrap();
    assert!(sched.is_quiesced(TaskId::Diagnostics));
    assert!(!sched.request_suspend(TaskId::Diagnostics));
}

// ---------------------------------------------------------------------------
// Pulse timing
// ---------------------------------------------------------------------------

/// Drive the pulse level alone, waking exactly when asked plus `lateness`.
fn run_pulse(
    sched: &Sched,
    pulse: &mut dyn Task,
    log: &Queue,
    activations: usize,
    lateness: Duration,
) {
    for _ in 0..activations {
        let at = sched.next_wake(TaskPriority::PulseGeneration).unwrap();
        sched.dispatch(at + lateness, &mut [&mut *pulse], log);
    }
}

#[test]
fn waveform_holds_period_and_width() {
    let shared = Shared::new(WaveformParams::default());
    let sched = Sched::new(TASK_TABLE, no_pend).unwrap();
    let log = Queue::new();
    let line = RecordingLine::default();
    let mut pulse = PulseGenerator::new(&shared, line.clone());

    sched.pend(TaskId::PulseGenerator);
    sched.dispatch(ms(0), &mut [&mut pulse], &log);
    assert!(line.driven());
    assert_eq!(
        sched.status(TaskId::PulseGenerator),
        Some(TaskStatus::Armed(ms(5)))
    );

    sched.dispatch(ms(5), &mut [&mut pulse], &log);
    assert!(!line.driven());
    assert_eq!(
        sched.status(TaskId::PulseGenerator),
        Some(TaskStatus::Armed(ms(500)))
    );

    run_pulse(&sched, &mut pulse, &log, 38, Duration::from_ticks(0));
    let stats = pulse.stats();
    assert_eq!(stats.cycles, 20);
    assert_eq!(line.rising_edges(), 20);
    assert_eq!(stats.last_period, Duration::from_millis(500));
    assert_eq!(stats.last_active, Duration::from_millis(5));
    assert!(stats.within_tolerance());
    assert_eq!(shared.pulse_stats(), stats);
}

#[test]
fn late_wakeups_stay_within_tolerance() {
    let shared = Shared::new(WaveformParams::default());
    let sched = Sched::new(TASK_TABLE, no_pend).unwrap();
    let log = Queue::new();
    let mut pulse = PulseGenerator::new(&shared, RecordingLine::default());

    sched.pend(TaskId::PulseGenerator);
    sched.dispatch(ms(0), &mut [&mut pulse], &log);
    // Every activation 10us late; the idle phase absorbs the overrun.
    run_pulse(&sched, &mut pulse, &log, 40, Duration::from_micros(10));

    let stats = pulse.stats();
    assert_eq!(stats.cycles, 20);
    assert!(stats.within_tolerance(), "{stats:?}");
}

#[test]
fn gross_overrun_is_flagged() {
    let shared = Shared::new(WaveformParams::default());
    let sched = Sched::new(TASK_TABLE, no_pend).unwrap();
    let log = Queue::new();
    let mut pulse = PulseGenerator::new(&shared, RecordingLine::default());

    sched.pend(TaskId::PulseGenerator);
    sched.dispatch(ms(0), &mut [&mut pulse], &log);
    // Active phase ends 1 ms late: 20 % wide.
    sched.dispatch(ms(6), &mut [&mut pulse], &log);
    assert!(!pulse.stats().within_tolerance());
    assert_eq!(pulse.stats().worst_active_ppm, 200_000);
}

#[test]
fn new_waveform_applies_at_next_cycle() {
    let shared = Shared::new(WaveformParams::default());
    let sched = Sched::new(TASK_TABLE, no_pend).unwrap();
    let log = Queue::new();
    let mut pulse = PulseGenerator::new(&shared, RecordingLine::default());

    sched.pend(TaskId::PulseGenerator);
    sched.dispatch(ms(0), &mut [&mut pulse], &log);
    shared
        .set_waveform(WaveformParams::new(Duration::from_millis(1000), 10))
        .unwrap();

    // Current cycle finishes with the old parameters.
    sched.dispatch(ms(5), &mut [&mut pulse], &log);
    assert_eq!(
        sched.status(TaskId::PulseGenerator),
        Some(TaskStatus::Armed(ms(500)))
    );

    sched.dispatch(ms(500), &mut [&mut pulse], &log);
    assert_eq!(
        sched.status(TaskId::PulseGenerator),
        Some(TaskStatus::Armed(ms(510)))
    );
}

#[test]
fn invalid_waveform_is_refused() {
    let shared = Shared::new(WaveformParams::default());
    assert_eq!(
        shared.set_waveform(WaveformParams::new(Duration::from_millis(1), 4)),
        Err(ConfigError::InvalidPeriod)
    );
    assert_eq!(
        shared.set_waveform(WaveformParams::new(
            Duration::from_millis(500),
            1000
        )),
        Err(ConfigError::InvalidDutyCycle)
    );
    assert_eq!(shared.waveform(), WaveformParams::default());
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[test]
fn diagnostics_drains_in_batches() {
    let shared = Shared::new(WaveformParams::default());
    let log = Queue::new();
    let mut diag = Diagnostics::new(&shared, &log, Duration::from_millis(100));

    for i in 0..40 {
        log.push(LogEvent::new(
            ms(i),
            Severity::Info,
            LogCategory::System,
            format_args!("event {}", i),
        ));
    }

    let rearm = diag.run(ms(100)).unwrap();
    assert_eq!(rearm, Rearm::After(Duration::from_millis(100)));
    assert_eq!(diag.forwarded(), 16);
    assert_eq!(log.len(), 24);

    // Quiescing flushes the rest.
    diag.quiesce(ms(200));
    assert!(log.is_empty());
    assert_eq!(diag.forwarded(), 40);
}
