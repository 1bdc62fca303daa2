//! Fixed-priority dispatcher.
//!
//! Each task is declared once in a table of `{id, priority}`. Its slot holds
//! a small status word behind a blocking mutex. A level's runner calls
//! [`Scheduler::dispatch`] with the bodies it owns and sleeps until
//! [`Scheduler::next_wake`]. On target every level is its own interrupt
//! executor, so preemption between levels comes from the NVIC. Within a
//! level tasks run to completion.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant};

use crate::error::{ConfigError, Error};
use crate::log::LogSink;

/// Lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TaskPriority {
    Diagnostics = 0,
    Shutdown = 1,
    BatteryMonitoring = 2,
    PulseGeneration = 3,
}

impl TaskPriority {
    pub const COUNT: usize = 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskId {
    PulseGenerator,
    BatteryMonitor,
    ShutdownCoordinator,
    Diagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskDecl {
    pub id: TaskId,
    pub priority: TaskPriority,
}

impl TaskDecl {
    pub const fn new(id: TaskId, priority: TaskPriority) -> Self {
        Self { id, priority }
    }
}

/// The firmware's task table.
pub const TASK_TABLE: [TaskDecl; 4] = [
    TaskDecl::new(TaskId::PulseGenerator, TaskPriority::PulseGeneration),
    TaskDecl::new(TaskId::BatteryMonitor, TaskPriority::BatteryMonitoring),
    TaskDecl::new(TaskId::ShutdownCoordinator, TaskPriority::Shutdown),
    TaskDecl::new(TaskId::Diagnostics, TaskPriority::Diagnostics),
];

/// Reject tables that break the priority invariant or repeat a task.
pub fn validate_table(decls: &[TaskDecl]) -> Result<(), ConfigError> {
    let mut has_pulse = false;
    for (i, decl) in decls.iter().enumerate() {
        let is_pulse = decl.id == TaskId::PulseGenerator;
        let top = decl.priority == TaskPriority::PulseGeneration;
        if is_pulse != top {
            return Err(ConfigError::PriorityInvariant);
        }
        has_pulse |= is_pulse;
        if decls[..i].iter().any(|d| d.id == decl.id) {
            return Err(ConfigError::DuplicateTask);
        }
    }
    if !has_pulse {
        return Err(ConfigError::PriorityInvariant);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskStatus {
    /// Waiting for a `pend`.
    Idle,
    /// Due at the given instant.
    Armed(Instant),
    Running,
    /// Quiesce on the task's next turn instead of running.
    SuspendRequested,
    Suspended,
    /// The body returned an error. Never re-armed automatically.
    Faulted,
}

/// What a body asks for when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rearm {
    /// Run again this long after the activation instant.
    After(Duration),
    /// Sleep until pended.
    OnDemand,
}

pub trait Task {
    fn id(&self) -> TaskId;

    /// One activation. Must be bounded in time.
    fn run(&mut self, now: Instant) -> Result<Rearm, Error>;

    /// Release the outputs the task drives. Called from the task's own
    /// level after a suspension request.
    fn quiesce(&mut self, _now: Instant) {}
}

/// Wakes the runner of a priority level.
pub type PendFn = fn(TaskPriority);

pub struct Scheduler<M: RawMutex, const N: usize> {
    decls: [TaskDecl; N],
    slots: [Mutex<M, Cell<TaskStatus>>; N],
    pend: PendFn,
}

impl<M: RawMutex, const N: usize> Scheduler<M, N> {
    pub fn new(
        decls: [TaskDecl; N],
        pend: PendFn,
    ) -> Result<Self, ConfigError> {
        validate_table(&decls)?;
        Ok(Self {
            decls,
            slots: core::array::from_fn(|_| {
                Mutex::new(Cell::new(TaskStatus::Idle))
            }),
            pend,
        })
    }

    fn index(&self, id: TaskId) -> Option<usize> {
        self.decls.iter().position(|d| d.id == id)
    }

    pub fn priority(&self, id: TaskId) -> Option<TaskPriority> {
        self.index(id).map(|i| self.decls[i].priority)
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.index(id).map(|i| self.slots[i].lock(|s| s.get()))
    }

    /// Arm `id` to run at `at` unless it is suspended or faulted. Wakes the
    /// task's level.
    pub fn arm_at(&self, id: TaskId, at: Instant) -> bool {
        let Some(i) = self.index(id) else {
            return false;
        };
        let armed = self.slots[i].lock(|s| match s.get() {
            TaskStatus::Idle | TaskStatus::Armed(_) | TaskStatus::Running => {
                s.set(TaskStatus::Armed(at));
                true
            }
            TaskStatus::SuspendRequested
            | TaskStatus::Suspended
            | TaskStatus::Faulted => false,
        });
        if armed {
            (self.pend)(self.decls[i].priority);
        }
        armed
    }

    pub fn arm_after(
        &self,
        id: TaskId,
        now: Instant,
        delay: Duration,
    ) -> bool {
        self.arm_at(id, now + delay)
    }

    /// Make `id` due immediately.
    pub fn pend(&self, id: TaskId) -> bool {
        self.arm_at(id, Instant::from_ticks(0))
    }

    /// Ask `id` to quiesce on its own level. Returns `false` for an unknown
    /// task.
    pub fn request_suspend(&self, id: TaskId) -> bool {
        let Some(i) = self.index(id) else {
            return false;
        };
        let wake = self.slots[i].lock(|s| match s.get() {
            TaskStatus::Suspended | TaskStatus::Faulted => false,
            _ => {
                s.set(TaskStatus::SuspendRequested);
                true
            }
        });
        if wake {
            (self.pend)(self.decls[i].priority);
        }
        true
    }

    /// Suspended, faulted or never registered.
    pub fn is_quiesced(&self, id: TaskId) -> bool {
        match self.status(id) {
            None | Some(TaskStatus::Suspended) | Some(TaskStatus::Faulted) => {
                true
            }
            Some(_) => false,
        }
    }

    /// Bring a suspended task back, due immediately.
    pub fn resume(&self, id: TaskId, now: Instant) -> bool {
        let Some(i) = self.index(id) else {
            return false;
        };
        let resumed = self.slots[i].lock(|s| match s.get() {
            TaskStatus::Suspended | TaskStatus::SuspendRequested => {
                s.set(TaskStatus::Armed(now));
                true
            }
            _ => false,
        });
        if resumed {
            (self.pend)(self.decls[i].priority);
        }
        resumed
    }

    /// Earliest instant a task at `priority` needs attention.
    pub fn next_wake(&self, priority: TaskPriority) -> Option<Instant> {
        let mut next: Option<Instant> = None;
        for (decl, slot) in self.decls.iter().zip(self.slots.iter()) {
            if decl.priority != priority {
                continue;
            }
            let at = match slot.lock(|s| s.get()) {
                TaskStatus::Armed(at) => at,
                TaskStatus::SuspendRequested => Instant::from_ticks(0),
                _ => continue,
            };
            next = Some(next.map_or(at, |n| n.min(at)));
        }
        next
    }

    /// Run every due body among `tasks`, highest priority first, each to
    /// completion. Returns how many activations ran.
    pub fn dispatch<L: LogSink>(
        &self,
        now: Instant,
        tasks: &mut [&mut dyn Task],
        log: &L,
    ) -> usize {
        let mut ran = 0;
        // Bounded so a task re-arming with a zero delay cannot spin.
        for _ in 0..(tasks.len() * 4).max(1) {
            let Some(t) = self.most_urgent(now, tasks) else {
                break;
            };
            let task = &mut *tasks[t];
            let Some(i) = self.index(task.id()) else {
                break;
            };
            self.activate(i, now, task, log);
            ran += 1;
        }
        ran
    }

    fn most_urgent(
        &self,
        now: Instant,
        tasks: &[&mut dyn Task],
    ) -> Option<usize> {
        let mut best: Option<(usize, TaskPriority)> = None;
        for (t, task) in tasks.iter().enumerate() {
            let Some(i) = self.index(task.id()) else {
                continue;
            };
            let due = match self.slots[i].lock(|s| s.get()) {
                TaskStatus::Armed(at) => at <= now,
                TaskStatus::SuspendRequested => true,
                _ => false,
            };
            let priority = self.decls[i].priority;
            if due && best.map_or(true, |(_, p)| priority > p) {
                best = Some((t, priority));
            }
        }
        best.map(|(t, _)| t)
    }

    fn activate<L: LogSink>(
        &self,
        i: usize,
        now: Instant,
        task: &mut dyn Task,
        log: &L,
    ) {
        let id = self.decls[i].id;
        let slot = &self.slots[i];

        let suspend = slot.lock(|s| {
            if s.get() == TaskStatus::SuspendRequested {
                true
            } else {
                s.set(TaskStatus::Running);
                false
            }
        });
        if suspend {
            task.quiesce(now);
            slot.lock(|s| s.set(TaskStatus::Suspended));
            debug!("task {:?} suspended", id);
            return;
        }

        let result = task.run(now);

        let suspend = slot.lock(|s| {
            if s.get() == TaskStatus::SuspendRequested {
                return true;
            }
            // A pend that arrived while running is kept.
            let pended = match s.get() {
                TaskStatus::Armed(at) => Some(at),
                _ => None,
            };
            s.set(match result {
                Ok(Rearm::After(delay)) => {
                    let at = now + delay;
                    TaskStatus::Armed(pended.map_or(at, |p| p.min(at)))
                }
                Ok(Rearm::OnDemand) => {
                    pended.map_or(TaskStatus::Idle, TaskStatus::Armed)
                }
                Err(_) => TaskStatus::Faulted,
            });
            false
        });
        if suspend {
            task.quiesce(now);
            slot.lock(|s| s.set(TaskStatus::Suspended));
            debug!("task {:?} suspended", id);
            return;
        }

        if let Err(e) = result {
            error!("task {:?} faulted: {:?}", id, e);
            event!(
                log,
                now,
                Error,
                Scheduler,
                "task {:?} faulted: {:?}",
                id,
                e
            );
        }
    }
}
