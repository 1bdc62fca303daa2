#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use pemf_core::{
    AnalogError, AnalogInput, IndicatorStatus, LogCategory, LogEvent,
    LogQueue, Loader, OutputLine, Severity, StatusIndicator, TaskPriority,
};

pub type Queue = LogQueue<NoopRawMutex, 64>;

pub const KEY: &[u8; 16] = b"pemf-loader-key!";

pub fn no_pend(_: TaskPriority) {}

/// Pop every queued event.
pub fn drain(queue: &Queue) -> Vec<LogEvent> {
    std::iter::from_fn(|| queue.pop()).collect()
}

pub fn find<'a>(
    events: &'a [LogEvent],
    severity: Severity,
    category: LogCategory,
    needle: &str,
) -> Option<&'a LogEvent> {
    events.iter().find(|e| {
        e.severity == severity
            && e.category == category
            && e.message.contains(needle)
    })
}

// ---------------------------------------------------------------------------
// Analog input
// ---------------------------------------------------------------------------

/// Replays queued conversions, then repeats `steady`.
#[derive(Clone)]
pub struct ScriptedInput {
    script: Rc<RefCell<VecDeque<Result<u16, AnalogError>>>>,
    steady: Rc<RefCell<u16>>,
    pub calls: Rc<RefCell<usize>>,
}

impl ScriptedInput {
    pub fn steady(raw: u16) -> Self {
        Self {
            script: Rc::default(),
            steady: Rc::new(RefCell::new(raw)),
            calls: Rc::default(),
        }
    }

    pub fn set_steady(&self, raw: u16) {
        *self.steady.borrow_mut() = raw;
    }

    /// Queue one activation: a throwaway conversion then the kept one.
    pub fn then(&self, throwaway: u16, kept: Result<u16, AnalogError>) {
        let mut script = self.script.borrow_mut();
        script.push_back(Ok(throwaway));
        script.push_back(kept);
    }
}

impl AnalogInput for ScriptedInput {
    fn sample(&mut self) -> Result<u16, AnalogError> {
        *self.calls.borrow_mut() += 1;
        match self.script.borrow_mut().pop_front() {
            Some(r) => r,
            None => Ok(*self.steady.borrow()),
        }
    }
}

// ---------------------------------------------------------------------------
// Output line
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct LineState {
    pub driven: bool,
    /// Readback reports energized regardless of the drive.
    pub stuck: bool,
    pub rising_edges: usize,
}

/// Clones share one physical line.
#[derive(Clone, Default)]
pub struct RecordingLine(pub Rc<RefCell<LineState>>);

impl RecordingLine {
    pub fn driven(&self) -> bool {
        self.0.borrow().driven
    }

    pub fn stick(&self, stuck: bool) {
        self.0.borrow_mut().stuck = stuck;
    }

    pub fn rising_edges(&self) -> usize {
        self.0.borrow().rising_edges
    }
}

impl OutputLine for RecordingLine {
    fn set_active(&mut self) {
        let mut s = self.0.borrow_mut();
        if !s.driven {
            s.rising_edges += 1;
        }
        s.driven = true;
    }

    fn set_idle(&mut self) {
        self.0.borrow_mut().driven = false;
    }

    fn is_energized(&self) -> bool {
        let s = self.0.borrow();
        s.driven || s.stuck
    }
}

// ---------------------------------------------------------------------------
// Indicator and loader
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingIndicator(pub Rc<RefCell<Vec<IndicatorStatus>>>);

impl RecordingIndicator {
    pub fn last(&self) -> Option<IndicatorStatus> {
        self.0.borrow().last().copied()
    }

    pub fn count(&self) -> usize {
        self.0.borrow().len()
    }
}

impl StatusIndicator for RecordingIndicator {
    fn show(&mut self, status: IndicatorStatus) {
        self.0.borrow_mut().push(status);
    }
}

pub struct PanicLoader;

impl Loader for PanicLoader {
    fn enter_loader(self) -> ! {
        panic!("loader entered")
    }
}
