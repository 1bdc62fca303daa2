//! Structured events and the bounded queue that carries them to the
//! low-priority consumer.

use core::cell::RefCell;
use core::fmt::{self, Write};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Instant;
use heapless::Deque;

pub const MESSAGE_CAPACITY: usize = 64;
pub type Message = heapless::String<MESSAGE_CAPACITY>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogCategory {
    Battery,
    Pulse,
    Safety,
    Shutdown,
    Scheduler,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogEvent {
    pub timestamp: Instant,
    pub severity: Severity,
    pub category: LogCategory,
    pub message: Message,
}

impl LogEvent {
    /// Formats `args` into the bounded message, truncating on a character
    /// boundary when it does not fit.
    pub fn new(
        timestamp: Instant,
        severity: Severity,
        category: LogCategory,
        args: fmt::Arguments<'_>,
    ) -> Self {
        let mut message = Message::new();
        let _ = Truncating(&mut message).write_fmt(args);
        Self { timestamp, severity, category, message }
    }
}

struct Truncating<'a>(&'a mut Message);

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Consumer of structured events. `push` must never block.
pub trait LogSink {
    fn push(&self, event: LogEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogStats {
    pub queued: usize,
    pub pushed: u32,
    pub dropped: u32,
}

struct Inner<const N: usize> {
    events: Deque<LogEvent, N>,
    pushed: u32,
    dropped: u32,
}

/// Fixed-capacity event queue. When full, the oldest event is evicted to
/// make room and counted as dropped.
pub struct LogQueue<M: RawMutex, const N: usize> {
    inner: Mutex<M, RefCell<Inner<N>>>,
}

impl<M: RawMutex, const N: usize> LogQueue<M, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                events: Deque::new(),
                pushed: 0,
                dropped: 0,
            })),
        }
    }

    pub fn pop(&self) -> Option<LogEvent> {
        self.inner.lock(|inner| inner.borrow_mut().events.pop_front())
    }

    pub fn len(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().events.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> LogStats {
        self.inner.lock(|inner| {
            let inner = inner.borrow();
            LogStats {
                queued: inner.events.len(),
                pushed: inner.pushed,
                dropped: inner.dropped,
            }
        })
    }
}

impl<M: RawMutex, const N: usize> Default for LogQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> LogSink for LogQueue<M, N> {
    fn push(&self, event: LogEvent) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            inner.pushed = inner.pushed.wrapping_add(1);
            if inner.events.is_full() {
                inner.events.pop_front();
                inner.dropped = inner.dropped.wrapping_add(1);
            }
            // Room was made above.
            let _ = inner.events.push_back(event);
        })
    }
}
