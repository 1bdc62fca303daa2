//! Coil-driver gate, shared by the pulse generator and the shutdown
//! coordinator.

use core::cell::RefCell;

use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive};
use embassy_nrf::Peri;
use embassy_sync::blocking_mutex::Mutex;
use pemf_core::OutputLine;
use static_cell::StaticCell;

use crate::CoreMutex;

pub type CoilPin = Mutex<CoreMutex, RefCell<Output<'static>>>;

static COIL: StaticCell<CoilPin> = StaticCell::new();

/// Take the gate pin, driven low before anything else can touch it.
pub fn init_coil(pin: Peri<'static, AnyPin>) -> &'static CoilPin {
    COIL.init(Mutex::new(RefCell::new(Output::new(
        pin,
        Level::Low,
        OutputDrive::HighDrive,
    ))))
}

/// One handle to the gate. Every handle drives the same pin.
#[derive(Clone, Copy)]
pub struct CoilLine {
    pin: &'static CoilPin,
}

impl CoilLine {
    pub fn new(pin: &'static CoilPin) -> Self {
        Self { pin }
    }
}

impl OutputLine for CoilLine {
    fn set_active(&mut self) {
        self.pin.lock(|p| p.borrow_mut().set_high());
    }

    fn set_idle(&mut self) {
        self.pin.lock(|p| p.borrow_mut().set_low());
    }

    /// Reads the output latch back rather than trusting the last write.
    fn is_energized(&self) -> bool {
        self.pin.lock(|p| p.borrow().is_set_high())
    }
}
