use embassy_nrf::interrupt::Priority;
use embassy_nrf::peripherals::{P0_27, P0_29, P1_15, SAADC, WDT};
use embassy_nrf::Peri;

#[cfg(feature = "usb")]
use crate::usb;

/// Battery sense input: 10k/5.1k divider into AIN5.
pub struct BatteryResources {
    /// Divided battery voltage.
    pub vdiv: Peri<'static, P0_29>,
    /// Successive Approximation Analog-to-Digital Converter.
    pub saadc: Peri<'static, SAADC>,
}

/// Represents all the peripherals and pins used by the driver board.
pub struct PemfBoard {
    /// Gate of the coil driver MOSFET. High energizes the coil.
    pub coil: Peri<'static, P0_27>,
    /// Status LED, active high.
    pub led: Peri<'static, P1_15>,
    /// Peripherals for battery sensing.
    pub battery: BatteryResources,
    /// Watchdog Timer.
    pub wdt: Peri<'static, WDT>,
    #[cfg(feature = "usb")]
    /// USB device peripheral
    pub usb: usb::UsbDriverBuilder,
}

impl Default for PemfBoard {
    fn default() -> Self {
        let mut config = embassy_nrf::config::Config::default();
        // Must preempt every executor level.
        config.gpiote_interrupt_priority = Priority::P2;
        config.time_interrupt_priority = Priority::P2;
        Self::new(config)
    }
}

impl PemfBoard {
    /// Create a new instance based on HAL configuration
    pub fn new(config: embassy_nrf::config::Config) -> Self {
        let p = embassy_nrf::init(config);

        Self {
            coil: p.P0_27,
            led: p.P1_15,
            battery: BatteryResources { vdiv: p.P0_29, saadc: p.SAADC },
            wdt: p.WDT,
            #[cfg(feature = "usb")]
            usb: usb::UsbDriverBuilder::new(p.USBD),
        }
    }
}
