use crate::prelude::*;
use embassy_nrf::peripherals::WDT;
use embassy_nrf::wdt;
use embassy_nrf::wdt::Watchdog;
use embassy_nrf::Peri;

pub mod battery;
pub mod coil;
pub mod led;
pub mod levels;
pub mod loader;
#[cfg(feature = "usb")]
pub mod usb;

// Re-exports
pub use battery::*;
pub use coil::*;
pub use led::*;
pub use levels::*;
pub use loader::*;
#[cfg(feature = "usb")]
pub use usb::*;

// Keeps our system alive
#[embassy_executor::task]
pub async fn watchdog_task(wdt: Peri<'static, WDT>) {
    let wdt_config = wdt::Config::try_new(&wdt).unwrap_or_default();

    let (_wdt, [mut handle]) = match Watchdog::try_new(wdt, wdt_config) {
        Ok(x) => x,
        Err(_) => {
            // Already running from a previous boot with another handle
            // count. Wait for it to expire.
            loop {
                cortex_m::asm::wfe();
            }
        }
    };
    loop {
        handle.pet();
        Timer::after(Duration::from_secs(2)).await;
    }
}
