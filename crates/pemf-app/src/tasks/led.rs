use embassy_futures::select::{select, Either};
use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive};
use embassy_nrf::Peri;
use embassy_sync::signal::Signal;
use pemf_core::IndicatorPattern;

use crate::prelude::*;

/// Latest status to render. Older values are overwritten.
pub static LED_STATUS: Signal<CriticalSectionRawMutex, IndicatorStatus> =
    Signal::new();

/// Posts status changes to the LED task without blocking the caller.
#[derive(Clone, Copy, Default)]
pub struct LedIndicator;

impl StatusIndicator for LedIndicator {
    fn show(&mut self, status: IndicatorStatus) {
        LED_STATUS.signal(status);
    }
}

/// Hold `level` for `time`, or until a new status arrives.
async fn hold(
    led: &mut Output<'static>,
    level: Level,
    time: Duration,
) -> Option<IndicatorStatus> {
    led.set_level(level);
    match select(Timer::after(time), LED_STATUS.wait()).await {
        Either::First(()) => None,
        Either::Second(status) => Some(status),
    }
}

#[embassy_executor::task]
pub async fn led_task(pin: Peri<'static, AnyPin>) {
    let mut led = Output::new(pin, Level::Low, OutputDrive::Standard);
    let mut pattern = IndicatorPattern::Off;

    loop {
        let next = match pattern {
            IndicatorPattern::Off => {
                led.set_low();
                Some(LED_STATUS.wait().await)
            }
            IndicatorPattern::Solid => {
                led.set_high();
                Some(LED_STATUS.wait().await)
            }
            IndicatorPattern::Flash { on, off } => {
                match hold(&mut led, Level::High, on).await {
                    Some(status) => Some(status),
                    None => hold(&mut led, Level::Low, off).await,
                }
            }
        };
        if let Some(status) = next {
            debug!("indicator: {:?}", status);
            pattern = IndicatorPattern::for_status(status);
        }
    }
}
