//! One runner per priority level. Each dispatches the bodies it owns, then
//! sleeps until the scheduler's next deadline for the level or until the
//! level is pended from elsewhere.

use embassy_futures::select::select;
use embassy_sync::signal::Signal;

use crate::prelude::*;

static WAKE: [Signal<CriticalSectionRawMutex, ()>; TaskPriority::COUNT] =
    [const { Signal::new() }; TaskPriority::COUNT];

/// Pend hook handed to the scheduler.
pub fn wake_level(level: TaskPriority) {
    WAKE[level as usize].signal(());
}

async fn sleep_until_due(core: &Core, level: TaskPriority) {
    let wake = &WAKE[level as usize];
    match core.scheduler.next_wake(level) {
        Some(at) => {
            select(Timer::at(at), wake.wait()).await;
        }
        None => wake.wait().await,
    }
}

#[embassy_executor::task]
pub async fn pulse_level(core: Core, mut pulse: AppPulse) {
    let level = TaskPriority::PulseGeneration;
    loop {
        core.scheduler.dispatch(Instant::now(), &mut [&mut pulse], core.log);
        sleep_until_due(&core, level).await;
    }
}

#[embassy_executor::task]
pub async fn battery_level(core: Core, mut battery: AppBattery) {
    let level = TaskPriority::BatteryMonitoring;
    loop {
        core.scheduler.dispatch(
            Instant::now(),
            &mut [&mut battery],
            core.log,
        );
        sleep_until_due(&core, level).await;
    }
}

#[embassy_executor::task]
pub async fn shutdown_level(core: Core, mut coordinator: AppCoordinator) {
    let level = TaskPriority::Shutdown;
    loop {
        core.scheduler.dispatch(
            Instant::now(),
            &mut [&mut coordinator],
            core.log,
        );
        sleep_until_due(&core, level).await;
    }
}

#[embassy_executor::task]
pub async fn diagnostics_level(core: Core, mut diagnostics: AppDiagnostics) {
    let level = TaskPriority::Diagnostics;
    loop {
        core.scheduler.dispatch(
            Instant::now(),
            &mut [&mut diagnostics],
            core.log,
        );
        sleep_until_due(&core, level).await;
    }
}
