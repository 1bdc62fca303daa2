#![no_std]
#![no_main]

use embassy_executor::Spawner;

cfg_if::cfg_if! {
    if #[cfg(feature = "defmt")] {
        use defmt_rtt as _;
        use panic_probe as _;
    } else {
        use panic_reset as _;
    }
}

use pemf_app::prelude::*;

// Application main entry point. The spawner can be used to start async tasks.
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("pEMF driver {} on {}", FW_VERSION, HW_VERSION);
    let board = PemfBoard::default();

    // The gate is held low from here on, whatever happens below.
    let coil = init_coil(board.coil.into());

    spawner.must_spawn(watchdog_task(board.wdt));
    spawner.must_spawn(led_task(board.led.into()));

    let core = match Core::init(Config::default()) {
        Ok(core) => core,
        Err(e) => {
            error!("self-test failed: {:?}, output held idle", e);
            LedIndicator.show(IndicatorStatus::Emergency);
            return;
        }
    };

    let input = SaadcInput::new(board.battery).await;

    let spawners = init_executors();
    spawners.pulse.must_spawn(pulse_level(
        core,
        PulseGenerator::new(core.shared, CoilLine::new(coil)),
    ));
    spawners.battery.must_spawn(battery_level(
        core,
        BatteryMonitor::new(
            core.shared,
            core.log,
            input,
            LedIndicator,
            &core.config,
        ),
    ));
    spawners.shutdown.must_spawn(shutdown_level(
        core,
        ShutdownCoordinator::new(
            core.shared,
            core.scheduler,
            core.log,
            CoilLine::new(coil),
            NrfLoader,
            &core.config,
        ),
    ));
    spawner.must_spawn(diagnostics_level(
        core,
        Diagnostics::new(
            core.shared,
            core.log,
            core.config.diagnostics_interval,
        ),
    ));

    core.start();

    #[cfg(feature = "usb")]
    spawner.must_spawn(usb_task(spawner, board.usb, core));
}
