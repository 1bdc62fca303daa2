#![no_std]

pub mod tasks;
mod util;

use embassy_executor::{InterruptExecutor, SendSpawner};
use embassy_nrf::interrupt;
use embassy_nrf::interrupt::{InterruptExt, Priority};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use pemf_core::{
    selftest, Config, Diagnostics, EntryChannel, Error, LogQueue, Scheduler,
    SharedState, ShutdownCoordinator, TaskId, TASK_TABLE,
};
use static_cell::StaticCell;

use tasks::{wake_level, CoilLine, LedIndicator, NrfLoader, SaadcInput};

pub const HW_VERSION: &str = env!("HW_VERSION");
pub const FW_VERSION: &str = env!("FW_VERSION");
pub const MANUFACTURER: &str = "pEMF Labs";

/// Every level touches the core from interrupt context.
pub type CoreMutex = CriticalSectionRawMutex;

pub const LOG_CAPACITY: usize = 32;
pub const TASK_COUNT: usize = TASK_TABLE.len();

pub type AppShared = SharedState<CoreMutex>;
pub type AppScheduler = Scheduler<CoreMutex, TASK_COUNT>;
pub type AppLog = LogQueue<CoreMutex, LOG_CAPACITY>;
pub type AppEntry = EntryChannel<'static, CoreMutex, TASK_COUNT>;

pub type AppPulse = pemf_core::PulseGenerator<'static, CoreMutex, CoilLine>;
pub type AppBattery = pemf_core::BatteryMonitor<
    'static,
    CoreMutex,
    AppLog,
    SaadcInput,
    LedIndicator,
>;
pub type AppCoordinator = ShutdownCoordinator<
    'static,
    CoreMutex,
    AppLog,
    CoilLine,
    NrfLoader,
    TASK_COUNT,
>;
pub type AppDiagnostics = Diagnostics<'static, CoreMutex, LOG_CAPACITY>;

// Statics
pub static LOG_QUEUE: AppLog = LogQueue::new();
static SHARED: StaticCell<AppShared> = StaticCell::new();
static SCHEDULER: StaticCell<AppScheduler> = StaticCell::new();
static ENTRY: StaticCell<AppEntry> = StaticCell::new();

static EXECUTOR_PULSE: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_BATTERY: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_SHUTDOWN: InterruptExecutor = InterruptExecutor::new();

/// Handles to the real-time core, shared by every level and the USB server.
#[derive(Clone, Copy)]
pub struct Core {
    pub config: Config,
    pub shared: &'static AppShared,
    pub scheduler: &'static AppScheduler,
    pub entry: &'static AppEntry,
    pub log: &'static AppLog,
}

impl Core {
    /// Run the start-up checks and build the core. On failure the emergency
    /// stop is latched and nothing is scheduled.
    pub fn init(config: Config) -> Result<Self, Error> {
        let shared: &'static AppShared =
            SHARED.init(SharedState::new(config.waveform));

        if let Err(e) = selftest::run(&config, &TASK_TABLE) {
            shared.flags().force_stop();
            return Err(e);
        }
        let scheduler: &'static AppScheduler = SCHEDULER.init(
            Scheduler::new(TASK_TABLE, wake_level)
                .map_err(|_| Error::SelfTestFailure)?,
        );
        let entry = ENTRY.init(EntryChannel::new(
            shared,
            scheduler,
            config.entry,
        ));

        Ok(Self { config, shared, scheduler, entry, log: &LOG_QUEUE })
    }

    /// Make the periodic tasks due. The coordinator waits for a request.
    pub fn start(&self) {
        for id in [
            TaskId::PulseGenerator,
            TaskId::BatteryMonitor,
            TaskId::Diagnostics,
        ] {
            self.scheduler.pend(id);
        }
        info!("core started, waveform {:?}", self.shared.waveform());
    }
}

// Interrupt executors
#[interrupt]
unsafe fn EGU0_SWI0() {
    EXECUTOR_PULSE.on_interrupt()
}

#[interrupt]
unsafe fn EGU1_SWI1() {
    EXECUTOR_BATTERY.on_interrupt()
}

#[interrupt]
unsafe fn EGU2_SWI2() {
    EXECUTOR_SHUTDOWN.on_interrupt()
}

pub struct Spawners {
    pub pulse: SendSpawner,
    pub battery: SendSpawner,
    pub shutdown: SendSpawner,
}

/// One executor per level. The NVIC priorities keep pulse generation above
/// battery monitoring above the shutdown coordinator. Diagnostics stays on
/// the thread-mode executor below all of them.
pub fn init_executors() -> Spawners {
    interrupt::EGU0_SWI0.set_priority(Priority::P5);
    let pulse = EXECUTOR_PULSE.start(interrupt::EGU0_SWI0);

    interrupt::EGU1_SWI1.set_priority(Priority::P6);
    let battery = EXECUTOR_BATTERY.start(interrupt::EGU1_SWI1);

    interrupt::EGU2_SWI2.set_priority(Priority::P7);
    let shutdown = EXECUTOR_SHUTDOWN.start(interrupt::EGU2_SWI2);

    Spawners { pulse, battery, shutdown }
}

pub mod prelude {
    pub use super::{
        debug, error, info, init_executors, tasks::*, warn, AppBattery,
        AppCoordinator, AppDiagnostics, AppPulse, Core, CoreMutex, Spawners,
        FW_VERSION, HW_VERSION, MANUFACTURER,
    };
    pub use embassy_executor::Spawner;
    pub use embassy_nrf::interrupt;
    pub use embassy_nrf::interrupt::{InterruptExt, Priority};
    pub use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    pub use embassy_time::{Duration, Instant, Timer};

    pub use pemf_bsp::{BatteryResources, PemfBoard};
    pub use pemf_core::{
        BatteryMonitor, Config, Diagnostics, IndicatorStatus, PulseGenerator,
        ShutdownCoordinator, StatusIndicator, TaskPriority,
    };
    pub use pemf_icd::{self as icd, DeviceInfo};
}
