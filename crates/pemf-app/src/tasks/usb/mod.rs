use crate::prelude::*;
use embassy_futures::join::join;
use embassy_nrf::usb::Driver;
use embassy_usb::Config;
use pemf_bsp::usb::UsbDriverBuilder;
use pemf_icd::*;
use static_cell::ConstStaticCell;

use postcard_rpc::{
    define_dispatch,
    server::{
        impls::embassy_usb_v0_5::{
            dispatch_impl::{
                spawn_fn, WireRxBuf, WireRxImpl, WireSpawnImpl, WireStorage,
                WireTxImpl,
            },
            PacketBuffers,
        },
        Dispatch, Server, SpawnContext,
    },
};

mod battery;
mod device_info;
mod entry;
mod pulse;
mod safety;

use battery::*;
use device_info::*;
use entry::*;
use pulse::*;
use safety::*;

// Postcard types
type MutexType = CriticalSectionRawMutex;
pub type AppTx = WireTxImpl<MutexType, AppDriver>;
type AppRx = WireRxImpl<AppDriver>;
type AppServer = Server<AppTx, AppRx, WireRxBuf, PemfUsbApp>;

type AppDriver =
    Driver<'static, embassy_nrf::usb::vbus_detect::HardwareVbusDetect>;
type AppStorage = WireStorage<MutexType, AppDriver, 256, 256, 64, 256>;
type BufStorage = PacketBuffers<1024, 1024>;

// Statics
static PBUFS: ConstStaticCell<BufStorage> =
    ConstStaticCell::new(BufStorage::new());
static STORAGE: AppStorage = AppStorage::new();

pub struct Context {
    pub core: Core,
    pub device_info: DeviceInfo,
}

define_dispatch! {
    app: PemfUsbApp;
    spawn_fn: spawn_fn;
    tx_impl: AppTx;
    spawn_impl: WireSpawnImpl;
    context: Context;

    endpoints: {
        list: ENDPOINT_LIST;

        | EndpointTy                | kind      | handler                       |
        | ----------                | ----      | -------                       |
        | DeviceInfoGetEndpoint     | async     | device_info_get               |
        | BatteryGetEndpoint        | async     | battery_get                   |
        | BatteryStreamEndpoint     | spawn     | battery_stream_handler        |
        | BatteryStopEndpoint       | async     | battery_stop                  |
        | SafetyGetEndpoint         | async     | safety_get                    |
        | SafetyResetEndpoint       | async     | safety_reset                  |
        | WaveformGetEndpoint       | async     | waveform_get                  |
        | WaveformSetEndpoint       | async     | waveform_set                  |
        | PulseStatsEndpoint        | async     | pulse_stats                   |
        | LoaderEnterEndpoint       | async     | loader_enter                  |
        | LoaderStatusEndpoint      | async     | loader_status                 |
    };
    topics_in: {
        list: TOPICS_IN_LIST;

        | TopicTy                   | kind      | handler                       |
        | ----------                | ----      | -------                       |
    };
    topics_out: {
        list: TOPICS_OUT_LIST;
    };
}

// Structs
pub struct SpawnCtx {
    pub core: Core,
}

impl SpawnContext for Context {
    type SpawnCtxt = SpawnCtx;
    fn spawn_ctxt(&mut self) -> Self::SpawnCtxt {
        SpawnCtx { core: self.core }
    }
}

// USB configuration
fn usb_config() -> Config<'static> {
    let mut config = Config::new(0x16c0, 0x27DD);
    config.manufacturer = Some(MANUFACTURER);
    config.product = Some("pemf-driver");
    config.serial_number = Some("12345678");

    // Required for windows compatibility.
    config.device_class = 0xEF;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;
    config.composite_with_iads = true;

    config
}

fn device_info() -> DeviceInfo {
    // Longer strings are cut to the wire capacity.
    fn field(s: &str) -> heapless::String<32> {
        let mut out = heapless::String::new();
        for c in s.chars() {
            if out.push(c).is_err() {
                break;
            }
        }
        out
    }
    DeviceInfo {
        hardware_revision: field(HW_VERSION),
        software_revision: field(FW_VERSION),
        manufacturer_name: field(MANUFACTURER),
    }
}

#[embassy_executor::task]
pub async fn usb_task(spawner: Spawner, usbd: UsbDriverBuilder, core: Core) {
    let context = Context { core, device_info: device_info() };
    let dispatcher = PemfUsbApp::new(context, spawner.into());
    let vkk = dispatcher.min_key_len();

    let driver = usbd.init();
    let pbufs = PBUFS.take();
    let config = usb_config();

    let (mut device, tx_impl, rx_impl) =
        STORAGE.init(driver, config, pbufs.tx_buf.as_mut_slice(), 64);

    let mut server: AppServer = Server::new(
        tx_impl,
        rx_impl,
        pbufs.rx_buf.as_mut_slice(),
        dispatcher,
        vkk,
    );

    let server_fut = async {
        // Let the USB driver come up before serving.
        Timer::after(Duration::from_secs(2)).await;
        info!("Starting Postcard Server...");
        server.run().await;
    };

    let _ = join(server_fut, device.run()).await;
    warn!("Exiting usb_task!!");
}
