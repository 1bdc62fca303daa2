use crate::prelude::*;
use embassy_futures::select::select;
use embassy_sync::signal::Signal;
use pemf_icd::{BatteryReport, BatteryStreamEndpoint, BatteryTopic};
use portable_atomic::{AtomicBool, Ordering};
use postcard_rpc::{header::VarHeader, server::Sender};

use super::{Context, SpawnCtx};

static STREAMING: AtomicBool = AtomicBool::new(false);
static USB_STREAM_STOP: Signal<CriticalSectionRawMutex, ()> = Signal::new();

pub async fn battery_get(
    context: &mut Context,
    _header: VarHeader,
    _rqst: (),
) -> Option<BatteryReport> {
    context.core.shared.battery_reading().map(Into::into)
}

/// Replies `false` if a stream is already running.
#[embassy_executor::task]
pub async fn battery_stream_handler(
    context: SpawnCtx,
    header: VarHeader,
    _rqst: (),
    sender: Sender<super::AppTx>,
) {
    let started = !STREAMING.swap(true, Ordering::AcqRel);
    if sender
        .reply::<BatteryStreamEndpoint>(header.seq_no, &started)
        .await
        .is_err()
    {
        error!("Failed to reply, not streaming battery");
        if started {
            STREAMING.store(false, Ordering::Release);
        }
        return;
    }
    if !started {
        return;
    }

    USB_STREAM_STOP.reset();
    select(battery_stream_usb(context.core, sender), USB_STREAM_STOP.wait())
        .await;
    STREAMING.store(false, Ordering::Release);
}

pub async fn battery_stop(
    _context: &mut Context,
    _header: VarHeader,
    _rqst: (),
) {
    USB_STREAM_STOP.signal(());
}

/// Publish each fresh reading once.
async fn battery_stream_usb(core: Core, sender: Sender<super::AppTx>) {
    let mut packet_counter = 0u8;
    let mut last = None;
    loop {
        Timer::after(core.config.battery_interval).await;

        let Some(reading) = core.shared.battery_reading() else {
            continue;
        };
        if last == Some(reading.timestamp) {
            continue;
        }
        last = Some(reading.timestamp);

        let report = BatteryReport::from(reading);
        if let Err(_e) = sender
            .publish::<BatteryTopic>(packet_counter.into(), &report)
            .await
        {
            #[cfg(feature = "defmt")]
            warn!(
                "Failed to publish battery data: {:?}",
                defmt::Debug2Format(&_e)
            );
        }
        packet_counter = packet_counter.wrapping_add(1);
    }
}
