use pemf_icd::{PulseReport, WaveformConfig};
use postcard_rpc::header::VarHeader;

use super::Context;
use crate::prelude::*;

pub async fn waveform_get(
    context: &mut Context,
    _header: VarHeader,
    _req: (),
) -> WaveformConfig {
    context.core.shared.waveform().into()
}

/// Returns `false` and keeps the running waveform if the request is out of
/// range. Applied at the start of the next cycle.
pub async fn waveform_set(
    context: &mut Context,
    _header: VarHeader,
    req: WaveformConfig,
) -> bool {
    match context.core.shared.set_waveform(req.into()) {
        Ok(()) => {
            info!(
                "waveform set: {} ms, {} permille",
                req.period_ms,
                req.duty_permille
            );
            true
        }
        Err(_e) => {
            warn!("waveform rejected: {:?}", _e);
            false
        }
    }
}

pub async fn pulse_stats(
    context: &mut Context,
    _header: VarHeader,
    _req: (),
) -> PulseReport {
    context.core.shared.pulse_stats().into()
}
