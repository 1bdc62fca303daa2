use embassy_nrf::saadc::{
    self, ChannelConfig, Gain, Input as _, Reference, Saadc,
};
use embassy_nrf::bind_interrupts;
use pemf_core::{poll_until, AnalogError, AnalogInput};

use crate::prelude::*;

/// Longest a single conversion may take before it counts as failed.
const SAMPLE_TIMEOUT: Duration = Duration::from_millis(2);
/// 12-bit conversion.
const FULL_SCALE: i16 = 4095;

bind_interrupts!(struct BatteryIrqs {
    SAADC => saadc::InterruptHandler;
});

/// Battery divider on the SAADC, referenced to VDD so counts map onto the
/// 3.3 V scale used by the core.
pub struct SaadcInput {
    saadc: Saadc<'static, 1>,
}

impl SaadcInput {
    pub async fn new(res: BatteryResources) -> Self {
        let mut channel =
            ChannelConfig::single_ended(res.vdiv.degrade_saadc());
        channel.reference = Reference::VDD1_4;
        channel.gain = Gain::GAIN1_4;

        let mut config = saadc::Config::default();
        config.resolution = saadc::Resolution::_12BIT;

        interrupt::SAADC.set_priority(Priority::P3);
        let saadc = Saadc::new(res.saadc, BatteryIrqs, config, [channel]);
        // Indicated: wait for ADC calibration.
        saadc.calibrate().await;
        Self { saadc }
    }
}

impl AnalogInput for SaadcInput {
    /// Busy-waits on the conversion. Runs on the battery level, which the
    /// pulse level preempts.
    ///
    /// The bound is a clock deadline, not a `Timer`: the integrated timer
    /// queue panics on a waker that no executor created.
    fn sample(&mut self) -> Result<u16, AnalogError> {
        let mut buf = [0i16; 1];
        let deadline = Instant::now() + SAMPLE_TIMEOUT;
        poll_until(self.saadc.sample(&mut buf), deadline)
            .ok_or(AnalogError)?;
        // Single-ended inputs can read slightly below ground.
        Ok(buf[0].clamp(0, FULL_SCALE) as u16)
    }
}
