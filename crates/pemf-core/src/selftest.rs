//! Start-up consistency checks.

use crate::battery::{raw_to_millivolts, BatteryState};
use crate::config::Config;
use crate::error::Error;
use crate::safety::check_limits;
use crate::scheduler::{validate_table, TaskDecl};

/// Validate the configuration and task table, then probe every band edge.
pub fn run(config: &Config, tasks: &[TaskDecl]) -> Result<(), Error> {
    if let Err(e) = config.validate() {
        error!("self-test: config rejected: {:?}", e);
        return Err(Error::SelfTestFailure);
    }
    if let Err(e) = validate_table(tasks) {
        error!("self-test: task table rejected: {:?}", e);
        return Err(Error::SelfTestFailure);
    }

    let t = &config.thresholds;
    let l = &config.limits;
    let edges = [
        (t.low, BatteryState::Low),
        (t.low + 1, BatteryState::Normal),
        (t.charging - 1, BatteryState::Normal),
        (t.charging, BatteryState::Charging),
        (t.full, BatteryState::Full),
        (l.over_voltage, BatteryState::Fault),
    ];
    for (raw, expected) in edges {
        if BatteryState::classify(raw, t, l) != expected {
            error!("self-test: raw {} misclassified", raw);
            return Err(Error::SelfTestFailure);
        }
    }

    if check_limits(l.over_voltage, l).is_none()
        || check_limits(l.under_voltage, l).is_none()
        || check_limits(t.low + 1, l).is_some()
        || check_limits(t.full, l).is_some()
    {
        error!("self-test: safety limits overlap the bands");
        return Err(Error::SelfTestFailure);
    }

    if raw_to_millivolts(t.low) >= raw_to_millivolts(t.charging) {
        error!("self-test: voltage scale not monotonic");
        return Err(Error::SelfTestFailure);
    }

    info!(
        "self-test passed: low {} mV, charging {} mV, over {} mV",
        raw_to_millivolts(t.low),
        raw_to_millivolts(t.charging),
        raw_to_millivolts(l.over_voltage)
    );
    Ok(())
}
