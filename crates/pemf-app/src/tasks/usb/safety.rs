use embassy_time::Instant;
use pemf_icd::{EntryKey, ResetResponse, SafetyReport};
use postcard_rpc::header::VarHeader;

use super::Context;

pub async fn safety_get(
    context: &mut Context,
    _header: VarHeader,
    _req: (),
) -> SafetyReport {
    context.core.shared.flags().snapshot().into()
}

/// Clears latched flags. The pulse generator resumes on its next cycle.
pub async fn safety_reset(
    context: &mut Context,
    _header: VarHeader,
    req: EntryKey,
) -> ResetResponse {
    context.core.entry.supervised_reset(&req.0, Instant::now()).into()
}
