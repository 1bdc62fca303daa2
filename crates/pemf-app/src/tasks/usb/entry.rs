use embassy_time::Instant;
use pemf_icd::{EntryKey, EntryResponse, EntryStatusReport};
use postcard_rpc::header::VarHeader;

use super::Context;

/// Accepting only starts the sequence. Its outcome is read back through
/// `loader/status`, or the device drops off the bus into the loader.
pub async fn loader_enter(
    context: &mut Context,
    _header: VarHeader,
    req: EntryKey,
) -> EntryResponse {
    context.core.entry.request_entry(&req.0, Instant::now()).into()
}

pub async fn loader_status(
    context: &mut Context,
    _header: VarHeader,
    _req: (),
) -> EntryStatusReport {
    context.core.entry.status().into()
}
