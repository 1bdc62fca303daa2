use pemf_icd::DeviceInfo;
use postcard_rpc::header::VarHeader;

pub async fn device_info_get(
    context: &mut super::Context,
    _header: VarHeader,
    _req: (),
) -> DeviceInfo {
    context.device_info.clone()
}
