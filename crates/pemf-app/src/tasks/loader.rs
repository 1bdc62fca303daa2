use embassy_nrf::pac;
use pemf_core::Loader;

/// Value the UF2 bootloader looks for in `GPREGRET` to stay resident.
pub const DFU_MAGIC_UF2_RESET: u8 = 0x57;

/// Resets into the UF2 bootloader.
pub struct NrfLoader;

impl Loader for NrfLoader {
    fn enter_loader(self) -> ! {
        pac::POWER.gpregret().write(|w| w.set_gpregret(DFU_MAGIC_UF2_RESET));
        cortex_m::asm::dsb();
        cortex_m::peripheral::SCB::sys_reset()
    }
}
