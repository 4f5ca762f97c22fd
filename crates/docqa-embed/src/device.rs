use candle_core::Device;
use tracing::info;

/// Metal when compiled with the `metal` feature and a GPU is present, CPU otherwise.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!("embedding device: Metal (MPS)");
            return dev;
        }
    }
    info!("embedding device: CPU");
    Device::Cpu
}
