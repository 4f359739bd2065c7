//! Compute device selection for the text model

use candle_core::Device;
use tracing::warn;

use crate::config::DevicePreference;

/// Resolve a preference into a usable device. Accelerators that are not
/// compiled in, or fail to initialise, fall back to the CPU.
pub fn select_device(preference: DevicePreference) -> Device {
    match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => cuda_or_cpu(),
        DevicePreference::Metal => metal_or_cpu(),
        DevicePreference::Auto => {
            if candle_core::utils::cuda_is_available() {
                cuda_or_cpu()
            } else if candle_core::utils::metal_is_available() {
                metal_or_cpu()
            } else {
                Device::Cpu
            }
        }
    }
}

fn cuda_or_cpu() -> Device {
    Device::new_cuda(0).unwrap_or_else(|e| {
        warn!("CUDA device unavailable ({}), using CPU", e);
        Device::Cpu
    })
}

fn metal_or_cpu() -> Device {
    Device::new_metal(0).unwrap_or_else(|e| {
        warn!("Metal device unavailable ({}), using CPU", e);
        Device::Cpu
    })
}

pub fn device_name(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}
