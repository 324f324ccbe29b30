use anyhow::Result;
use candle_core::Device;

#[cfg(feature = "cuda")]
use cudarc::driver::CudaDevice;

/// Opens the CUDA device `ordinal`, or returns `None` when no accelerator is usable
/// (no driver, no device, or the crate was built without the `cuda` feature).
pub fn accelerator(ordinal: usize) -> Option<Device> {
    if !candle_core::utils::cuda_is_available() {
        tracing::debug!("candle was built without CUDA support");
        return None;
    }
    match Device::new_cuda(ordinal) {
        Ok(device) => Some(device),
        Err(e) => {
            tracing::warn!("Failed to open CUDA device {}: {}", ordinal, e);
            None
        }
    }
}

/// Returns (free_memory, total_memory) in bytes for the specified device.
/// Returns (0, 0) if CUDA is not available or disabled.
pub fn get_vram_info(_device_id: usize) -> Result<(usize, usize)> {
    #[cfg(feature = "cuda")]
    {
        match CudaDevice::new(_device_id) {
            Ok(_dev) => {
                use cudarc::driver::result::mem_get_info;
                let (free, total) = mem_get_info()?;
                Ok((free, total))
            }
            Err(e) => {
                tracing::warn!("Failed to initialize CUDA device {}: {:?}", _device_id, e);
                Ok((0, 0))
            }
        }
    }

    #[cfg(not(feature = "cuda"))]
    {
        Ok((0, 0))
    }
}

/// Accelerator if present, otherwise the CPU when `allow_cpu` is set.
/// Errors when neither is allowed; callers exit with a failure status.
pub fn select_device(ordinal: usize, allow_cpu: bool) -> Result<Device> {
    match accelerator(ordinal) {
        Some(device) => Ok(device),
        None if allow_cpu => {
            tracing::warn!("⚠️ No CUDA device found, running on CPU (--cpu)");
            Ok(Device::Cpu)
        }
        None => anyhow::bail!("No CUDA device available. Pass --cpu to run on the CPU anyway."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cpu_build_has_no_accelerator() -> Result<()> {
        assert!(accelerator(0).is_none());
        assert_eq!(get_vram_info(0)?, (0, 0));
        Ok(())
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_select_device_requires_cpu_opt_in() -> Result<()> {
        let err = select_device(0, false).unwrap_err();
        assert!(err.to_string().contains("No CUDA device available"));
        assert!(select_device(0, true)?.is_cpu());
        Ok(())
    }
}
