use crate::config::DevicePreference;
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

/// Compute device the session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    /// Pick the device for `preference`, degrading to CPU when CUDA is
    /// requested but unavailable.
    pub fn resolve(preference: DevicePreference) -> Self {
        Self::resolve_with(preference, cuda_available())
    }

    fn resolve_with(preference: DevicePreference, cuda: bool) -> Self {
        match preference {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Auto if cuda => Device::Cuda,
            DevicePreference::Auto => Device::Cpu,
            DevicePreference::Cuda if cuda => Device::Cuda,
            DevicePreference::Cuda => {
                tracing::warn!("CUDA requested but the execution provider is unavailable, using CPU");
                Device::Cpu
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn cuda_available() -> bool {
    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => available,
        Err(e) => {
            tracing::debug!("CUDA availability check failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_cpu_always_wins() {
        assert_eq!(Device::resolve_with(DevicePreference::Cpu, true), Device::Cpu);
    }

    #[test]
    fn auto_follows_availability() {
        assert_eq!(Device::resolve_with(DevicePreference::Auto, true), Device::Cuda);
        assert_eq!(Device::resolve_with(DevicePreference::Auto, false), Device::Cpu);
    }

    #[test]
    fn cuda_degrades_to_cpu() {
        assert_eq!(Device::resolve_with(DevicePreference::Cuda, false), Device::Cpu);
        assert_eq!(Device::Cuda.to_string(), "cuda");
    }
}
