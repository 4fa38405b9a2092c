use super::init::WgpuDevice;

/// Adapter summary shown in the overlay.
#[derive(Debug, Clone)]
pub struct AdapterSummary {
    pub adapter_name: String,
    pub backend: String,
    pub device_type: String,
}

impl std::fmt::Display for AdapterSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.adapter_name, self.device_type, self.backend)
    }
}

impl WgpuDevice {
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn adapter_summary(&self) -> AdapterSummary {
        AdapterSummary {
            adapter_name: self.adapter_info.name.clone(),
            backend: self.adapter_info.backend.to_str().to_string(),
            device_type: match self.adapter_info.device_type {
                wgpu::DeviceType::DiscreteGpu => "Discrete GPU".to_string(),
                wgpu::DeviceType::IntegratedGpu => "Integrated GPU".to_string(),
                wgpu::DeviceType::VirtualGpu => "Virtual GPU".to_string(),
                wgpu::DeviceType::Cpu => "CPU".to_string(),
                _ => "Unknown".to_string(),
            },
        }
    }
}
