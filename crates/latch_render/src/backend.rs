//! Rendering backend bring-up
//!
//! Headless device creation for upload streaming and tools.

use crate::{BackendType, DeviceCapabilities};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

impl From<wgpu::Backend> for BackendType {
    fn from(backend: wgpu::Backend) -> Self {
        match backend {
            wgpu::Backend::Metal => BackendType::Metal,
            wgpu::Backend::Dx12 => BackendType::DirectX12,
            wgpu::Backend::Vulkan => BackendType::Vulkan,
            wgpu::Backend::Gl => BackendType::OpenGL,
            wgpu::Backend::BrowserWebGpu => BackendType::WebGpu,
            _ => BackendType::Empty,
        }
    }
}

/// Probe what an adapter can do
pub fn probe_capabilities(adapter: &wgpu::Adapter) -> DeviceCapabilities {
    let info = adapter.get_info();
    let limits = adapter.limits();
    DeviceCapabilities {
        backend: info.backend.into(),
        adapter_name: info.name,
        max_texture_size: limits.max_texture_dimension_2d,
        max_buffer_size: limits.max_buffer_size,
        supports_compute: adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
    }
}

/// Create a device without a surface.
pub async fn request_headless_device(
) -> Result<(wgpu::Device, wgpu::Queue, DeviceCapabilities), RenderError> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or(RenderError::NoAdapter)?;

    let capabilities = probe_capabilities(&adapter);
    info!(
        backend = ?capabilities.backend,
        adapter = %capabilities.adapter_name,
        "GPU adapter selected"
    );

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("latch headless device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        )
        .await?;

    Ok((device, queue, capabilities))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_wgpu_backends() {
        assert_eq!(BackendType::from(wgpu::Backend::Vulkan), BackendType::Vulkan);
        assert_eq!(BackendType::from(wgpu::Backend::Dx12), BackendType::DirectX12);
        assert_eq!(BackendType::from(wgpu::Backend::Gl), BackendType::OpenGL);
    }
}
