//! Latch Render System
//!
//! wgpu device bring-up and the GPU side of transient uploads

pub mod backend;
pub mod upload;

pub use backend::{request_headless_device, RenderError};
pub use upload::WgpuQueue;
pub use wgpu;

/// Rendering backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Metal (macOS, iOS)
    Metal,
    /// DirectX 12 (Windows)
    DirectX12,
    /// Vulkan (cross-platform)
    Vulkan,
    /// OpenGL (cross-platform, fallback)
    OpenGL,
    /// WebGPU (web)
    WebGpu,
    /// No real backend
    Empty,
}

/// Capability probe result
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub backend: BackendType,
    pub adapter_name: String,
    pub max_texture_size: u32,
    pub max_buffer_size: u64,
    pub supports_compute: bool,
}
