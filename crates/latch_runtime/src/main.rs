//! Latch Engine Runtime
//!
//! Headless upload streaming: every frame rebuilds a batch of vertices on
//! the CPU, stages it in the transient upload ring and copies it into a GPU
//! vertex buffer. Pass a JSON settings file as the first argument to resize
//! the ring.

use anyhow::{Context, Result};
use latch_core::memory::{UploadHeap, UploadSettings};
use latch_render::{wgpu, WgpuQueue};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const FRAMES: u32 = 240;
const TRIANGLES: usize = 1024;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

fn fill_vertices(vertices: &mut [Vertex], frame: u32) {
    let phase = frame as f32 * 0.05;
    for (i, tri) in vertices.chunks_exact_mut(3).enumerate() {
        let angle = phase + i as f32 * 0.37;
        let (cx, cy) = (angle.cos() * 0.8, angle.sin() * 0.8);
        let shade = (i % 7) as f32 / 7.0;
        let corners = [[0.0, 0.02], [-0.02, -0.02], [0.02, -0.02]];
        for (vertex, corner) in tri.iter_mut().zip(corners) {
            *vertex = Vertex {
                position: [cx + corner[0], cy + corner[1]],
                color: [shade, 1.0 - shade, 0.5],
            };
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Latch Engine v{}", latch_core::VERSION);

    let settings = match std::env::args().nth(1) {
        Some(path) => UploadSettings::load(&path)
            .with_context(|| format!("loading upload settings from {path}"))?,
        None => UploadSettings::default(),
    };

    let (device, queue, capabilities) = pollster::block_on(latch_render::request_headless_device())
        .context("creating headless GPU device")?;
    tracing::info!(?capabilities, "device ready");

    let device = Arc::new(device);
    let gpu = WgpuQueue::new(Arc::clone(&device), Arc::new(queue));
    let mut heap = UploadHeap::from_settings(&settings, gpu).context("creating upload heap")?;

    let mut vertices = vec![<Vertex as bytemuck::Zeroable>::zeroed(); TRIANGLES * 3];
    let vertex_bytes = std::mem::size_of_val(vertices.as_slice());
    let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Streamed Vertex Buffer"),
        size: vertex_bytes as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    for frame in 0..FRAMES {
        heap.begin_frame();
        fill_vertices(&mut vertices, frame);

        let align = heap.default_alignment();
        let offset = heap.allocate_pod(align, &vertices)?.offset();
        let staged = heap
            .bytes_at(offset, vertex_bytes)
            .context("staged vertices outside the upload block")?;

        let gpu = heap.queue();
        gpu.queue().write_buffer(&vertex_buffer, 0, staged);
        let encoder = gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Upload Encoder"),
            });
        let tag = gpu.submit(std::iter::once(encoder.finish()));
        tracing::trace!(frame, %tag, offset, "frame uploaded");
    }

    let _ = device.poll(wgpu::Maintain::Wait);
    heap.begin_frame();

    let stats = heap.ring().stats();
    let stalls = heap.ring().stall_timer();
    tracing::info!(
        allocations = stats.allocations,
        bytes = stats.bytes_reserved,
        wraps = stats.wraps,
        waits = stats.waits,
        avg_stall_ms = stalls.average_wait_ms(),
        peak_frame = heap.frame_tracker().peak_frame(),
        "upload streaming finished"
    );

    Ok(())
}
