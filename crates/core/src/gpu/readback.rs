//! Blocking buffer readback for debugging and tests.
//!
//! Copies a storage buffer into a fresh `MAP_READ` staging buffer and blocks
//! until the device signals mapping completion. Never used inside the hot
//! simulation loop.

use bytemuck::Pod;

use super::GpuContext;

/// Read `len` elements of `T` from the front of `buffer` (blocking).
#[must_use]
pub fn read_buffer<T: Pod>(context: &GpuContext, buffer: &wgpu::Buffer, len: usize) -> Vec<T> {
    let byte_len = (len * std::mem::size_of::<T>()) as u64;

    let staging_buffer = context.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size: byte_len,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = context
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Copy Encoder"),
        });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, byte_len);
    context.queue().submit(Some(encoder.finish()));

    // Map and wait for the device to signal completion
    let buffer_slice = staging_buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        sender.send(result).ok();
    });

    context.device().poll(wgpu::Maintain::Wait);
    receiver.recv().ok();

    let data = buffer_slice.get_mapped_range();
    let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();

    drop(data);
    staging_buffer.unmap();

    values
}
