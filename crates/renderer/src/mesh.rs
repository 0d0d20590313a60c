//! Vertex buffers on the GPU.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use tracing::debug;

use renderer_resources::MeshData;
use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::device::Device;

use crate::deletion_queue::DeletionQueue;
use crate::error::RenderResult;
use crate::upload::UploadContext;

/// A mesh whose vertices live in a GPU buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuMesh {
    pub vertex_buffer: vk::Buffer,
    pub vertex_count: u32,
}

/// Copies `mesh` into a vertex buffer owned by `deletion_queue`.
///
/// With `gpu_only` set, the vertices go through a staging buffer and an
/// immediate submit into device-local memory; the staging buffer is freed
/// before returning. Otherwise the vertex buffer is host-visible and written
/// directly.
///
/// # Errors
///
/// Returns an error if the mesh is empty, a buffer cannot be created, or the
/// upload fails.
pub fn upload_mesh(
    device: &Arc<Device>,
    upload: &mut UploadContext,
    deletion_queue: &mut DeletionQueue,
    mesh: &MeshData,
    gpu_only: bool,
) -> RenderResult<GpuMesh> {
    let bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
    let size = bytes.len() as vk::DeviceSize;

    let vertex_buffer = if gpu_only {
        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, bytes)?;
        let vertex_buffer = Buffer::with_location(
            device.clone(),
            BufferUsage::Vertex,
            size,
            MemoryLocation::GpuOnly,
        )?;

        let scope = upload.begin()?;
        scope.cmd().copy_buffer(
            staging.handle(),
            vertex_buffer.handle(),
            &[vk::BufferCopy::default().size(size)],
        );
        scope.submit()?;
        vertex_buffer
    } else {
        Buffer::new_with_data(device.clone(), BufferUsage::Vertex, bytes)?
    };

    debug!(
        "Uploaded {} vertices ({} bytes, gpu_only={})",
        mesh.vertex_count(),
        size,
        gpu_only
    );

    Ok(GpuMesh {
        vertex_buffer: deletion_queue.track(vertex_buffer).handle,
        vertex_count: mesh.vertex_count(),
    })
}
