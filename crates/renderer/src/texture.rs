//! Sampled textures on the GPU.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use renderer_resources::TextureData;
use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::device::Device;
use renderer_rhi::image::{Image, ImageKind, ImageParts, TEXTURE_FORMAT, full_range};

use crate::deletion_queue::DeletionQueue;
use crate::error::RenderResult;
use crate::upload::UploadContext;

/// Layout transition barrier over the whole color image.
fn transition(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(full_range(vk::ImageAspectFlags::COLOR))
}

/// Uploads RGBA8 pixels into a `SHADER_READ_ONLY_OPTIMAL` image owned by
/// `deletion_queue`.
///
/// Both layout transitions and the copy are recorded into one immediate
/// submit.
///
/// # Errors
///
/// Returns an error if the image or staging buffer cannot be created or the
/// upload fails.
pub fn upload_texture(
    device: &Arc<Device>,
    upload: &mut UploadContext,
    deletion_queue: &mut DeletionQueue,
    texture: &TextureData,
) -> RenderResult<ImageParts> {
    let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, &texture.pixels)?;
    let image = Image::new(
        device.clone(),
        ImageKind::Texture,
        TEXTURE_FORMAT,
        texture.width,
        texture.height,
    )?;

    let scope = upload.begin()?;
    let cmd = scope.cmd();

    cmd.pipeline_barrier(
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::PipelineStageFlags::TRANSFER,
        &[transition(
            image.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        )],
    );

    let region = vk::BufferImageCopy::default()
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(0)
                .base_array_layer(0)
                .layer_count(1),
        )
        .image_extent(image.extent());
    cmd.copy_buffer_to_image(
        staging.handle(),
        image.handle(),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[region],
    );

    cmd.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        &[transition(
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
        )],
    );
    scope.submit()?;

    debug!(
        "Uploaded {}x{} texture ({} bytes)",
        texture.width,
        texture.height,
        texture.size_bytes()
    );
    Ok(deletion_queue.track(image))
}
