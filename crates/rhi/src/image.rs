//! GPU images with a matching image view, and texture samplers.
//!
//! [`Image`] covers the two kinds of image the engine creates: depth
//! attachments (recreated with the swapchain) and sampled textures (uploaded
//! once and handed to the deletion queue with [`Image::into_parts`]).

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Format used for the depth attachment.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Format used for color textures loaded from disk.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// What an image is created for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    /// Depth attachment of the main render pass
    Depth,
    /// Sampled color texture filled through a transfer
    Texture,
}

impl ImageKind {
    pub fn usage(self) -> vk::ImageUsageFlags {
        match self {
            ImageKind::Depth => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ImageKind::Texture => {
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST
            }
        }
    }

    pub fn aspect(self) -> vk::ImageAspectFlags {
        match self {
            ImageKind::Depth => vk::ImageAspectFlags::DEPTH,
            ImageKind::Texture => vk::ImageAspectFlags::COLOR,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ImageKind::Depth => "depth_image",
            ImageKind::Texture => "texture_image",
        }
    }
}

/// Subresource range covering the single mip and layer of an engine image.
pub fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Raw handles of an image whose ownership has moved elsewhere.
#[derive(Clone, Copy, Debug)]
pub struct ImageParts {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

/// A 2D image, its GPU-only memory and a view over it.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: ManuallyDrop<Allocation>,
    format: vk::Format,
    extent: vk::Extent3D,
    kind: ImageKind,
}

impl Image {
    /// Creates an image and its view.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `kind` - Depth attachment or sampled texture
    /// * `format` - Pixel format
    /// * `width`, `height` - Size in pixels
    ///
    /// # Errors
    ///
    /// Returns an error if either dimension is zero, or if image creation,
    /// allocation or view creation fails.
    pub fn new(
        device: Arc<Device>,
        kind: ImageKind,
        format: vk::Format,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image dimensions must be greater than 0 (got {}x{})",
                width, height
            )));
        }

        let extent = vk::Extent3D {
            width,
            height,
            depth: 1,
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(kind.usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = match device.allocator().allocate(&AllocationCreateDesc {
            name: kind.name(),
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        let view = unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .and_then(|()| {
                    let view_info = vk::ImageViewCreateInfo::default()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(format)
                        .subresource_range(full_range(kind.aspect()));
                    device.handle().create_image_view(&view_info, None)
                })
        };
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                if let Err(free_err) = device.allocator().free(allocation) {
                    error!("Failed to free image allocation: {:?}", free_err);
                }
                return Err(e.into());
            }
        };

        debug!(
            "Created {}: {}x{} ({:?})",
            kind.name(),
            width,
            height,
            format
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: ManuallyDrop::new(allocation),
            format,
            extent,
            kind,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Releases ownership of the image, view and allocation.
    pub fn into_parts(self) -> (ImageParts, Allocation) {
        let parts = ImageParts {
            image: self.image,
            view: self.view,
            format: self.format,
            extent: self.extent,
        };
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so each field is moved out once.
        let allocation = unsafe { ManuallyDrop::take(&mut this.allocation) };
        drop(unsafe { std::ptr::read(&this.device) });
        (parts, allocation)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        // SAFETY: Drop runs once and the field is not touched afterwards.
        let allocation = unsafe { ManuallyDrop::take(&mut self.allocation) };
        if let Err(e) = self.device.allocator().free(allocation) {
            error!("Failed to free image allocation: {:?}", e);
        }

        debug!("Destroyed {}", self.kind.name());
    }
}

/// Texture sampler.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates a sampler with the same filter for magnification and
    /// minification and repeat addressing on every axis.
    pub fn new(device: Arc<Device>, filter: vk::Filter) -> RhiResult<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn into_raw(self) -> vk::Sampler {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc is released exactly once here.
        drop(unsafe { std::ptr::read(&this.device) });
        this.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_kind_usage() {
        assert_eq!(
            ImageKind::Depth.usage(),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        );
        assert!(ImageKind::Texture.usage().contains(vk::ImageUsageFlags::SAMPLED));
        assert!(
            ImageKind::Texture
                .usage()
                .contains(vk::ImageUsageFlags::TRANSFER_DST)
        );
    }

    #[test]
    fn test_image_kind_aspect() {
        assert_eq!(ImageKind::Depth.aspect(), vk::ImageAspectFlags::DEPTH);
        assert_eq!(ImageKind::Texture.aspect(), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_full_range_covers_single_level() {
        let range = full_range(vk::ImageAspectFlags::COLOR);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
        assert_eq!(range.base_mip_level, 0);
    }
}
