//! Size-dependent render targets: the depth image and one framebuffer per
//! swapchain image.
//!
//! These are the only GPU objects rebuilt while the engine runs, so they are
//! owned here with RAII instead of going through the deletion queue.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::swapchain::Swapchain;
//! use renderer_renderer::render_targets::RenderTargets;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>, swapchain: &Swapchain, pass: vk::RenderPass)
//! #     -> Result<(), renderer_rhi::RhiError> {
//! let mut targets = RenderTargets::new(device, pass, swapchain)?;
//! let framebuffer = targets.framebuffer(0);
//! // After the swapchain is rebuilt:
//! targets.rebuild(pass, swapchain)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::info;

use renderer_rhi::RhiResult;
use renderer_rhi::device::Device;
use renderer_rhi::image::{DEPTH_FORMAT, Image, ImageKind};
use renderer_rhi::render_pass::Framebuffers;
use renderer_rhi::swapchain::Swapchain;

use crate::ubo::GpuSceneData;

/// Depth attachment plus framebuffers sized to the swapchain.
///
/// # Resource Destruction
///
/// Framebuffers are declared first so they are dropped before the depth view
/// they reference.
pub struct RenderTargets {
    framebuffers: Framebuffers,
    depth: Image,
    device: Arc<Device>,
    extent: vk::Extent2D,
}

impl RenderTargets {
    /// Creates targets matching `swapchain`.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `render_pass` - Pass the framebuffers are compatible with
    /// * `swapchain` - Source of the color views and extent
    ///
    /// # Errors
    ///
    /// Returns an error if the depth image or a framebuffer cannot be created.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        swapchain: &Swapchain,
    ) -> RhiResult<Self> {
        let extent = swapchain.extent();
        let depth = Image::new(
            device.clone(),
            ImageKind::Depth,
            DEPTH_FORMAT,
            extent.width,
            extent.height,
        )?;
        let framebuffers = Framebuffers::new(
            device.clone(),
            render_pass,
            swapchain.image_views(),
            depth.view(),
            extent,
        )?;

        info!(
            "Created render targets: {}x{} depth ({:?}), {} framebuffer(s)",
            extent.width,
            extent.height,
            DEPTH_FORMAT,
            framebuffers.len()
        );

        Ok(Self {
            framebuffers,
            depth,
            device,
            extent,
        })
    }

    /// Replaces the targets after `swapchain` has been rebuilt.
    ///
    /// The caller must ensure no submitted work still uses the old targets.
    ///
    /// # Errors
    ///
    /// Returns an error if the new targets cannot be created; the old ones
    /// are kept in that case.
    pub fn rebuild(&mut self, render_pass: vk::RenderPass, swapchain: &Swapchain) -> RhiResult<()> {
        *self = Self::new(self.device.clone(), render_pass, swapchain)?;
        Ok(())
    }

    /// Framebuffer for swapchain image `image_index`.
    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index)
    }

    #[inline]
    pub fn depth_view(&self) -> vk::ImageView {
        self.depth.view()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Clear values for the color and depth attachments, in attachment order.
///
/// The blue channel is `|sin(frame / 120)|`.
pub fn clear_values(frame_number: u64) -> [vk::ClearValue; 2] {
    let flash = (frame_number as f32 / GpuSceneData::CYCLE_FRAMES).sin().abs();
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, flash, 1.0],
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_depth_is_far_plane() {
        let values = clear_values(0);
        let depth = unsafe { values[1].depth_stencil };
        assert_eq!(depth.depth, 1.0);
    }

    #[test]
    fn test_clear_color_flashes_blue() {
        let start = unsafe { clear_values(0)[0].color.float32 };
        assert_eq!(start, [0.0, 0.0, 0.0, 1.0]);

        let later = unsafe { clear_values(188)[0].color.float32 };
        assert_eq!(later[0], 0.0);
        assert_eq!(later[1], 0.0);
        assert!(later[2] > 0.99 && later[2] <= 1.0);
    }
}
