//! Pipeline layouts and the reusable graphics [`PipelineBuilder`].
//!
//! The builder is an accumulator with public fields. Callers set everything
//! once, then change only what differs between successive pipelines (usually
//! the shader stages and the layout) and call [`PipelineBuilder::build`] again.
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::device::Device;
//! use renderer_rhi::pipeline::{self, PipelineBuilder};
//! use renderer_rhi::vertex::Vertex;
//! use ash::vk;
//!
//! # fn example(device: &Device, render_pass: vk::RenderPass, layout: vk::PipelineLayout,
//! #            stages: [vk::PipelineShaderStageCreateInfo<'static>; 2], extent: vk::Extent2D) {
//! let mut builder = PipelineBuilder::new(extent);
//! builder.vertex_input = Vertex::input_description();
//! builder.depth_stencil = pipeline::depth_stencil_state(true, true, vk::CompareOp::LESS_OR_EQUAL);
//! builder.pipeline_layout = layout;
//! builder.shader_stages.extend(stages);
//!
//! let pipeline = builder.build(device, render_pass);
//! if pipeline == vk::Pipeline::null() {
//!     // already logged; do not bind
//! }
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `descriptor_set_layouts` - Set layouts in set-index order
    /// * `push_constant_ranges` - Push constant ranges
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout: {} set(s), {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn into_raw(self) -> vk::PipelineLayout {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc is released exactly once here.
        drop(unsafe { std::ptr::read(&this.device) });
        this.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Owned vertex input bindings and attributes.
#[derive(Clone, Debug, Default)]
pub struct VertexInputDescription {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

pub fn input_assembly_state(
    topology: vk::PrimitiveTopology,
) -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
    vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(topology)
        .primitive_restart_enable(false)
}

/// Rasterizer with no culling, clockwise front faces and no depth bias.
pub fn rasterization_state(
    polygon_mode: vk::PolygonMode,
) -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(polygon_mode)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
}

/// Single-sample multisampling.
pub fn multisample_state() -> vk::PipelineMultisampleStateCreateInfo<'static> {
    vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .min_sample_shading(1.0)
}

/// Opaque attachment writing all four channels.
pub fn color_blend_attachment_state() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
}

/// Depth test/write state. With `depth_test` off the compare op is ALWAYS.
pub fn depth_stencil_state(
    depth_test: bool,
    depth_write: bool,
    compare_op: vk::CompareOp,
) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(depth_test)
        .depth_write_enable(depth_write)
        .depth_compare_op(if depth_test {
            compare_op
        } else {
            vk::CompareOp::ALWAYS
        })
        .depth_bounds_test_enable(false)
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0)
        .stencil_test_enable(false)
}

/// Viewport covering `extent` with the full depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering `extent`.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Reusable graphics pipeline accumulator.
///
/// Viewport and scissor are listed in `dynamic_states` by default, so the
/// stored values only seed the pipeline and the frame loop sets the real ones
/// for the current swapchain extent.
pub struct PipelineBuilder {
    pub shader_stages: Vec<vk::PipelineShaderStageCreateInfo<'static>>,
    pub vertex_input: VertexInputDescription,
    pub input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
    pub rasterizer: vk::PipelineRasterizationStateCreateInfo<'static>,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    pub multisampling: vk::PipelineMultisampleStateCreateInfo<'static>,
    pub depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    pub pipeline_layout: vk::PipelineLayout,
    pub dynamic_states: Vec<vk::DynamicState>,
}

impl PipelineBuilder {
    /// Creates a builder for filled triangle lists covering `extent`, with
    /// depth testing disabled and no shader stages or layout set.
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            shader_stages: Vec::new(),
            vertex_input: VertexInputDescription::default(),
            input_assembly: input_assembly_state(vk::PrimitiveTopology::TRIANGLE_LIST),
            viewport: full_viewport(extent),
            scissor: full_scissor(extent),
            rasterizer: rasterization_state(vk::PolygonMode::FILL),
            color_blend_attachment: color_blend_attachment_state(),
            multisampling: multisample_state(),
            depth_stencil: depth_stencil_state(false, false, vk::CompareOp::ALWAYS),
            pipeline_layout: vk::PipelineLayout::null(),
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    /// Builds a pipeline for subpass 0 of `render_pass`.
    ///
    /// Failure is not fatal: it is logged and `vk::Pipeline::null()` is
    /// returned. The caller must not bind a null pipeline.
    pub fn build(&self, device: &Device, render_pass: vk::RenderPass) -> vk::Pipeline {
        match self.try_build(device, render_pass) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!("Failed to create pipeline: {}", e);
                vk::Pipeline::null()
            }
        }
    }

    /// Builds a pipeline, reporting failure as an error.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if no shader stages or layout are
    /// set, or the Vulkan error if pipeline creation fails.
    pub fn try_build(&self, device: &Device, render_pass: vk::RenderPass) -> RhiResult<vk::Pipeline> {
        self.validate()?;

        let viewports = [self.viewport];
        let scissors = [self.scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let attachments = [self.color_blend_attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&attachments);

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_input.bindings)
            .vertex_attribute_descriptions(&self.vertex_input.attributes);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&self.shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&self.input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&self.rasterizer)
            .multisample_state(&self.multisampling)
            .depth_stencil_state(&self.depth_stencil)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(self.pipeline_layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| e)?
        };

        debug!(
            "Created graphics pipeline with {} stage(s)",
            self.shader_stages.len()
        );
        Ok(pipelines[0])
    }

    fn validate(&self) -> RhiResult<()> {
        if self.shader_stages.is_empty() {
            return Err(RhiError::PipelineError(
                "At least one shader stage is required".to_string(),
            ));
        }
        if self.pipeline_layout == vk::PipelineLayout::null() {
            return Err(RhiError::PipelineError(
                "Pipeline layout is not set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let extent = vk::Extent2D {
            width: 1700,
            height: 900,
        };
        let builder = PipelineBuilder::new(extent);

        assert!(builder.shader_stages.is_empty());
        assert_eq!(
            builder.input_assembly.topology,
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
        assert_eq!(builder.rasterizer.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(builder.viewport.width, 1700.0);
        assert_eq!(builder.scissor.extent.height, 900);
        assert_eq!(
            builder.color_blend_attachment.color_write_mask,
            vk::ColorComponentFlags::RGBA
        );
        assert!(builder.dynamic_states.contains(&vk::DynamicState::VIEWPORT));
    }

    #[test]
    fn test_builder_rejects_missing_state() {
        let mut builder = PipelineBuilder::new(vk::Extent2D {
            width: 1,
            height: 1,
        });
        assert!(matches!(builder.validate(), Err(RhiError::PipelineError(_))));

        builder
            .shader_stages
            .push(vk::PipelineShaderStageCreateInfo::default());
        assert!(matches!(builder.validate(), Err(RhiError::PipelineError(_))));
    }

    #[test]
    fn test_builder_is_reusable() {
        let mut builder = PipelineBuilder::new(vk::Extent2D {
            width: 8,
            height: 8,
        });
        builder.depth_stencil = depth_stencil_state(true, true, vk::CompareOp::LESS_OR_EQUAL);
        builder
            .shader_stages
            .push(vk::PipelineShaderStageCreateInfo::default());

        builder.shader_stages.clear();
        builder
            .shader_stages
            .push(vk::PipelineShaderStageCreateInfo::default().stage(vk::ShaderStageFlags::FRAGMENT));

        assert_eq!(builder.shader_stages.len(), 1);
        assert_eq!(builder.depth_stencil.depth_test_enable, vk::TRUE);
        assert_eq!(
            builder.depth_stencil.depth_compare_op,
            vk::CompareOp::LESS_OR_EQUAL
        );
    }

    #[test]
    fn test_depth_disabled_uses_always() {
        let state = depth_stencil_state(false, false, vk::CompareOp::LESS);
        assert_eq!(state.depth_compare_op, vk::CompareOp::ALWAYS);
        assert_eq!(state.depth_write_enable, vk::FALSE);
    }
}
