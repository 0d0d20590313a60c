//! The engine's pipeline layouts and graphics pipelines.
//!
//! One [`PipelineBuilder`] is reused for every pipeline: between builds only
//! the fields that differ (shader stages, vertex input, layout) are changed.
//! A missing shader or a failed build leaves that pipeline null; materials
//! built on a null pipeline are not registered.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{info, warn};

use renderer_rhi::device::Device;
use renderer_rhi::pipeline::{PipelineBuilder, PipelineLayout, depth_stencil_state};
use renderer_rhi::shader::{Shader, ShaderStage};
use renderer_rhi::vertex::Vertex;

use crate::deletion_queue::DeletionQueue;
use crate::descriptors::SetLayouts;
use crate::error::RenderResult;
use crate::ubo::MeshPushConstants;

pub const TRIANGLE_VERT: &str = "triangle.vert.spv";
pub const TRIANGLE_FRAG: &str = "triangle.frag.spv";
pub const COLORED_TRIANGLE_VERT: &str = "colored_triangle.vert.spv";
pub const COLORED_TRIANGLE_FRAG: &str = "colored_triangle.frag.spv";
pub const MESH_VERT: &str = "triangle_mesh.vert.spv";
pub const DEFAULT_LIT_FRAG: &str = "default_lit.frag.spv";
pub const TEXTURED_LIT_FRAG: &str = "textured_lit.frag.spv";

/// Push constant range for [`MeshPushConstants`], vertex stage.
pub fn mesh_push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .offset(0)
        .size(MeshPushConstants::SIZE as u32)
}

/// Replaces the builder's stages. Returns false, leaving the stages empty,
/// if any shader failed to load.
fn set_stages(builder: &mut PipelineBuilder, shaders: &[&Option<Shader>]) -> bool {
    builder.shader_stages.clear();
    if shaders.iter().any(|shader| shader.is_none()) {
        return false;
    }
    builder.shader_stages.extend(
        shaders
            .iter()
            .filter_map(|shader| Option::as_ref(*shader))
            .map(Shader::stage_create_info),
    );
    true
}

/// Builds with the current state, or returns null when the stages are unset.
fn build_named(
    builder: &PipelineBuilder,
    device: &Device,
    render_pass: vk::RenderPass,
    stages_ready: bool,
    name: &str,
) -> vk::Pipeline {
    if !stages_ready {
        warn!("Skipping '{}' pipeline: shader modules missing", name);
        return vk::Pipeline::null();
    }
    builder.build(device, render_pass)
}

/// Every pipeline and layout the engine draws with.
#[derive(Clone, Copy, Debug)]
pub struct Pipelines {
    pub triangle_layout: vk::PipelineLayout,
    pub triangle: vk::Pipeline,
    pub colored_triangle: vk::Pipeline,
    pub mesh_layout: vk::PipelineLayout,
    pub mesh: vk::Pipeline,
    pub textured_layout: vk::PipelineLayout,
    pub textured: vk::Pipeline,
}

impl Pipelines {
    /// Loads the shaders from `shader_dir` and builds every pipeline.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `deletion_queue` - Receives the layouts and non-null pipelines
    /// * `render_pass` - Pass the pipelines are compatible with
    /// * `extent` - Initial viewport size; viewport and scissor are dynamic
    /// * `shader_dir` - Directory holding the `.spv` binaries
    /// * `set_layouts` - Descriptor set layouts for sets 0, 1 and 2
    ///
    /// # Errors
    ///
    /// Returns an error only if a pipeline layout cannot be created. Shader
    /// and pipeline failures are logged and yield null pipelines.
    pub fn new(
        device: &Arc<Device>,
        deletion_queue: &mut DeletionQueue,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        shader_dir: &Path,
        set_layouts: SetLayouts,
    ) -> RenderResult<Self> {
        let load = |name: &str, stage| Shader::load(device.clone(), &shader_dir.join(name), stage);

        let triangle_vert = load(TRIANGLE_VERT, ShaderStage::Vertex);
        let triangle_frag = load(TRIANGLE_FRAG, ShaderStage::Fragment);
        let colored_vert = load(COLORED_TRIANGLE_VERT, ShaderStage::Vertex);
        let colored_frag = load(COLORED_TRIANGLE_FRAG, ShaderStage::Fragment);
        let mesh_vert = load(MESH_VERT, ShaderStage::Vertex);
        let lit_frag = load(DEFAULT_LIT_FRAG, ShaderStage::Fragment);
        let textured_frag = load(TEXTURED_LIT_FRAG, ShaderStage::Fragment);

        let triangle_layout = deletion_queue.track(PipelineLayout::new(device.clone(), &[], &[])?);
        let push_ranges = [mesh_push_constant_range()];
        let mesh_layout = deletion_queue.track(PipelineLayout::new(
            device.clone(),
            &[set_layouts.global, set_layouts.object],
            &push_ranges,
        )?);
        let textured_layout = deletion_queue.track(PipelineLayout::new(
            device.clone(),
            &[set_layouts.global, set_layouts.object, set_layouts.texture],
            &push_ranges,
        )?);

        let mut builder = PipelineBuilder::new(extent);
        builder.depth_stencil = depth_stencil_state(true, true, vk::CompareOp::LESS_OR_EQUAL);

        // Hardcoded triangles: no vertex input, empty layout.
        builder.pipeline_layout = triangle_layout;
        let ready = set_stages(&mut builder, &[&triangle_vert, &triangle_frag]);
        let triangle = build_named(&builder, device, render_pass, ready, "triangle");

        let ready = set_stages(&mut builder, &[&colored_vert, &colored_frag]);
        let colored_triangle = build_named(&builder, device, render_pass, ready, "colored_triangle");

        // Meshes: vertex buffer input plus sets 0 and 1.
        builder.vertex_input = Vertex::input_description();
        builder.pipeline_layout = mesh_layout;
        let ready = set_stages(&mut builder, &[&mesh_vert, &lit_frag]);
        let mesh = build_named(&builder, device, render_pass, ready, "mesh");

        builder.pipeline_layout = textured_layout;
        let ready = set_stages(&mut builder, &[&mesh_vert, &textured_frag]);
        let textured = build_named(&builder, device, render_pass, ready, "textured");

        for pipeline in [triangle, colored_triangle, mesh, textured] {
            deletion_queue.push(pipeline);
        }

        info!(
            "Pipelines built: triangle={}, colored_triangle={}, mesh={}, textured={}",
            triangle != vk::Pipeline::null(),
            colored_triangle != vk::Pipeline::null(),
            mesh != vk::Pipeline::null(),
            textured != vk::Pipeline::null()
        );

        Ok(Self {
            triangle_layout,
            triangle,
            colored_triangle,
            mesh_layout,
            mesh,
            textured_layout,
            textured,
        })
    }

    /// Pipeline for the debug triangle.
    #[inline]
    pub fn debug_triangle(&self, colored: bool) -> vk::Pipeline {
        if colored {
            self.colored_triangle
        } else {
            self.triangle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constant_range_covers_struct() {
        let range = mesh_push_constant_range();
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 80);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_set_stages_rejects_missing_shader() {
        let mut builder = PipelineBuilder::new(vk::Extent2D {
            width: 4,
            height: 4,
        });
        let missing: Option<Shader> = None;
        assert!(!set_stages(&mut builder, &[&missing, &None]));
        assert!(builder.shader_stages.is_empty());
    }

    #[test]
    fn test_shader_names_are_spirv() {
        for name in [
            TRIANGLE_VERT,
            TRIANGLE_FRAG,
            COLORED_TRIANGLE_VERT,
            COLORED_TRIANGLE_FRAG,
            MESH_VERT,
            DEFAULT_LIT_FRAG,
            TEXTURED_LIT_FRAG,
        ] {
            assert!(name.ends_with(".spv"));
        }
    }
}
