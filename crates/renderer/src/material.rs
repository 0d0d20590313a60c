//! Materials: a pipeline, its layout and an optional texture set.

use ash::vk;

/// Immutable draw state shared by every object that uses it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Material {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    /// Set 2; `None` for untextured materials.
    pub texture_set: Option<vk::DescriptorSet>,
}

impl Material {
    pub fn new(pipeline: vk::Pipeline, layout: vk::PipelineLayout) -> Self {
        Self {
            pipeline,
            layout,
            texture_set: None,
        }
    }

    pub fn with_texture(mut self, set: vk::DescriptorSet) -> Self {
        self.texture_set = Some(set);
        self
    }

    #[inline]
    pub fn is_textured(&self) -> bool {
        self.texture_set.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_texture_set_is_optional() {
        let material = Material::new(vk::Pipeline::from_raw(1), vk::PipelineLayout::from_raw(2));
        assert!(!material.is_textured());

        let textured = material.with_texture(vk::DescriptorSet::from_raw(3));
        assert!(textured.is_textured());
        assert_eq!(textured.pipeline, material.pipeline);
    }
}
