//! Mesh vertex format and its Vulkan input description.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::pipeline::VertexInputDescription;

/// Vertex used by every mesh.
///
/// # Memory Layout
///
/// - Offset 0: position (12 bytes), location 0
/// - Offset 12: normal (12 bytes), location 1
/// - Offset 24: color (12 bytes), location 2
/// - Offset 36: uv (8 bytes), location 3
/// - Total size: 44 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, color: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            color,
            uv,
        }
    }

    /// One per-vertex binding at index 0 with four attributes.
    pub fn input_description() -> VertexInputDescription {
        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        };

        let attribute = |location: u32, format: vk::Format, offset: usize| {
            vk::VertexInputAttributeDescription {
                binding: 0,
                location,
                format,
                offset: offset as u32,
            }
        };

        VertexInputDescription {
            bindings: vec![binding],
            attributes: vec![
                attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
                attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
                attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
                attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(size_of::<Vertex>(), 44);
    }

    #[test]
    fn test_vertex_offsets() {
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, normal), 12);
        assert_eq!(offset_of!(Vertex, color), 24);
        assert_eq!(offset_of!(Vertex, uv), 36);
    }

    #[test]
    fn test_input_description() {
        let description = Vertex::input_description();
        assert_eq!(description.bindings.len(), 1);
        assert_eq!(description.bindings[0].stride, 44);
        assert_eq!(description.attributes.len(), 4);

        let locations: Vec<u32> = description.attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2, 3]);
        assert_eq!(description.attributes[3].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(description.attributes[2].offset, 24);
    }

    #[test]
    fn test_vertex_is_pod() {
        let vertex = Vertex::new(Vec3::X, Vec3::Y, Vec3::Z, Vec2::ONE);
        let bytes = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 44);
        let back: Vertex = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(back, vertex);
    }
}
