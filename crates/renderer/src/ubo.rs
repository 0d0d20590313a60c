//! Data structures shared with the shaders.
//!
//! These structures must match the GLSL declarations in `shaders/` exactly.
//! All of them are `#[repr(C)]` and `Pod` so they can be copied into mapped
//! memory or pushed as bytes.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Camera uniform (set 0, binding 0).
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: view-projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuCameraData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
}

impl GpuCameraData {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Builds the uniform from view and projection; `viewproj = proj * view`.
    pub fn new(view: Mat4, proj: Mat4) -> Self {
        Self {
            view,
            proj,
            viewproj: proj * view,
        }
    }
}

/// Scene uniform (set 0, binding 1, dynamic offset).
///
/// Five vec4s, 80 bytes. One padded copy per frame slot lives in a single
/// buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuSceneData {
    /// w is the exponent.
    pub fog_color: Vec4,
    /// x = min, y = max, zw unused.
    pub fog_distances: Vec4,
    pub ambient_color: Vec4,
    /// w is the sun power.
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

impl GpuSceneData {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Period, in frames, of the ambient color and clear color cycles.
    pub const CYCLE_FRAMES: f32 = 120.0;

    /// Sets the ambient color for `frame_number`: `(sin t, 0, cos t, 1)` with
    /// `t = frame / 120`.
    pub fn animate(&mut self, frame_number: u64) {
        let t = frame_number as f32 / Self::CYCLE_FRAMES;
        self.ambient_color = Vec4::new(t.sin(), 0.0, t.cos(), 1.0);
    }
}

/// One element of the per-object storage buffer (set 1, binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuObjectData {
    pub model_matrix: Mat4,
}

impl GpuObjectData {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Per-draw push constants, vertex stage.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub data: Vec4,
    pub render_matrix: Mat4,
}

impl MeshPushConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(render_matrix: Mat4) -> Self {
        Self {
            data: Vec4::ZERO,
            render_matrix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(GpuCameraData::SIZE, 192);
        assert_eq!(GpuSceneData::SIZE, 80);
        assert_eq!(GpuObjectData::SIZE, 64);
        assert_eq!(MeshPushConstants::SIZE, 80);
    }

    #[test]
    fn test_alignment() {
        // Mat4 and Vec4 are 16-byte aligned in glam, as std140/std430 expect.
        assert_eq!(std::mem::align_of::<GpuCameraData>(), 16);
        assert_eq!(std::mem::align_of::<GpuSceneData>(), 16);
    }

    #[test]
    fn test_camera_viewproj() {
        let view = Mat4::from_translation(Vec3::new(0.0, -6.0, -10.0));
        let proj = Mat4::perspective_rh(70f32.to_radians(), 1700.0 / 900.0, 0.1, 200.0);
        let camera = GpuCameraData::new(view, proj);
        assert_eq!(camera.viewproj, proj * view);
    }

    #[test]
    fn test_ambient_cycle() {
        let mut scene = GpuSceneData::default();
        scene.animate(0);
        assert_eq!(scene.ambient_color, Vec4::new(0.0, 0.0, 1.0, 1.0));

        scene.animate(120);
        let expected = Vec4::new(1f32.sin(), 0.0, 1f32.cos(), 1.0);
        assert!(scene.ambient_color.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_push_constants_bytes() {
        let constants = MeshPushConstants::new(Mat4::IDENTITY);
        assert_eq!(bytemuck::bytes_of(&constants).len(), MeshPushConstants::SIZE);
        assert_eq!(constants.data, Vec4::ZERO);
    }
}
