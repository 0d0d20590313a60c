//! Fixed-step translation camera.
//!
//! The camera never rotates: the view matrix is a plain translation by the
//! camera position and movement adds whole units along the world axes.

use glam::{Mat4, Vec3};

/// Distance covered by one movement step.
pub const MOVE_STEP: f32 = 1.0;

/// Starting camera position.
pub const DEFAULT_POSITION: Vec3 = Vec3::new(0.0, -6.0, -10.0);

/// Perspective projection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 70.0_f32.to_radians(),
            near: 0.1,
            far: 200.0,
        }
    }
}

impl Projection {
    /// Perspective matrix for `aspect` with Y flipped for Vulkan clip space.
    pub fn matrix(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }
}

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: DEFAULT_POSITION,
            projection: Projection::default(),
        }
    }
}

impl Camera {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Moves the camera by `steps` units along each axis.
    pub fn step(&mut self, steps: Vec3) {
        self.position += steps * MOVE_STEP;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection.matrix(aspect)
    }

    pub fn view_projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_position() {
        assert_eq!(Camera::default().position, Vec3::new(0.0, -6.0, -10.0));
    }

    #[test]
    fn test_view_is_translation() {
        let camera = Camera::new(Vec3::new(1.0, 2.0, 3.0));
        let moved = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert_eq!(moved, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_step_moves_whole_units() {
        let mut camera = Camera::new(Vec3::ZERO);
        camera.step(Vec3::Z);
        camera.step(Vec3::Z);
        camera.step(-Vec3::X);
        assert_eq!(camera.position, Vec3::new(-1.0, 0.0, 2.0));
    }

    #[test]
    fn test_projection_flips_y() {
        let projection = Projection::default();
        let flipped = projection.matrix(16.0 / 9.0);
        let plain = Mat4::perspective_rh(projection.fov_y, 16.0 / 9.0, 0.1, 200.0);
        assert_eq!(flipped.y_axis.y, -plain.y_axis.y);
        assert_eq!(flipped.x_axis.x, plain.x_axis.x);
    }
}
