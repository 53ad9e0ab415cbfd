//! Transform and camera math.
//!
//! Conventions follow Vulkan clip space: depth in `[0, 1]`, +Y pointing
//! down the screen, +Z pointing away from the viewer.

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

/// Translation, scale and rotation of an object.
///
/// Rotation is stored as Tait-Bryan angles applied in Y, X, Z order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Position offset
    pub translation: Vec3,
    /// Per-axis scale
    pub scale: Vec3,
    /// Rotation in radians (x = pitch, y = yaw, z = roll)
    pub rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

impl Transform {
    /// Rotation as a quaternion (YXZ order).
    #[inline]
    pub fn quat(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.rotation.y,
            self.rotation.x,
            self.rotation.z,
        )
    }

    /// Model matrix: translate * rotate(Y, X, Z) * scale.
    #[inline]
    pub fn mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quat(), self.translation)
    }

    /// Matrix for transforming normals (inverse transpose of the upper 3x3).
    #[inline]
    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.quat()) * Mat3::from_diagonal(self.scale.recip())
    }
}

/// Projection and view matrices for rendering.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    /// Orthographic projection mapping the given box to clip space.
    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = Mat4::orthographic_lh(left, right, bottom, top, near, far);
    }

    /// Perspective projection.
    ///
    /// `aspect` must be non-zero; a zero-height surface never reaches here
    /// because the frame loop waits it out.
    pub fn set_perspective_projection(&mut self, fovy: f32, aspect: f32, near: f32, far: f32) {
        debug_assert!(aspect.abs() > f32::EPSILON, "aspect ratio must be non-zero");
        self.projection = Mat4::perspective_lh(fovy, aspect, near, far);
    }

    /// Look from `position` along `direction`.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        self.view = Mat4::look_to_lh(position, direction.normalize(), up);
    }

    /// Look from `position` at `target`.
    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// View from `position` rotated by YXZ Euler angles.
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let orientation = Quat::from_euler(EulerRot::YXZ, rotation.y, rotation.x, rotation.z);
        self.view = Mat4::from_rotation_translation(orientation, position).inverse();
    }

    /// Projection matrix.
    pub const fn projection(&self) -> Mat4 {
        self.projection
    }

    /// View matrix.
    pub const fn view(&self) -> Mat4 {
        self.view
    }

    /// Projection * view.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn default_transform_is_identity() {
        assert_eq!(Transform::default().mat4(), Mat4::IDENTITY);
    }

    #[test]
    fn transform_applies_scale_then_rotation_then_translation() {
        let transform = Transform {
            translation: Vec3::new(0.0, 0.0, 2.5),
            scale: Vec3::splat(2.0),
            rotation: Vec3::new(0.0, FRAC_PI_2, 0.0),
        };

        // +X scaled to 2, rotated 90 degrees about Y to -Z, then moved by +2.5 Z.
        let p = transform.mat4().transform_point3(Vec3::X);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let transform = Transform {
            scale: Vec3::new(2.0, 1.0, 1.0),
            ..Default::default()
        };
        let n = transform.normal_matrix() * Vec3::X;
        assert_relative_eq!(n.x, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn perspective_maps_near_and_far_to_vulkan_depth() {
        let mut camera = Camera::default();
        camera.set_perspective_projection(FRAC_PI_2, 1.0, 0.1, 100.0);

        let near = camera.projection().project_point3(Vec3::new(0.0, 0.0, 0.1));
        let far = camera.projection().project_point3(Vec3::new(0.0, 0.0, 100.0));
        assert_relative_eq!(near.z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn orthographic_maps_box_to_clip_space() {
        let mut camera = Camera::default();
        camera.set_orthographic_projection(-1.0, 1.0, -1.0, 1.0, 0.0, 10.0);

        let p = camera.projection().project_point3(Vec3::new(1.0, 0.0, 10.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn view_yxz_moves_world_opposite_to_camera() {
        let mut camera = Camera::default();
        camera.set_view_yxz(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO);

        let p = camera.view().transform_point3(Vec3::ZERO);
        assert_relative_eq!(p.z, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn view_target_looks_down_positive_z() {
        let mut camera = Camera::default();
        camera.set_view_target(Vec3::ZERO, Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Y);

        let p = camera.view().transform_point3(Vec3::new(0.0, 0.0, 3.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-5);
    }
}
