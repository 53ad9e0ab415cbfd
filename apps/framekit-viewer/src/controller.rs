//! Keyboard fly-through controls.

use std::f32::consts::TAU;

use framekit_core::Transform;
use glam::Vec3;
use hashbrown::HashSet;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Moves a transform in the XZ plane and turns it with the arrow keys.
#[derive(Debug)]
pub struct KeyboardController {
    pressed: HashSet<KeyCode>,
    /// Units per second.
    pub move_speed: f32,
    /// Radians per second.
    pub look_speed: f32,
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self {
            pressed: HashSet::new(),
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

impl KeyboardController {
    pub fn process_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                match event.state {
                    ElementState::Pressed => self.press(key),
                    ElementState::Released => self.release(key),
                }
            }
            WindowEvent::Focused(false) => self.pressed.clear(),
            _ => {}
        }
    }

    pub fn press(&mut self, key: KeyCode) {
        self.pressed.insert(key);
    }

    pub fn release(&mut self, key: KeyCode) {
        self.pressed.remove(&key);
    }

    fn axis(&self, positive: KeyCode, negative: KeyCode) -> f32 {
        f32::from(u8::from(self.pressed.contains(&positive)))
            - f32::from(u8::from(self.pressed.contains(&negative)))
    }

    /// Apply one frame of input to `transform`.
    pub fn move_in_plane_xz(&self, dt: f32, transform: &mut Transform) {
        let rotate = Vec3::new(
            self.axis(KeyCode::ArrowUp, KeyCode::ArrowDown),
            self.axis(KeyCode::ArrowRight, KeyCode::ArrowLeft),
            0.0,
        );
        if rotate.length_squared() > f32::EPSILON {
            transform.rotation += self.look_speed * dt * rotate.normalize();
        }

        // Keep pitch short of straight up or down.
        transform.rotation.x = transform.rotation.x.clamp(-1.5, 1.5);
        transform.rotation.y = transform.rotation.y.rem_euclid(TAU);

        let yaw = transform.rotation.y;
        let forward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
        let right = Vec3::new(forward.z, 0.0, -forward.x);
        let up = Vec3::NEG_Y;

        let movement = forward * self.axis(KeyCode::KeyW, KeyCode::KeyS)
            + right * self.axis(KeyCode::KeyD, KeyCode::KeyA)
            + up * self.axis(KeyCode::KeyE, KeyCode::KeyQ);
        if movement.length_squared() > f32::EPSILON {
            transform.translation += self.move_speed * dt * movement.normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn idle_controller_leaves_transform_alone() {
        let controller = KeyboardController::default();
        let mut transform = Transform::default();

        controller.move_in_plane_xz(0.5, &mut transform);

        assert_eq!(transform, Transform::default());
    }

    #[test]
    fn forward_follows_yaw() {
        let mut controller = KeyboardController::default();
        controller.press(KeyCode::KeyW);
        let mut transform = Transform::default();

        controller.move_in_plane_xz(1.0, &mut transform);
        assert_relative_eq!(transform.translation.z, 3.0, epsilon = 1e-5);

        transform = Transform::default();
        transform.rotation.y = std::f32::consts::FRAC_PI_2;
        controller.move_in_plane_xz(1.0, &mut transform);
        assert_relative_eq!(transform.translation.x, 3.0, epsilon = 1e-5);
        assert_relative_eq!(transform.translation.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn diagonal_movement_is_normalized() {
        let mut controller = KeyboardController::default();
        controller.press(KeyCode::KeyW);
        controller.press(KeyCode::KeyD);
        let mut transform = Transform::default();

        controller.move_in_plane_xz(1.0, &mut transform);

        assert_relative_eq!(transform.translation.length(), 3.0, epsilon = 1e-5);
        assert_relative_eq!(transform.translation.y, 0.0);
    }

    #[test]
    fn pitch_is_clamped_and_yaw_wraps() {
        let mut controller = KeyboardController::default();
        controller.press(KeyCode::ArrowUp);
        let mut transform = Transform::default();

        controller.move_in_plane_xz(10.0, &mut transform);
        assert_relative_eq!(transform.rotation.x, 1.5);

        controller.release(KeyCode::ArrowUp);
        controller.press(KeyCode::ArrowLeft);
        transform.rotation = Vec3::ZERO;
        controller.move_in_plane_xz(1.0, &mut transform);
        assert_relative_eq!(transform.rotation.y, TAU - 1.5, epsilon = 1e-5);
    }

    #[test]
    fn e_moves_up_in_screen_space() {
        let mut controller = KeyboardController::default();
        controller.press(KeyCode::KeyE);
        let mut transform = Transform::default();

        controller.move_in_plane_xz(1.0, &mut transform);

        assert_relative_eq!(transform.translation.y, -3.0, epsilon = 1e-5);
    }
}
