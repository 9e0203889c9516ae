use cinder_engine::input::{InputSnapshot, Key};
use cinder_engine::transform::Camera;
use glam::Vec3;

/// Free-flying first-person controls: mouse look, WASD on the ground plane,
/// Space and Shift straight up and down.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FlyController {
    /// Blocks per second.
    pub speed: f32,
    /// Degrees per pixel of raw mouse motion.
    pub sensitivity: f32,
}

impl Default for FlyController {
    fn default() -> Self {
        Self {
            speed: 5.0,
            sensitivity: 0.1,
        }
    }
}

impl FlyController {
    pub fn update(&self, camera: &mut Camera, input: &InputSnapshot, dt: f32) {
        let (dx, dy) = input.mouse_delta();
        // Screen y grows downward; moving the mouse down looks down.
        camera.look(
            (dx * self.sensitivity).to_radians(),
            (-dy * self.sensitivity).to_radians(),
        );

        let forward = camera.forward_flat();
        let right = camera.right();
        let axes = [
            (Key::W, forward),
            (Key::S, -forward),
            (Key::D, right),
            (Key::A, -right),
            (Key::Space, Vec3::Y),
            (Key::Shift, Vec3::NEG_Y),
        ];

        let motion: Vec3 = axes
            .into_iter()
            .filter(|(key, _)| input.key_down(*key))
            .map(|(_, dir)| dir)
            .sum();
        camera.position += motion * self.speed * dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_engine::input::{InputEvent, KeyState, Modifiers};

    fn holding(keys: &[Key]) -> InputSnapshot {
        let mut snapshot = InputSnapshot::default();
        for key in keys {
            snapshot.state.apply_event(
                &mut snapshot.frame,
                InputEvent::Key {
                    key: *key,
                    state: KeyState::Pressed,
                    modifiers: Modifiers::default(),
                    code: 0,
                    repeat: false,
                },
            );
        }
        snapshot
    }

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn forward_moves_down_negative_z() {
        let mut camera = Camera::default();
        FlyController::default().update(&mut camera, &holding(&[Key::W]), 0.5);
        assert!(close(camera.position, Vec3::new(0.0, 0.0, -2.5)));
    }

    #[test]
    fn vertical_keys_ignore_pitch() {
        let mut camera = Camera::default();
        camera.look(0.0, 1.0);
        FlyController::default().update(&mut camera, &holding(&[Key::W, Key::Space]), 1.0);
        assert!(close(camera.position, Vec3::new(0.0, 5.0, -5.0)));
    }

    #[test]
    fn mouse_right_turns_right_and_down_looks_down() {
        let mut camera = Camera::default();
        let mut input = InputSnapshot::default();
        input.frame.mouse_delta = (900.0, 100.0);
        FlyController::default().update(&mut camera, &input, 0.016);

        assert!((camera.yaw - 90f32.to_radians()).abs() < 1e-5);
        assert!((camera.pitch + 10f32.to_radians()).abs() < 1e-5);
        assert!(close(camera.forward_flat(), Vec3::X));
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut camera = Camera::default();
        FlyController::default().update(&mut camera, &holding(&[Key::A, Key::D]), 1.0);
        assert!(close(camera.position, Vec3::ZERO));
    }
}
