use glam::{Mat4, Vec3};

/// Perspective projection parameters.
///
/// Right-handed, depth mapped to `[0, 1]` (wgpu clip space).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Projection {
    /// Vertical field of view, radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Width over height.
    pub aspect: f32,
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y: fov_y_degrees.to_radians(),
            near,
            far,
            aspect: 1.0,
        }
    }

    /// Derives the aspect ratio from a framebuffer size. Zero-sized
    /// (minimized) surfaces keep the previous ratio.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::perspective(70.0, 0.1, 1000.0)
    }
}

/// First-person camera: position plus yaw/pitch.
///
/// Y is up. With zero yaw and pitch the camera looks down -Z; positive yaw
/// turns right, positive pitch looks up.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Radians.
    pub yaw: f32,
    /// Radians, kept inside `(-pi/2, pi/2)` by `look`.
    pub pitch: f32,
    pub projection: Projection,
}

impl Camera {
    /// Pitch limit keeping the view matrix well defined.
    pub const MAX_PITCH: f32 = 89.0 * std::f32::consts::PI / 180.0;

    pub fn new(position: Vec3, projection: Projection) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            projection,
        }
    }

    /// Adds to yaw and pitch, clamping pitch to +/- 89 degrees.
    pub fn look(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw = (self.yaw + d_yaw).rem_euclid(std::f32::consts::TAU);
        self.pitch = (self.pitch + d_pitch).clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
    }

    /// Unit view direction.
    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(sy * cp, sp, -cy * cp)
    }

    /// Unit view direction projected onto the ground plane.
    pub fn forward_flat(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        Vec3::new(sy, 0.0, -cy)
    }

    pub fn right(&self) -> Vec3 {
        self.forward_flat().cross(Vec3::Y)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Projection::default())
    }
}
