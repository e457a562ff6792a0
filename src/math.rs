//! View, projection and model matrices for the stereo views.
//!
//! All matrices use glam's column-vector convention. They are transposed on
//! their way into constant buffers (see [`shader_layout`]) because the cube
//! program multiplies row vectors.

use glam::{Mat4, Quat, Vec3};
use openxr as xr;

/// Rigid transform of a tracked object or a placed cube.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn to_xr(self) -> xr::Posef {
        xr::Posef {
            orientation: xr::Quaternionf {
                x: self.orientation.x,
                y: self.orientation.y,
                z: self.orientation.z,
                w: self.orientation.w,
            },
            position: xr::Vector3f {
                x: self.position.x,
                y: self.position.y,
                z: self.position.z,
            },
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<xr::Posef> for Pose {
    fn from(pose: xr::Posef) -> Self {
        Self {
            position: to_vec3(&pose.position),
            orientation: to_quat(&pose.orientation),
        }
    }
}

/// Field of view as four half-angles in radians; left and down are negative
/// for a view centered on its optical axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

impl Fov {
    pub fn symmetric(half_angle: f32) -> Self {
        Self {
            angle_left: -half_angle,
            angle_right: half_angle,
            angle_up: half_angle,
            angle_down: -half_angle,
        }
    }

    pub fn to_xr(self) -> xr::Fovf {
        xr::Fovf {
            angle_left: self.angle_left,
            angle_right: self.angle_right,
            angle_up: self.angle_up,
            angle_down: self.angle_down,
        }
    }
}

impl From<xr::Fovf> for Fov {
    fn from(fov: xr::Fovf) -> Self {
        Self {
            angle_left: fov.angle_left,
            angle_right: fov.angle_right,
            angle_up: fov.angle_up,
            angle_down: fov.angle_down,
        }
    }
}

fn to_vec3(v: &xr::Vector3f) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn to_quat(q: &xr::Quaternionf) -> Quat {
    Quat::from_xyzw(q.x, q.y, q.z, q.w)
}

/// Right-handed off-center perspective projection with a [0, 1] depth range.
pub fn projection_matrix(fov: &Fov, near: f32, far: f32) -> Mat4 {
    // Frustum bounds at the near plane
    let left = near * fov.angle_left.tan();
    let right = near * fov.angle_right.tan();
    let bottom = near * fov.angle_down.tan();
    let top = near * fov.angle_up.tan();

    Mat4::frustum_rh(left, right, bottom, top, near, far)
}

/// Inverse of the eye's world transform.
pub fn view_matrix(eye: &Pose) -> Mat4 {
    Mat4::from_rotation_translation(eye.orientation, eye.position).inverse()
}

pub fn model_matrix(pose: &Pose, scale: f32) -> Mat4 {
    Mat4::from_scale_rotation_translation(Vec3::splat(scale), pose.orientation, pose.position)
}

/// Memory layout expected by the constant buffers.
pub fn shader_layout(matrix: Mat4) -> [f32; 16] {
    matrix.transpose().to_cols_array()
}
