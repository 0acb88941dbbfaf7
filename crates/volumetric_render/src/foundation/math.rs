//! Math utilities and types
//!
//! Provides the nalgebra aliases used throughout the crate plus the handful of
//! matrix builders the render and shadow paths need. All view matrices follow
//! the right-handed convention: view space looks down −Z.

pub use nalgebra::{Matrix4, Quaternion, Unit, UnitQuaternion, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = UnitQuaternion<f32>;

/// Linear RGBA colour
pub type Color = [f32; 4];

/// Opaque white
pub const WHITE: Color = [1.0, 1.0, 1.0, 1.0];

/// Transparent black
pub const CLEAR_BLACK: Color = [0.0, 0.0, 0.0, 0.0];

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Create a transform at `position` whose forward axis points at `target`
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let dir = target - position;
        let rotation = if dir.norm_squared() > f32::EPSILON {
            // face_towards maps +Z onto the direction, forward is −Z
            Quat::face_towards(&-dir, &stable_up(&dir))
        } else {
            Quat::identity()
        };
        Self::from_position_rotation(position, rotation)
    }

    /// Builder-style scale override
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Local-to-world matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// World-to-local matrix
    pub fn inverse_matrix(&self) -> Mat4 {
        self.to_matrix().try_inverse().unwrap_or_else(Mat4::identity)
    }

    /// World-to-view matrix for an observer at this transform (scale ignored)
    pub fn view_matrix(&self) -> Mat4 {
        let rigid = Mat4::new_translation(&self.position) * self.rotation.to_homogeneous();
        rigid.try_inverse().unwrap_or_else(Mat4::identity)
    }

    /// Direction the transform faces (−Z in local space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::new(0.0, 0.0, -1.0)
    }

    /// Transform a local-space point into world space
    pub fn transform_point(&self, point: &Vec3) -> Vec3 {
        self.position + self.rotation * point.component_mul(&self.scale)
    }
}

/// Rectangle in pixels or normalized units, origin bottom-left
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Left edge
    pub x: f32,
    /// Bottom edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering `width` × `height` from the origin
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    /// Pixel dimensions, rounded and clamped to at least one pixel
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }

    /// Scale every component by `factor`
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

/// Perspective projection taking a vertical field of view in degrees
///
/// Produces OpenGL-style clip space (z in [-1, 1]). Backends remap it through
/// [`GraphicsBackend::gpu_projection`](crate::backend::GraphicsBackend::gpu_projection).
pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    Mat4::new_perspective(aspect, fov_degrees.to_radians(), near, far)
}

/// Orthographic projection, OpenGL-style clip space
pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    Mat4::new_orthographic(left, right, bottom, top, near, far)
}

/// Right-handed view matrix looking from `eye` towards `target`
pub fn look_at(eye: &Vec3, target: &Vec3, up: &Vec3) -> Mat4 {
    Mat4::look_at_rh(&Point3::from(*eye), &Point3::from(*target), up)
}

/// Up vector that is never parallel to `dir`
pub fn stable_up(dir: &Vec3) -> Vec3 {
    let n = dir.normalize();
    if n.y.abs() > 0.999 {
        Vec3::z()
    } else {
        Vec3::y()
    }
}

/// Multiply a point by a matrix including the homogeneous divide
pub fn transform_point(m: &Mat4, p: &Vec3) -> Vec3 {
    let v = m * Vec4::new(p.x, p.y, p.z, 1.0);
    if v.w.abs() > f32::EPSILON {
        Vec3::new(v.x / v.w, v.y / v.w, v.z / v.w)
    } else {
        Vec3::new(v.x, v.y, v.z)
    }
}

/// Translation matrix
pub fn translation(x: f32, y: f32, z: f32) -> Mat4 {
    Mat4::new_translation(&Vec3::new(x, y, z))
}

/// Non-uniform scale matrix
pub fn scaling(x: f32, y: f32, z: f32) -> Mat4 {
    Mat4::new_nonuniform_scaling(&Vec3::new(x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_forward_defaults_to_negative_z() {
        let t = Transform::identity();
        assert_relative_eq!(t.forward(), Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_looking_at_points_forward_at_target() {
        let t = Transform::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::new(5.0, 0.0, 5.0));
        assert_relative_eq!(t.forward(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_view_matrix_moves_target_onto_negative_z() {
        let t = Transform::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros());
        let p = transform_point(&t.view_matrix(), &Vec3::zeros());
        assert_relative_eq!(p, Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-5);
    }

    #[test]
    fn test_transform_point_applies_scale_then_translation() {
        let t = Transform::from_position(Vec3::new(1.0, 0.0, 0.0)).with_scale(Vec3::new(2.0, 2.0, 2.0));
        assert_relative_eq!(t.transform_point(&Vec3::new(1.0, 1.0, 1.0)), Vec3::new(3.0, 2.0, 2.0));
        assert_relative_eq!(
            transform_point(&t.to_matrix(), &Vec3::new(1.0, 1.0, 1.0)),
            Vec3::new(3.0, 2.0, 2.0)
        );
    }

    #[test]
    fn test_rect_pixel_size_is_never_zero() {
        assert_eq!(Rect::new(0.0, 0.0, 0.2, 0.0).pixel_size(), (1, 1));
        assert_eq!(Rect::from_size(640, 480).pixel_size(), (640, 480));
    }
}
