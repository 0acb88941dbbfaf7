//! Viewpoints (cameras) supplied by the host
//!
//! The pipeline only consumes viewpoints: every frame it reads the matrices,
//! pixel rect and stereo eye from here and never writes back.

use crate::backend::TargetHandle;
use crate::foundation::math::{orthographic, perspective, Mat4, Rect, Transform};

/// Projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection with a vertical field of view in degrees
    Perspective {
        /// Vertical field of view in degrees
        fov: f32,
        /// Near clip plane
        near: f32,
        /// Far clip plane
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        /// Half of the vertical view size
        size: f32,
        /// Near clip plane
        near: f32,
        /// Far clip plane
        far: f32,
    },
}

/// Eye a buffer set or viewport belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Eye {
    /// Left stereo eye
    Left,
    /// Right stereo eye
    Right,
    /// Non-stereo rendering
    Mono,
}

/// Stereo configuration of a viewpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StereoMode {
    /// Single view
    #[default]
    Mono,
    /// Renders only the left eye
    Left,
    /// Renders only the right eye
    Right,
    /// Renders both eyes, one pass per eye
    Both {
        /// Eye currently being rendered
        active: Eye,
    },
}

/// View and projection override for one stereo eye
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeMatrices {
    /// World-to-view matrix
    pub view: Mat4,
    /// Projection matrix
    pub projection: Mat4,
}

/// Rendering path of the viewpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderPath {
    /// Forward shading
    #[default]
    Forward,
    /// Deferred shading
    Deferred,
}

/// How the viewpoint clears its target before drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClearMode {
    /// Skybox background
    #[default]
    Skybox,
    /// Solid color background
    SolidColor,
    /// Clear depth only
    DepthOnly,
    /// No clear
    Nothing,
}

/// How a render coordinator puts actors on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    /// Per-actor buffers, lighting passes and compositing
    #[default]
    Standard,
    /// Actors render straight into the viewpoint target after the frame
    Direct,
}

/// A camera as seen by the pipeline
#[derive(Debug, Clone)]
pub struct Viewpoint {
    /// Debug name
    pub name: String,
    /// Camera transform; forward is the view direction
    pub transform: Transform,
    /// Projection parameters
    pub projection: Projection,
    /// Pixel rectangle on the render target
    pub pixel_rect: Rect,
    /// Stereo configuration
    pub stereo: StereoMode,
    /// Per-eye overrides, `[left, right]`
    pub eye_matrices: Option<[EyeMatrices; 2]>,
    /// Shading path
    pub render_path: RenderPath,
    /// Clear mode
    pub clear_mode: ClearMode,
    /// Standard or direct rendering
    pub render_mode: RenderMode,
    /// Explicit color target, `None` for the backbuffer
    pub target_color: Option<TargetHandle>,
    /// Explicit depth target, `None` for the backbuffer
    pub target_depth: Option<TargetHandle>,
    /// Disabled viewpoints are skipped by the scheduler
    pub enabled: bool,
}

impl Viewpoint {
    /// Perspective viewpoint covering `width` × `height` pixels
    pub fn perspective(name: &str, transform: Transform, fov: f32, near: f32, far: f32, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            transform,
            projection: Projection::Perspective { fov, near, far },
            pixel_rect: Rect::from_size(width, height),
            stereo: StereoMode::Mono,
            eye_matrices: None,
            render_path: RenderPath::Forward,
            clear_mode: ClearMode::Skybox,
            render_mode: RenderMode::Standard,
            target_color: None,
            target_depth: None,
            enabled: true,
        }
    }

    /// Orthographic viewpoint covering `width` × `height` pixels
    pub fn orthographic(name: &str, transform: Transform, size: f32, near: f32, far: f32, width: u32, height: u32) -> Self {
        Self {
            projection: Projection::Orthographic { size, near, far },
            ..Self::perspective(name, transform, 60.0, near, far, width, height)
        }
    }

    /// Resize the pixel rect
    pub fn resize(&mut self, width: u32, height: u32) {
        self.pixel_rect = Rect::new(self.pixel_rect.x, self.pixel_rect.y, width as f32, height as f32);
    }

    /// Pixel dimensions of the viewpoint
    pub fn pixel_size(&self) -> (u32, u32) {
        self.pixel_rect.pixel_size()
    }

    /// Width over height
    pub fn aspect(&self) -> f32 {
        let (w, h) = self.pixel_size();
        w as f32 / h as f32
    }

    /// Near clip plane
    pub fn near(&self) -> f32 {
        match self.projection {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    /// Far clip plane
    pub fn far(&self) -> f32 {
        match self.projection {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    /// Vertical field of view in degrees; orthographic viewpoints report 0
    pub fn fov(&self) -> f32 {
        match self.projection {
            Projection::Perspective { fov, .. } => fov,
            Projection::Orthographic { .. } => 0.0,
        }
    }

    /// True for orthographic projections
    pub fn is_orthographic(&self) -> bool {
        matches!(self.projection, Projection::Orthographic { .. })
    }

    /// Eye currently being rendered
    pub fn active_eye(&self) -> Eye {
        match self.stereo {
            StereoMode::Mono => Eye::Mono,
            StereoMode::Left => Eye::Left,
            StereoMode::Right => Eye::Right,
            StereoMode::Both { active } => active,
        }
    }

    /// True when rendering one eye of a stereo pair
    pub fn is_stereo(&self) -> bool {
        self.active_eye() != Eye::Mono
    }

    /// World-to-view matrix of the viewpoint's centre
    pub fn view_matrix(&self) -> Mat4 {
        self.transform.view_matrix()
    }

    /// Projection matrix of the viewpoint's centre
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov, near, far } => perspective(fov, self.aspect(), near, far),
            Projection::Orthographic { size, near, far } => {
                let half_width = size * self.aspect();
                orthographic(-half_width, half_width, -size, size, near, far)
            }
        }
    }

    /// View and projection for `eye`, falling back to the centre matrices
    pub fn eye_matrices(&self, eye: Eye) -> EyeMatrices {
        let centre = EyeMatrices {
            view: self.view_matrix(),
            projection: self.projection_matrix(),
        };
        match (eye, self.eye_matrices) {
            (Eye::Left, Some([left, _])) => left,
            (Eye::Right, Some([_, right])) => right,
            _ => centre,
        }
    }

    /// Projection × view of the centre
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    fn camera() -> Viewpoint {
        Viewpoint::perspective("main", Transform::identity(), 60.0, 0.3, 100.0, 800, 400)
    }

    #[test]
    fn test_aspect_and_planes() {
        let vp = camera();
        assert_eq!(vp.aspect(), 2.0);
        assert_eq!(vp.near(), 0.3);
        assert_eq!(vp.far(), 100.0);
        assert!(!vp.is_orthographic());
    }

    #[test]
    fn test_active_eye_follows_stereo_mode() {
        let mut vp = camera();
        assert_eq!(vp.active_eye(), Eye::Mono);
        vp.stereo = StereoMode::Both { active: Eye::Right };
        assert_eq!(vp.active_eye(), Eye::Right);
        assert!(vp.is_stereo());
    }

    #[test]
    fn test_eye_matrices_fall_back_to_centre() {
        let mut vp = camera();
        assert_eq!(vp.eye_matrices(Eye::Left).view, vp.view_matrix());
        let left = EyeMatrices {
            view: Mat4::new_translation(&Vec3::new(0.03, 0.0, 0.0)),
            projection: vp.projection_matrix(),
        };
        vp.eye_matrices = Some([left, left]);
        assert_eq!(vp.eye_matrices(Eye::Left).view, left.view);
        assert_eq!(vp.eye_matrices(Eye::Mono).view, vp.view_matrix());
    }

    #[test]
    fn test_resize_updates_pixel_size() {
        let mut vp = camera();
        vp.resize(1024, 768);
        assert_eq!(vp.pixel_size(), (1024, 768));
    }
}
