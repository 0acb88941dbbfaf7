//! Lighting system

use serde::{Deserialize, Serialize};

use crate::backend::TargetHandle;
use crate::config::QualitySettings;
use crate::foundation::math::{Color, Transform, Vec3, WHITE};
use crate::shadows::ShadowQuality;

/// Light types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// Directional light (like sunlight), cascaded shadows
    Directional,
    /// Spot light (like a flashlight), single shadow map
    Spot,
    /// Point light (like a lightbulb), cube map shadows
    Point,
}

/// Shadow mode of a light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowMode {
    /// The light casts no shadows
    None,
    /// Hard-edged shadows
    Hard,
    /// Filtered shadows
    #[default]
    Soft,
}

/// Per-light shadow resolution override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LightShadowResolution {
    /// Defer to [`QualitySettings::shadow_resolution`]
    #[default]
    FromQualitySettings,
    /// Force a tier
    Fixed(ShadowQuality),
}

/// Light source
#[derive(Debug, Clone)]
pub struct Light {
    /// Debug name
    pub name: String,
    /// Light type
    pub kind: LightKind,
    /// Position and orientation; forward is the light direction
    pub transform: Transform,
    /// Light color
    pub color: Color,
    /// Light intensity
    pub intensity: f32,
    /// Light range (for point/spot lights)
    pub range: f32,
    /// Full cone angle for spot lights, in degrees
    pub spot_angle: f32,
    /// Shadow mode
    pub shadows: ShadowMode,
    /// Shadow resolution override
    pub shadow_resolution: LightShadowResolution,
    /// Shadow darkness in [0, 1]
    pub shadow_strength: f32,
    /// Depth bias in world units
    pub shadow_bias: f32,
    /// Near plane of the shadow projection
    pub shadow_near_plane: f32,
    /// Directional shadows are limited to this distance from the viewpoint
    pub shadow_distance_limit: f32,
    /// Baked lights render once to clear and are then skipped
    pub realtime: bool,
    /// Disabled lights contribute nothing
    pub enabled: bool,
    /// Bit mask of actor layers this light affects
    pub culling_mask: u32,
    /// Optional cookie texture
    pub cookie: Option<TargetHandle>,
}

impl Light {
    fn base(name: &str, kind: LightKind, transform: Transform) -> Self {
        Self {
            name: name.to_string(),
            kind,
            transform,
            color: WHITE,
            intensity: 1.0,
            range: 10.0,
            spot_angle: 30.0,
            shadows: ShadowMode::Soft,
            shadow_resolution: LightShadowResolution::FromQualitySettings,
            shadow_strength: 1.0,
            shadow_bias: 0.05,
            shadow_near_plane: 0.2,
            shadow_distance_limit: 10.0,
            realtime: true,
            enabled: true,
            culling_mask: u32::MAX,
            cookie: None,
        }
    }

    /// Create a directional light shining along `direction`
    pub fn directional(name: &str, direction: Vec3) -> Self {
        let transform = Transform::looking_at(Vec3::zeros(), direction);
        Self::base(name, LightKind::Directional, transform)
    }

    /// Create a spot light
    pub fn spot(name: &str, position: Vec3, target: Vec3, range: f32, spot_angle: f32) -> Self {
        Self {
            range,
            spot_angle,
            ..Self::base(name, LightKind::Spot, Transform::looking_at(position, target))
        }
    }

    /// Create a point light
    pub fn point(name: &str, position: Vec3, range: f32) -> Self {
        Self {
            range,
            ..Self::base(name, LightKind::Point, Transform::from_position(position))
        }
    }

    /// Set the shadow resolution override
    pub fn with_shadow_resolution(mut self, resolution: LightShadowResolution) -> Self {
        self.shadow_resolution = resolution;
        self
    }

    /// Set the shadow mode
    pub fn with_shadows(mut self, shadows: ShadowMode) -> Self {
        self.shadows = shadows;
        self
    }

    /// Mark the light as baked rather than realtime
    pub fn baked(mut self) -> Self {
        self.realtime = false;
        self
    }

    /// Shadow tier after resolving the quality-settings default
    pub fn resolved_quality(&self, quality: &QualitySettings) -> ShadowQuality {
        match self.shadow_resolution {
            LightShadowResolution::Fixed(tier) => tier,
            LightShadowResolution::FromQualitySettings => quality.shadow_resolution,
        }
    }

    /// True when `layer` is in this light's culling mask
    pub fn affects_layer(&self, layer: u32) -> bool {
        layer < 32 && self.culling_mask & (1 << layer) != 0
    }

    /// World-space direction the light points in
    pub fn direction(&self) -> Vec3 {
        self.transform.forward()
    }

    /// World-space position
    pub fn position(&self) -> Vec3 {
        self.transform.position
    }
}
