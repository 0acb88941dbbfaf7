//! Volumetric actors and their materials

use bitflags::bitflags;

use crate::backend::AssetHandle;
use crate::foundation::math::{Color, Transform, WHITE};

/// Render queue at and above which a material blends as transparent
pub const TRANSPARENT_QUEUE_THRESHOLD: i32 = 2450;

/// Render queue of a default opaque material
pub const GEOMETRY_QUEUE: i32 = 2000;

/// Render queue of a default transparent material
pub const TRANSPARENT_QUEUE: i32 = 3000;

bitflags! {
    /// Per-actor render behaviour switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ActorFlags: u32 {
        /// Actor is drawn into shadow maps
        const CAST_SHADOWS = 1 << 0;
        /// Actor samples shadow maps during its lighting pass
        const RECEIVE_SHADOWS = 1 << 1;
        /// Actor runs the per-light lighting passes
        const USE_LIGHTING = 1 << 2;
        /// Lighting draws use a screen-space quad instead of the proxy mesh
        const SCREEN_SPACE_QUAD = 1 << 3;
        /// Actor is culled against each viewpoint frustum
        const OCCLUSION_CULLING = 1 << 4;
    }
}

impl Default for ActorFlags {
    fn default() -> Self {
        Self::CAST_SHADOWS | Self::RECEIVE_SHADOWS | Self::USE_LIGHTING | Self::OCCLUSION_CULLING
    }
}

/// Identifier the backend uses to resolve a host material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MaterialId(pub u64);

/// The parts of a material the pipeline reads
///
/// Shader source and authoring live elsewhere; this is the opaque bag of
/// pass count, blend queue and named colour slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Backend identifier
    pub id: MaterialId,
    /// Number of shader passes the material provides
    pub pass_count: u32,
    /// Blend-queue classification
    pub render_queue: i32,
    /// `_MainColor` slot, if the shader has one
    pub main_color: Option<Color>,
    /// `_ColorFactor` slot, if the shader has one
    pub color_factor: Option<Color>,
    /// `TRANSPARENCY_DITHER` keyword
    pub transparency_dither: bool,
}

impl Material {
    /// Opaque material with the standard six passes
    pub fn opaque(id: MaterialId) -> Self {
        Self {
            id,
            pass_count: 6,
            render_queue: GEOMETRY_QUEUE,
            main_color: None,
            color_factor: None,
            transparency_dither: false,
        }
    }

    /// Transparent material tinted by `color_factor`
    pub fn transparent(id: MaterialId, color_factor: Color) -> Self {
        Self {
            render_queue: TRANSPARENT_QUEUE,
            color_factor: Some(color_factor),
            ..Self::opaque(id)
        }
    }

    /// True when the material sits in the transparent part of the render queue
    pub fn is_transparent(&self) -> bool {
        self.render_queue >= TRANSPARENT_QUEUE_THRESHOLD
    }

    /// Alpha used to weight this material's contribution to shadow maps
    pub fn transparency_value(&self) -> f32 {
        self.main_color
            .or(self.color_factor)
            .map_or(1.0, |color| color[3])
    }

    /// Tint applied by the composite pass
    pub fn tint(&self) -> Color {
        self.color_factor.unwrap_or(WHITE)
    }

    /// Composite shader pass: 0 opaque, 1 blended, 2 dithered
    pub fn composite_pass(&self) -> u32 {
        match (self.is_transparent(), self.transparency_dither) {
            (false, _) => 0,
            (true, false) => 1,
            (true, true) => 2,
        }
    }

    /// True when the material provides shader pass `pass`
    pub fn has_pass(&self, pass: u32) -> bool {
        pass < self.pass_count
    }
}

/// A drawable volumetric entity
#[derive(Debug, Clone)]
pub struct Actor {
    /// Debug name
    pub name: String,
    /// Local-to-world transform
    pub transform: Transform,
    /// Decoded asset; `None` until the playback engine has loaded one
    pub asset: Option<AssetHandle>,
    /// Material; actors without one are never drawn
    pub material: Option<Material>,
    /// Render behaviour switches
    pub flags: ActorFlags,
    /// Scale applied to the culling sphere radius
    pub occlusion_culling_multiplier: f32,
    /// Layer index (0..32) tested against light culling masks
    pub layer: u32,
    /// Disabled actors are ignored by every coordinator
    pub enabled: bool,
}

impl Actor {
    /// Create an enabled actor with default flags
    pub fn new(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            transform,
            asset: None,
            material: None,
            flags: ActorFlags::default(),
            occlusion_culling_multiplier: 1.0,
            layer: 0,
            enabled: true,
        }
    }

    /// Set the decoded asset
    pub fn with_asset(mut self, asset: AssetHandle) -> Self {
        self.asset = Some(asset);
        self
    }

    /// Set the material
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    /// Replace the flags
    pub fn with_flags(mut self, flags: ActorFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the layer
    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    /// Shorthand for a flag query
    pub fn has(&self, flag: ActorFlags) -> bool {
        self.flags.contains(flag)
    }

    /// True when the material classifies the actor as transparent
    pub fn is_transparent(&self) -> bool {
        self.material.as_ref().is_some_and(Material::is_transparent)
    }

    /// Weight of this actor in a transparent shadow bake
    pub fn shadow_weight(&self) -> f32 {
        match &self.material {
            Some(material) if material.is_transparent() => material.transparency_value(),
            _ => 1.0,
        }
    }
}
