//! Backend abstraction traits for the volumetric pipeline
//!
//! The pipeline never talks to a graphics API directly. It allocates targets,
//! records [`RenderCommand`]s into command lists and asks the player side of
//! the backend to render decoded actors, all through [`GraphicsBackend`].
//! Decoded assets are queried through [`PlaybackEngine`].

pub mod headless;
mod playback;

pub use playback::PlaybackEngine;

use bitflags::bitflags;

use crate::foundation::collections::{LightId, ViewpointId};
use crate::foundation::math::{Color, Mat4, Rect, Vec4};
use crate::render::{RenderError, ViewportDescriptor};
use crate::scene::MaterialId;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Handle to a backend render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetHandle(pub u64);

/// Handle to a backend command list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandListHandle(pub u64);

/// Handle to a backend viewport slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewportHandle(pub u64);

/// Opaque handle to a decoded volumetric asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetHandle(pub u64);

/// Graphics API the backend runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsApi {
    /// No GPU, commands are only recorded
    Headless,
    /// Desktop OpenGL core profile
    OpenGlCore,
    /// OpenGL ES
    OpenGlEs,
    /// Direct3D 11
    Direct3D11,
    /// Direct3D 12
    Direct3D12,
    /// Metal
    Metal,
    /// Vulkan
    Vulkan,
}

bitflags! {
    /// Platform capabilities and quirks the pipeline adapts to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CapabilityFlags: u32 {
        /// The platform can run the pipeline at all
        const SUPPORTED = 1 << 0;
        /// Native texture copies into and out of depth targets
        const COPY_TEXTURE = 1 << 1;
        /// Point light shadow maps store non-linear depth
        const NONLINEAR_POINT_DEPTH = 1 << 2;
        /// Targets created this frame cannot be rendered into until the next
        const DEFERS_NEW_TARGETS = 1 << 3;
        /// Cube faces are stored upside down and need a flipped copy
        const FLIP_CUBE_FACE_Y = 1 << 4;
        /// Clip-space depth runs from 0 to 1 instead of -1 to 1
        const CLIP_DEPTH_ZERO_TO_ONE = 1 << 5;
        /// The per-actor lighting pass is unavailable
        const SKIP_LIGHTING_PASS = 1 << 6;
        /// Direct render mode is unavailable
        const NO_DIRECT_MODE = 1 << 7;
    }
}

/// Format the backend picked for linear depth targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinearDepthFormat {
    /// 32-bit float
    #[default]
    RFloat,
    /// 16-bit float
    RHalf,
    /// Whatever the platform's default color format is
    Default,
}

/// Capability snapshot of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Graphics API
    pub api: GraphicsApi,
    /// Capability and quirk flags
    pub flags: CapabilityFlags,
    /// Largest texture edge in pixels
    pub max_texture_size: u32,
    /// Format used for linear depth targets
    pub linear_depth_format: LinearDepthFormat,
}

impl BackendCapabilities {
    /// Shorthand for a flag query
    pub fn has(&self, flag: CapabilityFlags) -> bool {
        self.flags.contains(flag)
    }
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            api: GraphicsApi::Headless,
            flags: CapabilityFlags::SUPPORTED | CapabilityFlags::COPY_TEXTURE,
            max_texture_size: 8192,
            linear_depth_format: LinearDepthFormat::RFloat,
        }
    }
}

/// Pixel format of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    /// 8-bit RGBA color
    Color,
    /// Depth buffer
    Depth,
    /// Depth buffer usable with comparison sampling
    Shadowmap,
    /// Single-channel linear depth
    LinearDepth(LinearDepthFormat),
}

/// Render target allocation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDesc {
    /// Debug name
    pub name: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: TargetFormat,
    /// Depth bits of an attached depth buffer, 0 for none
    pub depth_bits: u32,
    /// Array layers, 6 for cube maps
    pub layers: u32,
}

impl TargetDesc {
    /// Single-layer target
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: TargetFormat, depth_bits: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format,
            depth_bits,
            layers: 1,
        }
    }

    /// Six-layer cube target
    pub fn cube(name: impl Into<String>, size: u32, format: TargetFormat, depth_bits: u32) -> Self {
        Self {
            layers: 6,
            ..Self::new(name, size, size, format, depth_bits)
        }
    }
}

/// Camera or light that owns an attached command list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListOwner {
    /// Executed while rendering this viewpoint
    Viewpoint(ViewpointId),
    /// Executed while rendering this light's shadows
    Light(LightId),
}

/// Point in the backend's frame where an attached list executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassEvent {
    /// After the viewpoint depth texture is produced
    AfterDepthTexture,
    /// After forward opaque geometry, non-skybox clear
    AfterForwardOpaque,
    /// After the skybox
    AfterSkybox,
    /// Before opaque image effects, deferred path
    BeforeImageEffectsOpaque,
    /// After forward transparent geometry
    AfterForwardAlpha,
    /// Before the light's shadow map is rendered
    BeforeShadowMap,
    /// After the light's shadow map is rendered
    AfterShadowMap,
    /// After one face of a point light's cube shadow map is rendered
    AfterShadowMapFace(CubeFace),
    /// After the light's screen-space shadow mask is produced
    AfterScreenspaceMask,
}

/// Well-known shader uniform slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Uniform {
    HvrColorTex,
    HvrDepthTex,
    ViewProjectInverse,
    CenterWorldPos,
    CameraWorldPos,
    WorldToObject,
    LightWorldPos,
    LightWorldDir,
    LightColorAtSource,
    LightParameters,
    ShadowParameters,
    ScreenspaceHvrMaskTexture,
    LightDepthMap,
    FromWorldToShadow,
    FromWorldToShadowFace(CubeFace),
    LightDepthMapFace(CubeFace),
    WorldToLightSpace,
    LightCookie,
    Tint,
    Odep,
    CurrLightPositionRange,
    FlipMapMatrix,
    ShadowFadeCameraDistance,
    ShadowMapTexture,
    ShadowMapTexelSize,
    WorldToShadowCascades,
    ShadowSplitSpheres,
    ShadowSplitSqRadii,
    FixedAmbientLighting,
}

impl Uniform {
    /// Shader-visible name
    pub fn name(self) -> &'static str {
        match self {
            Self::HvrColorTex => "_HvrColorTex",
            Self::HvrDepthTex => "_HvrDepthTex",
            Self::ViewProjectInverse => "_ViewProjectInverse",
            Self::CenterWorldPos => "_CenterWorldPos",
            Self::CameraWorldPos => "_CameraWorldPos",
            Self::WorldToObject => "_WorldToObject",
            Self::LightWorldPos => "_LightWorldPos",
            Self::LightWorldDir => "_LightWorldDir",
            Self::LightColorAtSource => "_LightColorAtSource",
            Self::LightParameters => "_LightParameters",
            Self::ShadowParameters => "_ShadowParameters",
            Self::ScreenspaceHvrMaskTexture => "_ScreenspaceHvrMaskTexture",
            Self::LightDepthMap => "_LightDepthMap",
            Self::FromWorldToShadow => "_FromWorldToShadow",
            Self::FromWorldToShadowFace(face) => match face {
                CubeFace::PositiveX => "_FromWorldToShadowPX",
                CubeFace::NegativeX => "_FromWorldToShadowNX",
                CubeFace::PositiveY => "_FromWorldToShadowPY",
                CubeFace::NegativeY => "_FromWorldToShadowNY",
                CubeFace::PositiveZ => "_FromWorldToShadowPZ",
                CubeFace::NegativeZ => "_FromWorldToShadowNZ",
            },
            Self::LightDepthMapFace(face) => match face {
                CubeFace::PositiveX => "_LightDepthMapPX",
                CubeFace::NegativeX => "_LightDepthMapNX",
                CubeFace::PositiveY => "_LightDepthMapPY",
                CubeFace::NegativeY => "_LightDepthMapNY",
                CubeFace::PositiveZ => "_LightDepthMapPZ",
                CubeFace::NegativeZ => "_LightDepthMapNZ",
            },
            Self::WorldToLightSpace => "_WorldToLightSpace",
            Self::LightCookie => "_LightCookie",
            Self::Tint => "_Tint",
            Self::Odep => "_oDEP",
            Self::CurrLightPositionRange => "_CurrLightPositionRange",
            Self::FlipMapMatrix => "_FlipMapMatrix",
            Self::ShadowFadeCameraDistance => "_ShadowFadeCameraDistance",
            Self::ShadowMapTexture => "_ShadowMapTexture",
            Self::ShadowMapTexelSize => "_ShadowMapTexture_TexelSize",
            Self::WorldToShadowCascades => "unity_WorldToShadow",
            Self::ShadowSplitSpheres => "_LightSplitsSpheres",
            Self::ShadowSplitSqRadii => "_LightSplitsSqRadii",
            Self::FixedAmbientLighting => "FIXED_AMBIENT_LIGHTING",
        }
    }
}

/// Cube map face, in the order shadow records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CubeFace {
    /// +X
    PositiveX,
    /// −X
    NegativeX,
    /// +Y
    PositiveY,
    /// −Y
    NegativeY,
    /// +Z
    PositiveZ,
    /// −Z
    NegativeZ,
}

impl CubeFace {
    /// All faces in layer order
    pub const ALL: [Self; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    /// Array layer of the face in a cube target
    pub fn layer(self) -> u32 {
        self as u32
    }
}

/// Value bound to a uniform slot
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// Scalar
    Float(f32),
    /// Four-component vector
    Vector(Vec4),
    /// 4x4 matrix
    Matrix(Mat4),
    /// Render target sampled as a texture
    Texture(TargetHandle),
    /// Fixed-size matrix array
    MatrixArray(Vec<Mat4>),
    /// Fixed-size vector array
    VectorArray(Vec<Vec4>),
}

/// Ordered set of uniform bindings for one draw
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyBlock {
    values: Vec<(Uniform, UniformValue)>,
}

impl PropertyBlock {
    /// Create an empty block
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` to `uniform`, replacing any previous binding
    pub fn set(&mut self, uniform: Uniform, value: UniformValue) -> &mut Self {
        if let Some(slot) = self.values.iter_mut().find(|(u, _)| *u == uniform) {
            slot.1 = value;
        } else {
            self.values.push((uniform, value));
        }
        self
    }

    /// Bind a scalar
    pub fn set_float(&mut self, uniform: Uniform, value: f32) -> &mut Self {
        self.set(uniform, UniformValue::Float(value))
    }

    /// Bind a vector
    pub fn set_vector(&mut self, uniform: Uniform, value: Vec4) -> &mut Self {
        self.set(uniform, UniformValue::Vector(value))
    }

    /// Bind a matrix
    pub fn set_matrix(&mut self, uniform: Uniform, value: Mat4) -> &mut Self {
        self.set(uniform, UniformValue::Matrix(value))
    }

    /// Bind a texture
    pub fn set_texture(&mut self, uniform: Uniform, value: TargetHandle) -> &mut Self {
        self.set(uniform, UniformValue::Texture(value))
    }

    /// Look up a binding
    pub fn get(&self, uniform: Uniform) -> Option<&UniformValue> {
        self.values.iter().find(|(u, _)| *u == uniform).map(|(_, v)| v)
    }

    /// Look up a texture binding
    pub fn texture(&self, uniform: Uniform) -> Option<TargetHandle> {
        match self.get(uniform) {
            Some(UniformValue::Texture(handle)) => Some(*handle),
            _ => None,
        }
    }

    /// Look up a vector binding
    pub fn vector(&self, uniform: Uniform) -> Option<Vec4> {
        match self.get(uniform) {
            Some(UniformValue::Vector(v)) => Some(*v),
            _ => None,
        }
    }

    /// Remove every binding
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Iterate bindings in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &(Uniform, UniformValue)> {
        self.values.iter()
    }
}

/// Geometry a draw command uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mesh {
    /// Full-screen quad for composites and blits
    FullscreenQuad,
    /// Quad covering the far plane of the main viewpoint, for shadow masks
    ShadowMaskQuad,
    /// Bounding proxy geometry of an actor
    ActorProxy,
}

/// Material a draw command uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialRef {
    /// An actor's host material
    Actor(MaterialId),
    /// Built-in color composite
    ColorComposite,
    /// Built-in depth composite
    DepthComposite,
    /// Built-in shadow caster copy
    ShadowCaster,
    /// Built-in depth linearization
    LinearDepth,
    /// Built-in screen-space shadow mask
    ScreenspaceShadowMask,
}

/// One recorded rendering instruction
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// Bind color/depth targets, optionally a single layer
    SetTarget {
        /// Color target, `None` keeps the current one
        color: Option<TargetHandle>,
        /// Depth target, `None` keeps the current one
        depth: Option<TargetHandle>,
        /// Layer for array or cube targets
        layer: Option<u32>,
    },
    /// Clear the bound targets
    Clear {
        /// Clear color, `None` leaves color untouched
        color: Option<Color>,
        /// Clear depth, `None` leaves depth untouched
        depth: Option<f32>,
    },
    /// Restrict rasterization to a rectangle
    SetViewportRect(Rect),
    /// Draw a mesh with a material pass
    Draw {
        /// Geometry
        mesh: Mesh,
        /// Object-to-world transform
        transform: Mat4,
        /// Material
        material: MaterialRef,
        /// Shader pass index
        pass: u32,
        /// Uniform bindings
        properties: PropertyBlock,
    },
    /// Full-target copy through an optional material pass
    Blit {
        /// Source texture; `None` reads the bound target, or nothing when a material generates the output
        source: Option<TargetHandle>,
        /// Destination
        dest: TargetHandle,
        /// Material and pass, `None` for a plain copy
        material: Option<(MaterialRef, u32)>,
        /// Uniform bindings
        properties: PropertyBlock,
    },
    /// Raw texture copy between layers
    CopyTexture {
        /// Source target
        source: TargetHandle,
        /// Source layer
        source_layer: u32,
        /// Destination target
        dest: TargetHandle,
        /// Destination layer
        dest_layer: u32,
    },
}

/// Main rendering backend trait
///
/// Implementations must tolerate handles that were released while work using
/// them was still queued; the pipeline never waits for the GPU.
pub trait GraphicsBackend {
    /// Capability snapshot; may change when the device is recreated
    fn capabilities(&self) -> BackendCapabilities;

    /// Allocate a render target
    fn create_target(&mut self, desc: &TargetDesc) -> BackendResult<TargetHandle>;

    /// Release a render target
    fn release_target(&mut self, target: TargetHandle);

    /// True while `target` has not been released
    fn is_target_live(&self, target: TargetHandle) -> bool;

    /// Create an empty command list
    fn create_command_list(&mut self, name: &str) -> BackendResult<CommandListHandle>;

    /// Release a command list, detaching it everywhere
    fn release_command_list(&mut self, list: CommandListHandle);

    /// Execute `list` whenever `owner` reaches `event`
    fn attach_command_list(&mut self, list: CommandListHandle, owner: ListOwner, event: PassEvent);

    /// Undo [`attach_command_list`](Self::attach_command_list); unknown pairs are ignored
    fn detach_command_list(&mut self, list: CommandListHandle, owner: ListOwner, event: PassEvent);

    /// Remove every recorded command from `list`
    fn clear_command_list(&mut self, list: CommandListHandle);

    /// Append a command to `list`
    fn record(&mut self, list: CommandListHandle, command: RenderCommand);

    /// Execute a command immediately
    fn execute(&mut self, command: RenderCommand);

    /// Allocate a player viewport slot
    fn create_viewport(&mut self) -> BackendResult<ViewportHandle>;

    /// Release a player viewport slot
    fn delete_viewport(&mut self, viewport: ViewportHandle);

    /// Let the player flip its internal buffers for a new frame
    fn prepare_frame(&mut self, color: Option<TargetHandle>, depth: Option<TargetHandle>);

    /// Announce that `asset` will be rendered through `viewport` this frame
    fn declare_visibility(&mut self, asset: AssetHandle, viewport: &ViewportDescriptor);

    /// Render `asset` through `viewport` into the given targets; false if nothing was drawn
    fn render_actor(
        &mut self,
        asset: AssetHandle,
        viewport: &ViewportDescriptor,
        color: Option<TargetHandle>,
        depth: Option<TargetHandle>,
    ) -> bool;

    /// Convert an OpenGL-style projection to what this API's shaders expect
    fn gpu_projection(&self, projection: &Mat4, render_into_texture: bool) -> Mat4 {
        let caps = self.capabilities();
        if !caps.has(CapabilityFlags::CLIP_DEPTH_ZERO_TO_ONE) {
            return *projection;
        }
        let mut remap = Mat4::identity();
        remap[(2, 2)] = 0.5;
        remap[(2, 3)] = 0.5;
        if render_into_texture {
            remap[(1, 1)] = -1.0;
        }
        remap * projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_property_block_replaces_existing_binding() {
        let mut block = PropertyBlock::new();
        block.set_float(Uniform::LightParameters, 1.0);
        block.set_texture(Uniform::HvrColorTex, TargetHandle(3));
        block.set_float(Uniform::LightParameters, 2.0);
        assert_eq!(block.iter().count(), 2);
        assert_eq!(block.get(Uniform::LightParameters), Some(&UniformValue::Float(2.0)));
        assert_eq!(block.texture(Uniform::HvrColorTex), Some(TargetHandle(3)));
    }

    #[test]
    fn test_cube_face_uniform_names() {
        assert_eq!(Uniform::FromWorldToShadowFace(CubeFace::PositiveX).name(), "_FromWorldToShadowPX");
        assert_eq!(Uniform::LightDepthMapFace(CubeFace::NegativeZ).name(), "_LightDepthMapNZ");
        assert_eq!(CubeFace::NegativeZ.layer(), 5);
    }

    #[test]
    fn test_gpu_projection_remaps_depth_range() {
        let backend = headless::HeadlessBackend::with_capabilities(BackendCapabilities {
            flags: CapabilityFlags::SUPPORTED | CapabilityFlags::CLIP_DEPTH_ZERO_TO_ONE,
            ..BackendCapabilities::default()
        });
        let proj = crate::foundation::math::perspective(60.0, 1.0, 1.0, 10.0);
        let gpu = backend.gpu_projection(&proj, false);
        let near = crate::foundation::math::transform_point(&gpu, &Vec3::new(0.0, 0.0, -1.0));
        let far = crate::foundation::math::transform_point(&gpu, &Vec3::new(0.0, 0.0, -10.0));
        assert!(near.z.abs() < 1e-4);
        assert!((far.z - 1.0).abs() < 1e-4);
    }
}
