//! # Light Shadows
//!
//! Shadow maps for every registered light. Each light gets a
//! [`ShadowCoordinator`] that owns one resource set sized for the light's
//! kind: a single map for spot lights, a cascaded map and screen-space mask
//! for directional lights, six cube faces for point lights.
//!
//! ## Design Goals
//!
//! - **Drift detection**: the settings a resource set was built from are
//!   cached and compared every frame; any change rebuilds from scratch
//! - **Transparent occluders**: when a transparent actor casts, every caster
//!   is baked into an isolated map and blended by its alpha weight
//! - **Per-kind resources**: a light only ever holds the targets its kind uses

mod cache;
mod directional;
mod owned;
mod point;
mod record;
mod resolution;
mod spot;

pub use cache::{ShadowMapCache, ShadowMapKey};
pub use directional::{cascade_bounding_sphere, cascade_layout, cascade_matrices, CascadeLayout, DirectionalShadows, MAX_CASCADES};
pub use owned::OwnedResources;
pub use point::{face_axes, face_view, CubeFaceShadow, PointShadows};
pub use record::{collect_casters, ShadowCaster, ShadowRecord};
pub use resolution::{directional_map_size, point_map_size, spot_map_size, ShadowQuality};
pub use spot::SpotShadows;

use log::{debug, warn};

use crate::backend::{
    AssetHandle, BackendCapabilities, BackendResult, CubeFace, GraphicsBackend, MaterialRef, Mesh, PropertyBlock,
    RenderCommand, TargetDesc, TargetFormat, TargetHandle, Uniform,
};
use crate::config::PipelineSettings;
use crate::foundation::collections::{ActorId, LightId};
use crate::foundation::math::{scaling, translation, Mat4, Rect, Vec4, WHITE};
use crate::frame::FrameContext;
use crate::render::{Degradation, ViewportDescriptor};
use crate::scene::{Light, LightKind, ShadowMode};

/// One viewport an isolated caster is rendered through
#[derive(Debug, Clone, Copy)]
pub struct IsolatedPass<'a> {
    /// Region of the temporary target to draw into, `None` for all of it
    pub rect: Option<Rect>,
    /// Asset to render
    pub asset: AssetHandle,
    /// Light viewport
    pub viewport: &'a ViewportDescriptor,
}

/// Render one actor alone and keep the result in `cache`
///
/// The actor is drawn through every pass into a temporary depth target,
/// which is then copied into the cached map for `(actor, face, size)`.
pub fn bake_isolated_map(
    actor: ActorId,
    face: Option<CubeFace>,
    size: u32,
    passes: &[IsolatedPass<'_>],
    cache: &mut ShadowMapCache,
    backend: &mut dyn GraphicsBackend,
) -> BackendResult<TargetHandle> {
    let temp = backend.create_target(&TargetDesc::new("hvr_isolated_caster_depth", size, size, TargetFormat::Depth, 16))?;
    backend.execute(RenderCommand::SetTarget {
        color: None,
        depth: Some(temp),
        layer: None,
    });
    backend.execute(RenderCommand::Clear {
        color: Some(WHITE),
        depth: Some(1.0),
    });
    for pass in passes {
        if let Some(rect) = pass.rect {
            backend.execute(RenderCommand::SetViewportRect(rect));
        }
        backend.render_actor(pass.asset, pass.viewport, None, Some(temp));
    }
    let key = ShadowMapKey {
        actor,
        face,
        width: size,
        height: size,
    };
    let map = match cache.request(key, backend) {
        Ok(map) => map,
        Err(err) => {
            backend.release_target(temp);
            return Err(err);
        }
    };
    backend.execute(RenderCommand::Blit {
        source: Some(temp),
        dest: map,
        material: None,
        properties: PropertyBlock::new(),
    });
    backend.release_target(temp);
    Ok(map)
}

/// Full-screen shadow caster draw that folds `map` into the bound target
pub fn caster_draw(pass: u32, size: (u32, u32), weight: f32, map: TargetHandle, mut properties: PropertyBlock) -> RenderCommand {
    properties
        .set_vector(
            Uniform::ShadowParameters,
            Vec4::new(size.0 as f32, size.1 as f32, weight, 0.0),
        )
        .set_texture(Uniform::Odep, map);
    RenderCommand::Draw {
        mesh: Mesh::FullscreenQuad,
        transform: Mat4::identity(),
        material: MaterialRef::ShadowCaster,
        pass,
        properties,
    }
}

/// Clip space to texture UV, depth untouched
pub fn to_uv_matrix() -> Mat4 {
    scaling(0.5, 0.5, 1.0) * translation(1.0, 1.0, 0.0)
}

/// Everything a light's resources were sized from
#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedLightState {
    kind: LightKind,
    quality: ShadowQuality,
    shadows: ShadowMode,
    realtime: bool,
    cascades: usize,
    camera: Option<(f32, f32)>,
    screen: Option<(u32, u32)>,
    scene_view: Option<(u32, u32)>,
    max_texture_size: u32,
    swap_chain_length: usize,
}

impl CachedLightState {
    fn capture(light: &Light, ctx: &FrameContext<'_>, caps: &BackendCapabilities) -> Self {
        let viewpoint = ctx.scene.main_viewpoint();
        let orthographic = viewpoint.is_some_and(|vp| vp.is_orthographic());
        Self {
            kind: light.kind,
            quality: light.resolved_quality(&ctx.settings.quality),
            shadows: light.shadows,
            realtime: light.realtime,
            cascades: ctx.settings.quality.effective_cascades(orthographic),
            camera: viewpoint.map(|vp| (vp.far(), vp.fov())),
            screen: viewpoint.map(|vp| vp.pixel_size()),
            scene_view: ctx.scene.scene_view_size,
            max_texture_size: caps.max_texture_size,
            swap_chain_length: ctx.settings.swap_chain_length,
        }
    }
}

/// Kind-specific shadow resources of one light
#[derive(Debug)]
pub enum ShadowResources {
    /// Cascaded map and screen-space mask
    Directional(DirectionalShadows),
    /// Single map
    Spot(SpotShadows),
    /// Six cube faces
    Point(PointShadows),
}

impl ShadowResources {
    fn create(
        id: LightId,
        light: &Light,
        state: &CachedLightState,
        settings: &PipelineSettings,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<Self> {
        let max = state.max_texture_size;
        let chain = state.swap_chain_length;
        match light.kind {
            LightKind::Directional => DirectionalShadows::create(
                id,
                directional_map_size(state.quality, max),
                state.cascades,
                chain,
                backend,
            )
            .map(Self::Directional),
            LightKind::Spot => SpotShadows::create(id, spot_map_size(state.quality, max), chain, backend).map(Self::Spot),
            LightKind::Point => {
                let dimension = state
                    .screen
                    .map_or(settings.default_max_dimension, |(w, h)| w.max(h));
                PointShadows::create(id, point_map_size(state.quality, dimension, max), chain, backend).map(Self::Point)
            }
        }
    }

    /// Number of shadow records: 1 spot, one per cascade, 6 point
    pub fn record_count(&self) -> usize {
        match self {
            Self::Directional(shadows) => shadows.cascades().len(),
            Self::Spot(_) => 1,
            Self::Point(shadows) => shadows.faces().len(),
        }
    }

    /// Records in kind order
    pub fn records(&self) -> Vec<&ShadowRecord> {
        match self {
            Self::Directional(shadows) => shadows.cascades().iter().collect(),
            Self::Spot(shadows) => vec![shadows.record()],
            Self::Point(shadows) => shadows.faces().iter().map(|face| &face.record).collect(),
        }
    }

    fn clear_command_lists(&self, backend: &mut dyn GraphicsBackend) {
        match self {
            Self::Directional(shadows) => shadows.clear_command_lists(backend),
            Self::Spot(shadows) => shadows.clear_command_lists(backend),
            Self::Point(shadows) => shadows.clear_command_lists(backend),
        }
    }

    fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        match self {
            Self::Directional(shadows) => shadows.release(backend),
            Self::Spot(shadows) => shadows.release(backend),
            Self::Point(shadows) => shadows.release(backend),
        }
    }
}

/// Owns and bakes the shadow resources of one light
#[derive(Debug)]
pub struct ShadowCoordinator {
    light: LightId,
    cached: Option<CachedLightState>,
    resources: Option<ShadowResources>,
    cache: ShadowMapCache,
    rendered_once: bool,
}

impl ShadowCoordinator {
    /// Create a coordinator with no resources; the first check builds them
    pub fn new(light: LightId) -> Self {
        Self {
            light,
            cached: None,
            resources: None,
            cache: ShadowMapCache::new(),
            rendered_once: false,
        }
    }

    /// Light this coordinator serves
    pub fn light_id(&self) -> LightId {
        self.light
    }

    /// Rebuild the resources if anything they were sized from changed
    ///
    /// Returns true when a rebuild happened. A failed rebuild is logged and
    /// not retried until the inputs change again.
    pub fn check_resources(&mut self, light: &Light, ctx: &FrameContext<'_>, backend: &mut dyn GraphicsBackend) -> bool {
        let state = CachedLightState::capture(light, ctx, &backend.capabilities());
        if self.cached == Some(state) {
            return false;
        }
        if self.cached.is_some() {
            Degradation::ResourceDrift.report(&format!("{}: shadow inputs changed", light.name));
        }
        self.release_resources(backend);
        match ShadowResources::create(self.light, light, &state, ctx.settings, backend) {
            Ok(resources) => {
                debug!("{}: {} shadow records", light.name, resources.record_count());
                self.resources = Some(resources);
            }
            Err(err) => warn!("{}: shadow resources unavailable: {err}", light.name),
        }
        self.cached = Some(state);
        self.rendered_once = false;
        true
    }

    /// Fit the light's viewports to this frame and declare its casters
    pub fn will_render(&mut self, light: &Light, ctx: &FrameContext<'_>, backend: &mut dyn GraphicsBackend) {
        match &mut self.resources {
            Some(ShadowResources::Directional(shadows)) => shadows.will_render(light, ctx, backend),
            Some(ShadowResources::Spot(shadows)) => shadows.will_render(light, ctx, backend),
            Some(ShadowResources::Point(shadows)) => shadows.will_render(light, ctx, backend),
            None => {}
        }
    }

    /// Bake this frame's shadows
    pub fn render(&mut self, light: &Light, ctx: &FrameContext<'_>, backend: &mut dyn GraphicsBackend) {
        self.bake(light, ctx, backend);
        self.rendered_once = false;
    }

    /// Bake once to clear stale maps, then do nothing until the light is rebuilt
    ///
    /// Returns true if a bake happened.
    pub fn render_once(&mut self, light: &Light, ctx: &FrameContext<'_>, backend: &mut dyn GraphicsBackend) -> bool {
        if self.rendered_once {
            return false;
        }
        self.bake(light, ctx, backend);
        self.rendered_once = true;
        true
    }

    fn bake(&mut self, light: &Light, ctx: &FrameContext<'_>, backend: &mut dyn GraphicsBackend) {
        self.cache.clear(backend);
        let result = match &mut self.resources {
            Some(ShadowResources::Directional(shadows)) => shadows.bake(light, ctx, &mut self.cache, backend),
            Some(ShadowResources::Spot(shadows)) => shadows.bake(light, &mut self.cache, backend),
            Some(ShadowResources::Point(shadows)) => shadows.bake(light, &mut self.cache, backend),
            None => Ok(()),
        };
        if let Err(err) = result {
            warn!("{}: shadow bake failed: {err}", light.name);
        }
    }

    /// Empty every list the light has recorded into
    pub fn clear_command_lists(&self, backend: &mut dyn GraphicsBackend) {
        if let Some(resources) = &self.resources {
            resources.clear_command_lists(backend);
        }
    }

    /// Current resource set
    pub fn resources(&self) -> Option<&ShadowResources> {
        self.resources.as_ref()
    }

    /// Number of shadow records, 0 without resources
    pub fn record_count(&self) -> usize {
        self.resources.as_ref().map_or(0, ShadowResources::record_count)
    }

    /// Number of isolated maps from the last bake
    pub fn cached_map_count(&self) -> usize {
        self.cache.len()
    }

    /// Screen-space mask of a directional light
    pub fn directional_mask(&self) -> Option<TargetHandle> {
        match &self.resources {
            Some(ShadowResources::Directional(shadows)) => shadows.mask(),
            _ => None,
        }
    }

    /// Depth map and world-to-shadow matrix of a spot light
    pub fn spot_shadow(&self) -> Option<(TargetHandle, Mat4)> {
        match &self.resources {
            Some(ShadowResources::Spot(shadows)) => shadows
                .depth_with_scene()
                .map(|depth| (depth, shadows.world_to_shadow())),
            _ => None,
        }
    }

    /// Per-face world-to-shadow matrices and linear depth maps of a point light
    pub fn point_faces(&self) -> Vec<(CubeFace, Mat4, TargetHandle)> {
        match &self.resources {
            Some(ShadowResources::Point(shadows)) => shadows
                .faces()
                .iter()
                .filter_map(|face| {
                    face.record
                        .linear_depth
                        .map(|linear| (face.face, face.world_to_shadow, linear))
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn release_resources(&mut self, backend: &mut dyn GraphicsBackend) {
        self.cache.clear(backend);
        if let Some(mut resources) = self.resources.take() {
            resources.release(backend);
        }
    }

    /// Release everything; the next check rebuilds from scratch
    pub fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        self.release_resources(backend);
        self.cached = None;
        self.rendered_once = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessBackend, StaticPlayback};
    use crate::foundation::math::{Transform, Vec3};
    use crate::scene::{LightShadowResolution, Scene, Viewpoint};
    use slotmap::SlotMap;

    fn scene_with_camera() -> Scene {
        let mut scene = Scene::new();
        let camera = scene.viewpoints.insert(Viewpoint::perspective(
            "main",
            Transform::identity(),
            60.0,
            0.3,
            100.0,
            640,
            480,
        ));
        scene.main_viewpoint = Some(camera);
        scene
    }

    fn light_id() -> LightId {
        let mut lights: SlotMap<LightId, ()> = SlotMap::with_key();
        lights.insert(())
    }

    #[test]
    fn test_record_counts_by_kind() {
        let scene = scene_with_camera();
        let playback = StaticPlayback::new();
        let mut backend = HeadlessBackend::new();
        for cascades in [1, 2, 4] {
            let settings = PipelineSettings::default().with_shadow_cascades(cascades);
            let ctx = FrameContext {
                scene: &scene,
                actors: &[],
                playback: &playback,
                settings: &settings,
                frame: 0,
            };
            let lights = [
                (Light::spot("spot", Vec3::zeros(), -Vec3::z(), 10.0, 45.0), 1),
                (Light::directional("sun", -Vec3::y()), cascades as usize),
                (Light::point("bulb", Vec3::zeros(), 5.0), 6),
            ];
            for (light, expected) in lights {
                let mut coordinator = ShadowCoordinator::new(light_id());
                assert!(coordinator.check_resources(&light, &ctx, &mut backend));
                assert_eq!(coordinator.record_count(), expected, "{}", light.name);
                coordinator.dispose(&mut backend);
            }
        }
        assert_eq!(backend.live_target_count(), 0);
    }

    #[test]
    fn test_quality_change_rebuilds_resources() {
        let scene = scene_with_camera();
        let playback = StaticPlayback::new();
        let settings = PipelineSettings::default();
        let ctx = FrameContext {
            scene: &scene,
            actors: &[],
            playback: &playback,
            settings: &settings,
            frame: 0,
        };
        let mut backend = HeadlessBackend::new();
        let mut light = Light::spot("spot", Vec3::zeros(), -Vec3::z(), 10.0, 45.0);
        let mut coordinator = ShadowCoordinator::new(light_id());
        assert!(coordinator.check_resources(&light, &ctx, &mut backend));
        assert!(!coordinator.check_resources(&light, &ctx, &mut backend));

        light.shadow_resolution = LightShadowResolution::Fixed(ShadowQuality::Low);
        assert!(coordinator.check_resources(&light, &ctx, &mut backend));
        let (depth, _) = coordinator.spot_shadow().unwrap();
        assert_eq!(backend.target_desc(depth).unwrap().width, 256);
        assert_eq!(backend.targets_named("hvr_spot").len(), 2);
    }

    #[test]
    fn test_shadow_mode_change_rebuilds_resources() {
        let scene = scene_with_camera();
        let playback = StaticPlayback::new();
        let settings = PipelineSettings::default();
        let ctx = FrameContext {
            scene: &scene,
            actors: &[],
            playback: &playback,
            settings: &settings,
            frame: 0,
        };
        let mut backend = HeadlessBackend::new();
        let mut light = Light::spot("spot", Vec3::zeros(), -Vec3::z(), 10.0, 45.0);
        let mut coordinator = ShadowCoordinator::new(light_id());
        assert!(coordinator.check_resources(&light, &ctx, &mut backend));

        light.shadows = ShadowMode::Hard;
        assert!(coordinator.check_resources(&light, &ctx, &mut backend));
        assert!(!coordinator.check_resources(&light, &ctx, &mut backend));

        light.shadows = ShadowMode::None;
        assert!(coordinator.check_resources(&light, &ctx, &mut backend));
        assert_eq!(coordinator.record_count(), 1);
        assert_eq!(backend.targets_named("hvr_spot").len(), 2);
    }

    #[test]
    fn test_missing_camera_is_a_stable_state() {
        let scene = Scene::new();
        let playback = StaticPlayback::new();
        let settings = PipelineSettings::default();
        let ctx = FrameContext {
            scene: &scene,
            actors: &[],
            playback: &playback,
            settings: &settings,
            frame: 0,
        };
        let mut backend = HeadlessBackend::new();
        let light = Light::point("bulb", Vec3::zeros(), 5.0);
        let mut coordinator = ShadowCoordinator::new(light_id());
        assert!(coordinator.check_resources(&light, &ctx, &mut backend));
        assert!(!coordinator.check_resources(&light, &ctx, &mut backend));
        assert!(matches!(coordinator.resources(), Some(ShadowResources::Point(_))));
        let face = coordinator.point_faces()[0].2;
        let expected = point_map_size(ShadowQuality::High, settings.default_max_dimension, 8192);
        assert_eq!(backend.target_desc(face).unwrap().width, expected);
    }

    #[test]
    fn test_render_once_bakes_a_single_time_until_rebuilt() {
        let scene = scene_with_camera();
        let playback = StaticPlayback::new();
        let settings = PipelineSettings::default();
        let ctx = FrameContext {
            scene: &scene,
            actors: &[],
            playback: &playback,
            settings: &settings,
            frame: 0,
        };
        let mut backend = HeadlessBackend::new();
        let light = Light::spot("spot", Vec3::zeros(), -Vec3::z(), 10.0, 45.0).baked();
        let mut coordinator = ShadowCoordinator::new(light_id());
        coordinator.check_resources(&light, &ctx, &mut backend);
        coordinator.will_render(&light, &ctx, &mut backend);
        assert!(coordinator.render_once(&light, &ctx, &mut backend));
        assert!(!coordinator.render_once(&light, &ctx, &mut backend));

        let mut moved = light.clone();
        moved.realtime = true;
        coordinator.check_resources(&moved, &ctx, &mut backend);
        assert!(coordinator.render_once(&moved, &ctx, &mut backend));
    }

    #[test]
    fn test_device_change_rebuilds_at_new_limit() {
        let scene = scene_with_camera();
        let playback = StaticPlayback::new();
        let settings = PipelineSettings::default();
        let ctx = FrameContext {
            scene: &scene,
            actors: &[],
            playback: &playback,
            settings: &settings,
            frame: 0,
        };
        let mut backend = HeadlessBackend::new();
        let light = Light::directional("sun", -Vec3::y());
        let mut coordinator = ShadowCoordinator::new(light_id());
        coordinator.check_resources(&light, &ctx, &mut backend);
        backend.set_capabilities(BackendCapabilities {
            max_texture_size: 1024,
            ..BackendCapabilities::default()
        });
        assert!(coordinator.check_resources(&light, &ctx, &mut backend));
        let Some(ShadowResources::Directional(shadows)) = coordinator.resources() else {
            panic!("expected directional resources");
        };
        assert_eq!(shadows.map_size(), 1024);
    }
}
