//! Scene context: the process-wide owner of the pipeline
//!
//! A [`SceneContext`] owns the graphics backend, the playback engine, the
//! scene registry and one coordinator per registered viewpoint and light. The
//! host keeps ownership of its [`Scene`] and hands it in once per frame.

use log::{debug, info, trace};

use crate::backend::{CapabilityFlags, GraphicsApi, GraphicsBackend, PlaybackEngine};
use crate::config::PipelineSettings;
use crate::foundation::collections::{ActorId, LightId, SecondaryMap, ViewpointId};
use crate::frame::{FrameContext, FramePhase, FrameScheduler};
use crate::render::{CoordinatorState, Degradation, FrameShadows, RenderCoordinator, RenderError, RenderStats};
use crate::scene::{RegistryEvent, Scene, SceneRegistry};
use crate::shadows::ShadowCoordinator;

/// Summary of one [`SceneContext::render_frame`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    /// Frame index
    pub frame: u64,
    /// The player was prepared during this call
    pub prepared: bool,
    /// Coordinators that rendered
    pub renderers: usize,
    /// Lights baked by the regular per-frame bake
    pub lights_baked: usize,
    /// Lights baked through the render-once fallback
    pub lights_refreshed: usize,
    /// Per-coordinator statistics summed over every viewpoint
    pub stats: RenderStats,
}

impl FrameReport {
    fn absorb(&mut self, stats: RenderStats) {
        self.renderers += 1;
        self.stats.rendered += stats.rendered;
        self.stats.failed += stats.failed;
        self.stats.composite_draws += stats.composite_draws;
        self.stats.lighting_draws += stats.lighting_draws;
        self.stats.refresh_lights |= stats.refresh_lights;
    }
}

/// Owns the backend, the registry and every coordinator
pub struct SceneContext<B: GraphicsBackend, P: PlaybackEngine> {
    backend: B,
    playback: P,
    settings: PipelineSettings,
    registry: SceneRegistry,
    renderers: SecondaryMap<ViewpointId, RenderCoordinator>,
    shadows: SecondaryMap<LightId, ShadowCoordinator>,
    scheduler: FrameScheduler,
    api: Option<GraphicsApi>,
    supported: bool,
}

impl<B: GraphicsBackend, P: PlaybackEngine> SceneContext<B, P> {
    /// Create a context; fails only when `settings` are invalid
    ///
    /// An unsupported platform is not an error: the context is created and
    /// stays inert, logging the problem once.
    pub fn init(backend: B, playback: P, settings: PipelineSettings) -> Result<Self, RenderError> {
        info!("Initializing volumetric scene context...");
        settings
            .validate()
            .map_err(|e| RenderError::InitializationFailed(format!("Pipeline settings: {e}")))?;
        let mut context = Self {
            backend,
            playback,
            settings,
            registry: SceneRegistry::new(),
            renderers: SecondaryMap::new(),
            shadows: SecondaryMap::new(),
            scheduler: FrameScheduler::new(),
            api: None,
            supported: false,
        };
        context.check_device();
        Ok(context)
    }

    /// Release every coordinator and hand the collaborators back
    pub fn teardown(mut self) -> (B, P) {
        self.release_all();
        self.registry.clear();
        info!("Volumetric scene context shut down");
        (self.backend, self.playback)
    }

    /// True while the backend can run the pipeline
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Register an actor; every coordinator creates a bundle for it
    pub fn add_actor(&mut self, actor: ActorId) -> bool {
        let added = self.registry.add(actor);
        self.dispatch_events();
        added
    }

    /// Unregister an actor and dispose its bundles
    pub fn remove_actor(&mut self, actor: ActorId) -> bool {
        let removed = self.registry.remove(actor);
        self.dispatch_events();
        removed
    }

    /// Register a shadow-casting light
    pub fn add_light(&mut self, light: LightId) -> bool {
        if !self.registry.add(light) {
            return false;
        }
        self.shadows.insert(light, ShadowCoordinator::new(light));
        true
    }

    /// Unregister a light and release its shadow resources
    pub fn remove_light(&mut self, light: LightId) -> bool {
        if !self.registry.remove(light) {
            return false;
        }
        if let Some(mut coordinator) = self.shadows.remove(light) {
            coordinator.dispose(&mut self.backend);
        }
        true
    }

    /// Register a viewpoint; its coordinator gets bundles for every registered actor
    pub fn add_renderer(&mut self, viewpoint: ViewpointId) -> bool {
        if !self.registry.add(viewpoint) {
            return false;
        }
        self.renderers.insert(viewpoint, RenderCoordinator::new(viewpoint));
        self.dispatch_events();
        true
    }

    /// Unregister a viewpoint and dispose its coordinator
    pub fn remove_renderer(&mut self, viewpoint: ViewpointId) -> bool {
        if !self.registry.remove(viewpoint) {
            return false;
        }
        if let Some(mut coordinator) = self.renderers.remove(viewpoint) {
            coordinator.dispose(&mut self.backend);
        }
        true
    }

    /// Forward queued registry notifications to the coordinators
    fn dispatch_events(&mut self) {
        for event in self.registry.drain_events() {
            match event {
                RegistryEvent::ActorAdded(actor) => {
                    for coordinator in self.renderers.values_mut() {
                        coordinator.on_actor_added(actor, self.settings.z_bias_range);
                    }
                }
                RegistryEvent::ActorRemoved(actor) => {
                    for coordinator in self.renderers.values_mut() {
                        coordinator.on_actor_removed(actor, &mut self.backend);
                    }
                }
                RegistryEvent::RendererAdded(viewpoint) => {
                    let actors = self.registry.objects::<ActorId>();
                    if let Some(coordinator) = self.renderers.get_mut(viewpoint) {
                        for actor in actors {
                            coordinator.on_actor_added(actor, self.settings.z_bias_range);
                        }
                    }
                }
            }
        }
    }

    /// Drop registrations whose objects left the scene
    fn prune(&mut self, scene: &Scene) {
        if self.registry.prune(scene) == 0 {
            return;
        }
        self.dispatch_events();
        let stale_lights: Vec<LightId> = self.shadows.keys().filter(|id| !self.registry.contains(*id)).collect();
        for id in stale_lights {
            if let Some(mut coordinator) = self.shadows.remove(id) {
                coordinator.dispose(&mut self.backend);
            }
        }
        let stale_renderers: Vec<ViewpointId> = self
            .renderers
            .keys()
            .filter(|id| !self.registry.contains(*id))
            .collect();
        for id in stale_renderers {
            if let Some(mut coordinator) = self.renderers.remove(id) {
                coordinator.dispose(&mut self.backend);
            }
        }
    }

    /// Tear everything down when the graphics API changed since the last check
    fn check_device(&mut self) {
        let caps = self.backend.capabilities();
        if self.api == Some(caps.api) {
            return;
        }
        if let Some(previous) = self.api {
            info!("Graphics API changed from {previous:?} to {:?}; rebuilding", caps.api);
            self.release_all();
        }
        self.api = Some(caps.api);
        self.supported = caps.has(CapabilityFlags::SUPPORTED);
        if !self.supported {
            Degradation::UnsupportedPlatform.report(&format!("{:?} cannot run volumetric rendering", caps.api));
        }
    }

    fn release_all(&mut self) {
        for coordinator in self.shadows.values_mut() {
            coordinator.dispose(&mut self.backend);
        }
        for coordinator in self.renderers.values_mut() {
            coordinator.release_resources(&mut self.backend);
        }
        self.scheduler.reset();
    }

    /// Render `frame` for every registered viewpoint
    pub fn render_frame(&mut self, scene: &Scene, frame: u64) -> FrameReport {
        self.run_frame(scene, frame, false)
    }

    /// Render the current frame again, preparing the player even if it already was
    pub fn force_redraw(&mut self, scene: &Scene) -> FrameReport {
        let frame = self.scheduler.frame();
        self.run_frame(scene, frame, true)
    }

    fn run_frame(&mut self, scene: &Scene, frame: u64, force: bool) -> FrameReport {
        let mut report = FrameReport {
            frame,
            ..FrameReport::default()
        };
        self.check_device();
        if !self.supported {
            return report;
        }
        self.prune(scene);

        let actors: Vec<ActorId> = self.registry.objects();
        let lights: Vec<LightId> = self.registry.objects();
        let viewpoints: Vec<ViewpointId> = self.registry.objects();
        let Self {
            backend,
            playback,
            settings,
            renderers,
            shadows,
            scheduler,
            ..
        } = self;
        let backend: &mut dyn GraphicsBackend = backend;
        let settings = &*settings;
        scheduler.begin_frame(frame);

        scheduler.enter(FramePhase::CheckResources);
        for id in &viewpoints {
            let (Some(viewpoint), Some(coordinator)) = (scene.viewpoints.get(*id), renderers.get_mut(*id)) else {
                continue;
            };
            if !viewpoint.enabled {
                if coordinator.state() != CoordinatorState::Disabled {
                    debug!("{}: viewpoint disabled", viewpoint.name);
                    coordinator.dispose(backend);
                }
                continue;
            }
            if coordinator.state() == CoordinatorState::Disabled {
                coordinator.enable();
                for actor in &actors {
                    coordinator.on_actor_added(*actor, settings.z_bias_range);
                }
            }
            coordinator.check_resources(viewpoint, settings, backend);
            coordinator.clear_command_lists(backend);
            coordinator.update_viewports(viewpoint, backend);
        }

        report.prepared = scheduler.try_prepare(force);
        if report.prepared {
            scheduler.enter(FramePhase::Prepare);
            playback.update();
            let ctx = FrameContext {
                scene,
                actors: &actors,
                playback: &*playback,
                settings,
                frame,
            };
            scheduler.enter(FramePhase::DeclareVisibility);
            for id in &lights {
                let (Some(light), Some(coordinator)) = (scene.lights.get(*id), shadows.get_mut(*id)) else {
                    continue;
                };
                if !light.enabled {
                    coordinator.dispose(backend);
                    continue;
                }
                coordinator.check_resources(light, &ctx, backend);
                coordinator.clear_command_lists(backend);
                coordinator.will_render(light, &ctx, backend);
            }
            for id in &viewpoints {
                if let (Some(viewpoint), Some(coordinator)) = (scene.viewpoints.get(*id), renderers.get_mut(*id)) {
                    if viewpoint.enabled {
                        coordinator.will_render(viewpoint, &ctx, backend);
                    }
                }
            }
            let main = scene.main_viewpoint();
            backend.prepare_frame(main.and_then(|vp| vp.target_color), main.and_then(|vp| vp.target_depth));
        }

        let ctx = FrameContext {
            scene,
            actors: &actors,
            playback: &*playback,
            settings,
            frame,
        };
        scheduler.enter(FramePhase::Bake);
        let mut baked = Vec::new();
        for id in &lights {
            let (Some(light), Some(coordinator)) = (scene.lights.get(*id), shadows.get_mut(*id)) else {
                continue;
            };
            if !light.enabled {
                continue;
            }
            if !light.realtime {
                if coordinator.render_once(light, &ctx, backend) {
                    report.lights_refreshed += 1;
                }
                continue;
            }
            if renderers.values().any(|renderer| renderer.uses_light(light, &ctx)) {
                coordinator.render(light, &ctx, backend);
                baked.push(*id);
            } else {
                trace!("{}: not used by any viewpoint this frame", light.name);
            }
        }
        report.lights_baked = baked.len();

        scheduler.enter(FramePhase::Render);
        let frame_shadows = FrameShadows::new(&scene.lights, shadows, &lights);
        for id in &viewpoints {
            let (Some(viewpoint), Some(coordinator)) = (scene.viewpoints.get(*id), renderers.get_mut(*id)) else {
                continue;
            };
            if viewpoint.enabled {
                report.absorb(coordinator.render(viewpoint, &ctx, &frame_shadows, backend));
            }
        }

        if report.stats.refresh_lights {
            for id in lights.iter().filter(|id| !baked.contains(*id)) {
                let (Some(light), Some(coordinator)) = (scene.lights.get(*id), shadows.get_mut(*id)) else {
                    continue;
                };
                if light.enabled && coordinator.render_once(light, &ctx, backend) {
                    report.lights_refreshed += 1;
                }
            }
        }
        trace!(
            "frame {frame}: {} renderers, {} baked, {} refreshed",
            report.renderers,
            report.lights_baked,
            report.lights_refreshed
        );
        report
    }

    /// Graphics backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable graphics backend
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Playback engine
    pub fn playback(&self) -> &P {
        &self.playback
    }

    /// Mutable playback engine
    pub fn playback_mut(&mut self) -> &mut P {
        &mut self.playback
    }

    /// Current settings
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Replace the settings; coordinators pick the change up as drift next frame
    pub fn set_settings(&mut self, settings: PipelineSettings) -> Result<(), RenderError> {
        settings
            .validate()
            .map_err(|e| RenderError::InitializationFailed(format!("Pipeline settings: {e}")))?;
        self.settings = settings;
        Ok(())
    }

    /// Scene registry
    pub fn registry(&self) -> &SceneRegistry {
        &self.registry
    }

    /// Render coordinator of a registered viewpoint
    pub fn renderer(&self, viewpoint: ViewpointId) -> Option<&RenderCoordinator> {
        self.renderers.get(viewpoint)
    }

    /// Shadow coordinator of a registered light
    pub fn shadow(&self, light: LightId) -> Option<&ShadowCoordinator> {
        self.shadows.get(light)
    }

    /// Frame scheduler
    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessBackend, StaticPlayback};
    use crate::backend::{AssetHandle, BackendCapabilities};
    use crate::foundation::math::{Transform, Vec3};
    use crate::scene::{Aabb, Actor, Light, Material, MaterialId, Viewpoint};

    type Context = SceneContext<HeadlessBackend, StaticPlayback>;

    fn setup() -> (Scene, Context, ViewpointId) {
        let mut scene = Scene::new();
        let camera = scene.viewpoints.insert(Viewpoint::perspective(
            "main",
            Transform::identity(),
            60.0,
            0.3,
            100.0,
            320,
            200,
        ));
        scene.main_viewpoint = Some(camera);
        let mut context = SceneContext::init(HeadlessBackend::new(), StaticPlayback::new(), PipelineSettings::default()).unwrap();
        context.add_renderer(camera);
        (scene, context, camera)
    }

    fn add_actor(scene: &mut Scene, context: &mut Context, z: f32) -> ActorId {
        let asset = AssetHandle(scene.actors.len() as u64 + 1);
        context
            .playback_mut()
            .insert(asset, Aabb::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5)));
        let id = scene.actors.insert(
            Actor::new("actor", Transform::from_position(Vec3::new(0.0, 0.0, -z)))
                .with_asset(asset)
                .with_material(Material::opaque(MaterialId(1))),
        );
        context.add_actor(id);
        id
    }

    #[test]
    fn test_invalid_settings_fail_init() {
        let settings = PipelineSettings::default().with_swap_chain_length(1);
        let result = SceneContext::init(HeadlessBackend::new(), StaticPlayback::new(), settings);
        assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
    }

    #[test]
    fn test_registry_events_reach_coordinators() {
        let (mut scene, mut context, camera) = setup();
        let actor = add_actor(&mut scene, &mut context, 5.0);
        assert!(context.renderer(camera).unwrap().bundle(actor).is_some());

        let late = scene.viewpoints.insert(Viewpoint::perspective("late", Transform::identity(), 60.0, 0.3, 50.0, 64, 64));
        context.add_renderer(late);
        assert!(context.renderer(late).unwrap().bundle(actor).is_some());

        assert!(context.remove_actor(actor));
        assert!(!context.remove_actor(actor));
        assert!(context.renderer(camera).unwrap().bundles().is_empty());
        assert!(context.renderer(late).unwrap().bundles().is_empty());
    }

    #[test]
    fn test_prepare_runs_once_per_frame_unless_forced() {
        let (mut scene, mut context, _) = setup();
        add_actor(&mut scene, &mut context, 5.0);
        assert!(context.render_frame(&scene, 1).prepared);
        assert!(!context.render_frame(&scene, 1).prepared);
        assert_eq!(context.backend().prepare_count(), 1);
        assert!(context.force_redraw(&scene).prepared);
        assert_eq!(context.backend().prepare_count(), 2);
        assert!(context.render_frame(&scene, 2).prepared);
        assert_eq!(context.playback().updates(), 3);
    }

    #[test]
    fn test_despawned_actor_is_pruned_before_rendering() {
        let (mut scene, mut context, camera) = setup();
        let actor = add_actor(&mut scene, &mut context, 5.0);
        context.render_frame(&scene, 1);
        assert_eq!(context.backend().targets_named("hvr_buffers").len(), 3);

        scene.actors.remove(actor);
        let report = context.render_frame(&scene, 2);
        assert!(!context.registry().contains(actor));
        assert!(context.renderer(camera).unwrap().bundles().is_empty());
        assert!(context.backend().targets_named("hvr_buffers").is_empty());
        assert_eq!(report.stats.rendered, 0);
    }

    #[test]
    fn test_stale_id_between_frames_can_still_be_unregistered() {
        let (mut scene, mut context, camera) = setup();
        let actor = add_actor(&mut scene, &mut context, 5.0);
        context.render_frame(&scene, 1);

        scene.actors.remove(actor);
        assert!(context.registry().contains(actor));
        assert!(context.remove_actor(actor));
        assert!(context.renderer(camera).unwrap().bundles().is_empty());
        assert!(context.backend().targets_named("hvr_buffers").is_empty());
        assert!(!context.remove_actor(actor));
    }

    #[test]
    fn test_unused_light_is_not_baked() {
        let (mut scene, mut context, _) = setup();
        let light = scene.lights.insert(Light::spot("spot", Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.0, 0.0, -5.0), 20.0, 45.0));
        context.add_light(light);
        let report = context.render_frame(&scene, 1);
        assert_eq!(report.lights_baked, 0);
        assert_eq!(context.shadow(light).unwrap().record_count(), 1);

        add_actor(&mut scene, &mut context, 5.0);
        let report = context.render_frame(&scene, 2);
        assert_eq!(report.lights_baked, 1);
        assert_eq!(report.stats.composite_draws, 1);
    }

    #[test]
    fn test_baked_light_renders_once() {
        let (mut scene, mut context, _) = setup();
        add_actor(&mut scene, &mut context, 5.0);
        let light = scene
            .lights
            .insert(Light::spot("baked", Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.0, 0.0, -5.0), 20.0, 45.0).baked());
        context.add_light(light);
        assert_eq!(context.render_frame(&scene, 1).lights_refreshed, 1);
        assert_eq!(context.render_frame(&scene, 2).lights_refreshed, 0);
        assert_eq!(context.render_frame(&scene, 3).lights_baked, 0);
    }

    #[test]
    fn test_disabled_light_releases_resources() {
        let (mut scene, mut context, _) = setup();
        let light = scene.lights.insert(Light::point("bulb", Vec3::new(0.0, 2.0, -4.0), 10.0));
        context.add_light(light);
        context.render_frame(&scene, 1);
        assert_eq!(context.shadow(light).unwrap().record_count(), 6);

        scene.lights[light].enabled = false;
        context.render_frame(&scene, 2);
        assert_eq!(context.shadow(light).unwrap().record_count(), 0);
        assert!(context.backend().targets_named("hvr_point").is_empty());

        assert!(context.remove_light(light));
        assert!(context.shadow(light).is_none());
    }

    #[test]
    fn test_disabled_viewpoint_disposes_and_recovers() {
        let (mut scene, mut context, camera) = setup();
        let actor = add_actor(&mut scene, &mut context, 5.0);
        context.render_frame(&scene, 1);
        scene.viewpoints[camera].enabled = false;
        let report = context.render_frame(&scene, 2);
        assert_eq!(report.renderers, 0);
        assert_eq!(context.renderer(camera).unwrap().state(), CoordinatorState::Disabled);
        assert_eq!(context.backend().live_list_count(), 0);

        scene.viewpoints[camera].enabled = true;
        let report = context.render_frame(&scene, 3);
        assert_eq!(report.renderers, 1);
        assert!(context.renderer(camera).unwrap().bundle(actor).is_some());
    }

    #[test]
    fn test_unsupported_platform_stays_inert() {
        let backend = HeadlessBackend::with_capabilities(BackendCapabilities {
            api: GraphicsApi::OpenGlEs,
            flags: CapabilityFlags::empty(),
            ..BackendCapabilities::default()
        });
        let mut scene = Scene::new();
        let camera = scene.viewpoints.insert(Viewpoint::perspective("main", Transform::identity(), 60.0, 0.3, 100.0, 64, 64));
        let mut context = SceneContext::init(backend, StaticPlayback::new(), PipelineSettings::default()).unwrap();
        context.add_renderer(camera);
        assert!(!context.is_supported());
        let report = context.render_frame(&scene, 1);
        assert!(!report.prepared);
        assert_eq!(context.backend().live_list_count(), 0);
    }

    #[test]
    fn test_device_change_rebuilds_everything() {
        let (mut scene, mut context, camera) = setup();
        let actor = add_actor(&mut scene, &mut context, 5.0);
        let light = scene.lights.insert(Light::directional("sun", -Vec3::y()));
        context.add_light(light);
        context.render_frame(&scene, 1);
        let created = context.backend().targets_created();

        context.backend_mut().set_capabilities(BackendCapabilities {
            api: GraphicsApi::Vulkan,
            ..BackendCapabilities::default()
        });
        let report = context.render_frame(&scene, 2);
        assert!(report.prepared);
        assert!(context.backend().targets_created() > created);
        assert!(context.renderer(camera).unwrap().bundle(actor).is_some());
        assert_eq!(context.shadow(light).unwrap().record_count(), 4);
    }

    #[test]
    fn test_teardown_releases_backend_objects() {
        let (mut scene, mut context, _) = setup();
        add_actor(&mut scene, &mut context, 5.0);
        let light = scene.lights.insert(Light::point("bulb", Vec3::new(0.0, 2.0, -4.0), 10.0));
        context.add_light(light);
        context.render_frame(&scene, 1);
        let (backend, _) = context.teardown();
        assert_eq!(backend.live_target_count(), 0);
        assert_eq!(backend.live_list_count(), 0);
        assert_eq!(backend.live_viewport_count(), 0);
    }
}
