//! Per-viewpoint render coordinator
//!
//! A [`RenderCoordinator`] owns one [`RenderBundle`] per registered actor and
//! records everything its viewpoint needs to draw them: each actor is rendered
//! into private buffers, lit by every contributing light, and composited into
//! the viewpoint through command lists attached at the right pass events.

use log::{debug, trace, warn};

use super::{sort_back_to_front, BufferSet, Degradation, RenderBundle, ViewportDescriptor, ViewportSwapChain};
use crate::backend::{
    AssetHandle, BackendCapabilities, BackendResult, CapabilityFlags, CommandListHandle, GraphicsBackend, ListOwner,
    MaterialRef, Mesh, PassEvent, PropertyBlock, RenderCommand, TargetDesc, TargetFormat, TargetHandle, Uniform,
};
use crate::config::{PipelineSettings, ShadowsSetting};
use crate::foundation::collections::{ActorId, LightId, SecondaryMap, SlotMap, ViewpointId};
use crate::foundation::math::{Mat4, Vec3, Vec4, CLEAR_BLACK, WHITE};
use crate::frame::FrameContext;
use crate::scene::{Actor, ActorFlags, ClearMode, Light, LightKind, Material, RenderMode, RenderPath, ShadowMode, Viewpoint};
use crate::shadows::ShadowCoordinator;

const OPAQUE_LIST: &str = "hvr_render.opaque";
const OPAQUE_COMPOSITE_LIST: &str = "hvr_render.opaque.composite";
const TRANSPARENT_LIST: &str = "hvr_render.transparent";
const TRANSPARENT_COMPOSITE_LIST: &str = "hvr_render.transparent.composite";
const DEPTH_LIST: &str = "hvr_render.depth";

/// Base lighting pass for actors that ignore scene lights
const UNLIT_PASS: u32 = 5;

/// Lifecycle of a render coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatorState {
    /// Everything released; nothing is rendered
    Disabled,
    /// Enabled but resources not checked yet
    Enabled,
    /// Command lists match the viewpoint settings
    ResourcesValid,
    /// Command lists are stale and are rebuilt on the next check
    ResourcesInvalidated,
}

/// What one coordinator did in one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    /// Actors drawn into their buffers or the viewpoint target
    pub rendered: usize,
    /// Visible, drawable actors that failed to render
    pub failed: usize,
    /// Composite draws recorded
    pub composite_draws: usize,
    /// Lighting draws recorded, base passes included
    pub lighting_draws: usize,
    /// Lights should bake once because a set rendered nothing or failed
    pub refresh_lights: bool,
}

/// Lights and their shadow state as seen by the render coordinators
#[derive(Clone, Copy)]
pub struct FrameShadows<'a> {
    lights: &'a SlotMap<LightId, Light>,
    coordinators: &'a SecondaryMap<LightId, ShadowCoordinator>,
    order: &'a [LightId],
}

impl<'a> FrameShadows<'a> {
    /// View over the lights in `order`
    pub fn new(
        lights: &'a SlotMap<LightId, Light>,
        coordinators: &'a SecondaryMap<LightId, ShadowCoordinator>,
        order: &'a [LightId],
    ) -> Self {
        Self {
            lights,
            coordinators,
            order,
        }
    }

    /// Lights that light actors on `layer` this frame, in registration order
    pub fn contributing(&self, layer: u32) -> impl Iterator<Item = (LightId, &'a Light)> + 'a {
        let lights = self.lights;
        self.order.iter().filter_map(move |id| {
            lights
                .get(*id)
                .filter(|light| light.enabled && light.realtime && light.affects_layer(layer))
                .map(|light| (*id, light))
        })
    }

    /// Shadow coordinator of `light`
    pub fn coordinator(&self, light: LightId) -> Option<&'a ShadowCoordinator> {
        self.coordinators.get(light)
    }
}

/// Command lists one coordinator records into
#[derive(Debug, Clone, Copy)]
struct CoordinatorLists {
    opaque: CommandListHandle,
    opaque_composite: CommandListHandle,
    transparent: CommandListHandle,
    transparent_composite: CommandListHandle,
    depth: CommandListHandle,
    opaque_event: PassEvent,
    depth_attached: bool,
}

impl CoordinatorLists {
    fn create(
        owner: ListOwner,
        path: RenderPath,
        clear: ClearMode,
        samples: u32,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<Self> {
        let names = [OPAQUE_LIST, OPAQUE_COMPOSITE_LIST, TRANSPARENT_LIST, TRANSPARENT_COMPOSITE_LIST, DEPTH_LIST];
        let mut created = Vec::with_capacity(names.len());
        for name in names {
            match backend.create_command_list(name) {
                Ok(list) => created.push(list),
                Err(err) => {
                    for list in created {
                        backend.release_command_list(list);
                    }
                    return Err(err);
                }
            }
        }
        let mut lists = Self {
            opaque: created[0],
            opaque_composite: created[1],
            transparent: created[2],
            transparent_composite: created[3],
            depth: created[4],
            opaque_event: opaque_event(path, clear),
            depth_attached: false,
        };
        backend.attach_command_list(lists.opaque, owner, lists.opaque_event);
        backend.attach_command_list(lists.opaque_composite, owner, lists.opaque_event);
        backend.attach_command_list(lists.transparent, owner, PassEvent::AfterForwardAlpha);
        backend.attach_command_list(lists.transparent_composite, owner, PassEvent::AfterForwardAlpha);
        lists.attach_depth(owner, samples, backend);
        Ok(lists)
    }

    /// The depth composite only runs while the viewpoint is not multi-sampled
    fn attach_depth(&mut self, owner: ListOwner, samples: u32, backend: &mut dyn GraphicsBackend) {
        let wanted = samples <= 1;
        if wanted == self.depth_attached {
            return;
        }
        if wanted {
            backend.attach_command_list(self.depth, owner, PassEvent::AfterDepthTexture);
        } else {
            backend.detach_command_list(self.depth, owner, PassEvent::AfterDepthTexture);
        }
        self.depth_attached = wanted;
    }

    fn all(&self) -> [CommandListHandle; 5] {
        [
            self.opaque,
            self.opaque_composite,
            self.transparent,
            self.transparent_composite,
            self.depth,
        ]
    }

    fn clear(&self, backend: &mut dyn GraphicsBackend) {
        for list in self.all() {
            backend.clear_command_list(list);
        }
    }

    fn release(&self, owner: ListOwner, backend: &mut dyn GraphicsBackend) {
        backend.detach_command_list(self.opaque, owner, self.opaque_event);
        backend.detach_command_list(self.opaque_composite, owner, self.opaque_event);
        backend.detach_command_list(self.transparent, owner, PassEvent::AfterForwardAlpha);
        backend.detach_command_list(self.transparent_composite, owner, PassEvent::AfterForwardAlpha);
        if self.depth_attached {
            backend.detach_command_list(self.depth, owner, PassEvent::AfterDepthTexture);
        }
        for list in self.all() {
            backend.release_command_list(list);
        }
    }
}

/// Pass event the opaque lists attach to
fn opaque_event(path: RenderPath, clear: ClearMode) -> PassEvent {
    match (path, clear) {
        (RenderPath::Deferred, _) => PassEvent::BeforeImageEffectsOpaque,
        (RenderPath::Forward, ClearMode::Skybox) => PassEvent::AfterSkybox,
        (RenderPath::Forward, _) => PassEvent::AfterForwardOpaque,
    }
}

/// Viewpoint settings the command lists were built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CachedViewState {
    render_path: RenderPath,
    clear_mode: ClearMode,
    samples: u32,
}

impl CachedViewState {
    fn capture(viewpoint: &Viewpoint, settings: &PipelineSettings) -> Self {
        let samples = match viewpoint.render_mode {
            RenderMode::Direct => 1,
            RenderMode::Standard => settings.quality.anti_aliasing.max(1),
        };
        Self {
            render_path: viewpoint.render_path,
            clear_mode: viewpoint.clear_mode,
            samples,
        }
    }
}

/// Actors in the order one frame draws them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawOrder {
    /// Opaque actors in bundle order
    pub opaque: Vec<ActorId>,
    /// Transparent actors, farthest first
    pub transparent: Vec<ActorId>,
}

/// Per-frame inputs shared by every actor draw
struct DrawInputs<'a> {
    viewpoint: &'a Viewpoint,
    ctx: &'a FrameContext<'a>,
    shadows: &'a FrameShadows<'a>,
    viewport: &'a ViewportDescriptor,
    caps: BackendCapabilities,
    dummy: Option<TargetHandle>,
    dummy_cube: Option<TargetHandle>,
}

/// Draws every registered actor for one viewpoint
#[derive(Debug)]
pub struct RenderCoordinator {
    viewpoint: ViewpointId,
    state: CoordinatorState,
    bundles: Vec<RenderBundle>,
    lists: Option<CoordinatorLists>,
    cached: Option<CachedViewState>,
    swap_chain: Option<ViewportSwapChain>,
    viewport: Option<ViewportDescriptor>,
    dummy_texture: Option<TargetHandle>,
    dummy_cube: Option<TargetHandle>,
}

impl RenderCoordinator {
    /// Create an enabled coordinator with no resources
    pub fn new(viewpoint: ViewpointId) -> Self {
        Self {
            viewpoint,
            state: CoordinatorState::Enabled,
            bundles: Vec::new(),
            lists: None,
            cached: None,
            swap_chain: None,
            viewport: None,
            dummy_texture: None,
            dummy_cube: None,
        }
    }

    /// Viewpoint this coordinator draws for
    pub fn viewpoint_id(&self) -> ViewpointId {
        self.viewpoint
    }

    /// Current lifecycle state
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    fn owner(&self) -> ListOwner {
        ListOwner::Viewpoint(self.viewpoint)
    }

    /// Create a bundle for a newly registered actor
    pub fn on_actor_added(&mut self, actor: ActorId, z_bias_range: f32) {
        if self.bundle(actor).is_none() {
            self.bundles.push(RenderBundle::new(actor, z_bias_range));
        }
    }

    /// Dispose the bundle of an unregistered actor
    pub fn on_actor_removed(&mut self, actor: ActorId, backend: &mut dyn GraphicsBackend) {
        if let Some(index) = self.bundles.iter().position(|bundle| bundle.actor == actor) {
            let mut bundle = self.bundles.remove(index);
            bundle.dispose(backend);
            Degradation::TemporalRace.report("bundle buffers released while the last frame may still read them");
        }
    }

    /// Bundle of `actor`
    pub fn bundle(&self, actor: ActorId) -> Option<&RenderBundle> {
        self.bundles.iter().find(|bundle| bundle.actor == actor)
    }

    /// All bundles in registration order
    pub fn bundles(&self) -> &[RenderBundle] {
        &self.bundles
    }

    /// Viewport descriptor written for this frame
    pub fn viewport(&self) -> Option<&ViewportDescriptor> {
        self.viewport.as_ref()
    }

    /// Mark the command lists stale, e.g. after a device change
    pub fn invalidate(&mut self) {
        if self.state != CoordinatorState::Disabled {
            self.state = CoordinatorState::ResourcesInvalidated;
        }
    }

    /// Re-enable a disabled coordinator; resources are rebuilt on the next check
    pub fn enable(&mut self) {
        if self.state == CoordinatorState::Disabled {
            self.state = CoordinatorState::Enabled;
        }
    }

    /// Rebuild command lists if the viewpoint's path, clear mode or sample count changed
    ///
    /// Bundles survive every rebuild. A sample-count change alone only moves
    /// the depth composite list. Returns true when anything was rebuilt.
    pub fn check_resources(&mut self, viewpoint: &Viewpoint, settings: &PipelineSettings, backend: &mut dyn GraphicsBackend) -> bool {
        if self.state == CoordinatorState::Disabled {
            return false;
        }
        let state = CachedViewState::capture(viewpoint, settings);
        let owner = self.owner();
        let mut rebuilt = false;

        if let (Some(cached), Some(lists)) = (self.cached, self.lists.as_mut()) {
            let lists_stale = cached.render_path != state.render_path || cached.clear_mode != state.clear_mode;
            if lists_stale || self.state == CoordinatorState::ResourcesInvalidated {
                Degradation::ResourceDrift.report(&format!("{}: render path or clear mode changed", viewpoint.name));
                lists.release(owner, backend);
                self.lists = None;
            } else if cached.samples != state.samples {
                Degradation::ResourceDrift.report(&format!(
                    "{}: samples {} -> {}",
                    viewpoint.name, cached.samples, state.samples
                ));
                lists.attach_depth(owner, state.samples, backend);
                rebuilt = true;
            }
        }

        if self.lists.is_none() {
            match CoordinatorLists::create(owner, state.render_path, state.clear_mode, state.samples, backend) {
                Ok(lists) => {
                    debug!("{}: command lists attached at {:?}", viewpoint.name, lists.opaque_event);
                    self.lists = Some(lists);
                    rebuilt = true;
                }
                Err(err) => {
                    warn!("{}: command lists unavailable: {err}", viewpoint.name);
                    self.state = CoordinatorState::ResourcesInvalidated;
                    self.cached = Some(state);
                    return false;
                }
            }
        }

        if self.swap_chain.is_none() {
            match ViewportSwapChain::new(settings.swap_chain_length, backend) {
                Ok(chain) => self.swap_chain = Some(chain),
                Err(err) => warn!("{}: viewport swap chain unavailable: {err}", viewpoint.name),
            }
        }
        if let Some(chain) = &mut self.swap_chain {
            chain.set_samples(state.samples);
        }

        self.cached = Some(state);
        self.state = CoordinatorState::ResourcesValid;
        rebuilt
    }

    /// Empty every command list before recording a new frame
    pub fn clear_command_lists(&self, backend: &mut dyn GraphicsBackend) {
        if let Some(lists) = &self.lists {
            lists.clear(backend);
        }
    }

    /// Write this frame's viewport descriptor for the active eye
    pub fn update_viewports(&mut self, viewpoint: &Viewpoint, backend: &mut dyn GraphicsBackend) {
        self.viewport = None;
        let Some(chain) = &mut self.swap_chain else {
            return;
        };
        let matrices = viewpoint.eye_matrices(viewpoint.active_eye());
        let rect = viewpoint.pixel_rect;
        self.viewport = chain.next_viewport(
            matrices.view,
            backend.gpu_projection(&matrices.projection, true),
            rect.x,
            rect.y,
            rect.width,
            rect.height,
        );
    }

    /// Refresh visibility of every bundle and declare the visible actors
    pub fn will_render(&mut self, viewpoint: &Viewpoint, ctx: &FrameContext<'_>, backend: &mut dyn GraphicsBackend) {
        if self.state != CoordinatorState::ResourcesValid {
            return;
        }
        let matrices = viewpoint.eye_matrices(viewpoint.active_eye());
        let view_projection = matrices.projection * matrices.view;
        let camera = viewpoint.transform.position;
        for bundle in &mut self.bundles {
            let Some(actor) = ctx.scene.actors.get(bundle.actor) else {
                continue;
            };
            let bounds = ctx.local_bounds(actor);
            bundle.update_visibility(actor, bounds.as_ref(), &camera, &view_projection);
            if !bundle.visible {
                continue;
            }
            match (actor.asset, &self.viewport) {
                (Some(asset), Some(viewport)) => backend.declare_visibility(asset, viewport),
                (None, _) => Degradation::MissingDependency.report(&format!("{}: no asset to declare", actor.name)),
                (Some(_), None) => {}
            }
        }
    }

    /// True if a visible, lit actor this coordinator draws is in `light`'s culling mask
    pub fn uses_light(&self, light: &Light, ctx: &FrameContext<'_>) -> bool {
        if self.state != CoordinatorState::ResourcesValid {
            return false;
        }
        let direct = ctx
            .scene
            .viewpoints
            .get(self.viewpoint)
            .is_some_and(|vp| vp.render_mode == RenderMode::Direct);
        if direct {
            return false;
        }
        self.bundles.iter().filter(|bundle| bundle.visible).any(|bundle| {
            ctx.scene.actors.get(bundle.actor).is_some_and(|actor| {
                is_drawable(actor) && actor.has(ActorFlags::USE_LIGHTING) && light.affects_layer(actor.layer)
            })
        })
    }

    /// Split visible, drawable bundles into opaque and back-to-front transparent
    pub fn draw_order(&self, ctx: &FrameContext<'_>) -> DrawOrder {
        let mut opaque = Vec::new();
        let mut transparent: Vec<&RenderBundle> = Vec::new();
        for bundle in self.bundles.iter().filter(|bundle| bundle.visible) {
            let Some(actor) = ctx.scene.actors.get(bundle.actor) else {
                continue;
            };
            if !is_drawable(actor) {
                continue;
            }
            if actor.is_transparent() {
                transparent.push(bundle);
            } else {
                opaque.push(bundle.actor);
            }
        }
        sort_back_to_front(&mut transparent);
        DrawOrder {
            opaque,
            transparent: transparent.iter().map(|bundle| bundle.actor).collect(),
        }
    }

    /// Draw every visible actor for this frame
    pub fn render(
        &mut self,
        viewpoint: &Viewpoint,
        ctx: &FrameContext<'_>,
        shadows: &FrameShadows<'_>,
        backend: &mut dyn GraphicsBackend,
    ) -> RenderStats {
        if self.state != CoordinatorState::ResourcesValid {
            return RenderStats::default();
        }
        match viewpoint.render_mode {
            RenderMode::Standard => self.render_standard(viewpoint, ctx, shadows, backend),
            RenderMode::Direct => self.render_direct(viewpoint, ctx, backend),
        }
    }

    fn render_direct(&mut self, viewpoint: &Viewpoint, ctx: &FrameContext<'_>, backend: &mut dyn GraphicsBackend) -> RenderStats {
        let mut stats = RenderStats::default();
        if backend.capabilities().has(CapabilityFlags::NO_DIRECT_MODE) {
            Degradation::CapabilityFallback.report(&format!("{}: direct mode unavailable", viewpoint.name));
            return stats;
        }
        let Some(viewport) = &self.viewport else {
            return stats;
        };
        let order = self.draw_order(ctx);
        for id in order.opaque.iter().chain(&order.transparent) {
            let Some(asset) = ctx.scene.actors.get(*id).and_then(|actor| actor.asset) else {
                continue;
            };
            if backend.render_actor(asset, viewport, viewpoint.target_color, viewpoint.target_depth) {
                stats.rendered += 1;
            } else {
                stats.failed += 1;
            }
        }
        stats
    }

    fn render_standard(
        &mut self,
        viewpoint: &Viewpoint,
        ctx: &FrameContext<'_>,
        shadows: &FrameShadows<'_>,
        backend: &mut dyn GraphicsBackend,
    ) -> RenderStats {
        let mut stats = RenderStats::default();
        let (Some(lists), Some(viewport)) = (self.lists, self.viewport.clone()) else {
            return stats;
        };
        let caps = backend.capabilities();
        let order = self.draw_order(ctx);
        let needs_dummy = !caps.has(CapabilityFlags::SKIP_LIGHTING_PASS) && !(order.opaque.is_empty() && order.transparent.is_empty());
        let dummy = if needs_dummy { self.dummy_texture(backend) } else { None };
        let dummy_cube = if needs_dummy { self.dummy_cube(backend) } else { None };
        let inputs = DrawInputs {
            viewpoint,
            ctx,
            shadows,
            viewport: &viewport,
            caps,
            dummy,
            dummy_cube,
        };

        let mut opaque_depths = Vec::with_capacity(order.opaque.len());
        let opaque_ok = self.render_set(&order.opaque, (lists.opaque, lists.opaque_composite), &inputs, &mut stats, &mut opaque_depths, backend);
        for depth in opaque_depths {
            let mut properties = PropertyBlock::new();
            properties.set_texture(Uniform::Odep, depth);
            backend.record(
                lists.depth,
                RenderCommand::Draw {
                    mesh: Mesh::FullscreenQuad,
                    transform: Mat4::identity(),
                    material: MaterialRef::DepthComposite,
                    pass: 0,
                    properties,
                },
            );
        }

        let mut transparent_depths = Vec::with_capacity(order.transparent.len());
        let transparent_ok = self.render_set(
            &order.transparent,
            (lists.transparent, lists.transparent_composite),
            &inputs,
            &mut stats,
            &mut transparent_depths,
            backend,
        );

        stats.refresh_lights = !opaque_ok || !transparent_ok;
        trace!(
            "{}: rendered {} actors, {} composites, refresh lights {}",
            viewpoint.name,
            stats.rendered,
            stats.composite_draws,
            stats.refresh_lights
        );
        stats
    }

    /// Render one set; false when the set is empty or any actor failed
    fn render_set(
        &mut self,
        actors: &[ActorId],
        lists: (CommandListHandle, CommandListHandle),
        inputs: &DrawInputs<'_>,
        stats: &mut RenderStats,
        depths: &mut Vec<TargetHandle>,
        backend: &mut dyn GraphicsBackend,
    ) -> bool {
        let mut all_rendered = !actors.is_empty();
        for id in actors {
            let Some(actor) = inputs.ctx.scene.actors.get(*id) else {
                continue;
            };
            let (Some(material), Some(asset)) = (&actor.material, actor.asset) else {
                continue;
            };
            let Some(bundle) = self.bundles.iter_mut().find(|bundle| bundle.actor == *id) else {
                continue;
            };
            match render_bundle(bundle, actor, material, asset, inputs, lists, stats, backend) {
                Some(depth) => {
                    stats.rendered += 1;
                    depths.push(depth);
                }
                None => {
                    stats.failed += 1;
                    all_rendered = false;
                }
            }
        }
        all_rendered
    }

    /// 2x2 white texture bound when a light has no mask or cookie
    fn dummy_texture(&mut self, backend: &mut dyn GraphicsBackend) -> Option<TargetHandle> {
        if !self.dummy_texture.is_some_and(|dummy| backend.is_target_live(dummy)) {
            self.dummy_texture = white_target(&TargetDesc::new("hvr_dummy_white", 2, 2, TargetFormat::Color, 0), backend);
        }
        self.dummy_texture
    }

    /// 2x2 white cube map bound as the cookie of point lights without one
    fn dummy_cube(&mut self, backend: &mut dyn GraphicsBackend) -> Option<TargetHandle> {
        if !self.dummy_cube.is_some_and(|dummy| backend.is_target_live(dummy)) {
            self.dummy_cube = white_target(&TargetDesc::cube("hvr_dummy_white_cube", 2, TargetFormat::Color, 0), backend);
        }
        self.dummy_cube
    }

    /// Release every bundle, list and viewport; the coordinator stays disabled until enabled
    pub fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        self.release_resources(backend);
        self.bundles.clear();
        self.state = CoordinatorState::Disabled;
    }

    /// Release lists, viewports and buffers but keep the bundles, e.g. for a device change
    pub fn release_resources(&mut self, backend: &mut dyn GraphicsBackend) {
        let owner = self.owner();
        if let Some(lists) = self.lists.take() {
            lists.release(owner, backend);
        }
        if let Some(mut chain) = self.swap_chain.take() {
            chain.delete_viewports(backend);
        }
        for bundle in &mut self.bundles {
            bundle.dispose(backend);
        }
        for dummy in [self.dummy_texture.take(), self.dummy_cube.take()].into_iter().flatten() {
            backend.release_target(dummy);
        }
        self.viewport = None;
        self.cached = None;
        self.invalidate();
    }
}

/// Actors the standard path can draw at all
fn is_drawable(actor: &Actor) -> bool {
    actor.enabled && actor.material.is_some() && actor.asset.is_some()
}

/// Render, light and composite one bundle; returns its depth buffer on success
fn render_bundle(
    bundle: &mut RenderBundle,
    actor: &Actor,
    material: &Material,
    asset: AssetHandle,
    inputs: &DrawInputs<'_>,
    (list, composite_list): (CommandListHandle, CommandListHandle),
    stats: &mut RenderStats,
    backend: &mut dyn GraphicsBackend,
) -> Option<TargetHandle> {
    let (width, height) = inputs.viewpoint.pixel_size();
    let eye = inputs.viewpoint.active_eye();
    let buffers = match bundle.buffers.get_buffers(eye, width, height, inputs.ctx.frame, backend) {
        Ok(buffers) => buffers.clone(),
        Err(err) => {
            warn!("{}: buffers unavailable: {err}", actor.name);
            return None;
        }
    };
    if !render_into_buffers(asset, &buffers, inputs, backend) {
        return None;
    }

    let lit_color = if inputs.caps.has(CapabilityFlags::SKIP_LIGHTING_PASS) {
        buffers.color
    } else {
        stats.lighting_draws += record_lighting(list, bundle, actor, material, &buffers, inputs, backend);
        buffers.color_copy
    };

    let mut properties = PropertyBlock::new();
    properties
        .set_vector(Uniform::Tint, Vec4::from(material.tint()))
        .set_texture(Uniform::HvrColorTex, lit_color)
        .set_texture(Uniform::HvrDepthTex, buffers.depth);
    backend.record(
        composite_list,
        RenderCommand::Draw {
            mesh: Mesh::FullscreenQuad,
            transform: Mat4::identity(),
            material: MaterialRef::ColorComposite,
            pass: material.composite_pass(),
            properties,
        },
    );
    stats.composite_draws += 1;
    Some(buffers.depth)
}

/// Create `desc` and clear every layer to white
fn white_target(desc: &TargetDesc, backend: &mut dyn GraphicsBackend) -> Option<TargetHandle> {
    let target = match backend.create_target(desc) {
        Ok(target) => target,
        Err(err) => {
            warn!("{} unavailable: {err}", desc.name);
            return None;
        }
    };
    for layer in 0..desc.layers {
        backend.execute(RenderCommand::SetTarget {
            color: Some(target),
            depth: None,
            layer: (desc.layers > 1).then_some(layer),
        });
        backend.execute(RenderCommand::Clear {
            color: Some(WHITE),
            depth: None,
        });
    }
    Some(target)
}

/// Draw the actor into its color buffer and copy its depth into the linear depth buffer
fn render_into_buffers(asset: AssetHandle, buffers: &BufferSet, inputs: &DrawInputs<'_>, backend: &mut dyn GraphicsBackend) -> bool {
    if inputs.caps.has(CapabilityFlags::DEFERS_NEW_TARGETS) && buffers.created_frame == inputs.ctx.frame {
        Degradation::TemporalRace.report("buffers created this frame are cleared and drawn next frame");
        backend.execute(RenderCommand::SetTarget {
            color: Some(buffers.color),
            depth: Some(buffers.depth),
            layer: None,
        });
        backend.execute(RenderCommand::Clear {
            color: Some([1.0, 0.0, 0.0, 0.0]),
            depth: Some(1.0),
        });
        return false;
    }

    let temp = match backend.create_target(&TargetDesc::new(
        "hvr_render_temp_depth",
        buffers.width,
        buffers.height,
        TargetFormat::Depth,
        16,
    )) {
        Ok(temp) => temp,
        Err(err) => {
            warn!("temporary depth unavailable: {err}");
            return false;
        }
    };
    backend.execute(RenderCommand::SetTarget {
        color: Some(buffers.color),
        depth: Some(temp),
        layer: None,
    });
    backend.execute(RenderCommand::Clear {
        color: Some(CLEAR_BLACK),
        depth: Some(1.0),
    });
    let rendered = backend.render_actor(asset, inputs.viewport, Some(buffers.color), Some(temp));
    backend.execute(RenderCommand::Blit {
        source: Some(temp),
        dest: buffers.depth,
        material: None,
        properties: PropertyBlock::new(),
    });
    backend.release_target(temp);
    rendered
}

/// Record the base and per-light lighting draws; returns the number of draws
fn record_lighting(
    list: CommandListHandle,
    bundle: &RenderBundle,
    actor: &Actor,
    material: &Material,
    buffers: &BufferSet,
    inputs: &DrawInputs<'_>,
    backend: &mut dyn GraphicsBackend,
) -> usize {
    backend.record(
        list,
        RenderCommand::SetTarget {
            color: Some(buffers.color_copy),
            depth: None,
            layer: None,
        },
    );
    backend.record(
        list,
        RenderCommand::Clear {
            color: Some(CLEAR_BLACK),
            depth: None,
        },
    );

    let view_projection = inputs.viewport.view_projection();
    let lit = actor.has(ActorFlags::USE_LIGHTING);
    let mut base = PropertyBlock::new();
    base.set_texture(Uniform::HvrColorTex, buffers.color)
        .set_texture(Uniform::HvrDepthTex, buffers.depth)
        .set_matrix(
            Uniform::ViewProjectInverse,
            view_projection.try_inverse().unwrap_or_else(Mat4::identity),
        )
        .set_float(
            Uniform::FixedAmbientLighting,
            if inputs.ctx.settings.fixed_ambient_lighting { 1.0 } else { 0.0 },
        );
    if lit {
        base.set_vector(Uniform::CenterWorldPos, point4(&bundle.culling.position()))
            .set_vector(Uniform::CameraWorldPos, point4(&inputs.viewpoint.transform.position))
            .set_matrix(Uniform::WorldToObject, actor.transform.inverse_matrix());
    }

    let (mesh, transform) = if actor.has(ActorFlags::SCREEN_SPACE_QUAD) {
        (Mesh::FullscreenQuad, Mat4::identity())
    } else {
        (Mesh::ActorProxy, actor.transform.to_matrix())
    };
    let draw = |pass: u32, properties: PropertyBlock| RenderCommand::Draw {
        mesh,
        transform,
        material: MaterialRef::Actor(material.id),
        pass,
        properties,
    };

    let base_pass = if !lit && material.has_pass(UNLIT_PASS) { UNLIT_PASS } else { 0 };
    backend.record(list, draw(base_pass, base.clone()));
    let mut draws = 1;
    if !lit {
        return draws;
    }

    let shadows_enabled = inputs.ctx.settings.quality.shadows != ShadowsSetting::Disable;
    for (id, light) in inputs.shadows.contributing(actor.layer) {
        let mut properties = base.clone();
        let receives = actor.has(ActorFlags::RECEIVE_SHADOWS) && light.shadows != ShadowMode::None && shadows_enabled;
        properties
            .set_vector(Uniform::LightWorldPos, point4(&light.position()))
            .set_vector(Uniform::LightWorldDir, light.direction().push(0.0))
            .set_vector(Uniform::LightColorAtSource, Vec4::from(light.color))
            .set_vector(
                Uniform::LightParameters,
                Vec4::new(
                    light.intensity,
                    light.shadow_strength,
                    light.spot_angle.to_radians(),
                    1.0 / light.range.max(f32::EPSILON),
                ),
            )
            .set_vector(Uniform::ShadowParameters, Vec4::new(if receives { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0));

        let coordinator = inputs.shadows.coordinator(id);
        let pass = match light.kind {
            LightKind::Directional => {
                let mask = coordinator
                    .and_then(ShadowCoordinator::directional_mask)
                    .filter(|_| !actor.is_transparent())
                    .or(inputs.dummy);
                if let Some(mask) = mask {
                    properties.set_texture(Uniform::ScreenspaceHvrMaskTexture, mask);
                }
                2
            }
            LightKind::Point => {
                if let Some(cookie) = light.cookie.or(inputs.dummy_cube) {
                    properties.set_texture(Uniform::LightCookie, cookie);
                }
                properties.set_matrix(Uniform::WorldToLightSpace, light.transform.inverse_matrix());
                for (face, world_to_shadow, depth) in coordinator.map(ShadowCoordinator::point_faces).unwrap_or_default() {
                    properties
                        .set_matrix(Uniform::FromWorldToShadowFace(face), world_to_shadow)
                        .set_texture(Uniform::LightDepthMapFace(face), depth);
                }
                if inputs.caps.has(CapabilityFlags::NONLINEAR_POINT_DEPTH) {
                    4
                } else {
                    3
                }
            }
            LightKind::Spot => {
                if let Some(cookie) = light.cookie.or(inputs.dummy) {
                    properties.set_texture(Uniform::LightCookie, cookie);
                }
                if let Some((depth, world_to_shadow)) = coordinator.and_then(ShadowCoordinator::spot_shadow) {
                    properties
                        .set_texture(Uniform::LightDepthMap, depth)
                        .set_matrix(Uniform::FromWorldToShadow, world_to_shadow);
                }
                1
            }
        };
        if material.has_pass(pass) {
            backend.record(list, draw(pass, properties));
            draws += 1;
        }
    }
    draws
}

fn point4(p: &Vec3) -> Vec4 {
    p.push(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessBackend, PlayerCall, StaticPlayback};
    use crate::backend::UniformValue;
    use crate::foundation::math::Transform;
    use crate::scene::{Aabb, MaterialId, Scene};

    struct Fixture {
        scene: Scene,
        playback: StaticPlayback,
        settings: PipelineSettings,
        actors: Vec<ActorId>,
        camera: ViewpointId,
        lights: Vec<LightId>,
        shadow_coordinators: SecondaryMap<LightId, ShadowCoordinator>,
    }

    impl Fixture {
        fn new() -> Self {
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
            Self {
                scene,
                playback: StaticPlayback::new(),
                settings: PipelineSettings::default(),
                actors: Vec::new(),
                camera,
                lights: Vec::new(),
                shadow_coordinators: SecondaryMap::new(),
            }
        }

        fn add_actor(&mut self, z: f32, material: Material) -> ActorId {
            let asset = AssetHandle(self.actors.len() as u64 + 100);
            self.playback
                .insert(asset, Aabb::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5)));
            let id = self.scene.actors.insert(
                Actor::new(format!("actor{z}"), Transform::from_position(Vec3::new(0.0, 0.0, -z)))
                    .with_asset(asset)
                    .with_material(material),
            );
            self.actors.push(id);
            id
        }

        fn add_light(&mut self, light: Light) -> LightId {
            let id = self.scene.lights.insert(light);
            self.lights.push(id);
            id
        }

        fn ctx(&self) -> FrameContext<'_> {
            FrameContext {
                scene: &self.scene,
                actors: &self.actors,
                playback: &self.playback,
                settings: &self.settings,
                frame: 1,
            }
        }

        fn viewpoint(&self) -> &Viewpoint {
            &self.scene.viewpoints[self.camera]
        }

        fn coordinator(&self, backend: &mut HeadlessBackend) -> RenderCoordinator {
            let mut coordinator = RenderCoordinator::new(self.camera);
            for actor in &self.actors {
                coordinator.on_actor_added(*actor, self.settings.z_bias_range);
            }
            coordinator.check_resources(self.viewpoint(), &self.settings, backend);
            coordinator
        }

        fn frame(&self, coordinator: &mut RenderCoordinator, backend: &mut HeadlessBackend) -> RenderStats {
            let ctx = self.ctx();
            let viewpoint = self.viewpoint();
            coordinator.clear_command_lists(backend);
            coordinator.update_viewports(viewpoint, backend);
            coordinator.will_render(viewpoint, &ctx, backend);
            let shadows = FrameShadows::new(&self.scene.lights, &self.shadow_coordinators, &self.lights);
            coordinator.render(viewpoint, &ctx, &shadows, backend)
        }
    }

    fn list_commands<'b>(backend: &'b HeadlessBackend, name: &str) -> &'b [RenderCommand] {
        backend
            .lists_named(name)
            .into_iter()
            .find(|list| list.name == name)
            .map(|list| list.commands.as_slice())
            .unwrap_or_default()
    }

    #[test]
    fn test_lists_attach_by_render_path_and_clear_mode() {
        let fixture = Fixture::new();
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        let owner = ListOwner::Viewpoint(fixture.camera);
        let opaque = backend.lists_named(OPAQUE_LIST)[0];
        assert_eq!(opaque.attachments, vec![(owner, PassEvent::AfterSkybox)]);
        let depth = backend.lists_named(DEPTH_LIST)[0];
        assert_eq!(depth.attachments, vec![(owner, PassEvent::AfterDepthTexture)]);
        let transparent = backend.lists_named(TRANSPARENT_COMPOSITE_LIST)[0];
        assert_eq!(transparent.attachments, vec![(owner, PassEvent::AfterForwardAlpha)]);

        let mut deferred = fixture.viewpoint().clone();
        deferred.render_path = RenderPath::Deferred;
        assert!(coordinator.check_resources(&deferred, &fixture.settings, &mut backend));
        assert_eq!(backend.live_list_count(), 5);
        let opaque = backend.lists_named(OPAQUE_LIST)[0];
        assert_eq!(opaque.attachments, vec![(owner, PassEvent::BeforeImageEffectsOpaque)]);

        let mut solid = fixture.viewpoint().clone();
        solid.clear_mode = ClearMode::SolidColor;
        coordinator.check_resources(&solid, &fixture.settings, &mut backend);
        let opaque = backend.lists_named(OPAQUE_LIST)[0];
        assert_eq!(opaque.attachments, vec![(owner, PassEvent::AfterForwardOpaque)]);
    }

    #[test]
    fn test_msaa_change_moves_only_the_depth_list() {
        let mut fixture = Fixture::new();
        fixture.add_actor(5.0, Material::opaque(MaterialId(1)));
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        let created = backend.live_list_count();

        let settings = PipelineSettings::default().with_anti_aliasing(4);
        assert!(coordinator.check_resources(fixture.viewpoint(), &settings, &mut backend));
        assert_eq!(backend.live_list_count(), created);
        assert!(backend.lists_named(DEPTH_LIST)[0].attachments.is_empty());
        assert_eq!(coordinator.bundles().len(), 1);
        assert!(!coordinator.check_resources(fixture.viewpoint(), &settings, &mut backend));
    }

    #[test]
    fn test_state_machine() {
        let fixture = Fixture::new();
        let mut backend = HeadlessBackend::new();
        let mut coordinator = RenderCoordinator::new(fixture.camera);
        assert_eq!(coordinator.state(), CoordinatorState::Enabled);
        coordinator.check_resources(fixture.viewpoint(), &fixture.settings, &mut backend);
        assert_eq!(coordinator.state(), CoordinatorState::ResourcesValid);
        coordinator.invalidate();
        assert_eq!(coordinator.state(), CoordinatorState::ResourcesInvalidated);
        assert!(coordinator.check_resources(fixture.viewpoint(), &fixture.settings, &mut backend));
        assert_eq!(coordinator.state(), CoordinatorState::ResourcesValid);

        coordinator.dispose(&mut backend);
        assert_eq!(coordinator.state(), CoordinatorState::Disabled);
        assert!(!coordinator.check_resources(fixture.viewpoint(), &fixture.settings, &mut backend));
        assert_eq!(backend.live_list_count(), 0);
        assert_eq!(backend.live_viewport_count(), 0);
        coordinator.enable();
        assert_eq!(coordinator.state(), CoordinatorState::Enabled);
    }

    #[test]
    fn test_draw_order_partitions_and_sorts() {
        let mut fixture = Fixture::new();
        let near_glass = fixture.add_actor(3.0, Material::transparent(MaterialId(2), [1.0, 1.0, 1.0, 0.5]));
        let wall = fixture.add_actor(10.0, Material::opaque(MaterialId(1)));
        let far_glass = fixture.add_actor(8.0, Material::transparent(MaterialId(2), [1.0, 1.0, 1.0, 0.5]));
        let bare = fixture.scene.actors.insert(Actor::new("bare", Transform::identity()));
        fixture.actors.push(bare);
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        coordinator.update_viewports(fixture.viewpoint(), &mut backend);
        coordinator.will_render(fixture.viewpoint(), &fixture.ctx(), &mut backend);

        let order = coordinator.draw_order(&fixture.ctx());
        assert_eq!(order.opaque, vec![wall]);
        assert_eq!(order.transparent, vec![far_glass, near_glass]);
    }

    #[test]
    fn test_will_render_declares_visible_actors_only() {
        let mut fixture = Fixture::new();
        let front = fixture.add_actor(5.0, Material::opaque(MaterialId(1)));
        let behind = fixture.add_actor(-5.0, Material::opaque(MaterialId(1)));
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        coordinator.update_viewports(fixture.viewpoint(), &mut backend);
        coordinator.will_render(fixture.viewpoint(), &fixture.ctx(), &mut backend);

        assert!(coordinator.bundle(front).unwrap().visible);
        assert!(!coordinator.bundle(behind).unwrap().visible);
        let declared: Vec<_> = backend
            .player_calls()
            .iter()
            .filter(|call| matches!(call, PlayerCall::DeclareVisibility(..)))
            .collect();
        assert_eq!(declared.len(), 1);
    }

    #[test]
    fn test_opaque_actor_records_lighting_composite_and_depth() {
        let mut fixture = Fixture::new();
        fixture.add_actor(5.0, Material::opaque(MaterialId(1)));
        fixture.add_light(Light::spot("spot", Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.0, 0.0, -5.0), 20.0, 45.0));
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        let stats = fixture.frame(&mut coordinator, &mut backend);

        assert_eq!(stats.rendered, 1);
        assert_eq!(stats.composite_draws, 1);
        assert_eq!(stats.lighting_draws, 2);
        assert!(stats.refresh_lights, "empty transparent set asks lights to refresh");

        let lighting = list_commands(&backend, OPAQUE_LIST);
        assert_eq!(lighting.len(), 4);
        let RenderCommand::Draw { pass, properties, .. } = &lighting[3] else {
            panic!("expected a light draw");
        };
        assert_eq!(*pass, 1);
        assert!(properties.texture(Uniform::LightCookie).is_some());
        assert_eq!(
            properties.vector(Uniform::ShadowParameters),
            Some(Vec4::new(1.0, 0.0, 0.0, 0.0))
        );

        let composite = list_commands(&backend, OPAQUE_COMPOSITE_LIST);
        assert!(matches!(composite[0], RenderCommand::Draw { material: MaterialRef::ColorComposite, pass: 0, .. }));
        let depth = list_commands(&backend, DEPTH_LIST);
        assert!(matches!(depth[0], RenderCommand::Draw { material: MaterialRef::DepthComposite, .. }));
    }

    #[test]
    fn test_transparent_composite_uses_material_pass_and_tint() {
        let mut fixture = Fixture::new();
        fixture.add_actor(5.0, Material::transparent(MaterialId(2), [0.5, 0.5, 0.5, 0.5]));
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        fixture.frame(&mut coordinator, &mut backend);

        let composite = list_commands(&backend, TRANSPARENT_COMPOSITE_LIST);
        let RenderCommand::Draw { pass, properties, .. } = &composite[0] else {
            panic!("expected a composite draw");
        };
        assert_eq!(*pass, 1);
        assert_eq!(
            properties.get(Uniform::Tint),
            Some(&UniformValue::Vector(Vec4::new(0.5, 0.5, 0.5, 0.5)))
        );
        assert!(list_commands(&backend, DEPTH_LIST).is_empty());
    }

    #[test]
    fn test_lights_outside_culling_mask_do_not_contribute() {
        let mut fixture = Fixture::new();
        fixture.add_actor(5.0, Material::opaque(MaterialId(1)));
        let mut light = Light::point("bulb", Vec3::new(0.0, 2.0, -5.0), 10.0);
        light.culling_mask = 0b10;
        fixture.add_light(light);
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        let stats = fixture.frame(&mut coordinator, &mut backend);
        assert_eq!(stats.lighting_draws, 1);
        let bulb = &fixture.scene.lights[fixture.lights[0]];
        assert!(!coordinator.uses_light(bulb, &fixture.ctx()));
    }

    #[test]
    fn test_point_cookie_falls_back_to_white_cube() {
        let mut fixture = Fixture::new();
        fixture.add_actor(5.0, Material::opaque(MaterialId(1)));
        fixture.add_light(Light::point("bulb", Vec3::new(0.0, 2.0, -5.0), 10.0));
        fixture.add_light(Light::spot("spot", Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.0, 0.0, -5.0), 20.0, 45.0));
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        fixture.frame(&mut coordinator, &mut backend);

        let cookie_layers = |light_pass: u32| {
            list_commands(&backend, OPAQUE_LIST)
                .iter()
                .find_map(|command| match command {
                    RenderCommand::Draw { pass, properties, .. } if *pass == light_pass => properties.texture(Uniform::LightCookie),
                    _ => None,
                })
                .and_then(|cookie| backend.target_desc(cookie))
                .map(|desc| desc.layers)
        };
        assert_eq!(cookie_layers(3), Some(6));
        assert_eq!(cookie_layers(1), Some(1));

        coordinator.dispose(&mut backend);
        assert!(backend.targets_named("hvr_dummy").is_empty());
    }

    #[test]
    fn test_unlit_actor_uses_unlit_pass() {
        let mut fixture = Fixture::new();
        let id = fixture.add_actor(5.0, Material::opaque(MaterialId(1)));
        fixture.scene.actors[id].flags.remove(ActorFlags::USE_LIGHTING);
        fixture.add_light(Light::directional("sun", -Vec3::y()));
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        let stats = fixture.frame(&mut coordinator, &mut backend);
        assert_eq!(stats.lighting_draws, 1);
        let lighting = list_commands(&backend, OPAQUE_LIST);
        assert!(matches!(lighting[2], RenderCommand::Draw { pass: UNLIT_PASS, .. }));
    }

    #[test]
    fn test_new_buffers_wait_a_frame_when_backend_defers_targets() {
        let mut fixture = Fixture::new();
        fixture.add_actor(5.0, Material::opaque(MaterialId(1)));
        let mut backend = HeadlessBackend::with_capabilities(BackendCapabilities {
            flags: CapabilityFlags::SUPPORTED | CapabilityFlags::DEFERS_NEW_TARGETS,
            ..BackendCapabilities::default()
        });
        let mut coordinator = fixture.coordinator(&mut backend);
        let stats = fixture.frame(&mut coordinator, &mut backend);
        assert_eq!((stats.rendered, stats.failed), (0, 1));
        assert!(stats.refresh_lights);
        assert!(list_commands(&backend, OPAQUE_COMPOSITE_LIST).is_empty());

        let ctx = FrameContext { frame: 2, ..fixture.ctx() };
        let viewpoint = fixture.viewpoint();
        coordinator.clear_command_lists(&mut backend);
        coordinator.update_viewports(viewpoint, &mut backend);
        coordinator.will_render(viewpoint, &ctx, &mut backend);
        let shadows = FrameShadows::new(&fixture.scene.lights, &fixture.shadow_coordinators, &fixture.lights);
        let stats = coordinator.render(viewpoint, &ctx, &shadows, &mut backend);
        assert_eq!(stats.rendered, 1);
    }

    #[test]
    fn test_failed_actor_is_not_composited() {
        let mut fixture = Fixture::new();
        let id = fixture.add_actor(5.0, Material::opaque(MaterialId(1)));
        let mut backend = HeadlessBackend::new();
        backend.fail_asset(fixture.scene.actors[id].asset.unwrap());
        let mut coordinator = fixture.coordinator(&mut backend);
        let stats = fixture.frame(&mut coordinator, &mut backend);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.composite_draws, 0);
        assert!(stats.refresh_lights);
        assert_eq!(backend.targets_named("hvr_render_temp_depth").len(), 0);
    }

    #[test]
    fn test_direct_mode_renders_into_viewpoint_target() {
        let mut fixture = Fixture::new();
        fixture.add_actor(5.0, Material::opaque(MaterialId(1)));
        fixture.scene.viewpoints[fixture.camera].render_mode = RenderMode::Direct;
        fixture.scene.viewpoints[fixture.camera].target_color = Some(TargetHandle(9000));
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        let stats = fixture.frame(&mut coordinator, &mut backend);
        assert_eq!(stats.composite_draws, 0);
        assert_eq!(coordinator.viewport().unwrap().samples, 1);
        assert!(backend.player_calls().iter().any(|call| matches!(
            call,
            PlayerCall::RenderActor { color: Some(TargetHandle(9000)), .. }
        )));
        assert_eq!(stats.failed, 1, "the explicit target is not a live headless target");
        let light = Light::directional("sun", -Vec3::y());
        assert!(!coordinator.uses_light(&light, &fixture.ctx()));

        backend.set_capabilities(BackendCapabilities {
            flags: CapabilityFlags::SUPPORTED | CapabilityFlags::NO_DIRECT_MODE,
            ..BackendCapabilities::default()
        });
        backend.clear_history();
        let stats = fixture.frame(&mut coordinator, &mut backend);
        assert_eq!(stats.rendered, 0);
        assert!(!backend
            .player_calls()
            .iter()
            .any(|call| matches!(call, PlayerCall::RenderActor { .. })));
    }

    #[test]
    fn test_removed_actor_releases_its_buffers() {
        let mut fixture = Fixture::new();
        let id = fixture.add_actor(5.0, Material::opaque(MaterialId(1)));
        let mut backend = HeadlessBackend::new();
        let mut coordinator = fixture.coordinator(&mut backend);
        fixture.frame(&mut coordinator, &mut backend);
        assert_eq!(backend.targets_named("hvr_buffers").len(), 3);
        coordinator.on_actor_removed(id, &mut backend);
        assert!(coordinator.bundle(id).is_none());
        assert!(backend.targets_named("hvr_buffers").is_empty());
    }
}
