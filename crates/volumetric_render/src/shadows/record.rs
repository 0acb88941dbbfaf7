use crate::backend::{AssetHandle, BackendResult, GraphicsBackend, TargetHandle};
use crate::foundation::collections::ActorId;
use crate::foundation::math::{Mat4, Rect};
use crate::frame::FrameContext;
use crate::render::{Degradation, ViewportDescriptor, ViewportSwapChain};
use crate::scene::{ActorFlags, Frustum, Light};

/// One actor drawn into a light's shadow this frame
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowCaster {
    /// Actor id
    pub actor: ActorId,
    /// Decoded asset handed to the player
    pub asset: AssetHandle,
    /// True when the actor's material is transparent
    pub transparent: bool,
    /// Contribution weight in a transparent bake, 1 for opaque actors
    pub weight: f32,
    /// Isolated shadow map, set during a transparent bake
    pub shadow_map: Option<TargetHandle>,
}

/// Shadow resources for one spot map, directional cascade or cube face
#[derive(Debug)]
pub struct ShadowRecord {
    /// Depth target the player renders into, `None` when the map is shared
    pub depth: Option<TargetHandle>,
    /// Linear depth target sampled by lighting passes
    pub linear_depth: Option<TargetHandle>,
    /// Viewport slots for this record
    pub swap_chain: ViewportSwapChain,
    /// Viewport written this frame
    pub viewport: Option<ViewportDescriptor>,
    /// Region of the map this record renders into
    pub rect: Rect,
    /// Casters collected this frame
    pub casters: Vec<ShadowCaster>,
    /// True when any caster this frame is transparent
    pub has_transparent_actor: bool,
    /// Light projection × view, without bias
    pub view_projection: Mat4,
}

impl ShadowRecord {
    /// Create a record with no viewport written yet
    pub fn new(swap_chain: ViewportSwapChain, depth: Option<TargetHandle>, linear_depth: Option<TargetHandle>, rect: Rect) -> Self {
        Self {
            depth,
            linear_depth,
            swap_chain,
            viewport: None,
            rect,
            casters: Vec::new(),
            has_transparent_actor: false,
            view_projection: Mat4::identity(),
        }
    }

    /// Store this frame's casters and flag transparency
    pub fn set_casters(&mut self, casters: Vec<ShadowCaster>) {
        self.has_transparent_actor = casters.iter().any(|c| c.transparent);
        self.casters = casters;
    }

    /// Forget this frame's viewport and casters
    pub fn reset_frame(&mut self) {
        self.viewport = None;
        self.casters.clear();
        self.has_transparent_actor = false;
    }

    /// Create one record per rect, each with its own swap chain of `swap_chain_length`
    ///
    /// `targets` supplies the depth and linear depth handles for each rect.
    /// Slots allocated before a failure are deleted again.
    pub fn create_many(
        specs: impl IntoIterator<Item = (Rect, Option<TargetHandle>, Option<TargetHandle>)>,
        swap_chain_length: usize,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<Vec<Self>> {
        let mut records: Vec<Self> = Vec::new();
        for (rect, depth, linear_depth) in specs {
            match ViewportSwapChain::new(swap_chain_length, backend) {
                Ok(chain) => records.push(Self::new(chain, depth, linear_depth, rect)),
                Err(err) => {
                    for record in &mut records {
                        record.release(backend);
                    }
                    return Err(err);
                }
            }
        }
        Ok(records)
    }

    /// Delete the record's viewport slots; targets belong to the owning resource set
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        self.swap_chain.delete_viewports(backend);
        self.reset_frame();
    }
}

/// Actors that should cast into a light frustum described by `view_projection`
///
/// Actors need an asset, decoded bounds, [`ActorFlags::CAST_SHADOWS`] and a
/// layer inside the light's culling mask.
pub fn collect_casters(light: &Light, view_projection: &Mat4, ctx: &FrameContext<'_>) -> Vec<ShadowCaster> {
    let frustum = Frustum::from_matrix(view_projection);
    ctx.live_actors()
        .filter(|(_, actor)| actor.enabled && actor.has(ActorFlags::CAST_SHADOWS) && light.affects_layer(actor.layer))
        .filter_map(|(id, actor)| {
            let asset = actor.asset?;
            let Some(bounds) = ctx.world_bounds(actor) else {
                Degradation::MissingDependency.report(&format!("{}: no bounds for shadow casting", actor.name));
                return None;
            };
            frustum.intersects_aabb(&bounds).then(|| ShadowCaster {
                actor: id,
                asset,
                transparent: actor.is_transparent(),
                weight: actor.shadow_weight(),
                shadow_map: None,
            })
        })
        .collect()
}
