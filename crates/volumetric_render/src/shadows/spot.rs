use log::debug;

use super::{bake_isolated_map, caster_draw, to_uv_matrix, IsolatedPass, OwnedResources, ShadowMapCache, ShadowRecord};
use crate::backend::{
    BackendResult, CommandListHandle, GraphicsBackend, ListOwner, MaterialRef, PassEvent, PropertyBlock, RenderCommand,
    TargetDesc, TargetFormat, TargetHandle,
};
use crate::foundation::collections::LightId;
use crate::foundation::math::{perspective, translation, Mat4, Rect};
use crate::frame::FrameContext;
use crate::scene::Light;
use crate::shadows::collect_casters;

/// Shadow resources of a spot light
///
/// The player renders casters into `depth`; after the host's own shadow pass
/// the result is copied into `depth_with_scene`, which lighting samples.
#[derive(Debug)]
pub struct SpotShadows {
    owned: OwnedResources,
    record: ShadowRecord,
    map_size: u32,
    bake_list: CommandListHandle,
    copy_list: CommandListHandle,
    world_to_shadow: Mat4,
}

impl SpotShadows {
    /// Allocate a `map_size` square map pair
    pub fn create(light: LightId, map_size: u32, swap_chain_length: usize, backend: &mut dyn GraphicsBackend) -> BackendResult<Self> {
        let mut owned = OwnedResources::new();
        let result = Self::allocate(&mut owned, light, map_size, swap_chain_length, backend);
        match result {
            Ok(parts) => Ok(Self { owned, ..parts }),
            Err(err) => {
                owned.release(backend);
                Err(err)
            }
        }
    }

    fn allocate(
        owned: &mut OwnedResources,
        light: LightId,
        map_size: u32,
        swap_chain_length: usize,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<Self> {
        let owner = ListOwner::Light(light);
        let linear = TargetFormat::LinearDepth(backend.capabilities().linear_depth_format);
        let depth = owned.target(
            &TargetDesc::new("hvr_spot_depth", map_size, map_size, TargetFormat::Depth, 16),
            backend,
        )?;
        let depth_with_scene = owned.target(
            &TargetDesc::new("hvr_spot_depth_with_scene", map_size, map_size, linear, 16),
            backend,
        )?;
        let bake_list = owned.list("hvr_light.spot.bake", owner, PassEvent::BeforeShadowMap, backend)?;
        let copy_list = owned.list("hvr_light.spot.copy_depth", owner, PassEvent::AfterShadowMap, backend)?;
        let mut records = ShadowRecord::create_many(
            [(Rect::from_size(map_size, map_size), Some(depth), Some(depth_with_scene))],
            swap_chain_length,
            backend,
        )?;
        let Some(record) = records.pop() else {
            return Err(crate::render::RenderError::ResourceCreationFailed("spot shadow record".to_string()));
        };
        debug!("spot shadows: {map_size}px map");
        Ok(Self {
            owned: OwnedResources::new(),
            record,
            map_size,
            bake_list,
            copy_list,
            world_to_shadow: Mat4::identity(),
        })
    }

    /// Set up the light's viewport and declare the casters it sees
    pub fn will_render(&mut self, light: &Light, ctx: &FrameContext<'_>, backend: &mut dyn GraphicsBackend) {
        self.record.reset_frame();
        let near = light.shadow_near_plane;
        let range = light.range.max(near + f32::EPSILON);
        let view = light.transform.view_matrix();
        let unbiased = perspective(light.spot_angle, 1.0, near, range);
        let biased = translation(0.0, 0.0, light.shadow_bias / (range - near)) * unbiased;

        let size = self.map_size as f32;
        self.record.view_projection = unbiased * view;
        self.record.viewport = self
            .record
            .swap_chain
            .next_viewport(view, backend.gpu_projection(&biased, true), 0.0, 0.0, size, size);
        self.world_to_shadow = to_uv_matrix() * backend.gpu_projection(&unbiased, false) * view;

        let casters = collect_casters(light, &self.record.view_projection, ctx);
        if let Some(viewport) = &self.record.viewport {
            for caster in &casters {
                backend.declare_visibility(caster.asset, viewport);
            }
        }
        self.record.set_casters(casters);
    }

    /// Clear the depth map, render this frame's casters and record the scene copy
    pub fn bake(&mut self, light: &Light, cache: &mut ShadowMapCache, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        self.owned.clear_lists(backend);
        let (Some(depth), Some(depth_with_scene)) = (self.record.depth, self.record.linear_depth) else {
            return Ok(());
        };
        backend.execute(RenderCommand::Blit {
            source: None,
            dest: depth,
            material: Some((MaterialRef::LinearDepth, 1)),
            properties: PropertyBlock::new(),
        });

        let size = (self.map_size, self.map_size);
        if light.realtime && !self.record.casters.is_empty() {
            if let Some(viewport) = self.record.viewport.clone() {
                if self.record.has_transparent_actor {
                    for caster in &mut self.record.casters {
                        let pass = IsolatedPass {
                            rect: None,
                            asset: caster.asset,
                            viewport: &viewport,
                        };
                        let map = bake_isolated_map(caster.actor, None, self.map_size, &[pass], cache, backend)?;
                        caster.shadow_map = Some(map);
                        backend.record(self.bake_list, caster_draw(0, size, caster.weight, map, PropertyBlock::new()));
                    }
                } else {
                    for caster in &self.record.casters {
                        backend.render_actor(caster.asset, &viewport, None, Some(depth));
                    }
                    backend.record(self.bake_list, caster_draw(0, size, 1.0, depth, PropertyBlock::new()));
                }
            }
        }

        backend.record(
            self.copy_list,
            RenderCommand::Blit {
                source: None,
                dest: depth_with_scene,
                material: None,
                properties: PropertyBlock::new(),
            },
        );
        Ok(())
    }

    /// Shadow record of the single map
    pub fn record(&self) -> &ShadowRecord {
        &self.record
    }

    /// Depth map including the host's own shadow casters
    pub fn depth_with_scene(&self) -> Option<TargetHandle> {
        self.record.linear_depth
    }

    /// World to shadow-map UV, without depth bias
    pub fn world_to_shadow(&self) -> Mat4 {
        self.world_to_shadow
    }

    /// Edge length of the map
    pub fn map_size(&self) -> u32 {
        self.map_size
    }

    /// List executed before the light's shadow map pass
    pub fn bake_list(&self) -> CommandListHandle {
        self.bake_list
    }

    /// List executed after the light's shadow map pass
    pub fn copy_list(&self) -> CommandListHandle {
        self.copy_list
    }

    /// Empty both command lists
    pub fn clear_command_lists(&self, backend: &mut dyn GraphicsBackend) {
        self.owned.clear_lists(backend);
    }

    /// Release every target, list and viewport slot
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        self.record.release(backend);
        self.owned.release(backend);
    }
}
