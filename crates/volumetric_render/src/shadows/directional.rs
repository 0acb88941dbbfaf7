//! Directional light cascades
//!
//! All cascades share one shadow map. Each cascade is fitted around a
//! bounding sphere of a slice of the main viewpoint's frustum, so its size
//! does not change as the viewpoint turns, and its projection is snapped to
//! whole texels so shadow edges hold still while the viewpoint moves.
//!
//! After the map is baked, a screen-sized mask is produced by drawing a quad
//! over the main viewpoint that samples every cascade. Lighting passes read
//! the mask instead of the map.

use log::debug;

use super::{bake_isolated_map, caster_draw, IsolatedPass, OwnedResources, ShadowMapCache, ShadowRecord};
use crate::backend::{
    BackendResult, CapabilityFlags, CommandListHandle, GraphicsBackend, ListOwner, Mesh, MaterialRef, PassEvent, PropertyBlock,
    RenderCommand, TargetDesc, TargetFormat, TargetHandle, Uniform, UniformValue,
};
use crate::config::ShadowsSetting;
use crate::foundation::collections::{ActorId, LightId};
use crate::foundation::math::{
    look_at, orthographic, scaling, stable_up, transform_point, translation, Mat4, Rect, Vec3, Vec4, CLEAR_BLACK,
};
use crate::frame::FrameContext;
use crate::render::Degradation;
use crate::scene::{BoundingSphere, Light, Projection, ShadowMode, Viewpoint};
use crate::shadows::collect_casters;

/// Most cascades a directional light can split its map into
pub const MAX_CASCADES: usize = 4;

/// Fade distance factor handed to the mask shader
const SHADOW_FADE_FACTOR: f32 = 3.0;

/// Map regions and UV transforms of every cascade
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeLayout {
    /// Pixel region of each cascade inside the shared map
    pub rects: Vec<Rect>,
    /// Clip space to map UV for each cascade
    pub to_uv: Vec<Mat4>,
}

/// Split a `map_size` square into `splits` cascades
///
/// APIs with a 0..1 clip depth range flip the map vertically when rendering
/// into a texture, so the first cascade moves to the top half there.
pub fn cascade_layout(splits: usize, map_size: u32, clip_zero_to_one: bool) -> CascadeLayout {
    let m = map_size as f32;
    let h = m * 0.5;
    let rects = match (splits, clip_zero_to_one) {
        (4, false) => vec![
            Rect::new(0.0, 0.0, h, h),
            Rect::new(h, 0.0, h, h),
            Rect::new(0.0, h, h, h),
            Rect::new(h, h, h, h),
        ],
        (4, true) => vec![
            Rect::new(0.0, h, h, h),
            Rect::new(h, h, h, h),
            Rect::new(0.0, 0.0, h, h),
            Rect::new(h, 0.0, h, h),
        ],
        (2, false) => vec![Rect::new(0.0, 0.0, m, h), Rect::new(0.0, h, m, h)],
        (2, true) => vec![Rect::new(0.0, h, m, h), Rect::new(0.0, 0.0, m, h)],
        _ => vec![Rect::new(0.0, 0.0, m, m)],
    };
    let (z_scale, z_offset) = if clip_zero_to_one { (1.0, 0.0) } else { (0.5, 1.0) };
    let to_uv = rects
        .iter()
        .map(|rect| {
            translation(rect.x / m, rect.y / m, 0.0)
                * scaling(rect.width / m, rect.height / m, 1.0)
                * scaling(0.5, 0.5, z_scale)
                * translation(1.0, 1.0, z_offset)
        })
        .collect();
    CascadeLayout { rects, to_uv }
}

/// World-space sphere enclosing the slice of `viewpoint` out to `percent` of the shadow distance
///
/// The shadow distance is the viewpoint's far plane capped at `shadow_limit`.
/// Perspective slices use the diagonal field of view so the sphere covers
/// the frustum corners whatever the viewpoint's roll.
pub fn cascade_bounding_sphere(viewpoint: &Viewpoint, percent: f32, shadow_limit: f32) -> BoundingSphere {
    let far = viewpoint.far().min(shadow_limit) * percent;
    let near = viewpoint.near();
    let position = viewpoint.transform.position;
    let forward = viewpoint.transform.forward();
    match viewpoint.projection {
        Projection::Perspective { fov, .. } => {
            let (width, height) = viewpoint.pixel_size();
            let diagonal = ((width * width + height * height) as f32).sqrt();
            let theta = 2.0 * ((diagonal / height as f32) * (fov.to_radians() * 0.5).tan()).atan();
            let half_cos = (theta * 0.5).cos();
            let radius = far / (2.0 * half_cos * half_cos);
            BoundingSphere::new(position + forward * (radius - near), radius)
        }
        Projection::Orthographic { size, .. } => {
            let far_corner = Vec3::new(size * viewpoint.aspect(), size, far);
            let center = Vec3::new(0.0, 0.0, (near + far) * 0.5);
            BoundingSphere::new(position + forward * center.z, (far_corner - center).norm())
        }
    }
}

/// View and texel-snapped orthographic projection of one cascade
///
/// `max_radius` is the radius of the outermost cascade; every cascade's near
/// plane is pulled back to it so casters outside the sphere still land in
/// the map. `texels` is the cascade's size in the shared map.
pub fn cascade_matrices(direction: &Vec3, sphere: &BoundingSphere, max_radius: f32, texels: (f32, f32)) -> (Mat4, Mat4) {
    let dir = direction.normalize();
    let r = sphere.radius;
    let eye = sphere.center - dir * r;
    let view = look_at(&eye, &sphere.center, &stable_up(&dir));
    let mut projection = orthographic(-r, r, -r, r, -(max_radius - r), 2.0 * r);

    let half_w = texels.0 * 0.5;
    let half_h = texels.1 * 0.5;
    let origin = transform_point(&(projection * view), &Vec3::zeros());
    let x = origin.x * half_w;
    let y = origin.y * half_h;
    projection[(0, 3)] += (x.round() - x) / half_w;
    projection[(1, 3)] += (y.round() - y) / half_h;
    (view, projection)
}

/// Shadow resources of a directional light
#[derive(Debug)]
pub struct DirectionalShadows {
    owned: OwnedResources,
    shadow_map: TargetHandle,
    map_size: u32,
    cascades: Vec<ShadowRecord>,
    to_uv: Vec<Mat4>,
    spheres: Vec<BoundingSphere>,
    world_to_shadow: Vec<Mat4>,
    shadow_limit: f32,
    mask: Option<(TargetHandle, (u32, u32))>,
    bake_list: CommandListHandle,
    mask_list: CommandListHandle,
}

impl DirectionalShadows {
    /// Allocate a `map_size` map split into `cascades` regions
    pub fn create(
        light: LightId,
        map_size: u32,
        cascades: usize,
        swap_chain_length: usize,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<Self> {
        let mut owned = OwnedResources::new();
        let result = Self::allocate(&mut owned, light, map_size, cascades, swap_chain_length, backend);
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
        cascades: usize,
        swap_chain_length: usize,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<Self> {
        let owner = ListOwner::Light(light);
        let shadow_map = owned.target(
            &TargetDesc::new("hvr_directional_shadowmap", map_size, map_size, TargetFormat::Shadowmap, 16),
            backend,
        )?;
        let bake_list = owned.list("hvr_light.directional.bake", owner, PassEvent::BeforeShadowMap, backend)?;
        let mask_list = owned.list("hvr_light.directional.mask", owner, PassEvent::AfterScreenspaceMask, backend)?;
        let zero_to_one = backend.capabilities().has(CapabilityFlags::CLIP_DEPTH_ZERO_TO_ONE);
        let layout = cascade_layout(cascades, map_size, zero_to_one);
        let records = ShadowRecord::create_many(
            layout.rects.iter().map(|rect| (*rect, None, None)),
            swap_chain_length,
            backend,
        )?;
        debug!("directional shadows: {map_size}px map, {} cascades", records.len());
        Ok(Self {
            owned: OwnedResources::new(),
            shadow_map,
            map_size,
            cascades: records,
            to_uv: layout.to_uv,
            spheres: Vec::new(),
            world_to_shadow: Vec::new(),
            shadow_limit: 0.0,
            mask: None,
            bake_list,
            mask_list,
        })
    }

    /// Fit every cascade to the main viewpoint and declare the casters it sees
    pub fn will_render(&mut self, light: &Light, ctx: &FrameContext<'_>, backend: &mut dyn GraphicsBackend) {
        for record in &mut self.cascades {
            record.reset_frame();
        }
        self.world_to_shadow.clear();
        self.spheres.clear();
        let Some(viewpoint) = ctx.scene.main_viewpoint() else {
            Degradation::MissingDependency.report(&format!("{}: no main viewpoint for cascades", light.name));
            return;
        };
        let quality = &ctx.settings.quality;
        self.shadow_limit = light.shadow_distance_limit.min(quality.shadow_distance);
        self.spheres = quality
            .split_percents(viewpoint.is_orthographic())
            .iter()
            .take(self.cascades.len())
            .map(|percent| cascade_bounding_sphere(viewpoint, *percent, self.shadow_limit))
            .collect();
        let max_radius = self.spheres.last().map_or(0.0, |sphere| sphere.radius);
        let direction = light.direction();

        for (record, sphere) in self.cascades.iter_mut().zip(&self.spheres) {
            let rect = record.rect;
            let (view, projection) = cascade_matrices(&direction, sphere, max_radius, (rect.width, rect.height));
            let view_with_bias = translation(0.0, 0.0, light.shadow_bias) * view;
            self.world_to_shadow
                .push(backend.gpu_projection(&projection, true) * view_with_bias);
            record.view_projection = projection * view;
            record.viewport = record.swap_chain.next_viewport(
                view,
                backend.gpu_projection(&projection, false),
                rect.x,
                rect.y,
                rect.width,
                rect.height,
            );
            let casters = collect_casters(light, &record.view_projection, ctx);
            if let Some(viewport) = &record.viewport {
                for caster in &casters {
                    backend.declare_visibility(caster.asset, viewport);
                }
            }
            record.set_casters(casters);
        }
    }

    /// Render casters into the shared map and record the mask pass
    pub fn bake(
        &mut self,
        light: &Light,
        ctx: &FrameContext<'_>,
        cache: &mut ShadowMapCache,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<()> {
        self.owned.clear_lists(backend);
        if ctx.settings.quality.shadows == ShadowsSetting::Disable {
            return Ok(());
        }
        let Some(viewpoint) = ctx.scene.main_viewpoint() else {
            Degradation::MissingDependency.report(&format!("{}: no main viewpoint for shadow mask", light.name));
            return Ok(());
        };
        let transparent = self.cascades.iter().any(|record| record.has_transparent_actor);
        if light.realtime && transparent {
            self.bake_isolated(cache, backend)?;
        } else {
            self.bake_shared(light.realtime, backend);
        }
        self.record_mask(light, viewpoint, ctx, backend)
    }

    fn bake_isolated(&mut self, cache: &mut ShadowMapCache, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        let size = self.map_size;
        let mut actors: Vec<(ActorId, f32)> = Vec::new();
        for caster in self.cascades.iter().flat_map(|record| &record.casters) {
            if !actors.iter().any(|(actor, _)| *actor == caster.actor) {
                actors.push((caster.actor, caster.weight));
            }
        }

        let mut maps = Vec::with_capacity(actors.len());
        for (actor, weight) in actors {
            let passes: Vec<IsolatedPass<'_>> = self
                .cascades
                .iter()
                .filter_map(|record| {
                    let viewport = record.viewport.as_ref()?;
                    let caster = record.casters.iter().find(|c| c.actor == actor)?;
                    Some(IsolatedPass {
                        rect: Some(record.rect),
                        asset: caster.asset,
                        viewport,
                    })
                })
                .collect();
            let map = bake_isolated_map(actor, None, size, &passes, cache, backend)?;
            maps.push((actor, map, weight));
        }
        for caster in self.cascades.iter_mut().flat_map(|record| record.casters.iter_mut()) {
            caster.shadow_map = maps
                .iter()
                .find(|(actor, _, _)| *actor == caster.actor)
                .map(|(_, map, _)| *map);
        }

        backend.record(
            self.bake_list,
            RenderCommand::SetTarget {
                color: None,
                depth: Some(self.shadow_map),
                layer: None,
            },
        );
        backend.record(
            self.bake_list,
            RenderCommand::Clear {
                color: Some(CLEAR_BLACK),
                depth: Some(1.0),
            },
        );
        for (_, map, weight) in maps {
            backend.record(self.bake_list, caster_draw(0, (size, size), weight, map, PropertyBlock::new()));
        }
        Ok(())
    }

    fn bake_shared(&self, realtime: bool, backend: &mut dyn GraphicsBackend) {
        backend.execute(RenderCommand::SetTarget {
            color: None,
            depth: Some(self.shadow_map),
            layer: None,
        });
        backend.execute(RenderCommand::Clear {
            color: Some(CLEAR_BLACK),
            depth: Some(1.0),
        });
        if !realtime {
            return;
        }
        for record in &self.cascades {
            let Some(viewport) = &record.viewport else {
                continue;
            };
            backend.execute(RenderCommand::SetViewportRect(record.rect));
            for caster in &record.casters {
                backend.render_actor(caster.asset, viewport, None, Some(self.shadow_map));
            }
        }
    }

    fn record_mask(
        &mut self,
        light: &Light,
        viewpoint: &Viewpoint,
        ctx: &FrameContext<'_>,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<()> {
        let size = viewpoint.pixel_size();
        let mask = match self.mask {
            Some((mask, mask_size)) if mask_size == size => mask,
            stale => {
                if let Some((old, _)) = stale {
                    backend.release_target(old);
                }
                self.mask = None;
                let mask = backend.create_target(&TargetDesc::new(
                    "hvr_screenspace_shadow_mask",
                    size.0,
                    size.1,
                    TargetFormat::Color,
                    16,
                ))?;
                debug!("directional shadows: mask {}x{}", size.0, size.1);
                self.mask = Some((mask, size));
                mask
            }
        };

        let hard = light.shadows == ShadowMode::Hard || ctx.settings.quality.shadows == ShadowsSetting::HardOnly;
        let pass = if hard {
            0
        } else if viewpoint.is_stereo() {
            3
        } else {
            2
        };
        let m = self.map_size as f32;
        let (spheres, squared_radii) = self.split_spheres();
        let mut properties = PropertyBlock::new();
        properties
            .set_texture(Uniform::ShadowMapTexture, self.shadow_map)
            .set_vector(Uniform::ShadowMapTexelSize, Vec4::new(1.0 / m, 1.0 / m, m, m))
            .set(Uniform::WorldToShadowCascades, UniformValue::MatrixArray(self.world_to_shadow_cascades()))
            .set(Uniform::ShadowSplitSpheres, UniformValue::VectorArray(spheres))
            .set_vector(Uniform::ShadowSplitSqRadii, squared_radii)
            .set_vector(
                Uniform::ShadowFadeCameraDistance,
                Vec4::new(self.shadow_limit, SHADOW_FADE_FACTOR, 0.0, 0.0),
            );
        backend.record(
            self.mask_list,
            RenderCommand::Draw {
                mesh: Mesh::ShadowMaskQuad,
                transform: viewpoint.transform.to_matrix(),
                material: MaterialRef::ScreenspaceShadowMask,
                pass,
                properties,
            },
        );
        backend.record(
            self.mask_list,
            RenderCommand::Blit {
                source: None,
                dest: mask,
                material: None,
                properties: PropertyBlock::new(),
            },
        );
        Ok(())
    }

    /// World to shadow-map UV for every cascade slot, zero for unused slots
    pub fn world_to_shadow_cascades(&self) -> Vec<Mat4> {
        (0..MAX_CASCADES)
            .map(|i| match (self.to_uv.get(i), self.world_to_shadow.get(i)) {
                (Some(to_uv), Some(world_to_shadow)) => to_uv * world_to_shadow,
                _ => Mat4::zeros(),
            })
            .collect()
    }

    /// Split spheres as `(center, radius)` and their squared radii
    ///
    /// Unused slots get a sphere at negative infinity with a huge radius so
    /// the mask shader never selects them.
    pub fn split_spheres(&self) -> (Vec<Vec4>, Vec4) {
        let mut spheres = vec![Vec4::repeat(f32::NEG_INFINITY); MAX_CASCADES];
        let mut squared_radii = Vec4::repeat(f32::MAX);
        for (i, sphere) in self.spheres.iter().take(MAX_CASCADES).enumerate() {
            spheres[i] = Vec4::new(sphere.center.x, sphere.center.y, sphere.center.z, sphere.radius);
            squared_radii[i] = sphere.radius * sphere.radius;
        }
        (spheres, squared_radii)
    }

    /// Screen-space shadow mask, once the first bake has created it
    pub fn mask(&self) -> Option<TargetHandle> {
        self.mask.map(|(mask, _)| mask)
    }

    /// Shared cascade map
    pub fn shadow_map(&self) -> TargetHandle {
        self.shadow_map
    }

    /// Edge length of the shared map
    pub fn map_size(&self) -> u32 {
        self.map_size
    }

    /// Cascade records in layout order
    pub fn cascades(&self) -> &[ShadowRecord] {
        &self.cascades
    }

    /// List executed before the light's shadow map pass
    pub fn bake_list(&self) -> CommandListHandle {
        self.bake_list
    }

    /// List executed after the screen-space mask pass
    pub fn mask_list(&self) -> CommandListHandle {
        self.mask_list
    }

    /// Empty both command lists
    pub fn clear_command_lists(&self, backend: &mut dyn GraphicsBackend) {
        self.owned.clear_lists(backend);
    }

    /// Release every target, list and viewport slot
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        for record in &mut self.cascades {
            record.release(backend);
        }
        if let Some((mask, _)) = self.mask.take() {
            backend.release_target(mask);
        }
        self.owned.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessBackend, StaticPlayback};
    use crate::backend::AssetHandle;
    use crate::config::PipelineSettings;
    use crate::foundation::math::Transform;
    use crate::scene::{Aabb, Actor, Material, MaterialId, Scene};
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    fn light_id() -> LightId {
        let mut lights: SlotMap<LightId, ()> = SlotMap::with_key();
        lights.insert(())
    }

    #[test]
    fn test_four_way_layout_maps_clip_corners_into_quadrants() {
        let layout = cascade_layout(4, 1024, false);
        assert_eq!(layout.rects[1], Rect::new(512.0, 0.0, 512.0, 512.0));
        let low = transform_point(&layout.to_uv[0], &Vec3::new(-1.0, -1.0, -1.0));
        assert_relative_eq!(low, Vec3::new(0.0, 0.0, 0.0), epsilon = 1e-6);
        let high = transform_point(&layout.to_uv[3], &Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(high, Vec3::new(1.0, 1.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_zero_to_one_layout_starts_in_top_half() {
        let layout = cascade_layout(4, 1024, true);
        assert_eq!(layout.rects[0], Rect::new(0.0, 512.0, 512.0, 512.0));
        let corner = transform_point(&layout.to_uv[0], &Vec3::new(-1.0, -1.0, 0.0));
        assert_relative_eq!(corner, Vec3::new(0.0, 0.5, 0.0), epsilon = 1e-6);

        let two = cascade_layout(2, 1024, false);
        assert_eq!(two.rects, vec![Rect::new(0.0, 0.0, 1024.0, 512.0), Rect::new(0.0, 512.0, 1024.0, 512.0)]);
        assert_eq!(cascade_layout(1, 256, true).rects, vec![Rect::new(0.0, 0.0, 256.0, 256.0)]);
    }

    #[test]
    fn test_perspective_sphere_uses_diagonal_fov() {
        // 90° vertical on a square screen: tan(θ/2) = √2, cos²(θ/2) = 1/3
        let vp = Viewpoint::perspective("main", Transform::identity(), 90.0, 0.5, 100.0, 256, 256);
        let sphere = cascade_bounding_sphere(&vp, 1.0, 20.0);
        assert_relative_eq!(sphere.radius, 30.0, epsilon = 1e-3);
        assert_relative_eq!(sphere.center, Vec3::new(0.0, 0.0, -29.5), epsilon = 1e-3);

        let half = cascade_bounding_sphere(&vp, 0.5, 20.0);
        assert_relative_eq!(half.radius, 15.0, epsilon = 1e-3);
    }

    #[test]
    fn test_orthographic_sphere_reaches_far_corner() {
        let vp = Viewpoint::orthographic("ortho", Transform::identity(), 5.0, 0.0, 10.0, 100, 100);
        let sphere = cascade_bounding_sphere(&vp, 1.0, 100.0);
        assert_relative_eq!(sphere.radius, 75.0f32.sqrt(), epsilon = 1e-4);
        assert_relative_eq!(sphere.center, Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-5);
    }

    #[test]
    fn test_projection_is_snapped_to_texels() {
        let sphere = BoundingSphere::new(Vec3::new(3.37, -1.21, -8.9), 12.3);
        let direction = Vec3::new(0.3, -1.0, -0.2);
        let (view, projection) = cascade_matrices(&direction, &sphere, 20.0, (512.0, 512.0));
        let origin = transform_point(&(projection * view), &Vec3::zeros());
        let x = origin.x * 256.0;
        let y = origin.y * 256.0;
        assert_relative_eq!(x, x.round(), epsilon = 1e-2);
        assert_relative_eq!(y, y.round(), epsilon = 1e-2);
    }

    #[test]
    fn test_unused_cascades_are_never_selected() {
        let mut backend = HeadlessBackend::new();
        let shadows = DirectionalShadows::create(light_id(), 1024, 2, 2, &mut backend).unwrap();
        let (spheres, radii) = shadows.split_spheres();
        assert_eq!(spheres.len(), MAX_CASCADES);
        assert!(spheres.iter().all(|s| s.x == f32::NEG_INFINITY));
        assert_eq!(radii[3], f32::MAX);
        assert!(shadows.world_to_shadow_cascades().iter().all(|m| *m == Mat4::zeros()));
    }

    #[test]
    fn test_bake_sizes_mask_to_main_viewpoint() {
        let mut scene = Scene::new();
        let mut playback = StaticPlayback::new();
        playback.insert(AssetHandle(1), Aabb::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5)));
        let actor = scene.actors.insert(
            Actor::new("a", Transform::from_position(Vec3::new(0.0, 0.0, -5.0)))
                .with_asset(AssetHandle(1))
                .with_material(Material::opaque(MaterialId(1))),
        );
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
        let settings = PipelineSettings::default().with_shadow_cascades(1);
        let actors = [actor];
        let ctx = FrameContext {
            scene: &scene,
            actors: &actors,
            playback: &playback,
            settings: &settings,
            frame: 1,
        };
        let light = Light::directional("sun", Vec3::new(0.0, -1.0, -0.2));
        let mut backend = HeadlessBackend::new();
        let mut cache = ShadowMapCache::new();
        let mut shadows = DirectionalShadows::create(light_id(), 1024, 1, 2, &mut backend).unwrap();

        shadows.will_render(&light, &ctx, &mut backend);
        assert_eq!(shadows.cascades()[0].casters.len(), 1);
        shadows.bake(&light, &ctx, &mut cache, &mut backend).unwrap();

        let mask = shadows.mask().unwrap();
        let desc = backend.target_desc(mask).unwrap();
        assert_eq!((desc.width, desc.height), (320, 200));
        let mask_commands = &backend.list(shadows.mask_list()).unwrap().commands;
        assert_eq!(mask_commands.len(), 2);
        assert!(matches!(mask_commands[0], RenderCommand::Draw { pass: 2, .. }));

        shadows.release(&mut backend);
        assert_eq!(backend.live_target_count(), 0);
        assert_eq!(backend.live_viewport_count(), 0);
    }
}
