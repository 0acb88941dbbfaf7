//! Point light cube shadows
//!
//! Each of the six faces gets its own record, depth target and linear depth
//! target, and its own pair of command lists attached to that face's shadow
//! pass. Where the platform can copy textures, the baked linear depth is
//! copied into a native cube map after the face renders.

use log::debug;

use super::{bake_isolated_map, caster_draw, to_uv_matrix, IsolatedPass, OwnedResources, ShadowMapCache, ShadowRecord};
use crate::backend::{
    BackendResult, CapabilityFlags, CommandListHandle, CubeFace, GraphicsBackend, ListOwner, MaterialRef, Mesh,
    PassEvent, PropertyBlock, RenderCommand, TargetDesc, TargetFormat, TargetHandle, Uniform,
};
use crate::foundation::collections::LightId;
use crate::foundation::math::{look_at, perspective, scaling, translation, Mat4, Rect, Vec3, Vec4, WHITE};
use crate::frame::FrameContext;
use crate::scene::Light;
use crate::shadows::collect_casters;

/// Direction and up vector a cube face looks along
pub fn face_axes(face: CubeFace) -> (Vec3, Vec3) {
    match face {
        CubeFace::PositiveX => (Vec3::x(), Vec3::y()),
        CubeFace::NegativeX => (-Vec3::x(), Vec3::y()),
        CubeFace::PositiveY => (Vec3::y(), -Vec3::z()),
        CubeFace::NegativeY => (-Vec3::y(), Vec3::z()),
        CubeFace::PositiveZ => (Vec3::z(), Vec3::y()),
        CubeFace::NegativeZ => (-Vec3::z(), Vec3::y()),
    }
}

/// World-to-view matrix of `face` for a light at `position`
pub fn face_view(face: CubeFace, position: &Vec3) -> Mat4 {
    let (direction, up) = face_axes(face);
    look_at(position, &(position + direction), &up)
}

/// One face of the cube and the lists attached to its pass
#[derive(Debug)]
pub struct CubeFaceShadow {
    /// Face this entry renders
    pub face: CubeFace,
    /// Casters, viewport and targets of the face
    pub record: ShadowRecord,
    /// Recorded before the face is sampled
    pub bake_list: CommandListHandle,
    /// Copies the face into the cube map
    pub restore_list: CommandListHandle,
    /// Inverse of projection × view, without bias
    pub inverse_view_projection: Mat4,
    /// World to face UV, without bias
    pub world_to_shadow: Mat4,
}

/// Shadow resources of a point light
#[derive(Debug)]
pub struct PointShadows {
    owned: OwnedResources,
    faces: Vec<CubeFaceShadow>,
    working: TargetHandle,
    cube: TargetHandle,
    map_size: u32,
    flags: CapabilityFlags,
}

impl PointShadows {
    /// Allocate six `map_size` faces plus the working and cube targets
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
        let caps = backend.capabilities();
        let owner = ListOwner::Light(light);
        let linear = TargetFormat::LinearDepth(caps.linear_depth_format);
        let working_format = if caps.has(CapabilityFlags::NONLINEAR_POINT_DEPTH) {
            TargetFormat::Shadowmap
        } else {
            linear
        };
        let working = owned.target(
            &TargetDesc::new("hvr_point_working", map_size, map_size, working_format, 16),
            backend,
        )?;
        let cube = owned.target(
            &TargetDesc::cube("hvr_point_cube", map_size, TargetFormat::Shadowmap, 16),
            backend,
        )?;

        let mut specs = Vec::with_capacity(CubeFace::ALL.len());
        let mut lists = Vec::with_capacity(CubeFace::ALL.len());
        for face in CubeFace::ALL {
            let depth = owned.target(
                &TargetDesc::new("hvr_point_face_depth", map_size, map_size, TargetFormat::Depth, 16),
                backend,
            )?;
            let linear_depth = owned.target(
                &TargetDesc::new("hvr_point_face_linear", map_size, map_size, linear, 16),
                backend,
            )?;
            let event = PassEvent::AfterShadowMapFace(face);
            let bake = owned.list("hvr_light.point.bake", owner, event, backend)?;
            let restore = owned.list("hvr_light.point.restore", owner, event, backend)?;
            specs.push((Rect::from_size(map_size, map_size), Some(depth), Some(linear_depth)));
            lists.push((face, bake, restore));
        }
        let records = ShadowRecord::create_many(specs, swap_chain_length, backend)?;
        let faces = records
            .into_iter()
            .zip(lists)
            .map(|(record, (face, bake_list, restore_list))| CubeFaceShadow {
                face,
                record,
                bake_list,
                restore_list,
                inverse_view_projection: Mat4::identity(),
                world_to_shadow: Mat4::identity(),
            })
            .collect();
        debug!("point shadows: {map_size}px faces");
        Ok(Self {
            owned: OwnedResources::new(),
            faces,
            working,
            cube,
            map_size,
            flags: caps.flags,
        })
    }

    /// Set up all six face viewports and declare the casters each one sees
    pub fn will_render(&mut self, light: &Light, ctx: &FrameContext<'_>, backend: &mut dyn GraphicsBackend) {
        let near = light.shadow_near_plane;
        let range = light.range.max(near + f32::EPSILON);
        let projection = perspective(90.0, 1.0, near, range);
        let biased = translation(0.0, 0.0, light.shadow_bias / (range - near)) * projection;
        let gpu_biased = backend.gpu_projection(&biased, false);
        let gpu = backend.gpu_projection(&projection, false);
        let position = light.position();
        let size = self.map_size as f32;

        for face in &mut self.faces {
            face.record.reset_frame();
            let view = face_view(face.face, &position);
            let view_projection = projection * view;
            face.record.view_projection = view_projection;
            face.inverse_view_projection = view_projection.try_inverse().unwrap_or_else(Mat4::identity);
            face.world_to_shadow = to_uv_matrix() * gpu * view;
            face.record.viewport = face
                .record
                .swap_chain
                .next_viewport(view, gpu_biased, 0.0, 0.0, size, size);

            let casters = collect_casters(light, &view_projection, ctx);
            if let Some(viewport) = &face.record.viewport {
                for caster in &casters {
                    backend.declare_visibility(caster.asset, viewport);
                }
            }
            face.record.set_casters(casters);
        }
    }

    /// Render every face's casters and record the copies into the cube map
    pub fn bake(&mut self, light: &Light, cache: &mut ShadowMapCache, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        self.owned.clear_lists(backend);
        if !light.realtime {
            for face in &self.faces {
                if let Some(linear) = face.record.linear_depth {
                    backend.execute(clear_to_far(linear));
                }
            }
            return Ok(());
        }

        let size = self.map_size;
        let position = light.position();
        let position_range = Vec4::new(position.x, position.y, position.z, 1.0 / light.range.max(f32::EPSILON));
        let flip = self.flags.contains(CapabilityFlags::FLIP_CUBE_FACE_Y);
        let nonlinear = self.flags.contains(CapabilityFlags::NONLINEAR_POINT_DEPTH);
        let copy = self.flags.contains(CapabilityFlags::COPY_TEXTURE);
        let flip_matrix = if flip {
            translation(0.0, 1.0, 0.0) * scaling(1.0, -1.0, 1.0)
        } else {
            Mat4::identity()
        };

        for face in &mut self.faces {
            let (Some(depth), Some(linear)) = (face.record.depth, face.record.linear_depth) else {
                continue;
            };
            let Some(viewport) = face.record.viewport.clone() else {
                continue;
            };
            if face.record.casters.is_empty() {
                backend.record(face.restore_list, set_color(linear, None));
                backend.record(face.restore_list, clear_white());
                continue;
            }

            let sources: Vec<(TargetHandle, f32)> = if face.record.has_transparent_actor {
                let mut sources = Vec::with_capacity(face.record.casters.len());
                for caster in &mut face.record.casters {
                    let pass = IsolatedPass {
                        rect: None,
                        asset: caster.asset,
                        viewport: &viewport,
                    };
                    let map = bake_isolated_map(caster.actor, Some(face.face), size, &[pass], cache, backend)?;
                    caster.shadow_map = Some(map);
                    sources.push((map, caster.weight));
                }
                sources
            } else {
                backend.execute(RenderCommand::SetTarget {
                    color: None,
                    depth: Some(depth),
                    layer: None,
                });
                backend.execute(clear_white());
                for caster in &face.record.casters {
                    backend.render_actor(caster.asset, &viewport, None, Some(depth));
                }
                vec![(depth, 1.0)]
            };

            let mut properties = PropertyBlock::new();
            properties
                .set_matrix(Uniform::ViewProjectInverse, face.inverse_view_projection)
                .set_vector(Uniform::CurrLightPositionRange, position_range)
                .set_matrix(Uniform::FlipMapMatrix, flip_matrix);

            if copy {
                let pass = if nonlinear { 5 } else { 2 };
                let mut targets = vec![linear];
                if nonlinear {
                    targets.push(self.working);
                }
                for target in targets {
                    backend.record(face.bake_list, set_color(target, None));
                    backend.record(face.bake_list, clear_white());
                    for (map, weight) in &sources {
                        backend.record(face.bake_list, caster_draw(pass, (size, size), *weight, *map, properties.clone()));
                    }
                }
                record_restore(face, linear, self.working, self.cube, nonlinear, flip, backend);
            } else {
                backend.record(
                    face.bake_list,
                    RenderCommand::SetTarget {
                        color: None,
                        depth: Some(self.cube),
                        layer: Some(face.face.layer()),
                    },
                );
                for (map, weight) in &sources {
                    backend.record(face.bake_list, caster_draw(3, (size, size), *weight, *map, properties.clone()));
                }
                backend.record(face.restore_list, set_color(linear, None));
                backend.record(face.restore_list, clear_white());
            }
        }
        Ok(())
    }

    /// Faces in layer order
    pub fn faces(&self) -> &[CubeFaceShadow] {
        &self.faces
    }

    /// Native cube map the faces are copied into
    pub fn cube(&self) -> TargetHandle {
        self.cube
    }

    /// Scratch target used for flipped and non-linear copies
    pub fn working(&self) -> TargetHandle {
        self.working
    }

    /// Edge length of one face
    pub fn map_size(&self) -> u32 {
        self.map_size
    }

    /// Empty every face's lists
    pub fn clear_command_lists(&self, backend: &mut dyn GraphicsBackend) {
        self.owned.clear_lists(backend);
    }

    /// Release every target, list and viewport slot
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        for face in &mut self.faces {
            face.record.release(backend);
        }
        self.owned.release(backend);
    }
}

/// Copy a baked face into its cube layer, through the working target when
/// the face must be flipped or the cube holds non-linear depth
fn record_restore(
    face: &CubeFaceShadow,
    linear: TargetHandle,
    working: TargetHandle,
    cube: TargetHandle,
    nonlinear: bool,
    flip: bool,
    backend: &mut dyn GraphicsBackend,
) {
    let source = if nonlinear {
        working
    } else if flip {
        let mut properties = PropertyBlock::new();
        properties
            .set_texture(Uniform::Odep, linear)
            .set_matrix(Uniform::FlipMapMatrix, translation(0.0, 1.0, 0.0) * scaling(1.0, -1.0, 1.0));
        backend.record(face.restore_list, set_color(working, None));
        backend.record(
            face.restore_list,
            RenderCommand::Draw {
                mesh: Mesh::FullscreenQuad,
                transform: Mat4::identity(),
                material: MaterialRef::ShadowCaster,
                pass: 4,
                properties,
            },
        );
        working
    } else {
        linear
    };
    backend.record(
        face.restore_list,
        RenderCommand::CopyTexture {
            source,
            source_layer: 0,
            dest: cube,
            dest_layer: face.face.layer(),
        },
    );
}

fn set_color(target: TargetHandle, layer: Option<u32>) -> RenderCommand {
    RenderCommand::SetTarget {
        color: Some(target),
        depth: None,
        layer,
    }
}

fn clear_white() -> RenderCommand {
    RenderCommand::Clear {
        color: Some(WHITE),
        depth: Some(1.0),
    }
}

fn clear_to_far(target: TargetHandle) -> RenderCommand {
    RenderCommand::Blit {
        source: None,
        dest: target,
        material: Some((MaterialRef::LinearDepth, 1)),
        properties: PropertyBlock::new(),
    }
}
