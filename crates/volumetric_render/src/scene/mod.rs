//! Scene objects and the registry that tracks them
//!
//! The host owns actors, lights and viewpoints in a [`Scene`]. The pipeline
//! refers to them only by id and re-resolves those ids every frame.

mod actor;
mod bounds;
mod light;
mod registry;
mod viewpoint;

pub use actor::{Actor, ActorFlags, Material, MaterialId, GEOMETRY_QUEUE, TRANSPARENT_QUEUE, TRANSPARENT_QUEUE_THRESHOLD};
pub use bounds::{Aabb, BoundingSphere, Frustum, Plane};
pub use light::{Light, LightKind, LightShadowResolution, ShadowMode};
pub use registry::{ObjectLiveness, RegistryEvent, RegistryObject, SceneObject, SceneRegistry};
pub use viewpoint::{ClearMode, Eye, EyeMatrices, Projection, RenderMode, RenderPath, StereoMode, Viewpoint};

use crate::foundation::collections::{ActorId, LightId, SlotMap, ViewpointId};

/// Host-owned arenas of every object the pipeline can render
#[derive(Debug, Default)]
pub struct Scene {
    /// Volumetric actors
    pub actors: SlotMap<ActorId, Actor>,
    /// Lights
    pub lights: SlotMap<LightId, Light>,
    /// Viewpoints
    pub viewpoints: SlotMap<ViewpointId, Viewpoint>,
    /// Viewpoint used for screen-dependent shadow decisions
    pub main_viewpoint: Option<ViewpointId>,
    /// Size of an auxiliary editing view, tracked by shadow dirty detection
    pub scene_view_size: Option<(u32, u32)>,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Main viewpoint if it is still alive
    pub fn main_viewpoint(&self) -> Option<&Viewpoint> {
        self.main_viewpoint.and_then(|id| self.viewpoints.get(id))
    }
}

impl ObjectLiveness for Scene {
    fn is_live(&self, object: SceneObject) -> bool {
        match object {
            SceneObject::Actor(id) => self.actors.contains_key(id),
            SceneObject::Light(id) => self.lights.contains_key(id),
            SceneObject::Renderer(id) => self.viewpoints.contains_key(id),
        }
    }
}
