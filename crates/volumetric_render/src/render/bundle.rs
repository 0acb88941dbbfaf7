use rand::Rng;

use super::{BufferPool, CullingHelper};
use crate::backend::GraphicsBackend;
use crate::foundation::collections::ActorId;
use crate::foundation::math::{Mat4, Vec3};
use crate::scene::{Aabb, Actor, ActorFlags};

/// State one render coordinator keeps for one actor
#[derive(Debug)]
pub struct RenderBundle {
    /// Actor this bundle draws
    pub actor: ActorId,
    /// Offscreen buffers per eye
    pub buffers: BufferPool,
    /// Frustum test against the owning viewpoint
    pub culling: CullingHelper,
    /// Distance from the viewpoint, refreshed every frame
    pub distance: f32,
    /// Fixed random sort bias breaking ties between coincident actors
    pub z_bias: f32,
    /// Result of the last visibility update
    pub visible: bool,
}

impl RenderBundle {
    /// Create a bundle with a sort bias drawn from `[-z_bias_range, z_bias_range]`
    pub fn new(actor: ActorId, z_bias_range: f32) -> Self {
        let range = z_bias_range.abs();
        let z_bias = if range > 0.0 {
            rand::thread_rng().gen_range(-range..=range)
        } else {
            0.0
        };
        Self {
            actor,
            buffers: BufferPool::new(),
            culling: CullingHelper::new(),
            distance: 0.0,
            z_bias,
            visible: true,
        }
    }

    /// Refresh distance and visibility for this frame
    ///
    /// Actors without decoded bounds or with culling turned off stay visible.
    pub fn update_visibility(&mut self, actor: &Actor, bounds: Option<&Aabb>, camera_position: &Vec3, view_projection: &Mat4) {
        self.distance = (actor.transform.position - camera_position).norm();
        self.visible = match bounds {
            Some(bounds) if actor.has(ActorFlags::OCCLUSION_CULLING) => {
                self.culling
                    .update(&actor.transform, bounds, actor.occlusion_culling_multiplier, view_projection);
                self.culling.is_visible()
            }
            _ => true,
        };
    }

    /// Back-to-front sort key
    pub fn sort_key(&self) -> f32 {
        self.distance + self.z_bias
    }

    /// Release every buffer held by the bundle
    pub fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        self.buffers.dispose(backend);
    }
}

/// Sort bundles so the farthest comes first
pub fn sort_back_to_front(bundles: &mut [&RenderBundle]) {
    bundles.sort_by(|a, b| b.sort_key().total_cmp(&a.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Transform;
    use slotmap::SlotMap;

    fn actor_ids(count: usize) -> Vec<ActorId> {
        let mut arena: SlotMap<ActorId, ()> = SlotMap::with_key();
        (0..count).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn test_z_bias_stays_in_range() {
        for id in actor_ids(50) {
            let bundle = RenderBundle::new(id, 0.001);
            assert!(bundle.z_bias.abs() <= 0.001);
        }
        let bundle = RenderBundle::new(actor_ids(1)[0], 0.0);
        assert_eq!(bundle.z_bias, 0.0);
    }

    #[test]
    fn test_sort_is_back_to_front() {
        let ids = actor_ids(5);
        let distances = [3.0, 10.0, 3.0, 0.5, 7.0];
        let bundles: Vec<RenderBundle> = ids
            .iter()
            .zip(distances)
            .map(|(id, d)| {
                let mut bundle = RenderBundle::new(*id, 0.001);
                bundle.distance = d;
                bundle
            })
            .collect();
        let mut order: Vec<&RenderBundle> = bundles.iter().collect();
        sort_back_to_front(&mut order);
        for pair in order.windows(2) {
            assert!(pair[0].distance + pair[0].z_bias >= pair[1].distance + pair[1].z_bias);
        }
        assert_eq!(order[0].distance, 10.0);
    }

    #[test]
    fn test_visibility_without_bounds_defaults_to_visible() {
        let id = actor_ids(1)[0];
        let mut bundle = RenderBundle::new(id, 0.0);
        let actor = Actor::new("a", Transform::from_position(Vec3::new(0.0, 0.0, 4.0)));
        bundle.update_visibility(&actor, None, &Vec3::zeros(), &Mat4::zeros());
        assert!(bundle.visible);
        assert!((bundle.distance - 4.0).abs() < 1e-6);
    }
}
