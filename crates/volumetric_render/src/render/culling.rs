use crate::foundation::math::{Mat4, Transform, Vec3};
use crate::scene::{Aabb, BoundingSphere, Frustum};

/// Edge length substituted for bounds the decoder has not filled in yet
const FALLBACK_BOUNDS_SIZE: f32 = 100.0;

/// Bounding-sphere visibility test for one actor against one viewpoint
#[derive(Debug, Clone)]
pub struct CullingHelper {
    sphere: BoundingSphere,
    visible: bool,
}

impl Default for CullingHelper {
    fn default() -> Self {
        Self {
            sphere: BoundingSphere::default(),
            visible: true,
        }
    }
}

impl CullingHelper {
    /// Create a helper that reports visible until the first update
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the sphere from object-space `bounds` and test it against `view_projection`
    pub fn update(&mut self, transform: &Transform, bounds: &Aabb, radius_multiplier: f32, view_projection: &Mat4) {
        self.sphere = Self::sphere_for(transform, bounds, radius_multiplier);
        self.visible = Frustum::from_matrix(view_projection).intersects_sphere(&self.sphere);
    }

    /// World-space bounding sphere of `bounds` under `transform`
    pub fn sphere_for(transform: &Transform, bounds: &Aabb, radius_multiplier: f32) -> BoundingSphere {
        let size = if bounds.is_degenerate() {
            Vec3::repeat(FALLBACK_BOUNDS_SIZE)
        } else {
            bounds.size()
        };
        let center = transform.transform_point(&bounds.center());
        let scaled_size = size.component_mul(&transform.scale.abs());
        let scaled_max = center + scaled_size * 0.5;
        BoundingSphere::new(center, (scaled_max - center).norm() * radius_multiplier)
    }

    /// Result of the last update
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Sphere centre from the last update
    pub fn position(&self) -> Vec3 {
        self.sphere.center
    }

    /// Sphere radius from the last update
    pub fn radius(&self) -> f32 {
        self.sphere.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{look_at, perspective};
    use approx::assert_relative_eq;

    fn view_projection() -> Mat4 {
        perspective(60.0, 1.0, 0.1, 50.0) * look_at(&Vec3::new(0.0, 0.0, 10.0), &Vec3::zeros(), &Vec3::y())
    }

    #[test]
    fn test_zero_bounds_fall_back_to_large_sphere() {
        let sphere = CullingHelper::sphere_for(&Transform::identity(), &Aabb::new(Vec3::zeros(), Vec3::zeros()), 1.0);
        assert_relative_eq!(sphere.radius, (3.0f32).sqrt() * 50.0, epsilon = 1e-3);
    }

    #[test]
    fn test_point_bounds_away_from_origin_also_fall_back() {
        let point = Aabb::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 2.0, 3.0));
        assert!(point.is_degenerate());
        assert!(!Aabb::from_center_extents(Vec3::zeros(), Vec3::new(0.0, 0.0, 0.1)).is_degenerate());
        let sphere = CullingHelper::sphere_for(&Transform::identity(), &point, 1.0);
        assert_relative_eq!(sphere.center, Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-5);
        assert_relative_eq!(sphere.radius, (3.0f32).sqrt() * 50.0, epsilon = 1e-3);
    }

    #[test]
    fn test_sphere_follows_transform_and_multiplier() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0)).with_scale(Vec3::new(2.0, 2.0, 2.0));
        let bounds = Aabb::from_center_extents(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        let sphere = CullingHelper::sphere_for(&transform, &bounds, 0.5);
        assert_relative_eq!(sphere.center, Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-5);
        assert_relative_eq!(sphere.radius, (12.0f32).sqrt() * 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_actor_behind_camera_is_culled() {
        let bounds = Aabb::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5));
        let mut helper = CullingHelper::new();
        assert!(helper.is_visible());

        helper.update(&Transform::identity(), &bounds, 1.0, &view_projection());
        assert!(helper.is_visible());

        helper.update(&Transform::from_position(Vec3::new(0.0, 0.0, 30.0)), &bounds, 1.0, &view_projection());
        assert!(!helper.is_visible());
    }
}
