use std::collections::HashMap;

use log::trace;

use crate::backend::{BackendResult, CubeFace, GraphicsBackend, TargetDesc, TargetFormat, TargetHandle};
use crate::foundation::collections::ActorId;

/// Identity of one isolated per-actor shadow map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowMapKey {
    /// Occluding actor
    pub actor: ActorId,
    /// Cube face for point lights, `None` otherwise
    pub face: Option<CubeFace>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Per-light pool of isolated shadow maps for transparent occluders
///
/// Emptied at the start of every bake; nothing is reused across frames.
#[derive(Debug, Default)]
pub struct ShadowMapCache {
    maps: HashMap<ShadowMapKey, TargetHandle>,
}

impl ShadowMapCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Map for `key`, allocating a linear-depth target on first request this frame
    pub fn request(&mut self, key: ShadowMapKey, backend: &mut dyn GraphicsBackend) -> BackendResult<TargetHandle> {
        if let Some(handle) = self.maps.get(&key) {
            return Ok(*handle);
        }
        let format = TargetFormat::LinearDepth(backend.capabilities().linear_depth_format);
        let handle = backend.create_target(&TargetDesc::new(
            "hvr_transparent_shadowmap",
            key.width,
            key.height,
            format,
            16,
        ))?;
        self.maps.insert(key, handle);
        Ok(handle)
    }

    /// Cached map for `key`
    pub fn get(&self, key: &ShadowMapKey) -> Option<TargetHandle> {
        self.maps.get(key).copied()
    }

    /// Number of cached maps
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Release every cached map
    pub fn clear(&mut self, backend: &mut dyn GraphicsBackend) {
        if !self.maps.is_empty() {
            trace!("shadow cache: releasing {} maps", self.maps.len());
        }
        for (_, handle) in self.maps.drain() {
            backend.release_target(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;
    use slotmap::SlotMap;

    #[test]
    fn test_same_key_returns_same_map() {
        let mut arena: SlotMap<ActorId, ()> = SlotMap::with_key();
        let actor = arena.insert(());
        let mut backend = HeadlessBackend::new();
        let mut cache = ShadowMapCache::new();
        let key = ShadowMapKey {
            actor,
            face: Some(CubeFace::PositiveY),
            width: 64,
            height: 64,
        };
        let a = cache.request(key, &mut backend).unwrap();
        let b = cache.request(key, &mut backend).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_distinguishes_face_and_size() {
        let mut arena: SlotMap<ActorId, ()> = SlotMap::with_key();
        let actor = arena.insert(());
        let mut backend = HeadlessBackend::new();
        let mut cache = ShadowMapCache::new();
        let base = ShadowMapKey {
            actor,
            face: None,
            width: 64,
            height: 64,
        };
        cache.request(base, &mut backend).unwrap();
        cache
            .request(ShadowMapKey { face: Some(CubeFace::NegativeX), ..base }, &mut backend)
            .unwrap();
        cache.request(ShadowMapKey { width: 32, ..base }, &mut backend).unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_clear_releases_targets() {
        let mut arena: SlotMap<ActorId, ()> = SlotMap::with_key();
        let actor = arena.insert(());
        let mut backend = HeadlessBackend::new();
        let mut cache = ShadowMapCache::new();
        let key = ShadowMapKey {
            actor,
            face: None,
            width: 16,
            height: 16,
        };
        let handle = cache.request(key, &mut backend).unwrap();
        cache.clear(&mut backend);
        assert!(cache.is_empty());
        assert!(!backend.is_target_live(handle));
        assert!(cache.get(&key).is_none());
    }
}
