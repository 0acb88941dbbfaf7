//! Scene registry
//!
//! A non-owning directory of every actor, light and renderer taking part in
//! volumetric rendering. Entries are generation-checked ids into the host's
//! arenas, so the registry never keeps an object alive; ids whose object has
//! gone are dropped by [`SceneRegistry::prune`].
//!
//! Pruning needs the host's arenas to tell a live id from a dead one, and
//! `add`/`remove` only see ids. The context therefore prunes once at the top
//! of every frame, before any coordinator iterates the registry. A stale id
//! sitting in the registry between frames is inert: every lookup goes through
//! the generation check and simply misses.
//!
//! Adding or removing an actor queues a [`RegistryEvent`]. The owning
//! [`SceneContext`](crate::SceneContext) drains the queue right after
//! each mutation and forwards it to every render coordinator, which is how
//! bundles get created and disposed.

use std::collections::HashSet;

use log::trace;

use crate::foundation::collections::{ActorId, LightId, ViewpointId};

/// Runtime-typed id of a registered object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneObject {
    /// A volumetric actor
    Actor(ActorId),
    /// A shadow-casting light
    Light(LightId),
    /// A viewpoint with a render coordinator
    Renderer(ViewpointId),
}

/// Ids that can be stored in and queried from the registry
pub trait RegistryObject: Copy {
    /// Narrow a registry entry to this id type
    fn from_object(object: SceneObject) -> Option<Self>;

    /// Widen this id into a registry entry
    fn into_object(self) -> SceneObject;
}

impl RegistryObject for ActorId {
    fn from_object(object: SceneObject) -> Option<Self> {
        match object {
            SceneObject::Actor(id) => Some(id),
            _ => None,
        }
    }

    fn into_object(self) -> SceneObject {
        SceneObject::Actor(self)
    }
}

impl RegistryObject for LightId {
    fn from_object(object: SceneObject) -> Option<Self> {
        match object {
            SceneObject::Light(id) => Some(id),
            _ => None,
        }
    }

    fn into_object(self) -> SceneObject {
        SceneObject::Light(self)
    }
}

impl RegistryObject for ViewpointId {
    fn from_object(object: SceneObject) -> Option<Self> {
        match object {
            SceneObject::Renderer(id) => Some(id),
            _ => None,
        }
    }

    fn into_object(self) -> SceneObject {
        SceneObject::Renderer(self)
    }
}

/// Answers whether the object behind an id still exists
pub trait ObjectLiveness {
    /// True while the object is alive in its arena
    fn is_live(&self, object: SceneObject) -> bool;
}

impl<F: Fn(SceneObject) -> bool> ObjectLiveness for F {
    fn is_live(&self, object: SceneObject) -> bool {
        self(object)
    }
}

/// Notification queued by registry mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    /// An actor was registered
    ActorAdded(ActorId),
    /// An actor was unregistered or pruned
    ActorRemoved(ActorId),
    /// A renderer was registered and needs bundles for the existing actors
    RendererAdded(ViewpointId),
}

/// Directory of registered scene objects in insertion order
#[derive(Debug, Default)]
pub struct SceneRegistry {
    entries: Vec<SceneObject>,
    members: HashSet<SceneObject>,
    events: Vec<RegistryEvent>,
}

impl SceneRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `object`; returns false if it was already registered
    pub fn add(&mut self, object: impl RegistryObject) -> bool {
        let object = object.into_object();
        if !self.members.insert(object) {
            return false;
        }
        self.entries.push(object);
        match object {
            SceneObject::Actor(id) => self.events.push(RegistryEvent::ActorAdded(id)),
            SceneObject::Renderer(id) => self.events.push(RegistryEvent::RendererAdded(id)),
            SceneObject::Light(_) => {}
        }
        trace!("registry: added {object:?}");
        true
    }

    /// Unregister `object`; returns false if it was not registered
    pub fn remove(&mut self, object: impl RegistryObject) -> bool {
        let object = object.into_object();
        if !self.members.remove(&object) {
            return false;
        }
        self.entries.retain(|entry| *entry != object);
        if let SceneObject::Actor(id) = object {
            self.events.push(RegistryEvent::ActorRemoved(id));
        }
        trace!("registry: removed {object:?}");
        true
    }

    /// True if `object` is registered
    pub fn contains(&self, object: impl RegistryObject) -> bool {
        self.members.contains(&object.into_object())
    }

    /// Registered ids of type `T` in insertion order
    pub fn objects<T: RegistryObject>(&self) -> Vec<T> {
        self.entries.iter().filter_map(|entry| T::from_object(*entry)).collect()
    }

    /// Drop every entry whose object is no longer alive
    ///
    /// Idempotent. Pruned actors queue an [`RegistryEvent::ActorRemoved`] so
    /// coordinators release their bundles.
    pub fn prune(&mut self, liveness: &impl ObjectLiveness) -> usize {
        let before = self.entries.len();
        let (live, dead): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|entry| liveness.is_live(*entry));
        self.entries = live;
        for object in dead {
            self.members.remove(&object);
            if let SceneObject::Actor(id) = object {
                self.events.push(RegistryEvent::ActorRemoved(id));
            }
            trace!("registry: pruned stale {object:?}");
        }
        before - self.entries.len()
    }

    /// Take the queued notifications
    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of registered objects
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry without queuing notifications
    pub fn clear(&mut self) {
        self.entries.clear();
        self.members.clear();
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids() -> (SlotMap<ActorId, ()>, ActorId, ActorId) {
        let mut arena = SlotMap::with_key();
        let a = arena.insert(());
        let b = arena.insert(());
        (arena, a, b)
    }

    #[test]
    fn test_add_then_contains() {
        let (_arena, a, _) = ids();
        let mut registry = SceneRegistry::new();
        assert!(registry.add(a));
        assert!(registry.contains(a));
    }

    #[test]
    fn test_remove_then_not_contains() {
        let (_arena, a, _) = ids();
        let mut registry = SceneRegistry::new();
        registry.add(a);
        assert!(registry.remove(a));
        assert!(!registry.contains(a));
        assert!(!registry.remove(a));
    }

    #[test]
    fn test_double_add_is_idempotent() {
        let (_arena, a, _) = ids();
        let mut registry = SceneRegistry::new();
        registry.add(a);
        assert!(!registry.add(a));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.drain_events(), vec![RegistryEvent::ActorAdded(a)]);
    }

    #[test]
    fn test_objects_are_filtered_by_type_in_insertion_order() {
        let (_arena, a, b) = ids();
        let mut lights: SlotMap<LightId, ()> = SlotMap::with_key();
        let light = lights.insert(());
        let mut registry = SceneRegistry::new();
        registry.add(b);
        registry.add(light);
        registry.add(a);
        assert_eq!(registry.objects::<ActorId>(), vec![b, a]);
        assert_eq!(registry.objects::<LightId>(), vec![light]);
        assert!(registry.objects::<ViewpointId>().is_empty());
    }

    #[test]
    fn test_prune_drops_dead_entries_and_notifies() {
        let (mut arena, a, b) = ids();
        let mut registry = SceneRegistry::new();
        registry.add(a);
        registry.add(b);
        registry.drain_events();

        arena.remove(a);
        let liveness = |object: SceneObject| match object {
            SceneObject::Actor(id) => arena.contains_key(id),
            _ => true,
        };
        assert_eq!(registry.prune(&liveness), 1);
        assert_eq!(registry.prune(&liveness), 0);
        assert!(!registry.contains(a));
        assert_eq!(registry.drain_events(), vec![RegistryEvent::ActorRemoved(a)]);
    }

    #[test]
    fn test_stale_key_does_not_alias_reused_slot() {
        let (mut arena, a, _) = ids();
        arena.remove(a);
        let reused = arena.insert(());
        let mut registry = SceneRegistry::new();
        registry.add(reused);
        assert!(!registry.contains(a));
    }
}
