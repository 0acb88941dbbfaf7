//! Handle types for the host-owned arenas
//!
//! Actors, lights and viewpoints live in generation-checked slot maps owned by
//! the host scene. Everything else refers to them through these keys, so a key
//! that outlives its object simply stops resolving instead of dangling.

pub use slotmap::{SecondaryMap, SlotMap};

slotmap::new_key_type! {
    /// Handle to an [`Actor`](crate::scene::Actor) in the host scene
    pub struct ActorId;

    /// Handle to a [`Light`](crate::scene::Light) in the host scene
    pub struct LightId;

    /// Handle to a [`Viewpoint`](crate::scene::Viewpoint) in the host scene
    pub struct ViewpointId;
}
