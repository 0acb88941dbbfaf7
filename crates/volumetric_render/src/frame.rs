//! Frame ordering and the once-per-frame prepare guard
//!
//! Every viewpoint that renders in a frame funnels through the same
//! [`FrameScheduler`]. Only the first one to ask gets to prepare the player;
//! the rest reuse what that prepare produced. A forced redraw skips the guard.

use log::trace;

use crate::backend::PlaybackEngine;
use crate::config::PipelineSettings;
use crate::foundation::collections::ActorId;
use crate::scene::{Aabb, Actor, Scene};

/// Frame phases with explicit ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FramePhase {
    /// Resource drift checks, viewport updates
    CheckResources = 0,
    /// Decode engine update and player buffer flip
    Prepare = 1,
    /// Visibility declarations from lights and viewpoints
    DeclareVisibility = 2,
    /// Shadow map baking
    Bake = 3,
    /// Per-actor rendering and command list recording
    Render = 4,
}

/// Read-only view of everything a coordinator consults during a frame
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    /// Host scene
    pub scene: &'a Scene,
    /// Registered actors in registration order
    pub actors: &'a [ActorId],
    /// Decode engine
    pub playback: &'a dyn PlaybackEngine,
    /// Global settings
    pub settings: &'a PipelineSettings,
    /// Frame index being rendered
    pub frame: u64,
}

impl<'a> FrameContext<'a> {
    /// Registered actors that are still alive in the scene
    pub fn live_actors(&self) -> impl Iterator<Item = (ActorId, &'a Actor)> + 'a {
        let scene = self.scene;
        let actors = self.actors;
        actors
            .iter()
            .filter_map(move |id| scene.actors.get(*id).map(|actor| (*id, actor)))
    }

    /// Object-space bounds of `actor`'s current frame
    pub fn local_bounds(&self, actor: &Actor) -> Option<Aabb> {
        actor.asset.and_then(|asset| self.playback.bounds(asset))
    }

    /// World-space bounds of `actor`'s current frame
    pub fn world_bounds(&self, actor: &Actor) -> Option<Aabb> {
        self.local_bounds(actor)
            .map(|bounds| bounds.transformed(&actor.transform.to_matrix()))
    }
}

/// Tracks the frame index and guards the player prepare
#[derive(Debug, Default)]
pub struct FrameScheduler {
    frame: u64,
    last_prepared: Option<u64>,
    phase: Option<FramePhase>,
}

impl FrameScheduler {
    /// Create a scheduler that has not prepared any frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Start work on `frame`; phases restart from the beginning
    pub fn begin_frame(&mut self, frame: u64) {
        if frame != self.frame {
            trace!("scheduler: frame {} -> {frame}", self.frame);
        }
        self.frame = frame;
        self.phase = None;
    }

    /// Frame index currently being rendered
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Last frame index the player was prepared for
    pub fn last_prepared_frame(&self) -> Option<u64> {
        self.last_prepared
    }

    /// True if the current frame still needs a prepare, recording that it got one
    ///
    /// `force` skips the guard for manual refreshes.
    pub fn try_prepare(&mut self, force: bool) -> bool {
        if !force && self.last_prepared == Some(self.frame) {
            trace!("scheduler: frame {} already prepared", self.frame);
            return false;
        }
        self.last_prepared = Some(self.frame);
        true
    }

    /// Enter `phase`; returns false when it would run out of order
    pub fn enter(&mut self, phase: FramePhase) -> bool {
        if self.phase.is_some_and(|current| current > phase) {
            trace!("scheduler: {phase:?} requested after {:?}", self.phase);
            return false;
        }
        self.phase = Some(phase);
        true
    }

    /// Phase most recently entered this frame
    pub fn phase(&self) -> Option<FramePhase> {
        self.phase
    }

    /// Forget the prepare record, e.g. after the device was recreated
    pub fn reset(&mut self) {
        self.last_prepared = None;
        self.phase = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_runs_once_per_frame() {
        let mut scheduler = FrameScheduler::new();
        scheduler.begin_frame(7);
        assert!(scheduler.try_prepare(false));
        assert!(!scheduler.try_prepare(false));
        assert_eq!(scheduler.last_prepared_frame(), Some(7));

        scheduler.begin_frame(8);
        assert!(scheduler.try_prepare(false));
    }

    #[test]
    fn test_force_bypasses_guard() {
        let mut scheduler = FrameScheduler::new();
        scheduler.begin_frame(1);
        assert!(scheduler.try_prepare(false));
        assert!(scheduler.try_prepare(true));
    }

    #[test]
    fn test_phases_must_not_go_backwards() {
        let mut scheduler = FrameScheduler::new();
        scheduler.begin_frame(1);
        assert!(scheduler.enter(FramePhase::Prepare));
        assert!(scheduler.enter(FramePhase::DeclareVisibility));
        assert!(!scheduler.enter(FramePhase::Prepare));
        assert!(scheduler.enter(FramePhase::Render));

        scheduler.begin_frame(2);
        assert!(scheduler.enter(FramePhase::CheckResources));
    }

    #[test]
    fn test_reset_forgets_prepared_frame() {
        let mut scheduler = FrameScheduler::new();
        scheduler.begin_frame(3);
        scheduler.try_prepare(false);
        scheduler.reset();
        assert!(scheduler.try_prepare(false));
    }
}
