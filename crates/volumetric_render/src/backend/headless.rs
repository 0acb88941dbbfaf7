//! Headless backend and playback engine
//!
//! [`HeadlessBackend`] executes nothing. It records every call so tests and
//! the demo can inspect what the pipeline asked for: which targets are alive,
//! which command lists hold which commands, and which player calls were made
//! in what order. [`StaticPlayback`] serves fixed bounds per asset.

use std::collections::{HashMap, HashSet};

use log::trace;

use super::{
    AssetHandle, BackendCapabilities, BackendResult, CommandListHandle, GraphicsBackend, ListOwner, PassEvent,
    PlaybackEngine, RenderCommand, TargetDesc, TargetHandle, ViewportHandle,
};
use crate::render::{RenderError, ViewportDescriptor};
use crate::scene::Aabb;

/// Player-side call observed by the headless backend
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    /// `prepare_frame`
    PrepareFrame,
    /// `declare_visibility`
    DeclareVisibility(AssetHandle, ViewportHandle),
    /// `render_actor`
    RenderActor {
        /// Asset
        asset: AssetHandle,
        /// Viewport slot used
        viewport: ViewportHandle,
        /// Color target
        color: Option<TargetHandle>,
        /// Depth target
        depth: Option<TargetHandle>,
    },
}

/// Command list state kept by the headless backend
#[derive(Debug, Clone, Default)]
pub struct RecordedList {
    /// Name given at creation
    pub name: String,
    /// Commands in record order
    pub commands: Vec<RenderCommand>,
    /// Owner/event pairs the list is attached to
    pub attachments: Vec<(ListOwner, PassEvent)>,
}

/// Recording backend with no GPU behind it
#[derive(Debug)]
pub struct HeadlessBackend {
    capabilities: BackendCapabilities,
    next_id: u64,
    targets: HashMap<TargetHandle, TargetDesc>,
    lists: HashMap<CommandListHandle, RecordedList>,
    viewports: HashSet<ViewportHandle>,
    executed: Vec<RenderCommand>,
    player_calls: Vec<PlayerCall>,
    failing_assets: HashSet<AssetHandle>,
    targets_created: usize,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::with_capabilities(BackendCapabilities::default())
    }
}

impl HeadlessBackend {
    /// Create a backend with default capabilities
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend reporting `capabilities`
    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        Self {
            capabilities,
            next_id: 1,
            targets: HashMap::new(),
            lists: HashMap::new(),
            viewports: HashSet::new(),
            executed: Vec::new(),
            player_calls: Vec::new(),
            failing_assets: HashSet::new(),
            targets_created: 0,
        }
    }

    /// Change the reported capabilities, e.g. to simulate a device change
    pub fn set_capabilities(&mut self, capabilities: BackendCapabilities) {
        self.capabilities = capabilities;
    }

    /// Make `render_actor` report failure for `asset`
    pub fn fail_asset(&mut self, asset: AssetHandle) {
        self.failing_assets.insert(asset);
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Number of targets not yet released
    pub fn live_target_count(&self) -> usize {
        self.targets.len()
    }

    /// Number of targets ever created
    pub fn targets_created(&self) -> usize {
        self.targets_created
    }

    /// Description of a live target
    pub fn target_desc(&self, target: TargetHandle) -> Option<&TargetDesc> {
        self.targets.get(&target)
    }

    /// Live targets whose name starts with `prefix`
    pub fn targets_named(&self, prefix: &str) -> Vec<(TargetHandle, &TargetDesc)> {
        let mut found: Vec<_> = self
            .targets
            .iter()
            .filter(|(_, desc)| desc.name.starts_with(prefix))
            .map(|(handle, desc)| (*handle, desc))
            .collect();
        found.sort_by_key(|(handle, _)| *handle);
        found
    }

    /// A live command list
    pub fn list(&self, list: CommandListHandle) -> Option<&RecordedList> {
        self.lists.get(&list)
    }

    /// Live command lists whose name starts with `prefix`
    pub fn lists_named(&self, prefix: &str) -> Vec<&RecordedList> {
        let mut found: Vec<_> = self.lists.iter().filter(|(_, l)| l.name.starts_with(prefix)).collect();
        found.sort_by_key(|(handle, _)| **handle);
        found.into_iter().map(|(_, list)| list).collect()
    }

    /// Number of live command lists
    pub fn live_list_count(&self) -> usize {
        self.lists.len()
    }

    /// Number of live viewport slots
    pub fn live_viewport_count(&self) -> usize {
        self.viewports.len()
    }

    /// Commands executed immediately
    pub fn executed(&self) -> &[RenderCommand] {
        &self.executed
    }

    /// Player calls in call order
    pub fn player_calls(&self) -> &[PlayerCall] {
        &self.player_calls
    }

    /// Number of `prepare_frame` calls
    pub fn prepare_count(&self) -> usize {
        self.player_calls
            .iter()
            .filter(|call| matches!(call, PlayerCall::PrepareFrame))
            .count()
    }

    /// Forget executed commands and player calls
    pub fn clear_history(&mut self) {
        self.executed.clear();
        self.player_calls.clear();
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn create_target(&mut self, desc: &TargetDesc) -> BackendResult<TargetHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "{}: zero-sized target {}x{}",
                desc.name, desc.width, desc.height
            )));
        }
        let max = self.capabilities.max_texture_size;
        if desc.width > max || desc.height > max {
            return Err(RenderError::ResourceCreationFailed(format!(
                "{}: {}x{} exceeds max texture size {max}",
                desc.name, desc.width, desc.height
            )));
        }
        let handle = TargetHandle(self.allocate_id());
        trace!("headless: create target {handle:?} {desc:?}");
        self.targets.insert(handle, desc.clone());
        self.targets_created += 1;
        Ok(handle)
    }

    fn release_target(&mut self, target: TargetHandle) {
        self.targets.remove(&target);
    }

    fn is_target_live(&self, target: TargetHandle) -> bool {
        self.targets.contains_key(&target)
    }

    fn create_command_list(&mut self, name: &str) -> BackendResult<CommandListHandle> {
        let handle = CommandListHandle(self.allocate_id());
        self.lists.insert(
            handle,
            RecordedList {
                name: name.to_string(),
                ..RecordedList::default()
            },
        );
        Ok(handle)
    }

    fn release_command_list(&mut self, list: CommandListHandle) {
        self.lists.remove(&list);
    }

    fn attach_command_list(&mut self, list: CommandListHandle, owner: ListOwner, event: PassEvent) {
        if let Some(recorded) = self.lists.get_mut(&list) {
            if !recorded.attachments.contains(&(owner, event)) {
                recorded.attachments.push((owner, event));
            }
        }
    }

    fn detach_command_list(&mut self, list: CommandListHandle, owner: ListOwner, event: PassEvent) {
        if let Some(recorded) = self.lists.get_mut(&list) {
            recorded.attachments.retain(|pair| *pair != (owner, event));
        }
    }

    fn clear_command_list(&mut self, list: CommandListHandle) {
        if let Some(recorded) = self.lists.get_mut(&list) {
            recorded.commands.clear();
        }
    }

    fn record(&mut self, list: CommandListHandle, command: RenderCommand) {
        if let Some(recorded) = self.lists.get_mut(&list) {
            recorded.commands.push(command);
        }
    }

    fn execute(&mut self, command: RenderCommand) {
        self.executed.push(command);
    }

    fn create_viewport(&mut self) -> BackendResult<ViewportHandle> {
        let handle = ViewportHandle(self.allocate_id());
        self.viewports.insert(handle);
        Ok(handle)
    }

    fn delete_viewport(&mut self, viewport: ViewportHandle) {
        self.viewports.remove(&viewport);
    }

    fn prepare_frame(&mut self, _color: Option<TargetHandle>, _depth: Option<TargetHandle>) {
        self.player_calls.push(PlayerCall::PrepareFrame);
    }

    fn declare_visibility(&mut self, asset: AssetHandle, viewport: &ViewportDescriptor) {
        self.player_calls.push(PlayerCall::DeclareVisibility(asset, viewport.handle));
    }

    fn render_actor(
        &mut self,
        asset: AssetHandle,
        viewport: &ViewportDescriptor,
        color: Option<TargetHandle>,
        depth: Option<TargetHandle>,
    ) -> bool {
        self.player_calls.push(PlayerCall::RenderActor {
            asset,
            viewport: viewport.handle,
            color,
            depth,
        });
        let targets_live = color.iter().chain(depth.iter()).all(|t| self.targets.contains_key(t));
        targets_live && self.viewports.contains(&viewport.handle) && !self.failing_assets.contains(&asset)
    }
}

/// Playback engine serving fixed bounds per asset
#[derive(Debug, Default)]
pub struct StaticPlayback {
    bounds: HashMap<AssetHandle, Aabb>,
    updates: u64,
    frame_time: f32,
}

impl StaticPlayback {
    /// Create an engine with no assets
    pub fn new() -> Self {
        Self {
            frame_time: 1.0 / 30.0,
            ..Self::default()
        }
    }

    /// Register an asset with fixed object-space bounds
    pub fn insert(&mut self, asset: AssetHandle, bounds: Aabb) {
        self.bounds.insert(asset, bounds);
    }

    /// Forget an asset
    pub fn remove(&mut self, asset: AssetHandle) {
        self.bounds.remove(&asset);
    }

    /// Number of `update` calls so far
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl PlaybackEngine for StaticPlayback {
    fn update(&mut self) {
        self.updates += 1;
    }

    fn bounds(&self, asset: AssetHandle) -> Option<Aabb> {
        self.bounds.get(&asset).copied()
    }

    fn is_playing(&self, asset: AssetHandle) -> bool {
        self.bounds.contains_key(&asset)
    }

    fn current_time(&self, asset: AssetHandle) -> f32 {
        if self.is_playing(asset) {
            self.updates as f32 * self.frame_time
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TargetFormat;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_targets_are_tracked_until_released() {
        let mut backend = HeadlessBackend::new();
        let target = backend
            .create_target(&TargetDesc::new("color", 64, 32, TargetFormat::Color, 0))
            .unwrap();
        assert!(backend.is_target_live(target));
        assert_eq!(backend.live_target_count(), 1);
        backend.release_target(target);
        assert!(!backend.is_target_live(target));
        assert_eq!(backend.targets_created(), 1);
    }

    #[test]
    fn test_zero_sized_target_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let result = backend.create_target(&TargetDesc::new("bad", 0, 32, TargetFormat::Color, 0));
        assert!(matches!(result, Err(RenderError::ResourceCreationFailed(_))));
    }

    #[test]
    fn test_attach_is_idempotent_and_detach_removes() {
        let mut backend = HeadlessBackend::new();
        let list = backend.create_command_list("opaque").unwrap();
        let mut lights: slotmap::SlotMap<crate::foundation::collections::LightId, ()> = slotmap::SlotMap::with_key();
        let owner = ListOwner::Light(lights.insert(()));
        backend.attach_command_list(list, owner, PassEvent::AfterShadowMap);
        backend.attach_command_list(list, owner, PassEvent::AfterShadowMap);
        assert_eq!(backend.list(list).unwrap().attachments.len(), 1);
        backend.detach_command_list(list, owner, PassEvent::AfterShadowMap);
        assert!(backend.list(list).unwrap().attachments.is_empty());
    }

    #[test]
    fn test_static_playback_reports_bounds() {
        let mut playback = StaticPlayback::new();
        let asset = AssetHandle(7);
        assert!(playback.bounds(asset).is_none());
        playback.insert(asset, Aabb::from_center_extents(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0)));
        assert!(playback.is_playing(asset));
        playback.update();
        playback.update();
        assert!(playback.current_time(asset) > 0.0);
    }
}
