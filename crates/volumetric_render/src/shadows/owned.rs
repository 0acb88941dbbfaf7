use log::trace;

use crate::backend::{BackendResult, CommandListHandle, GraphicsBackend, ListOwner, PassEvent, TargetDesc, TargetHandle};

/// Targets and attached command lists owned by one light's resource set
///
/// Everything allocated through here is released together, which is also how
/// a half-built resource set is unwound when an allocation fails.
#[derive(Debug, Default)]
pub struct OwnedResources {
    targets: Vec<TargetHandle>,
    lists: Vec<(CommandListHandle, ListOwner, PassEvent)>,
}

impl OwnedResources {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a target owned by this set
    pub fn target(&mut self, desc: &TargetDesc, backend: &mut dyn GraphicsBackend) -> BackendResult<TargetHandle> {
        let handle = backend.create_target(desc)?;
        self.targets.push(handle);
        Ok(handle)
    }

    /// Create a command list and attach it to `owner` at `event`
    pub fn list(
        &mut self,
        name: &str,
        owner: ListOwner,
        event: PassEvent,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<CommandListHandle> {
        let handle = backend.create_command_list(name)?;
        backend.attach_command_list(handle, owner, event);
        self.lists.push((handle, owner, event));
        Ok(handle)
    }

    /// Number of owned targets
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Number of owned command lists
    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    /// Empty every owned command list
    pub fn clear_lists(&self, backend: &mut dyn GraphicsBackend) {
        for (list, _, _) in &self.lists {
            backend.clear_command_list(*list);
        }
    }

    /// Detach and release every list, then release every target
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        trace!(
            "shadow resources: releasing {} targets and {} lists",
            self.targets.len(),
            self.lists.len()
        );
        for (list, owner, event) in self.lists.drain(..) {
            backend.detach_command_list(list, owner, event);
            backend.release_command_list(list);
        }
        for target in self.targets.drain(..) {
            backend.release_target(target);
        }
    }
}
