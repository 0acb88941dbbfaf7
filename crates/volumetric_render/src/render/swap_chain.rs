//! Viewport descriptor rotation
//!
//! The backend may still be reading last frame's descriptor while this frame
//! writes a new one. Handing out descriptors from a small ring means the slot
//! being written is never the slot being read, without any synchronisation.

use log::debug;

use crate::backend::{BackendResult, GraphicsBackend, ViewportHandle};
use crate::foundation::math::{Mat4, Rect};

/// Camera state handed to the player for one draw
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportDescriptor {
    /// Backend viewport slot this descriptor was written into
    pub handle: ViewportHandle,
    /// World-to-view matrix
    pub view: Mat4,
    /// GPU projection matrix
    pub projection: Mat4,
    /// Pixel rectangle
    pub rect: Rect,
    /// Multi-sample count
    pub samples: u32,
}

impl ViewportDescriptor {
    /// Projection × view
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Fixed ring of viewport slots rotated on every request
#[derive(Debug)]
pub struct ViewportSwapChain {
    slots: Option<Vec<ViewportHandle>>,
    index: usize,
    samples: u32,
}

impl ViewportSwapChain {
    /// Allocate `count` viewport slots; counts below two are raised to two
    pub fn new(count: usize, backend: &mut dyn GraphicsBackend) -> BackendResult<Self> {
        let count = count.max(2);
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match backend.create_viewport() {
                Ok(handle) => slots.push(handle),
                Err(err) => {
                    for handle in slots {
                        backend.delete_viewport(handle);
                    }
                    return Err(err);
                }
            }
        }
        Ok(Self {
            slots: Some(slots),
            index: 0,
            samples: 1,
        })
    }

    /// Sample count written into subsequent descriptors
    pub fn set_samples(&mut self, samples: u32) {
        self.samples = samples.max(1);
    }

    /// Number of slots in the ring, 0 after deletion
    pub fn len(&self) -> usize {
        self.slots.as_ref().map_or(0, Vec::len)
    }

    /// True once the slots have been deleted
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the next slot and advance the ring; `None` after [`delete_viewports`](Self::delete_viewports)
    pub fn next_viewport(&mut self, view: Mat4, projection: Mat4, x: f32, y: f32, width: f32, height: f32) -> Option<ViewportDescriptor> {
        let slots = self.slots.as_ref()?;
        let handle = slots[self.index];
        self.index = (self.index + 1) % slots.len();
        Some(ViewportDescriptor {
            handle,
            view,
            projection,
            rect: Rect::new(x, y, width, height),
            samples: self.samples,
        })
    }

    /// Release every slot; later requests return `None`
    pub fn delete_viewports(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(slots) = self.slots.take() {
            debug!("swap chain: deleting {} viewports", slots.len());
            for handle in slots {
                backend.delete_viewport(handle);
            }
        }
        self.index = 0;
    }
}
