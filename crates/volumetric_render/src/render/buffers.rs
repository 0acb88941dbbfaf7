//! Per-actor offscreen buffers
//!
//! Every render bundle draws its actor into private color and depth targets
//! before compositing. Buffers are kept per stereo eye and always match the
//! pixel size they were last requested at.

use std::collections::BTreeMap;

use log::debug;

use crate::backend::{BackendResult, GraphicsBackend, TargetDesc, TargetFormat, TargetHandle};
use crate::scene::Eye;

/// Color, scratch color and linear depth targets of one eye
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSet {
    /// Actor color
    pub color: TargetHandle,
    /// Lit copy of the color, written by the lighting pass
    pub color_copy: TargetHandle,
    /// Linear depth
    pub depth: TargetHandle,
    /// Frame index the targets were created on
    pub created_frame: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl BufferSet {
    fn create(width: u32, height: u32, frame: u64, backend: &mut dyn GraphicsBackend) -> BackendResult<Self> {
        let depth_format = TargetFormat::LinearDepth(backend.capabilities().linear_depth_format);
        let color = backend.create_target(&TargetDesc::new("hvr_buffers_color", width, height, TargetFormat::Color, 0))?;
        let color_copy = match backend.create_target(&TargetDesc::new(
            "hvr_buffers_color_copy",
            width,
            height,
            TargetFormat::Color,
            0,
        )) {
            Ok(handle) => handle,
            Err(err) => {
                backend.release_target(color);
                return Err(err);
            }
        };
        let depth = match backend.create_target(&TargetDesc::new("hvr_buffers_depth", width, height, depth_format, 32)) {
            Ok(handle) => handle,
            Err(err) => {
                backend.release_target(color);
                backend.release_target(color_copy);
                return Err(err);
            }
        };
        debug!("buffers: created {width}x{height} set on frame {frame}");
        Ok(Self {
            color,
            color_copy,
            depth,
            created_frame: frame,
            width,
            height,
        })
    }

    fn release(&self, backend: &mut dyn GraphicsBackend) {
        backend.release_target(self.color);
        backend.release_target(self.color_copy);
        backend.release_target(self.depth);
    }

    /// True when the set matches `width` × `height`
    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

/// Lazily created buffer sets keyed by eye
#[derive(Debug, Default)]
pub struct BufferPool {
    sets: BTreeMap<Eye, BufferSet>,
}

impl BufferPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers for `eye` at exactly `width` × `height`
    ///
    /// A stored set of a different size is released and replaced.
    pub fn get_buffers(
        &mut self,
        eye: Eye,
        width: u32,
        height: u32,
        frame: u64,
        backend: &mut dyn GraphicsBackend,
    ) -> BackendResult<&BufferSet> {
        let width = width.max(1);
        let height = height.max(1);
        if let Some(existing) = self.sets.get(&eye) {
            if !existing.matches(width, height) {
                debug!(
                    "buffers: {eye:?} resized {}x{} -> {width}x{height}",
                    existing.width, existing.height
                );
                existing.release(backend);
                self.sets.remove(&eye);
            }
        }
        if !self.sets.contains_key(&eye) {
            let set = BufferSet::create(width, height, frame, backend)?;
            self.sets.insert(eye, set);
        }
        self.sets
            .get(&eye)
            .ok_or_else(|| crate::render::RenderError::InvalidHandle(format!("buffer set for {eye:?}")))
    }

    /// Stored set for `eye` without creating one
    pub fn peek(&self, eye: Eye) -> Option<&BufferSet> {
        self.sets.get(&eye)
    }

    /// Number of eyes holding buffers
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// True when no buffers are held
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Release every buffer set
    pub fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        for set in self.sets.values() {
            set.release(backend);
        }
        self.sets.clear();
    }
}
