//! # Per-Viewpoint Rendering
//!
//! Everything a single viewpoint needs to put volumetric actors on screen:
//! the per-actor [`RenderBundle`]s with their [`BufferPool`]s and
//! [`CullingHelper`]s, the [`ViewportSwapChain`] that feeds the player, and
//! the [`RenderCoordinator`] that records opaque, transparent and composite
//! work into backend command lists.
//!
//! ## Design Goals
//!
//! - **Frame-synchronous**: nothing here waits on the GPU; swap chains keep
//!   descriptors from aliasing across frames instead
//! - **Self-healing**: settings drift is detected by comparing cached values
//!   and resources are rebuilt on the next frame
//! - **Quiet degradation**: per-frame problems are classified as a
//!   [`Degradation`], logged, and recovered locally

mod buffers;
mod bundle;
mod coordinator;
mod culling;
mod swap_chain;

pub use buffers::{BufferPool, BufferSet};
pub use bundle::{sort_back_to_front, RenderBundle};
pub use coordinator::{CoordinatorState, DrawOrder, FrameShadows, RenderCoordinator, RenderStats};
pub use culling::CullingHelper;
pub use swap_chain::{ViewportDescriptor, ViewportSwapChain};

use log::{debug, trace, warn};

/// Errors raised while constructing render resources
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Pipeline initialization failed during setup
    ///
    /// Raised when a context or coordinator cannot acquire the backend
    /// objects it needs before the first frame.
    #[error("Pipeline initialization failed: {0}")]
    InitializationFailed(String),

    /// Resource creation or management failed
    ///
    /// Occurs when a render target, command list or viewport slot cannot be
    /// created, typically because of size limits or memory pressure.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// The graphics API cannot run the pipeline
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A handle was used after release or never existed
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Backend-specific error occurred
    ///
    /// Wraps backend-specific errors in a generic form for consistent error
    /// handling across different graphics backends.
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Classification of per-frame problems that are recovered locally
///
/// None of these reach the frame scheduler. They exist so every component
/// logs the same kind of problem at the same level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Degradation {
    /// The graphics API cannot run the pipeline; everything is disabled
    UnsupportedPlatform,
    /// Cached settings no longer match; resources are rebuilt
    ResourceDrift,
    /// An actor or light lacks something it needs this frame and is skipped
    MissingDependency,
    /// A slower code path replaces an unavailable capability
    CapabilityFallback,
    /// A resource was disposed while work using it may still be in flight
    TemporalRace,
}

impl Degradation {
    /// Log `detail` at the level this kind of degradation calls for
    pub fn report(self, detail: &str) {
        match self {
            Self::UnsupportedPlatform => warn!("unsupported platform: {detail}"),
            Self::ResourceDrift => debug!("resource drift: {detail}"),
            Self::CapabilityFallback => debug!("capability fallback: {detail}"),
            Self::MissingDependency => trace!("missing dependency: {detail}"),
            Self::TemporalRace => trace!("temporal race: {detail}"),
        }
    }
}
