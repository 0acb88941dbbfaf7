//! # Volumetric Render
//!
//! Render and shadow orchestration for volumetric video actors on top of an
//! abstract graphics backend.
//!
//! ## Features
//!
//! - **Scene Registry**: non-owning, generation-checked directory of actors,
//!   lights and viewpoints
//! - **Per-Viewpoint Rendering**: per-actor buffers, back-to-front transparent
//!   ordering, lighting and composite command lists
//! - **Shadows**: cascaded directional, single-map spot and cube-map point
//!   shadows, with alpha-weighted transparent occluders
//! - **Frame Scheduling**: one player prepare per frame, with a forced redraw
//! - **Headless Backend**: a recording backend for tests and tooling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use volumetric_render::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut scene = Scene::new();
//!     let camera = scene.viewpoints.insert(Viewpoint::perspective(
//!         "main",
//!         Transform::identity(),
//!         60.0,
//!         0.3,
//!         100.0,
//!         1280,
//!         720,
//!     ));
//!     scene.main_viewpoint = Some(camera);
//!
//!     let mut context = SceneContext::init(HeadlessBackend::new(), StaticPlayback::new(), PipelineSettings::default())?;
//!     context.add_renderer(camera);
//!     let report = context.render_frame(&scene, 1);
//!     println!("rendered {} actors", report.stats.rendered);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod backend;
pub mod config;
pub mod foundation;
pub mod frame;
pub mod render;
pub mod scene;
pub mod shadows;

mod context;

pub use context::{FrameReport, SceneContext};


/// Common imports for pipeline users
pub mod prelude {
    pub use crate::{
        backend::{
            headless::{HeadlessBackend, StaticPlayback},
            AssetHandle, BackendCapabilities, CapabilityFlags, GraphicsApi, GraphicsBackend, PlaybackEngine, TargetHandle,
        },
        config::{Config, ConfigError, PipelineSettings, QualitySettings, ShadowsSetting},
        foundation::{
            collections::{ActorId, LightId, ViewpointId},
            math::{Mat4, Transform, Vec3},
        },
        render::{RenderError, RenderStats},
        scene::{Aabb, Actor, ActorFlags, Light, Material, MaterialId, Scene, Viewpoint},
        shadows::ShadowQuality,
        FrameReport, SceneContext,
    };
}
