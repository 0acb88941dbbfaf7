//! Headless volumetric scene demo
//!
//! Builds a small scene of volumetric actors lit by a sun, a spot and a point
//! light, then drives the pipeline against the recording backend and logs what
//! every frame did.
//!
//! ```text
//! RUST_LOG=debug cargo run -p volumetric_demo -- [settings.toml|settings.ron] [frames]
//! ```

use log::{info, warn};
use rand::Rng;
use volumetric_render::prelude::*;
use volumetric_render::scene::LightKind;

const DEFAULT_FRAMES: u64 = 8;
const ACTOR_COUNT: u64 = 6;

struct DemoScene {
    scene: Scene,
    camera: ViewpointId,
    actors: Vec<ActorId>,
    lamp: LightId,
}

impl DemoScene {
    fn build(playback: &mut StaticPlayback) -> Self {
        let mut rng = rand::thread_rng();
        let mut scene = Scene::new();
        let camera = scene.viewpoints.insert(Viewpoint::perspective(
            "main",
            Transform::looking_at(Vec3::new(0.0, 2.0, 8.0), Vec3::zeros()),
            60.0,
            0.3,
            100.0,
            1280,
            720,
        ));
        scene.main_viewpoint = Some(camera);

        let mut actors = Vec::new();
        for index in 0..ACTOR_COUNT {
            let asset = AssetHandle(index + 1);
            playback.insert(asset, Aabb::from_center_extents(Vec3::new(0.0, 0.9, 0.0), Vec3::new(0.4, 0.9, 0.3)));
            let position = Vec3::new(rng.gen_range(-3.0..3.0), 0.0, rng.gen_range(-4.0..2.0));
            let material = if index % 3 == 0 {
                Material::transparent(MaterialId(index), [0.8, 0.9, 1.0, 0.5])
            } else {
                Material::opaque(MaterialId(index))
            };
            actors.push(scene.actors.insert(
                Actor::new(format!("performer{index}"), Transform::from_position(position))
                    .with_asset(asset)
                    .with_material(material),
            ));
        }

        scene.lights.insert(Light::directional("sun", Vec3::new(-0.3, -1.0, -0.4)));
        let lamp = scene
            .lights
            .insert(Light::spot("lamp", Vec3::new(0.0, 5.0, 3.0), Vec3::zeros(), 20.0, 50.0));
        scene.lights.insert(Light::point("bulb", Vec3::new(2.0, 3.0, -1.0), 8.0));

        Self {
            scene,
            camera,
            actors,
            lamp,
        }
    }
}

fn load_settings(path: Option<&str>) -> PipelineSettings {
    let Some(path) = path else {
        return PipelineSettings::default();
    };
    match PipelineSettings::load_from_file(path) {
        Ok(settings) => {
            info!("Loaded pipeline settings from {path}");
            settings
        }
        Err(e) => {
            warn!("Failed to load {path}: {e}; using defaults");
            PipelineSettings::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let settings = load_settings(args.next().as_deref());
    let frames = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(DEFAULT_FRAMES);

    let mut playback = StaticPlayback::new();
    let mut demo = DemoScene::build(&mut playback);
    let mut context = SceneContext::init(HeadlessBackend::new(), playback, settings)?;
    context.add_renderer(demo.camera);
    for id in demo.scene.actors.keys() {
        context.add_actor(id);
    }
    for id in demo.scene.lights.keys() {
        context.add_light(id);
    }

    for frame in 1..=frames {
        match frame {
            3 => {
                info!("Resizing the main viewpoint");
                demo.scene.viewpoints[demo.camera].resize(1920, 1080);
            }
            5 => {
                info!("Turning the lamp into a point light");
                demo.scene.lights[demo.lamp].kind = LightKind::Point;
            }
            6 => {
                if let Some(actor) = demo.actors.pop() {
                    info!("Removing {}", demo.scene.actors[actor].name);
                    demo.scene.actors.remove(actor);
                }
            }
            _ => {}
        }

        let report = context.render_frame(&demo.scene, frame);
        info!(
            "frame {}: prepared {}, rendered {}, failed {}, composites {}, lighting draws {}, lights baked {}, refreshed {}",
            report.frame,
            report.prepared,
            report.stats.rendered,
            report.stats.failed,
            report.stats.composite_draws,
            report.stats.lighting_draws,
            report.lights_baked,
            report.lights_refreshed
        );
    }

    let backend = context.backend();
    info!(
        "{} live targets, {} live lists, {} targets created over the run",
        backend.live_target_count(),
        backend.live_list_count(),
        backend.targets_created()
    );

    let (backend, _) = context.teardown();
    info!("{} live targets after teardown", backend.live_target_count());
    Ok(())
}
