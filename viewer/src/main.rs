use {
    color_eyre::Report,
    eyre::WrapErr as _,
    spectryl::{
        backend::host::HostBackend, Camera, ColorSpace, DisplayImage, LightingParams, Material,
        RenderConfig, RenderLoop, RenderState, SceneNode, SceneSnapshot, SppTarget, Surface,
    },
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
    tracing_subscriber::EnvFilter,
};

/// How long an unbounded session runs before the viewer stops it.
const UNBOUNDED_BUDGET: Duration = Duration::from_secs(3);

fn main() -> Result<(), Report> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = RenderConfig::load_default()?;
    tracing::info!(?config, "config loaded");

    let backend = Arc::new(HostBackend::new());
    let handle = RenderLoop::spawn(backend, demo_scene(), Camera::default(), &config)?;

    handle.start(config.spp_target);
    let started = Instant::now();

    loop {
        std::thread::sleep(Duration::from_millis(200));
        let progress = handle.progress();
        tracing::info!(
            spp = progress.sample_count,
            fps = progress.fps as f64,
            compiling = progress.compiling_pipeline,
            state = ?progress.state,
            "progress"
        );
        if progress.state == RenderState::Stopped {
            break;
        }
        if config.spp_target == SppTarget::Unbounded && started.elapsed() > UNBOUNDED_BUDGET {
            handle.stop();
        }
    }

    if let Some(error) = handle.last_error() {
        return Err(eyre::eyre!("render session failed: {}", error));
    }

    let image = handle.display_image(ColorSpace::Srgb);
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "render.png".to_owned());
    save_png(&image, &path).wrap_err("failed to write output image")?;
    tracing::info!(%path, spp = handle.progress().sample_count, "render written");
    Ok(())
}

fn demo_scene() -> SceneSnapshot {
    SceneSnapshot {
        nodes: vec![
            SceneNode {
                name: "ground".to_owned(),
                surface: Surface::Plane {
                    point: [0.0, 0.0, 0.0],
                    normal: [0.0, 1.0, 0.0],
                },
                material: 0,
            },
            SceneNode {
                name: "sphere".to_owned(),
                surface: Surface::Sphere {
                    center: [-1.2, 1.0, 0.0],
                    radius: 1.0,
                },
                material: 1,
            },
            SceneNode {
                name: "hot-sphere".to_owned(),
                surface: Surface::Sphere {
                    center: [1.2, 0.7, 0.5],
                    radius: 0.7,
                },
                material: 2,
            },
        ],
        materials: vec![
            Material {
                reflectance: 0.4,
                spectral_slope: 0.02,
                roughness: 0.8,
                ..Material::default()
            },
            Material {
                reflectance: 0.7,
                spectral_slope: -0.05,
                roughness: 0.1,
                ..Material::default()
            },
            // Visible in thermal bands: an engine-exhaust-hot surface.
            Material {
                reflectance: 0.2,
                emission_scale: 1.5,
                temperature_k: 600.0,
                ..Material::default()
            },
        ],
        lighting: LightingParams::default(),
    }
}

fn save_png(image: &DisplayImage, path: &str) -> Result<(), Report> {
    let mut out = image::RgbImage::new(image.extent.width, image.extent.height);
    for (index, pixel) in image.pixels.iter().enumerate() {
        let x = index as u32 % image.extent.width;
        let y = index as u32 / image.extent.width;
        out.put_pixel(x, y, image::Rgb([quantize(pixel[0]), quantize(pixel[1]), quantize(pixel[2])]));
    }
    out.save(path)?;
    Ok(())
}

fn quantize(channel: f32) -> u8 {
    (channel.max(0.0).min(1.0) * 255.0 + 0.5) as u8
}
