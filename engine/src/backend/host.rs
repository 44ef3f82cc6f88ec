use {
    super::{
        BackendError, BackendFeatures, CancelToken, CompileError, CompiledPipeline, PassOutput,
        PipelineDesc, PipelineResource, RtBackend, TraceJob,
    },
    crate::{
        scene::{SceneSnapshot, Surface},
        spectral::blackbody_weight,
    },
    nalgebra as na,
    rand::{rngs::SmallRng, Rng as _, SeedableRng as _},
    std::{
        any::Any,
        f64::consts::PI,
        time::{Duration, Instant},
    },
};

const SUN_TEMPERATURE_K: f32 = 5778.0;
const SHADOW_BIAS: f32 = 1e-3;

/// Reference backend that traces on the CPU against the analytic scene
/// surfaces. Stands in for the hardware path on machines without a ray
/// tracing device and drives headless rendering.
pub struct HostBackend {
    compile_latency: Duration,
}

impl HostBackend {
    pub fn new() -> Self {
        HostBackend {
            compile_latency: Duration::from_millis(0),
        }
    }

    /// The hardware path spends seconds to minutes in first-use shader
    /// compilation; this simulates that cost for the host path.
    pub fn with_compile_latency(compile_latency: Duration) -> Self {
        HostBackend { compile_latency }
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        HostBackend::new()
    }
}

/// Specialization record produced by "compiling" for a scene and band set.
#[derive(Debug)]
struct HostPipeline {
    band_count: u32,
    surface_count: u32,
}

impl PipelineResource for HostPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RtBackend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn features(&self) -> BackendFeatures {
        BackendFeatures::RAY_TRACING | BackendFeatures::SPECTRAL_BANDS | BackendFeatures::HOST_READBACK
    }

    fn compile_pipeline(
        &self,
        desc: &PipelineDesc,
        cancel: &CancelToken,
    ) -> Result<CompiledPipeline, CompileError> {
        let deadline = Instant::now() + self.compile_latency;
        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                return Err(CompileError::Cancelled { key: desc.key });
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        if cancel.is_cancelled() {
            return Err(CompileError::Cancelled { key: desc.key });
        }
        Ok(CompiledPipeline::new(HostPipeline {
            band_count: desc.band_count,
            surface_count: desc.surface_count,
        }))
    }

    fn trace(
        &self,
        pipeline: &CompiledPipeline,
        job: &TraceJob<'_>,
    ) -> Result<PassOutput, BackendError> {
        let pipeline = pipeline
            .downcast_ref::<HostPipeline>()
            .ok_or_else(|| BackendError::BackendFault("foreign pipeline handle".to_owned()))?;
        if pipeline.band_count as usize != job.bands.len() {
            return Err(BackendError::BackendFault(format!(
                "pipeline specialized for {} bands, job carries {}",
                pipeline.band_count,
                job.bands.len(),
            )));
        }
        if pipeline.surface_count as usize != job.scene.nodes.len() {
            return Err(BackendError::BackendFault(format!(
                "pipeline shader table sized for {} surfaces, scene has {}",
                pipeline.surface_count,
                job.scene.nodes.len(),
            )));
        }

        let (origin, forward, right, up) = job.camera.basis();
        let aspect = job.extent.width as f32 / job.extent.height.max(1) as f32;
        let tan_half = (job.camera.fov_y() * 0.5).tan();

        let lighting = &job.scene.lighting;
        let to_sun = -na::Vector3::from(lighting.sun_direction).normalize();
        let sun_spectrum: Vec<f64> = job
            .bands
            .iter()
            .map(|band| blackbody_weight(band.center_nm, SUN_TEMPERATURE_K))
            .collect();

        let band_count = job.bands.len();
        let mut radiance = vec![0.0f64; job.extent.pixel_count() * band_count];

        for y in 0..job.extent.height {
            for x in 0..job.extent.width {
                let pixel = (y * job.extent.width + x) as usize;
                let mut rng = SmallRng::seed_from_u64(
                    job.seed ^ (pixel as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15),
                );
                let out = &mut radiance[pixel * band_count..(pixel + 1) * band_count];

                for _ in 0..job.samples {
                    let jx = (x as f32 + rng.gen::<f32>()) / job.extent.width as f32;
                    let jy = (y as f32 + rng.gen::<f32>()) / job.extent.height as f32;
                    let ndc_x = jx * 2.0 - 1.0;
                    let ndc_y = 1.0 - jy * 2.0;
                    let dir = (forward
                        + right * (ndc_x * tan_half * aspect)
                        + up * (ndc_y * tan_half))
                        .normalize();

                    match nearest_hit(job.scene, &origin, &dir) {
                        Some(hit) => {
                            let material = job.scene.material(hit.material);
                            let cosine = hit.normal.dot(&to_sun).max(0.0);
                            let lit = cosine > 0.0
                                && !occluded(job.scene, &(hit.point + hit.normal * SHADOW_BIAS), &to_sun);
                            // Rough surfaces scatter; perturb the estimate so
                            // the running mean converges progressively.
                            let wiggle =
                                1.0 + material.roughness * (rng.gen::<f32>() - 0.5) * 0.5;

                            for (band, value) in job.bands.iter().zip(out.iter_mut()) {
                                let reflectance =
                                    material.reflectance_at(band.center_nm) as f64 * wiggle as f64;
                                let mut sample = 0.0;
                                if lit {
                                    sample += reflectance
                                        * cosine as f64
                                        * lighting.sun_irradiance as f64
                                        * blackbody_weight(band.center_nm, SUN_TEMPERATURE_K)
                                        / PI;
                                }
                                sample += reflectance
                                    * (lighting.sky_radiance + lighting.ambient) as f64
                                    * blackbody_weight(band.center_nm, SUN_TEMPERATURE_K);
                                sample += material.emission_scale as f64
                                    * blackbody_weight(band.center_nm, material.temperature_k);
                                *value += sample;
                            }
                        }
                        None => {
                            for (spectrum, value) in sun_spectrum.iter().zip(out.iter_mut()) {
                                *value += lighting.sky_radiance as f64 * spectrum;
                            }
                        }
                    }
                }
            }
        }

        Ok(PassOutput {
            radiance,
            samples: job.samples,
        })
    }
}

struct Hit {
    point: na::Point3<f32>,
    normal: na::Vector3<f32>,
    material: u32,
}

fn nearest_hit(
    scene: &SceneSnapshot,
    origin: &na::Point3<f32>,
    dir: &na::Vector3<f32>,
) -> Option<Hit> {
    let mut nearest: Option<(f32, usize)> = None;
    for (index, node) in scene.nodes.iter().enumerate() {
        if let Some(t) = intersect(&node.surface, origin, dir) {
            match nearest {
                Some((best, _)) if best <= t => {}
                _ => nearest = Some((t, index)),
            }
        }
    }
    nearest.map(|(t, index)| {
        let node = &scene.nodes[index];
        let point = origin + dir * t;
        Hit {
            point,
            normal: surface_normal(&node.surface, &point, dir),
            material: node.material,
        }
    })
}

fn occluded(scene: &SceneSnapshot, origin: &na::Point3<f32>, dir: &na::Vector3<f32>) -> bool {
    scene
        .nodes
        .iter()
        .any(|node| intersect(&node.surface, origin, dir).is_some())
}

fn intersect(surface: &Surface, origin: &na::Point3<f32>, dir: &na::Vector3<f32>) -> Option<f32> {
    match *surface {
        Surface::Sphere { center, radius } => {
            let oc = origin - na::Point3::from(na::Vector3::from(center));
            let b = oc.dot(dir);
            let c = oc.dot(&oc) - radius * radius;
            let discriminant = b * b - c;
            if discriminant < 0.0 {
                return None;
            }
            let sqrt = discriminant.sqrt();
            let near = -b - sqrt;
            if near > SHADOW_BIAS {
                Some(near)
            } else {
                let far = -b + sqrt;
                if far > SHADOW_BIAS {
                    Some(far)
                } else {
                    None
                }
            }
        }
        Surface::Plane { point, normal } => {
            let normal = na::Vector3::from(normal);
            let denom = normal.dot(dir);
            if denom.abs() < 1e-6 {
                return None;
            }
            let t = (na::Point3::from(na::Vector3::from(point)) - origin).dot(&normal) / denom;
            if t > SHADOW_BIAS {
                Some(t)
            } else {
                None
            }
        }
    }
}

fn surface_normal(
    surface: &Surface,
    point: &na::Point3<f32>,
    dir: &na::Vector3<f32>,
) -> na::Vector3<f32> {
    let normal = match *surface {
        Surface::Sphere { center, radius } => {
            (point - na::Point3::from(na::Vector3::from(center))) / radius
        }
        Surface::Plane { normal, .. } => na::Vector3::from(normal).normalize(),
    };
    // Always face the incoming ray.
    if normal.dot(dir) > 0.0 {
        -normal
    } else {
        normal
    }
}
