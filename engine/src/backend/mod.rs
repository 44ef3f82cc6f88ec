pub mod host;

use {
    crate::{cache::PipelineKey, camera::Camera, scene::SceneSnapshot, spectral::WavelengthBand},
    serde::{Deserialize, Serialize},
    std::{
        any::Any,
        fmt,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    },
};

bitflags::bitflags! {
    /// Capabilities a backend reports at startup.
    pub struct BackendFeatures: u32 {
        const RAY_TRACING = 0x0000_0001;
        const SPECTRAL_BANDS = 0x0000_0002;
        const HOST_READBACK = 0x0000_0004;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// What a compile produces. Backends keep their pipeline objects behind
/// this and downcast on use.
pub trait PipelineResource: fmt::Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a compiled ray tracing pipeline. Clones share one
/// underlying object; the cache hands the same handle to every requester.
#[derive(Clone, Debug)]
pub struct CompiledPipeline {
    resource: Arc<dyn PipelineResource>,
}

impl CompiledPipeline {
    pub fn new<R>(resource: R) -> Self
    where
        R: PipelineResource,
    {
        CompiledPipeline {
            resource: Arc::new(resource),
        }
    }

    pub fn downcast_ref<R: PipelineResource>(&self) -> Option<&R> {
        self.resource.as_any().downcast_ref()
    }

    /// True when both handles refer to one compiled object.
    pub fn same_object(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

/// Everything a backend needs to specialize a pipeline for one cache key.
#[derive(Clone, Copy, Debug)]
pub struct PipelineDesc {
    pub key: PipelineKey,
    pub band_count: u32,
    pub surface_count: u32,
}

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum CompileError {
    #[error("compilation of pipeline {key:?} was cancelled")]
    Cancelled { key: PipelineKey },

    #[error("pipeline {key:?} failed to compile: {reason}")]
    Failed { key: PipelineKey, reason: String },
}

impl CompileError {
    pub fn key(&self) -> PipelineKey {
        match self {
            CompileError::Cancelled { key } | CompileError::Failed { key, .. } => *key,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("graphics device lost")]
    DeviceLost,

    #[error("out of device memory")]
    OutOfMemory,

    #[error("backend fault: {0}")]
    BackendFault(String),
}

/// One sampling pass over the full target: one iteration per band per pixel.
pub struct TraceJob<'a> {
    pub extent: Extent2d,
    pub bands: &'a [WavelengthBand],
    pub camera: &'a Camera,
    pub scene: &'a SceneSnapshot,
    /// Sample multiplicity of this pass.
    pub samples: u32,
    /// Distinct per pass within an epoch; drives stochastic jitter.
    pub seed: u64,
}

/// Radiance produced by one pass. Pixel-major, one value per band.
pub struct PassOutput {
    pub radiance: Vec<f64>,
    pub samples: u32,
}

/// Seam to the ray tracing device. The engine drives this trait only; the
/// hardware implementation lives with the windowing collaborator.
pub trait RtBackend: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn features(&self) -> BackendFeatures;

    /// Compile the pipeline for `desc`. Long-running; implementations must
    /// poll `cancel` and bail out with `CompileError::Cancelled` when it
    /// fires.
    fn compile_pipeline(
        &self,
        desc: &PipelineDesc,
        cancel: &CancelToken,
    ) -> Result<CompiledPipeline, CompileError>;

    /// Submit one sampling pass and wait for its results.
    fn trace(
        &self,
        pipeline: &CompiledPipeline,
        job: &TraceJob<'_>,
    ) -> Result<PassOutput, BackendError>;
}
