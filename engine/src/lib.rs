pub mod accum;
pub mod backend;
pub mod cache;
pub mod camera;
pub mod config;
pub mod display;
pub mod fps_counter;
pub mod invalidate;
pub mod scene;
pub mod scheduler;
pub mod spectral;

pub use self::{
    accum::{AccumBuffer, AccumSnapshot, SamplePass},
    backend::{
        BackendError, BackendFeatures, CancelToken, CompileError, CompiledPipeline, Extent2d,
        PassOutput, PipelineDesc, PipelineResource, RtBackend, TraceJob,
    },
    cache::{PipelineCache, PipelineKey, PipelineStatus},
    camera::{Camera, CameraEdit},
    config::{RenderConfig, ResolutionPreset, SppTarget},
    display::{to_display_image, ColorSpace, DisplayImage},
    fps_counter::FpsCounter,
    invalidate::{classify, Edit, Invalidation},
    scene::{LightingParams, Material, SceneNode, SceneSnapshot, Surface},
    scheduler::{Progress, RenderError, RenderHandle, RenderLoop, RenderState},
    spectral::{
        band_count, blackbody_weight, plan_bands, BandSet, BandVec, PlanError, SpectralMode,
        SpectralModeKind, WavelengthBand,
    },
};
