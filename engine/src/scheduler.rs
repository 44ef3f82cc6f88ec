use {
    crate::{
        accum::{AccumBuffer, AccumSnapshot, SamplePass},
        backend::{BackendError, CompileError, Extent2d, PipelineDesc, RtBackend, TraceJob},
        cache::{PipelineCache, PipelineKey, PipelineStatus},
        camera::Camera,
        config::{RenderConfig, SppTarget},
        display::{to_display_image, ColorSpace, DisplayImage},
        fps_counter::FpsCounter,
        invalidate::{classify, Edit, Invalidation},
        scene::SceneSnapshot,
        spectral::{plan_bands, BandVec, PlanError, SpectralMode},
    },
    flume::{Receiver, Sender, TryRecvError},
    parking_lot::Mutex,
    std::{
        sync::Arc,
        thread::JoinHandle,
        time::{Duration, Instant},
    },
};

/// How long a pass waits on an in-flight pipeline compile before going back
/// to the command queue.
const COMPILE_POLL: Duration = Duration::from_millis(50);

/// Render loop states. Stopping keeps accumulated state; only resets and
/// invalidating edits discard it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Rendering,
    Paused,
    Stopped,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum RenderError {
    /// Fatal to the session; the loop stops and waits for an explicit
    /// `start`.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Local to one pipeline key; other keys keep rendering.
    #[error(transparent)]
    Pipeline(#[from] CompileError),
}

/// Live progress readout, published after every pass and state change.
#[derive(Clone, Debug)]
pub struct Progress {
    pub state: RenderState,
    pub epoch: u64,
    pub sample_count: u32,
    pub target: SppTarget,
    pub fps: f32,
    pub eta: Option<Duration>,
    pub compiling_pipeline: bool,
}

enum Command {
    Start(SppTarget),
    Stop,
    Pause,
    Resume,
    Reset,
    Edit(Edit),
    Shutdown,
}

struct SharedState {
    accum: Arc<AccumBuffer>,
    progress: Mutex<Progress>,
    last_error: Mutex<Option<RenderError>>,
}

/// Client half of the render loop. All control flows through here; the
/// loop itself runs on its own thread until the handle shuts it down.
pub struct RenderHandle {
    commands: Sender<Command>,
    shared: Arc<SharedState>,
    thread: Option<JoinHandle<()>>,
}

impl RenderHandle {
    pub fn start(&self, target: SppTarget) {
        self.send(Command::Start(target));
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    /// Forward an edit. Spectral edits are validated eagerly so a bad band
    /// range is reported here and leaves the running accumulation alone.
    pub fn apply_edit(&self, edit: Edit) -> Result<(), PlanError> {
        if let Edit::Spectral(mode) = &edit {
            plan_bands(*mode)?;
        }
        self.send(Command::Edit(edit));
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        self.shared.progress.lock().clone()
    }

    /// Latest published accumulation snapshot. Never blocks behind a pass.
    pub fn snapshot(&self) -> Arc<AccumSnapshot> {
        self.shared.accum.snapshot()
    }

    /// Convert the latest snapshot for presentation or export. The image
    /// reflects whole passes only; a pass in flight is not in it.
    pub fn display_image(&self, color_space: ColorSpace) -> DisplayImage {
        to_display_image(&self.snapshot(), color_space)
    }

    pub fn last_error(&self) -> Option<RenderError> {
        self.shared.last_error.lock().clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::error!("render loop is gone");
        }
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub struct RenderLoop;

impl RenderLoop {
    /// Spawn the render thread. The loop starts in `Idle`; call
    /// `RenderHandle::start` to begin sampling.
    pub fn spawn(
        backend: Arc<dyn RtBackend>,
        scene: SceneSnapshot,
        camera: Camera,
        config: &RenderConfig,
    ) -> Result<RenderHandle, PlanError> {
        let mode = config.spectral_mode;
        let bands = plan_bands(mode)?;
        let extent = config.resolution.extent();
        let accum = Arc::new(AccumBuffer::new(extent, mode, bands.clone()));

        let shared = Arc::new(SharedState {
            accum: accum.clone(),
            progress: Mutex::new(Progress {
                state: RenderState::Idle,
                epoch: 0,
                sample_count: 0,
                target: config.spp_target,
                fps: 0.0,
                eta: None,
                compiling_pipeline: false,
            }),
            last_error: Mutex::new(None),
        });

        let (commands, receiver) = flume::unbounded();
        let mut worker = Loop {
            cache: PipelineCache::new(backend.clone()),
            backend,
            scene,
            camera,
            mode,
            bands,
            extent,
            target: config.spp_target,
            state: RenderState::Idle,
            accum,
            fps: FpsCounter::new(Duration::from_secs(1)),
            shared: shared.clone(),
            pass_index: 0,
            compiling: false,
            blocked: false,
        };
        let thread = std::thread::Builder::new()
            .name("render-loop".to_owned())
            .spawn(move || worker.run(receiver))
            .expect("failed to spawn render thread");

        Ok(RenderHandle {
            commands,
            shared,
            thread: Some(thread),
        })
    }
}

struct Loop {
    backend: Arc<dyn RtBackend>,
    cache: PipelineCache,
    scene: SceneSnapshot,
    camera: Camera,
    mode: SpectralMode,
    bands: BandVec,
    extent: Extent2d,
    target: SppTarget,
    state: RenderState,
    accum: Arc<AccumBuffer>,
    fps: FpsCounter,
    shared: Arc<SharedState>,
    pass_index: u64,
    compiling: bool,
    /// Set when the current pipeline key failed to compile; passes hold
    /// until an edit changes the key.
    blocked: bool,
}

impl Loop {
    fn run(&mut self, commands: Receiver<Command>) {
        tracing::debug!(backend = self.backend.name(), "render loop started");
        loop {
            let command = if self.active() {
                match commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                // Nothing to do until the caller speaks up.
                match commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };

            if let Some(command) = command {
                if !self.handle(command) {
                    break;
                }
                // Drain queued control before the next pass.
                continue;
            }

            if self.active() {
                self.pass();
            }
        }
        tracing::debug!("render loop exited");
    }

    fn active(&self) -> bool {
        self.state == RenderState::Rendering && !self.blocked
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Start(target) => {
                self.target = target;
                *self.shared.last_error.lock() = None;
                self.blocked = false;
                self.fps.reset();
                self.transition(RenderState::Rendering);
            }
            Command::Stop => {
                if let RenderState::Rendering | RenderState::Paused = self.state {
                    self.transition(RenderState::Stopped);
                }
            }
            Command::Pause => {
                if self.state == RenderState::Rendering {
                    self.transition(RenderState::Paused);
                }
            }
            Command::Resume => {
                if self.state == RenderState::Paused {
                    self.transition(RenderState::Rendering);
                }
            }
            Command::Reset => self.invalidate_accum(false),
            Command::Edit(edit) => self.edit(edit),
            Command::Shutdown => return false,
        }
        self.publish_progress();
        true
    }

    fn transition(&mut self, next: RenderState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "render state");
            self.state = next;
        }
    }

    fn edit(&mut self, edit: Edit) {
        let invalidation = classify(&edit, self.extent);
        let old_key = self.pipeline_key();
        let mut layout_changed = false;

        match edit {
            Edit::Camera(camera_edit) => self.camera.apply(camera_edit),
            Edit::Material { index, material } => {
                if !self.scene.set_material(index, material) {
                    tracing::warn!(index, "material edit out of range");
                }
            }
            Edit::Lighting(lighting) => self.scene.lighting = lighting,
            Edit::Topology(scene) => self.scene = scene,
            Edit::Spectral(mode) => match plan_bands(mode) {
                Ok(bands) => {
                    self.mode = mode;
                    self.bands = bands;
                    layout_changed = true;
                }
                Err(error) => {
                    tracing::warn!(%error, "rejecting spectral edit, keeping previous plan");
                    return;
                }
            },
            Edit::SppTarget(target) => self.target = target,
            Edit::Resolution(extent) => {
                if extent.pixel_count() != self.extent.pixel_count() {
                    self.extent = extent;
                    layout_changed = true;
                } else if extent != self.extent {
                    self.extent = extent;
                    self.accum.relabel_extent(extent);
                }
            }
        }

        // A failed pipeline may become compilable after any edit.
        self.blocked = false;

        match invalidation {
            Invalidation::None => {}
            Invalidation::ResetAccumulation => self.invalidate_accum(layout_changed),
            Invalidation::RecompilePipeline => self.invalidate_pipeline(old_key),
            Invalidation::Both => {
                self.invalidate_pipeline(old_key);
                self.invalidate_accum(layout_changed);
            }
        }
    }

    fn invalidate_accum(&mut self, layout_changed: bool) {
        if layout_changed {
            self.accum
                .reconfigure(self.extent, self.mode, self.bands.clone());
        } else {
            self.accum.reset();
        }
        self.pass_index = 0;
        self.fps.reset();
    }

    fn invalidate_pipeline(&mut self, old_key: PipelineKey) {
        self.cache.cancel(old_key);
        // Specialization depends on band count and shader table size, so a
        // same-key entry is stale after a recompile-class edit.
        self.cache.evict(old_key);
        self.cache.forget_failure(old_key);
    }

    fn pipeline_key(&self) -> PipelineKey {
        PipelineKey {
            topology_hash: self.scene.topology_hash(),
            material_hash: self.scene.material_hash(),
            mode_kind: self.mode.kind(),
        }
    }

    fn pass(&mut self) {
        let sample_count = self.accum.snapshot().uniform_sample_count();
        if self.target.reached(sample_count) {
            tracing::debug!(sample_count, "sample target reached");
            self.transition(RenderState::Stopped);
            self.publish_progress();
            return;
        }

        let key = self.pipeline_key();
        let desc = PipelineDesc {
            key,
            band_count: self.bands.len() as u32,
            surface_count: self.scene.nodes.len() as u32,
        };
        let pipeline = match self.cache.get_or_compile(desc) {
            PipelineStatus::Ready(pipeline) => {
                self.compiling = false;
                pipeline
            }
            PipelineStatus::Compiling => {
                self.compiling = true;
                self.publish_progress();
                // Bounded join keeps the loop responsive to control.
                match self.cache.wait_timeout(key, COMPILE_POLL) {
                    Some(Ok(pipeline)) => {
                        self.compiling = false;
                        pipeline
                    }
                    Some(Err(error)) => {
                        self.pipeline_failed(error);
                        return;
                    }
                    None => return,
                }
            }
            PipelineStatus::Failed(error) => {
                self.pipeline_failed(error);
                return;
            }
        };

        let epoch = self.accum.epoch();
        let started = Instant::now();
        let job = TraceJob {
            extent: self.extent,
            bands: &self.bands,
            camera: &self.camera,
            scene: &self.scene,
            samples: 1,
            seed: (epoch << 32).wrapping_add(self.pass_index),
        };

        match self.backend.trace(&pipeline, &job) {
            Ok(output) => {
                let applied = self.accum.accumulate(SamplePass {
                    epoch,
                    samples: output.samples,
                    radiance: output.radiance,
                });
                self.pass_index += 1;
                if applied {
                    self.fps.add_sample(started.elapsed());
                }

                let sample_count = self.accum.snapshot().uniform_sample_count();
                tracing::trace!(sample_count, "pass complete");
                if self.target.reached(sample_count) {
                    tracing::debug!(sample_count, "sample target reached");
                    self.transition(RenderState::Stopped);
                }
                self.publish_progress();
            }
            Err(error) => {
                tracing::error!(%error, "backend failure, stopping session");
                *self.shared.last_error.lock() = Some(RenderError::Backend(error));
                self.transition(RenderState::Stopped);
                self.publish_progress();
            }
        }
    }

    fn pipeline_failed(&mut self, error: CompileError) {
        tracing::error!(%error, "pipeline unavailable");
        *self.shared.last_error.lock() = Some(RenderError::Pipeline(error));
        self.compiling = false;
        // Hold passes until an edit produces a different pipeline; the
        // session itself stays alive.
        self.blocked = true;
        self.publish_progress();
    }

    fn publish_progress(&self) {
        let snapshot = self.accum.snapshot();
        let sample_count = snapshot.uniform_sample_count();
        let eta = match self.target {
            SppTarget::Fixed(target) if self.state == RenderState::Rendering => {
                let remaining = target.saturating_sub(sample_count);
                let average = self.fps.average();
                if remaining > 0 && average > Duration::from_secs(0) {
                    Some(average * remaining)
                } else {
                    None
                }
            }
            _ => None,
        };
        *self.shared.progress.lock() = Progress {
            state: self.state,
            epoch: snapshot.epoch,
            sample_count,
            target: self.target,
            fps: self.fps.fps(),
            eta,
            compiling_pipeline: self.compiling,
        };
    }
}
