use {
    crate::{
        backend::{CancelToken, CompileError, CompiledPipeline, PipelineDesc, RtBackend},
        spectral::SpectralModeKind,
    },
    lru::LruCache,
    parking_lot::{Condvar, Mutex},
    std::{collections::HashMap, sync::Arc, time::Duration},
};

type KeyMap<V> = HashMap<PipelineKey, V, ahash::RandomState>;

pub const DEFAULT_CAPACITY: usize = 32;

/// Cache key for compiled pipelines. Wavelength values stay out on purpose:
/// only the kind of spectral pipeline specializes shaders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub topology_hash: u64,
    pub material_hash: u64,
    pub mode_kind: SpectralModeKind,
}

#[derive(Clone, Debug)]
pub enum PipelineStatus {
    Ready(CompiledPipeline),
    Compiling,
    Failed(CompileError),
}

struct CompileJob {
    cancel: CancelToken,
    done: Mutex<Option<Result<CompiledPipeline, CompileError>>>,
    finished: Condvar,
}

impl CompileJob {
    fn new() -> Self {
        CompileJob {
            cancel: CancelToken::new(),
            done: Mutex::new(None),
            finished: Condvar::new(),
        }
    }

    fn complete(&self, result: Result<CompiledPipeline, CompileError>) {
        *self.done.lock() = Some(result);
        self.finished.notify_all();
    }

    fn wait(&self) -> Result<CompiledPipeline, CompileError> {
        let mut done = self.done.lock();
        while done.is_none() {
            self.finished.wait(&mut done);
        }
        done.clone().unwrap()
    }

    fn wait_timeout(&self, timeout: Duration) -> Option<Result<CompiledPipeline, CompileError>> {
        let mut done = self.done.lock();
        if done.is_none() {
            self.finished.wait_for(&mut done, timeout);
        }
        done.clone()
    }
}

struct Shared {
    backend: Arc<dyn RtBackend>,
    capacity: usize,
    // Lock order when nesting: `inflight` before `ready` or `failed`.
    ready: Mutex<LruCache<PipelineKey, CompiledPipeline>>,
    inflight: Mutex<KeyMap<Arc<CompileJob>>>,
    failed: Mutex<KeyMap<CompileError>>,
}

/// Compiled pipeline cache with single-flight background compilation.
/// Cheap to clone; clones share the same entries. Ready entries are bounded
/// by an LRU; evicted handles stay alive for anyone still holding them.
#[derive(Clone)]
pub struct PipelineCache {
    shared: Arc<Shared>,
}

impl PipelineCache {
    pub fn new(backend: Arc<dyn RtBackend>) -> Self {
        PipelineCache::with_capacity(backend, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(backend: Arc<dyn RtBackend>, capacity: usize) -> Self {
        PipelineCache {
            shared: Arc::new(Shared {
                backend,
                capacity,
                ready: Mutex::new(LruCache::new(capacity)),
                inflight: Mutex::new(KeyMap::default()),
                failed: Mutex::new(KeyMap::default()),
            }),
        }
    }

    /// Non-blocking lookup. A miss schedules a background compile and
    /// reports `Compiling`; concurrent callers for the same key join that
    /// compile instead of starting another.
    pub fn get_or_compile(&self, desc: PipelineDesc) -> PipelineStatus {
        let key = desc.key;
        if let Some(pipeline) = self.shared.ready.lock().get(&key) {
            return PipelineStatus::Ready(pipeline.clone());
        }
        if let Some(error) = self.shared.failed.lock().get(&key) {
            return PipelineStatus::Failed(error.clone());
        }

        let mut inflight = self.shared.inflight.lock();
        if inflight.contains_key(&key) {
            return PipelineStatus::Compiling;
        }
        // Recheck under the in-flight lock: a compile may have just landed.
        if let Some(pipeline) = self.shared.ready.lock().get(&key) {
            return PipelineStatus::Ready(pipeline.clone());
        }
        let job = Arc::new(CompileJob::new());
        inflight.insert(key, job.clone());
        drop(inflight);

        self.spawn_compile(desc, job);
        PipelineStatus::Compiling
    }

    /// Block until `key` resolves. Joins an in-flight compile when one is
    /// running; never starts one. `None` means the key is unknown.
    pub fn wait(&self, key: PipelineKey) -> Option<Result<CompiledPipeline, CompileError>> {
        match self.lookup(key) {
            Lookup::Done(result) => Some(result),
            Lookup::Inflight(job) => Some(job.wait()),
            Lookup::Unknown => None,
        }
    }

    /// Bounded join used by the render loop to stay responsive to control
    /// messages while a first-use compile runs. `None` on timeout or when
    /// the key is unknown.
    pub fn wait_timeout(
        &self,
        key: PipelineKey,
        timeout: Duration,
    ) -> Option<Result<CompiledPipeline, CompileError>> {
        match self.lookup(key) {
            Lookup::Done(result) => Some(result),
            Lookup::Inflight(job) => job.wait_timeout(timeout),
            Lookup::Unknown => None,
        }
    }

    /// Cancel the in-flight compile for `key`, if any.
    pub fn cancel(&self, key: PipelineKey) {
        let job = self.shared.inflight.lock().remove(&key);
        if let Some(job) = job {
            tracing::debug!(?key, "cancelling pipeline compilation");
            job.cancel.cancel();
        }
    }

    /// Drop the ready entry for `key` so the next request respecializes.
    /// Handles already held elsewhere stay alive.
    pub fn evict(&self, key: PipelineKey) {
        self.shared.ready.lock().pop(&key);
    }

    /// Forget a recorded failure so the next request recompiles.
    pub fn forget_failure(&self, key: PipelineKey) {
        self.shared.failed.lock().remove(&key);
    }

    /// Drop every entry: ready, failed, and in-flight (cancelled).
    pub fn clear(&self) {
        let jobs: Vec<_> = self
            .shared
            .inflight
            .lock()
            .drain()
            .map(|(_, job)| job)
            .collect();
        for job in jobs {
            job.cancel.cancel();
        }
        *self.shared.ready.lock() = LruCache::new(self.shared.capacity);
        self.shared.failed.lock().clear();
    }

    pub fn ready_len(&self) -> usize {
        self.shared.ready.lock().len()
    }

    fn lookup(&self, key: PipelineKey) -> Lookup {
        if let Some(pipeline) = self.shared.ready.lock().get(&key) {
            return Lookup::Done(Ok(pipeline.clone()));
        }
        if let Some(job) = self.shared.inflight.lock().get(&key) {
            return Lookup::Inflight(job.clone());
        }
        match self.shared.failed.lock().get(&key) {
            Some(error) => Lookup::Done(Err(error.clone())),
            None => Lookup::Unknown,
        }
    }

    fn spawn_compile(&self, desc: PipelineDesc, job: Arc<CompileJob>) {
        let shared = self.shared.clone();
        let key = desc.key;
        tracing::debug!(?key, "compiling ray tracing pipeline");

        let job_for_thread = job.clone();
        let spawned = std::thread::Builder::new()
            .name("pipeline-compile".to_owned())
            .spawn(move || {
                let job = job_for_thread;
                let result = shared.backend.compile_pipeline(&desc, &job.cancel);

                let mut inflight = shared.inflight.lock();
                // A cancel may have removed the job, or a later compile may
                // own the slot by now; only the current owner publishes.
                let owner = match inflight.get(&key) {
                    Some(current) => Arc::ptr_eq(current, &job),
                    None => false,
                };
                if owner {
                    inflight.remove(&key);
                }
                drop(inflight);

                match &result {
                    Ok(pipeline) if owner => {
                        tracing::debug!(?key, "pipeline compiled");
                        shared.ready.lock().put(key, pipeline.clone());
                    }
                    Err(CompileError::Cancelled { .. }) => {
                        tracing::debug!(?key, "pipeline compilation cancelled");
                    }
                    Err(error) if owner => {
                        tracing::error!(?key, %error, "pipeline compilation failed");
                        shared.failed.lock().insert(key, error.clone());
                    }
                    _ => {}
                }
                job.complete(result);
            });

        if let Err(error) = spawned {
            self.shared.inflight.lock().remove(&key);
            let error = CompileError::Failed {
                key,
                reason: format!("failed to spawn compile thread: {}", error),
            };
            self.shared.failed.lock().insert(key, error.clone());
            job.complete(Err(error));
        }
    }
}

enum Lookup {
    Done(Result<CompiledPipeline, CompileError>),
    Inflight(Arc<CompileJob>),
    Unknown,
}
