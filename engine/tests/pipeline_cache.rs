//! Pipeline cache semantics: single-flight compilation, per-key failure
//! isolation, cancellation, and the LRU bound.

use {
    spectryl::{
        backend::host::HostBackend, BackendError, BackendFeatures, CancelToken, CompileError,
        CompiledPipeline, PassOutput, PipelineCache, PipelineDesc, PipelineKey, PipelineStatus,
        RtBackend, SpectralModeKind, TraceJob,
    },
    std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    },
};

struct CountingBackend {
    inner: HostBackend,
    compiles: AtomicUsize,
}

impl CountingBackend {
    fn new(latency: Duration) -> Self {
        CountingBackend {
            inner: HostBackend::with_compile_latency(latency),
            compiles: AtomicUsize::new(0),
        }
    }

    fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl RtBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn features(&self) -> BackendFeatures {
        self.inner.features()
    }

    fn compile_pipeline(
        &self,
        desc: &PipelineDesc,
        cancel: &CancelToken,
    ) -> Result<CompiledPipeline, CompileError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        self.inner.compile_pipeline(desc, cancel)
    }

    fn trace(
        &self,
        pipeline: &CompiledPipeline,
        job: &TraceJob<'_>,
    ) -> Result<PassOutput, BackendError> {
        self.inner.trace(pipeline, job)
    }
}

/// Backend whose compiles fail for one key, a bounded number of times.
struct FlakyBackend {
    inner: HostBackend,
    bad: PipelineKey,
    failures_left: AtomicUsize,
}

impl FlakyBackend {
    fn new(bad: PipelineKey, failures: usize) -> Self {
        FlakyBackend {
            inner: HostBackend::new(),
            bad,
            failures_left: AtomicUsize::new(failures),
        }
    }
}

impl RtBackend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    fn features(&self) -> BackendFeatures {
        self.inner.features()
    }

    fn compile_pipeline(
        &self,
        desc: &PipelineDesc,
        cancel: &CancelToken,
    ) -> Result<CompiledPipeline, CompileError> {
        if desc.key == self.bad && self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(CompileError::Failed {
                key: desc.key,
                reason: "closest-hit stage failed to link".to_owned(),
            });
        }
        self.inner.compile_pipeline(desc, cancel)
    }

    fn trace(
        &self,
        pipeline: &CompiledPipeline,
        job: &TraceJob<'_>,
    ) -> Result<PassOutput, BackendError> {
        self.inner.trace(pipeline, job)
    }
}

fn key(seed: u64) -> PipelineKey {
    PipelineKey {
        topology_hash: seed,
        material_hash: seed ^ 0xdead_beef,
        mode_kind: SpectralModeKind::RgbFused,
    }
}

fn desc(key: PipelineKey) -> PipelineDesc {
    PipelineDesc {
        key,
        band_count: 6,
        surface_count: 2,
    }
}

#[test]
fn concurrent_requests_share_one_compilation() {
    let backend = Arc::new(CountingBackend::new(Duration::from_millis(100)));
    let cache = PipelineCache::new(backend.clone());
    let key = key(1);

    let mut joins = Vec::new();
    for _ in 0..4 {
        let cache = cache.clone();
        joins.push(std::thread::spawn(move || {
            cache.get_or_compile(desc(key));
            cache.wait(key).expect("key must be known").expect("compile must succeed")
        }));
    }

    let pipelines: Vec<CompiledPipeline> =
        joins.into_iter().map(|join| join.join().unwrap()).collect();

    assert_eq!(backend.compile_count(), 1, "single-flight violated");
    for pipeline in &pipelines[1..] {
        assert!(pipeline.same_object(&pipelines[0]));
    }
}

#[test]
fn hit_returns_the_shared_handle_immediately() {
    let backend = Arc::new(CountingBackend::new(Duration::from_millis(0)));
    let cache = PipelineCache::new(backend.clone());
    let key = key(2);

    cache.get_or_compile(desc(key));
    let first = cache.wait(key).unwrap().unwrap();

    match cache.get_or_compile(desc(key)) {
        PipelineStatus::Ready(pipeline) => assert!(pipeline.same_object(&first)),
        other => panic!("expected Ready, got {:?}", other),
    }
    assert_eq!(backend.compile_count(), 1);
}

#[test]
fn failure_is_isolated_to_its_key() {
    let bad = key(3);
    let good = key(4);
    let backend = Arc::new(FlakyBackend::new(bad, usize::MAX));
    let cache = PipelineCache::new(backend);

    cache.get_or_compile(desc(bad));
    match cache.wait(bad) {
        Some(Err(CompileError::Failed { key, .. })) => assert_eq!(key, bad),
        other => panic!("expected failure, got {:?}", other),
    }
    // Both observers of the bad key see the same failure, no re-compile.
    match cache.get_or_compile(desc(bad)) {
        PipelineStatus::Failed(CompileError::Failed { key, .. }) => assert_eq!(key, bad),
        other => panic!("expected Failed, got {:?}", other),
    }

    // The other key is unaffected.
    cache.get_or_compile(desc(good));
    assert!(cache.wait(good).unwrap().is_ok());
    assert_eq!(cache.ready_len(), 1);
}

#[test]
fn forgotten_failure_recompiles() {
    let bad = key(5);
    let backend = Arc::new(FlakyBackend::new(bad, 1));
    let cache = PipelineCache::new(backend);

    cache.get_or_compile(desc(bad));
    assert!(cache.wait(bad).unwrap().is_err());
    // The failure is sticky until the caller clears it.
    assert!(matches!(
        cache.get_or_compile(desc(bad)),
        PipelineStatus::Failed(_)
    ));

    cache.forget_failure(bad);
    cache.get_or_compile(desc(bad));
    assert!(cache.wait(bad).unwrap().is_ok());
}

#[test]
fn cancelled_compile_is_discarded_and_restartable() {
    let backend = Arc::new(CountingBackend::new(Duration::from_millis(200)));
    let cache = PipelineCache::new(backend.clone());
    let key = key(6);

    assert!(matches!(
        cache.get_or_compile(desc(key)),
        PipelineStatus::Compiling
    ));
    cache.cancel(key);
    assert!(cache.wait(key).is_none(), "cancelled key must be unknown");

    // A fresh request compiles again.
    cache.get_or_compile(desc(key));
    assert!(cache.wait(key).unwrap().is_ok());
    assert_eq!(backend.compile_count(), 2);
}

#[test]
fn evicted_key_recompiles_on_next_request() {
    let backend = Arc::new(CountingBackend::new(Duration::from_millis(0)));
    let cache = PipelineCache::new(backend.clone());
    let key = key(7);

    cache.get_or_compile(desc(key));
    cache.wait(key).unwrap().unwrap();
    assert_eq!(backend.compile_count(), 1);

    cache.evict(key);
    cache.get_or_compile(desc(key));
    cache.wait(key).unwrap().unwrap();
    assert_eq!(backend.compile_count(), 2);
}

#[test]
fn ready_entries_are_bounded_by_the_lru() {
    let backend = Arc::new(CountingBackend::new(Duration::from_millis(0)));
    let cache = PipelineCache::with_capacity(backend, 2);

    for seed in 10..13 {
        let key = key(seed);
        cache.get_or_compile(desc(key));
        cache.wait(key).unwrap().unwrap();
    }
    assert_eq!(cache.ready_len(), 2);
}

#[test]
fn clear_cancels_and_empties_everything() {
    let backend = Arc::new(CountingBackend::new(Duration::from_millis(0)));
    let cache = PipelineCache::new(backend);
    let key = key(20);

    cache.get_or_compile(desc(key));
    cache.wait(key).unwrap().unwrap();
    assert_eq!(cache.ready_len(), 1);

    cache.clear();
    assert_eq!(cache.ready_len(), 0);
    assert!(cache.wait(key).is_none());
}
