use {
    crate::{
        backend::Extent2d,
        spectral::{BandVec, SpectralMode, WavelengthBand},
    },
    parking_lot::{Mutex, RwLock},
    std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// One sampling pass worth of radiance, stamped with the epoch it was
/// issued under. Pixel-major, one value per band.
#[derive(Clone, Debug)]
pub struct SamplePass {
    pub epoch: u64,
    pub samples: u32,
    pub radiance: Vec<f64>,
}

/// Immutable point-in-time view of accumulation. Readers clone the `Arc`;
/// the storage behind it is never written again.
#[derive(Clone, Debug)]
pub struct AccumSnapshot {
    pub extent: Extent2d,
    pub mode: SpectralMode,
    pub bands: Vec<WavelengthBand>,
    pub epoch: u64,
    sum: Vec<f64>,
    counts: Vec<u32>,
}

impl AccumSnapshot {
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn sample_count(&self, pixel: usize) -> u32 {
        self.counts[pixel]
    }

    /// Sample depth of the frame. Full-frame passes keep every pixel at the
    /// same count, so the first pixel speaks for all of them.
    pub fn uniform_sample_count(&self) -> u32 {
        self.counts.first().copied().unwrap_or(0)
    }

    /// Mean radiance for one pixel and band; black before the first sample.
    pub fn mean(&self, pixel: usize, band: usize) -> f64 {
        match self.counts[pixel] {
            0 => 0.0,
            count => self.sum[pixel * self.bands.len() + band] / count as f64,
        }
    }

    /// Raw accumulated sum, before dividing by the sample count.
    pub fn sum(&self, pixel: usize, band: usize) -> f64 {
        self.sum[pixel * self.bands.len() + band]
    }
}

struct Inner {
    extent: Extent2d,
    mode: SpectralMode,
    bands: BandVec,
    sum: Vec<f64>,
    counts: Vec<u32>,
}

impl Inner {
    fn new(extent: Extent2d, mode: SpectralMode, bands: BandVec) -> Self {
        let pixels = extent.pixel_count();
        let sum = vec![0.0; pixels * bands.len()];
        Inner {
            extent,
            mode,
            bands,
            sum,
            counts: vec![0; pixels],
        }
    }

    fn zero(&mut self) {
        for sum in self.sum.iter_mut() {
            *sum = 0.0;
        }
        for count in self.counts.iter_mut() {
            *count = 0;
        }
    }

    fn snapshot(&self, epoch: u64) -> AccumSnapshot {
        AccumSnapshot {
            extent: self.extent,
            mode: self.mode,
            bands: self.bands.iter().copied().collect(),
            epoch,
            sum: self.sum.clone(),
            counts: self.counts.clone(),
        }
    }
}

/// Authoritative accumulation state of a render session. `accumulate` and
/// `reset` are the only mutators and both run on the render thread;
/// `snapshot` hands readers the last published copy without touching the
/// accumulation path.
pub struct AccumBuffer {
    epoch: AtomicU64,
    inner: Mutex<Inner>,
    published: RwLock<Arc<AccumSnapshot>>,
}

impl AccumBuffer {
    pub fn new(extent: Extent2d, mode: SpectralMode, bands: BandVec) -> Self {
        let inner = Inner::new(extent, mode, bands);
        let published = RwLock::new(Arc::new(inner.snapshot(0)));
        AccumBuffer {
            epoch: AtomicU64::new(0),
            inner: Mutex::new(inner),
            published,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Merge one pass. A pass stamped with an older epoch is dropped whole:
    /// a reset between issue and completion discards it, never a partial
    /// application.
    pub fn accumulate(&self, pass: SamplePass) -> bool {
        let mut inner = self.inner.lock();
        let current = self.epoch.load(Ordering::Acquire);
        if pass.epoch != current {
            tracing::trace!(
                pass_epoch = pass.epoch,
                current,
                "dropping sample pass from stale epoch"
            );
            return false;
        }
        debug_assert_eq!(pass.radiance.len(), inner.sum.len());
        for (sum, value) in inner.sum.iter_mut().zip(&pass.radiance) {
            *sum += value;
        }
        for count in inner.counts.iter_mut() {
            *count += pass.samples;
        }
        self.publish(&inner, current);
        true
    }

    /// Zero all sums and counts and open a new epoch. In-flight passes
    /// stamped with the old epoch will be dropped on arrival.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.zero();
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.publish(&inner, epoch);
    }

    /// Reallocate for a new target size or band plan. Implies a reset.
    pub fn reconfigure(&self, extent: Extent2d, mode: SpectralMode, bands: BandVec) {
        let mut inner = self.inner.lock();
        *inner = Inner::new(extent, mode, bands);
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.publish(&inner, epoch);
    }

    /// Swap extent labels without touching accumulated data. Only legal
    /// when the pixel count is unchanged.
    pub fn relabel_extent(&self, extent: Extent2d) -> bool {
        let mut inner = self.inner.lock();
        if extent.pixel_count() != inner.extent.pixel_count() {
            return false;
        }
        inner.extent = extent;
        let epoch = self.epoch.load(Ordering::Acquire);
        self.publish(&inner, epoch);
        true
    }

    pub fn snapshot(&self) -> Arc<AccumSnapshot> {
        self.published.read().clone()
    }

    fn publish(&self, inner: &Inner, epoch: u64) {
        *self.published.write() = Arc::new(inner.snapshot(epoch));
    }
}
