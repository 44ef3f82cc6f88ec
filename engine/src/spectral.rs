use {
    once_cell::sync::Lazy,
    serde::{Deserialize, Serialize},
    smallvec::SmallVec,
};

/// Shortest wavelength the integrator accepts, in nanometers.
pub const MIN_WAVELENGTH_NM: f32 = 380.0;

/// Longest wavelength the integrator accepts. Covers LWIR.
pub const MAX_WAVELENGTH_NM: f32 = 14_000.0;

/// Band lists are small: three to eight bands for fused RGB, a few dozen at
/// most for hyperspectral ranges.
pub type BandVec = SmallVec<[WavelengthBand; 8]>;

/// One discrete wavelength sampled during integration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WavelengthBand {
    pub center_nm: f32,
    /// Share of this band in the fused output. Weights of a plan sum to 1.
    pub weight: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SpectralMode {
    /// Visible-range bands fused into a color image.
    RgbFused,
    /// Monochromatic rendering at one wavelength.
    SingleWavelength(f32),
    /// Multiple bands of a sub-range fused into one false-color output.
    BandFused(BandSet),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum BandSet {
    Nir,
    Swir,
    Mwir,
    Lwir,
    Custom {
        min_nm: f32,
        max_nm: f32,
        step_nm: f32,
    },
}

/// Payload-free discriminant of `SpectralMode`. Pipeline keys carry this;
/// retuning a wavelength inside a mode does not respecialize shaders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpectralModeKind {
    RgbFused,
    SingleWavelength,
    BandFused,
}

impl SpectralMode {
    pub fn kind(&self) -> SpectralModeKind {
        match self {
            SpectralMode::RgbFused => SpectralModeKind::RgbFused,
            SpectralMode::SingleWavelength(_) => SpectralModeKind::SingleWavelength,
            SpectralMode::BandFused(_) => SpectralModeKind::BandFused,
        }
    }
}

impl BandSet {
    /// The range this set spans, `(min_nm, max_nm, step_nm)`.
    pub fn range(&self) -> (f32, f32, f32) {
        match *self {
            BandSet::Nir => (780.0, 1400.0, 50.0),
            BandSet::Swir => (1000.0, 2500.0, 100.0),
            BandSet::Mwir => (3000.0, 5000.0, 200.0),
            BandSet::Lwir => (8000.0, 12_000.0, 400.0),
            BandSet::Custom {
                min_nm,
                max_nm,
                step_nm,
            } => (min_nm, max_nm, step_nm),
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("wavelength {0} nm outside supported range [380, 14000] nm")]
    InvalidWavelength(f32),

    #[error("invalid band range: min {min_nm} nm, max {max_nm} nm, step {step_nm} nm")]
    InvalidRange {
        min_nm: f32,
        max_nm: f32,
        step_nm: f32,
    },
}

static RGB_FUSED_BANDS: Lazy<BandVec> = Lazy::new(|| {
    // Six bands across the visible range, blue through red. The display
    // converter integrates these against its CIE response with exactly
    // these weights.
    let centers = [415.0, 470.0, 525.0, 580.0, 635.0, 690.0];
    let weight = 1.0 / centers.len() as f32;
    centers
        .iter()
        .map(|&center_nm| WavelengthBand { center_nm, weight })
        .collect()
});

/// Number of bands a range produces, `ceil((max-min)/step) + 1`. Panels
/// display this value verbatim; the planner emits exactly this many bands.
pub fn band_count(min_nm: f32, max_nm: f32, step_nm: f32) -> Option<u32> {
    if !(min_nm < max_nm) || !(step_nm > 0.0) {
        return None;
    }
    Some(((max_nm - min_nm) / step_nm).ceil() as u32 + 1)
}

/// Derive the ordered band set for a spectral mode. Pure and deterministic;
/// changing the resulting plan invalidates any running accumulation, which
/// is the scheduler's call to make.
pub fn plan_bands(mode: SpectralMode) -> Result<BandVec, PlanError> {
    match mode {
        SpectralMode::RgbFused => Ok(RGB_FUSED_BANDS.clone()),
        SpectralMode::SingleWavelength(nm) => {
            if !(MIN_WAVELENGTH_NM..=MAX_WAVELENGTH_NM).contains(&nm) {
                return Err(PlanError::InvalidWavelength(nm));
            }
            let mut bands = BandVec::new();
            bands.push(WavelengthBand {
                center_nm: nm,
                weight: 1.0,
            });
            Ok(bands)
        }
        SpectralMode::BandFused(set) => {
            let (min_nm, max_nm, step_nm) = set.range();
            let count = band_count(min_nm, max_nm, step_nm).ok_or(PlanError::InvalidRange {
                min_nm,
                max_nm,
                step_nm,
            })?;
            let weight = 1.0 / count as f32;
            Ok((0..count)
                .map(|i| WavelengthBand {
                    // The final step may be partial; it lands on the range end.
                    center_nm: (min_nm + i as f32 * step_nm).min(max_nm),
                    weight,
                })
                .collect())
        }
    }
}

/// Planck emission at `nm` for a body at `kelvin`, normalized so radiance
/// at the Wien peak is 1. Unitless and tame from visible through LWIR.
pub fn blackbody_weight(nm: f32, kelvin: f32) -> f64 {
    if kelvin <= 0.0 || nm <= 0.0 {
        return 0.0;
    }
    let peak_nm = 2.897_771_9e6 / kelvin as f64;
    planck(nm as f64 * 1e-9, kelvin as f64) / planck(peak_nm * 1e-9, kelvin as f64)
}

fn planck(wavelength_m: f64, kelvin: f64) -> f64 {
    const H: f64 = 6.626_070_15e-34;
    const C: f64 = 2.997_924_58e8;
    const KB: f64 = 1.380_649e-23;

    let exponent = H * C / (wavelength_m * KB * kelvin);
    if exponent > 700.0 {
        // exp() would overflow; emission this far off-peak is zero anyway.
        return 0.0;
    }
    2.0 * H * C * C / wavelength_m.powi(5) / (exponent.exp() - 1.0)
}
