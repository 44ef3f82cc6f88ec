use {
    crate::{accum::AccumSnapshot, backend::Extent2d, spectral::SpectralMode},
    palette::{LinSrgb, Srgb},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    LinearSrgb,
    Srgb,
}

/// CPU-side image produced from a snapshot. Encoding to PNG/EXR is the
/// export collaborator's job.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayImage {
    pub extent: Extent2d,
    /// Row-major RGB triples.
    pub pixels: Vec<[f32; 3]>,
}

/// Convert accumulated spectral radiance into a presentable image. Pure
/// read path: the same snapshot always yields the same bytes.
///
/// RGB-fused snapshots integrate per-band mean radiance against the
/// planner's weights through a CIE-style response. Single-wavelength and
/// band-fused snapshots map fused mean radiance through a palette that is
/// monotonic in radiance.
pub fn to_display_image(snapshot: &AccumSnapshot, color_space: ColorSpace) -> DisplayImage {
    let pixel_count = snapshot.extent.pixel_count();
    let mut pixels = Vec::with_capacity(pixel_count);

    match snapshot.mode {
        SpectralMode::RgbFused => {
            for pixel in 0..pixel_count {
                pixels.push(rgb_fused(snapshot, pixel));
            }
        }
        SpectralMode::SingleWavelength(nm) => {
            let peak = peak_fused_mean(snapshot);
            let tint = wavelength_tint(nm);
            for pixel in 0..pixel_count {
                let level = normalized(fused_mean(snapshot, pixel), peak);
                pixels.push([tint[0] * level, tint[1] * level, tint[2] * level]);
            }
        }
        SpectralMode::BandFused(_) => {
            let peak = peak_fused_mean(snapshot);
            for pixel in 0..pixel_count {
                let level = normalized(fused_mean(snapshot, pixel), peak);
                pixels.push(heat_color(level));
            }
        }
    }

    if color_space == ColorSpace::Srgb {
        for pixel in pixels.iter_mut() {
            *pixel = encode_srgb(*pixel);
        }
    }

    DisplayImage {
        extent: snapshot.extent,
        pixels,
    }
}

fn rgb_fused(snapshot: &AccumSnapshot, pixel: usize) -> [f32; 3] {
    let mut xyz = [0.0f64; 3];
    for (band_index, band) in snapshot.bands.iter().enumerate() {
        let weighted = snapshot.mean(pixel, band_index) * band.weight as f64;
        let response = cie_xyz(band.center_nm);
        xyz[0] += weighted * response[0] as f64;
        xyz[1] += weighted * response[1] as f64;
        xyz[2] += weighted * response[2] as f64;
    }
    xyz_to_linear_srgb(xyz)
}

/// Per-band means folded by the plan weights into one scalar.
fn fused_mean(snapshot: &AccumSnapshot, pixel: usize) -> f64 {
    snapshot
        .bands
        .iter()
        .enumerate()
        .map(|(band_index, band)| snapshot.mean(pixel, band_index) * band.weight as f64)
        .sum()
}

fn peak_fused_mean(snapshot: &AccumSnapshot) -> f64 {
    (0..snapshot.extent.pixel_count())
        .map(|pixel| fused_mean(snapshot, pixel))
        .fold(0.0, f64::max)
}

fn normalized(value: f64, peak: f64) -> f32 {
    if peak <= 0.0 {
        0.0
    } else {
        (value / peak) as f32
    }
}

// Multi-gaussian fit to the CIE 1931 standard observer
// (Wyman, Sloan, Shirley, JCGT 2013).
fn cie_xyz(nm: f32) -> [f32; 3] {
    let x = 1.056 * gauss(nm, 599.8, 37.9, 31.0) + 0.362 * gauss(nm, 442.0, 16.0, 26.7)
        - 0.065 * gauss(nm, 501.1, 20.4, 26.2);
    let y = 0.821 * gauss(nm, 568.8, 46.9, 40.5) + 0.286 * gauss(nm, 530.9, 16.3, 31.1);
    let z = 1.217 * gauss(nm, 437.0, 11.8, 36.0) + 0.681 * gauss(nm, 459.0, 26.0, 13.8);
    [x.max(0.0), y, z]
}

fn gauss(nm: f32, mu: f32, sigma_lo: f32, sigma_hi: f32) -> f32 {
    let sigma = if nm < mu { sigma_lo } else { sigma_hi };
    let t = (nm - mu) / sigma;
    (-0.5 * t * t).exp()
}

fn xyz_to_linear_srgb(xyz: [f64; 3]) -> [f32; 3] {
    let [x, y, z] = xyz;
    let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
    let g = -0.969_266_0 * x + 1.876_010_8 * y + 0.041_556_0 * z;
    let b = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;
    [r.max(0.0) as f32, g.max(0.0) as f32, b.max(0.0) as f32]
}

/// Heat ramp for fused infrared output: black through red and yellow to
/// white. Each channel is non-decreasing in the input.
fn heat_color(level: f32) -> [f32; 3] {
    let level = level.max(0.0).min(1.0);
    let r = (level * 3.0).min(1.0);
    let g = ((level - 1.0 / 3.0) * 3.0).max(0.0).min(1.0);
    let b = ((level - 2.0 / 3.0) * 3.0).max(0.0).min(1.0);
    [r, g, b]
}

/// Approximate hue of a visible wavelength; neutral outside the visible
/// range, where a hue has no physical meaning.
fn wavelength_tint(nm: f32) -> [f32; 3] {
    if !(380.0..=760.0).contains(&nm) {
        return [1.0, 1.0, 1.0];
    }
    if nm < 440.0 {
        let t = (nm - 380.0) / 60.0;
        [0.5 * (1.0 - t), 0.0, 0.5 + 0.5 * t]
    } else if nm < 490.0 {
        let t = (nm - 440.0) / 50.0;
        [0.0, t, 1.0]
    } else if nm < 510.0 {
        let t = (nm - 490.0) / 20.0;
        [0.0, 1.0, 1.0 - t]
    } else if nm < 580.0 {
        let t = (nm - 510.0) / 70.0;
        [t, 1.0, 0.0]
    } else if nm < 645.0 {
        let t = (nm - 580.0) / 65.0;
        [1.0, 1.0 - t, 0.0]
    } else {
        [1.0, 0.0, 0.0]
    }
}

fn encode_srgb([r, g, b]: [f32; 3]) -> [f32; 3] {
    let encoded = Srgb::from_linear(LinSrgb::new(r.min(1.0), g.min(1.0), b.min(1.0)));
    let (r, g, b) = encoded.into_components();
    [r, g, b]
}
