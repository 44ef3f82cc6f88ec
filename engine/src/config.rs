use {
    crate::{
        backend::Extent2d,
        spectral::{BandSet, SpectralMode},
    },
    color_eyre::Report,
    eyre::WrapErr as _,
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SppTarget {
    Fixed(u32),
    /// The "Progressive" toggle: sample until told to stop.
    Unbounded,
}

impl SppTarget {
    pub fn reached(&self, sample_count: u32) -> bool {
        match *self {
            SppTarget::Fixed(target) => sample_count >= target,
            SppTarget::Unbounded => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionPreset {
    Preview,
    Hd,
    Uhd,
    Custom { width: u32, height: u32 },
}

impl ResolutionPreset {
    pub fn extent(&self) -> Extent2d {
        match *self {
            ResolutionPreset::Preview => Extent2d {
                width: 640,
                height: 360,
            },
            ResolutionPreset::Hd => Extent2d {
                width: 1920,
                height: 1080,
            },
            ResolutionPreset::Uhd => Extent2d {
                width: 3840,
                height: 2160,
            },
            ResolutionPreset::Custom { width, height } => Extent2d { width, height },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub spectral_mode: SpectralMode,
    /// Hyperspectral range panels edit before committing it as a custom
    /// mode; kept separate from the active mode on purpose.
    pub wavelength_min_nm: f32,
    pub wavelength_max_nm: f32,
    pub wavelength_step_nm: f32,
    pub spp_target: SppTarget,
    pub resolution: ResolutionPreset,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            spectral_mode: SpectralMode::RgbFused,
            wavelength_min_nm: 380.0,
            wavelength_max_nm: 760.0,
            wavelength_step_nm: 5.0,
            spp_target: SppTarget::Fixed(4),
            resolution: ResolutionPreset::Preview,
        }
    }
}

impl RenderConfig {
    /// Custom band-fused mode built from the configured range.
    pub fn custom_mode(&self) -> SpectralMode {
        SpectralMode::BandFused(BandSet::Custom {
            min_nm: self.wavelength_min_nm,
            max_nm: self.wavelength_max_nm,
            step_nm: self.wavelength_step_nm,
        })
    }

    pub fn load_default() -> Result<Self, Report> {
        let path = std::env::var("SPECTRYL_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./spectryl.ron"));
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(RenderConfig::default());
        }
        Self::load(&path)
    }

    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<Self, Report> {
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("Failed to open config {}", path.display()))?;
        Ok(ron::de::from_reader(file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_target_reached_at_count() {
        assert!(!SppTarget::Fixed(16).reached(15));
        assert!(SppTarget::Fixed(16).reached(16));
        assert!(!SppTarget::Unbounded.reached(u32::MAX));
    }

    #[test]
    fn config_round_trips_through_ron() {
        let config = RenderConfig {
            spectral_mode: SpectralMode::SingleWavelength(550.0),
            spp_target: SppTarget::Unbounded,
            ..RenderConfig::default()
        };
        let text = ron::ser::to_string(&config).unwrap();
        let back: RenderConfig = ron::de::from_str(&text).unwrap();
        assert_eq!(back.spectral_mode, config.spectral_mode);
        assert_eq!(back.spp_target, config.spp_target);
    }
}
