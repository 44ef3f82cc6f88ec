use crate::{
    backend::Extent2d,
    camera::CameraEdit,
    config::SppTarget,
    scene::{LightingParams, Material, SceneSnapshot},
    spectral::SpectralMode,
};

/// Scene and parameter edits the engine reacts to. Payloads arrive already
/// applied on the editing side; the engine updates its own view and decides
/// what the edit invalidates.
#[derive(Clone, Debug)]
pub enum Edit {
    Camera(CameraEdit),
    Material { index: usize, material: Material },
    Lighting(LightingParams),
    Topology(SceneSnapshot),
    Spectral(SpectralMode),
    SppTarget(SppTarget),
    Resolution(Extent2d),
}

/// What an edit costs before sampling may continue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Invalidation {
    None,
    ResetAccumulation,
    RecompilePipeline,
    Both,
}

/// Classify an edit against the current render target. Pure decision
/// table; the scheduler acts on the verdict.
pub fn classify(edit: &Edit, current_extent: Extent2d) -> Invalidation {
    match edit {
        // A progressive accumulator cannot reuse samples across viewpoints.
        Edit::Camera(_) => Invalidation::ResetAccumulation,
        // The radiance integral changed; existing sums are stale.
        Edit::Material { .. } => Invalidation::ResetAccumulation,
        Edit::Lighting(_) => Invalidation::ResetAccumulation,
        Edit::Topology(_) => Invalidation::Both,
        Edit::Spectral(_) => Invalidation::Both,
        // Only moves the scheduler's stopping condition.
        Edit::SppTarget(_) => Invalidation::None,
        Edit::Resolution(extent) => {
            if extent.pixel_count() == current_extent.pixel_count() {
                Invalidation::None
            } else {
                Invalidation::ResetAccumulation
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{camera::CameraEdit, scene::Material},
    };

    const EXTENT: Extent2d = Extent2d {
        width: 64,
        height: 64,
    };

    #[test]
    fn classification_table() {
        let camera = Edit::Camera(CameraEdit::Zoom { delta: 1.0 });
        assert_eq!(classify(&camera, EXTENT), Invalidation::ResetAccumulation);

        let material = Edit::Material {
            index: 0,
            material: Material::default(),
        };
        assert_eq!(classify(&material, EXTENT), Invalidation::ResetAccumulation);

        let topology = Edit::Topology(SceneSnapshot::default());
        assert_eq!(classify(&topology, EXTENT), Invalidation::Both);

        let spectral = Edit::Spectral(SpectralMode::RgbFused);
        assert_eq!(classify(&spectral, EXTENT), Invalidation::Both);

        let spp = Edit::SppTarget(SppTarget::Unbounded);
        assert_eq!(classify(&spp, EXTENT), Invalidation::None);
    }

    #[test]
    fn resolution_invalidates_only_on_pixel_count_change() {
        let same_count = Edit::Resolution(Extent2d {
            width: 32,
            height: 128,
        });
        assert_eq!(classify(&same_count, EXTENT), Invalidation::None);

        let grown = Edit::Resolution(Extent2d {
            width: 128,
            height: 128,
        });
        assert_eq!(classify(&grown, EXTENT), Invalidation::ResetAccumulation);
    }
}
