//! Band planner contract: counts, ordering, weights, and rejection of
//! malformed ranges.

use spectryl::{band_count, plan_bands, BandSet, PlanError, SpectralMode};

fn custom(min_nm: f32, max_nm: f32, step_nm: f32) -> SpectralMode {
    SpectralMode::BandFused(BandSet::Custom {
        min_nm,
        max_nm,
        step_nm,
    })
}

#[test]
fn custom_range_1000_to_2500_step_500_yields_four_bands() {
    let bands = plan_bands(custom(1000.0, 2500.0, 500.0)).unwrap();
    let centers: Vec<f32> = bands.iter().map(|band| band.center_nm).collect();
    assert_eq!(centers, vec![1000.0, 1500.0, 2000.0, 2500.0]);
    assert_eq!(band_count(1000.0, 2500.0, 500.0), Some(4));
}

#[test]
fn band_count_formula_holds_across_ranges() {
    let ranges = [
        (380.0f32, 760.0f32, 5.0f32),
        (380.0, 760.0, 7.0),
        (300.0, 2500.0, 100.0),
        (1000.0, 1001.0, 0.25),
        (8000.0, 12_000.0, 400.0),
        (3000.0, 5000.0, 333.0),
    ];
    for &(min_nm, max_nm, step_nm) in &ranges {
        let expected = ((max_nm - min_nm) / step_nm).ceil() as usize + 1;
        let bands = plan_bands(custom(min_nm, max_nm, step_nm)).unwrap();
        assert_eq!(
            bands.len(),
            expected,
            "range {} .. {} step {}",
            min_nm,
            max_nm,
            step_nm
        );
        assert_eq!(band_count(min_nm, max_nm, step_nm), Some(expected as u32));

        for window in bands.windows(2) {
            assert!(
                window[0].center_nm < window[1].center_nm,
                "bands must ascend strictly"
            );
        }
        assert!(bands.last().unwrap().center_nm <= max_nm);

        let weight_sum: f32 = bands.iter().map(|band| band.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-4);
    }
}

#[test]
fn partial_final_step_lands_on_range_end() {
    let bands = plan_bands(custom(1000.0, 2400.0, 500.0)).unwrap();
    let centers: Vec<f32> = bands.iter().map(|band| band.center_nm).collect();
    assert_eq!(centers, vec![1000.0, 1500.0, 2000.0, 2400.0]);
}

#[test]
fn single_wavelength_yields_one_unit_band() {
    let bands = plan_bands(SpectralMode::SingleWavelength(550.0)).unwrap();
    assert_eq!(bands.len(), 1);
    assert_eq!(bands[0].center_nm, 550.0);
    assert_eq!(bands[0].weight, 1.0);
}

#[test]
fn out_of_range_wavelength_is_rejected() {
    assert_eq!(
        plan_bands(SpectralMode::SingleWavelength(100.0)),
        Err(PlanError::InvalidWavelength(100.0))
    );
    assert_eq!(
        plan_bands(SpectralMode::SingleWavelength(20_000.0)),
        Err(PlanError::InvalidWavelength(20_000.0))
    );
    // Boundaries are valid.
    assert!(plan_bands(SpectralMode::SingleWavelength(380.0)).is_ok());
    assert!(plan_bands(SpectralMode::SingleWavelength(14_000.0)).is_ok());
}

#[test]
fn degenerate_ranges_are_rejected() {
    for mode in [
        custom(2500.0, 1000.0, 100.0),
        custom(1000.0, 1000.0, 100.0),
        custom(1000.0, 2500.0, 0.0),
        custom(1000.0, 2500.0, -5.0),
    ]
    .iter()
    {
        match plan_bands(*mode) {
            Err(PlanError::InvalidRange { .. }) => {}
            other => panic!("expected InvalidRange, got {:?}", other),
        }
    }
}

#[test]
fn preset_infrared_sets_cover_their_ranges() {
    let swir = plan_bands(SpectralMode::BandFused(BandSet::Swir)).unwrap();
    assert_eq!(swir.len(), 16);
    assert_eq!(swir.first().unwrap().center_nm, 1000.0);
    assert_eq!(swir.last().unwrap().center_nm, 2500.0);

    let lwir = plan_bands(SpectralMode::BandFused(BandSet::Lwir)).unwrap();
    assert_eq!(lwir.len(), 11);
    assert_eq!(lwir.first().unwrap().center_nm, 8000.0);
    assert_eq!(lwir.last().unwrap().center_nm, 12_000.0);

    let mwir = plan_bands(SpectralMode::BandFused(BandSet::Mwir)).unwrap();
    assert_eq!(mwir.len(), 11);

    let nir = plan_bands(SpectralMode::BandFused(BandSet::Nir)).unwrap();
    assert_eq!(nir.len(), 14);
}

#[test]
fn planning_is_deterministic() {
    let first = plan_bands(custom(400.0, 900.0, 37.0)).unwrap();
    let second = plan_bands(custom(400.0, 900.0, 37.0)).unwrap();
    assert_eq!(first, second);
}
