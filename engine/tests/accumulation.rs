//! Accumulation buffer semantics: per-epoch additivity, reset boundaries,
//! and tear-free snapshots.

use spectryl::{plan_bands, AccumBuffer, Extent2d, SamplePass, SpectralMode};

const EXTENT: Extent2d = Extent2d {
    width: 4,
    height: 2,
};

fn buffer(mode: SpectralMode) -> AccumBuffer {
    AccumBuffer::new(EXTENT, mode, plan_bands(mode).unwrap())
}

fn flat_pass(buffer: &AccumBuffer, value: f64) -> SamplePass {
    let snapshot = buffer.snapshot();
    SamplePass {
        epoch: buffer.epoch(),
        samples: 1,
        radiance: vec![value; EXTENT.pixel_count() * snapshot.band_count()],
    }
}

#[test]
fn sums_are_additive_within_an_epoch() {
    let accum = buffer(SpectralMode::RgbFused);
    assert!(accum.accumulate(flat_pass(&accum, 1.0)));
    assert!(accum.accumulate(flat_pass(&accum, 2.5)));

    let snapshot = accum.snapshot();
    for pixel in 0..EXTENT.pixel_count() {
        assert_eq!(snapshot.sample_count(pixel), 2);
        for band in 0..snapshot.band_count() {
            assert!((snapshot.sum(pixel, band) - 3.5).abs() < 1e-12);
            assert!((snapshot.mean(pixel, band) - 1.75).abs() < 1e-12);
        }
    }
}

#[test]
fn mean_is_black_before_first_sample() {
    let accum = buffer(SpectralMode::SingleWavelength(550.0));
    let snapshot = accum.snapshot();
    for pixel in 0..EXTENT.pixel_count() {
        assert_eq!(snapshot.sample_count(pixel), 0);
        assert_eq!(snapshot.mean(pixel, 0), 0.0);
    }
}

#[test]
fn reset_zeroes_counts_and_opens_new_epoch() {
    let accum = buffer(SpectralMode::RgbFused);
    accum.accumulate(flat_pass(&accum, 4.0));
    assert_eq!(accum.epoch(), 0);

    accum.reset();
    assert_eq!(accum.epoch(), 1);

    let snapshot = accum.snapshot();
    assert_eq!(snapshot.epoch, 1);
    for pixel in 0..EXTENT.pixel_count() {
        assert_eq!(snapshot.sample_count(pixel), 0);
        for band in 0..snapshot.band_count() {
            assert_eq!(snapshot.sum(pixel, band), 0.0);
        }
    }
}

#[test]
fn pass_from_stale_epoch_is_dropped_whole() {
    let accum = buffer(SpectralMode::RgbFused);
    // Issued before the reset, applied after it: must not merge.
    let in_flight = flat_pass(&accum, 9.0);
    accum.reset();

    assert!(!accum.accumulate(in_flight));
    let snapshot = accum.snapshot();
    for pixel in 0..EXTENT.pixel_count() {
        assert_eq!(snapshot.sample_count(pixel), 0);
    }

    // The new epoch accepts fresh passes.
    assert!(accum.accumulate(flat_pass(&accum, 1.0)));
    assert_eq!(accum.snapshot().uniform_sample_count(), 1);
}

#[test]
fn snapshots_are_stable_while_accumulation_continues() {
    let accum = buffer(SpectralMode::RgbFused);
    accum.accumulate(flat_pass(&accum, 1.0));

    let early = accum.snapshot();
    accum.accumulate(flat_pass(&accum, 1.0));
    accum.accumulate(flat_pass(&accum, 1.0));

    assert_eq!(early.uniform_sample_count(), 1);
    assert_eq!(accum.snapshot().uniform_sample_count(), 3);
}

#[test]
fn reconfigure_reallocates_for_a_new_band_plan() {
    let accum = buffer(SpectralMode::RgbFused);
    accum.accumulate(flat_pass(&accum, 1.0));

    let mode = SpectralMode::SingleWavelength(1064.0);
    accum.reconfigure(EXTENT, mode, plan_bands(mode).unwrap());

    let snapshot = accum.snapshot();
    assert_eq!(snapshot.band_count(), 1);
    assert_eq!(snapshot.epoch, 1);
    assert_eq!(snapshot.uniform_sample_count(), 0);
}

#[test]
fn sample_count_is_uniform_across_bands_and_pixels() {
    let accum = buffer(SpectralMode::RgbFused);
    for _ in 0..5 {
        accum.accumulate(flat_pass(&accum, 0.25));
    }
    let snapshot = accum.snapshot();
    for pixel in 0..EXTENT.pixel_count() {
        assert_eq!(snapshot.sample_count(pixel), 5);
    }
}
