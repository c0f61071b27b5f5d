//! Partition properties and reference scenarios shared by every grower.

#![allow(clippy::unwrap_used, clippy::panic)]

use quasiflat_segment::{
    AbsoluteDifference, CancelFlag, Connectivity, DistanceKind, DistanceLut, Extent, Grid,
    GrowerKind, GrowerMetrics, LabelImage, LocalRange, Neighbourhood, Offset, PredicateKind,
    SegmentConfig, SegmentError, Segmentation, UNLABELLED, UnionFindLabeler, segment,
    segment_with_cancel,
};

const ALL_GROWERS: [GrowerKind; 5] = [
    GrowerKind::UnionFind,
    GrowerKind::Smooth,
    GrowerKind::Soille,
    GrowerKind::Adaptive,
    GrowerKind::AdaptiveRegions,
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Deterministic pseudo-random grid with values in `[0, levels)`.
fn lcg_grid(width: usize, height: usize, levels: u64, seed: u64) -> Grid<u8> {
    let mut state = seed;
    let data = (0..width * height)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            u8::try_from((state >> 33) % levels).unwrap()
        })
        .collect();
    Grid::from_rows(width, height, data).unwrap()
}

fn lcg_mask(len: usize, seed: u64) -> Vec<bool> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 40) % 5 != 0
        })
        .collect()
}

fn config(grower: GrowerKind, alpha: f64, omega: Option<f64>) -> SegmentConfig {
    SegmentConfig {
        grower,
        local_range: LocalRange::Uniform(alpha),
        global_range: omega,
        ..SegmentConfig::default()
    }
}

fn run(grid: &Grid<u8>, grower: GrowerKind, alpha: f64, omega: Option<f64>) -> Segmentation {
    segment(grid, &config(grower, alpha, omega)).unwrap()
}

/// Every present pixel has exactly one valid label, absent pixels keep
/// the sentinel, and no label in `[0, count)` is empty.
fn assert_partition<T: quasiflat_segment::Sample>(grid: &Grid<T>, labels: &LabelImage) {
    for i in 0..grid.len() {
        if grid.is_present(i) {
            let r = labels.region(i).unwrap();
            assert!(r < labels.count());
        } else {
            assert_eq!(labels.as_raw()[i], UNLABELLED);
        }
    }
    assert!(labels.region_sizes().iter().all(|&s| s > 0));
}

/// Largest `max - min` over the pixels of each region.
fn region_spans(grid: &Grid<u8>, labels: &LabelImage) -> Vec<f64> {
    let mut lo = vec![f64::INFINITY; labels.count()];
    let mut hi = vec![f64::NEG_INFINITY; labels.count()];
    for i in 0..grid.len() {
        if let Some(r) = labels.region(i) {
            let v = f64::from(grid.pixel(i)[0]);
            lo[r] = lo[r].min(v);
            hi[r] = hi[r].max(v);
        }
    }
    lo.iter().zip(&hi).map(|(l, h)| h - l).collect()
}

// ---------------------------------------------------------------------------
// Partition totality and exclusivity
// ---------------------------------------------------------------------------

#[test]
fn every_grower_produces_a_total_partition_under_a_mask() {
    for seed in [1, 7, 42] {
        let grid = lcg_grid(11, 9, 24, seed);
        let grid = grid.with_mask(lcg_mask(99, seed + 100)).unwrap();
        for grower in ALL_GROWERS {
            let seg = segment(&grid, &config(grower, 3.0, Some(6.0))).unwrap();
            assert_partition(&grid, &seg.labels);
        }
    }
}

#[test]
fn absent_pixels_do_not_bridge_regions() {
    let grid = Grid::from_rows(5, 1, vec![3u8, 3, 3, 3, 3])
        .unwrap()
        .with_mask(vec![true, true, false, true, true])
        .unwrap();
    for grower in ALL_GROWERS {
        let seg = run(&grid, grower, 10.0, None);
        assert_eq!(seg.labels.as_raw(), &[0, 0, UNLABELLED, 1, 1], "{}", grower.name());
    }
}

// ---------------------------------------------------------------------------
// Range bounds
// ---------------------------------------------------------------------------

#[test]
fn union_find_regions_are_alpha_components() {
    let alpha = 2.0;
    let grid = lcg_grid(12, 10, 12, 3);
    let seg = run(&grid, GrowerKind::UnionFind, alpha, None);
    let nbh = Connectivity::Four.neighbourhood();
    let sizes = seg.labels.region_sizes();
    for p in 0..grid.len() {
        let lp = seg.labels.as_raw()[p];
        let mut has_close_mate = false;
        for q in nbh.neighbours(&grid, p) {
            let d = (f64::from(grid.pixel(p)[0]) - f64::from(grid.pixel(q)[0])).abs();
            if d <= alpha {
                assert_eq!(lp, seg.labels.as_raw()[q], "pixels {p} and {q} within alpha");
                has_close_mate = true;
            }
        }
        let region = seg.labels.region(p).unwrap();
        if sizes[region] > 1 {
            assert!(has_close_mate, "pixel {p} joined without a close neighbour");
        }
    }
}

#[test]
fn omega_bounds_every_region_spread() {
    for seed in [5, 11, 23] {
        let grid = lcg_grid(10, 10, 30, seed);
        for omega in [0.0, 4.0, 9.0] {
            for grower in [
                GrowerKind::Smooth,
                GrowerKind::Soille,
                GrowerKind::Adaptive,
                GrowerKind::AdaptiveRegions,
            ] {
                let seg = run(&grid, grower, 6.0, Some(omega));
                for span in region_spans(&grid, &seg.labels) {
                    assert!(span <= omega, "{} spread {span} > {omega}", grower.name());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Soille uniqueness
// ---------------------------------------------------------------------------

#[test]
fn soille_partition_does_not_depend_on_scan_order() {
    for seed in [2, 9, 31, 64] {
        let grid = lcg_grid(13, 9, 20, seed);
        for (alpha, omega) in [(2.0, Some(4.0)), (3.0, Some(7.0)), (4.0, None)] {
            for connectivity in [Connectivity::Four, Connectivity::Eight] {
                let config = SegmentConfig {
                    connectivity,
                    ..config(GrowerKind::Soille, alpha, omega)
                };
                let forward = segment(&grid, &config).unwrap();
                let backward = segment(&grid.reversed(), &config).unwrap();
                assert!(
                    forward.labels.same_partition(&backward.labels.reversed()),
                    "seed {seed} alpha {alpha} omega {omega:?} {connectivity:?}"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[test]
fn regrowing_the_mean_reconstruction_keeps_the_partition() {
    // Flat blocks whose contrasts all exceed alpha.
    let mut data = vec![0u8; 8 * 6];
    for (i, v) in data.iter_mut().enumerate() {
        let (x, y) = (i % 8, i / 8);
        *v = match (x < 3, y < 2) {
            (true, true) => 10,
            (true, false) => 40,
            (false, true) => 70,
            (false, false) => if x < 6 { 100 } else { 130 },
        };
    }
    let grid = Grid::from_rows(8, 6, data).unwrap();
    for grower in ALL_GROWERS {
        let config = config(grower, 5.0, Some(12.0));
        let first = segment(&grid, &config).unwrap();
        let means = first.labels.region_means(&grid).unwrap();
        let second = segment(&means, &config).unwrap();
        assert!(first.labels.same_partition(&second.labels), "{}", grower.name());
        assert_eq!(first.region_count(), 5);
    }
}

// ---------------------------------------------------------------------------
// Adaptive search
// ---------------------------------------------------------------------------

#[test]
fn adaptive_search_converges_within_log_bound() {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn bound(upper: u32) -> usize {
        (f64::from(upper + 2)).log2().ceil() as usize + 2
    }
    for upper in [1u32, 6, 31, 200] {
        let grid = lcg_grid(9, 9, 64, u64::from(upper));
        let seg = run(&grid, GrowerKind::Adaptive, f64::from(upper), Some(10.0));
        let GrowerMetrics::Adaptive { max_iterations, .. } = seg.metrics else {
            panic!("adaptive grower reported {:?}", seg.metrics);
        };
        assert!(max_iterations <= bound(upper), "upper {upper}: {max_iterations}");
    }
}

/// Largest-threshold zones found by trying every threshold from the top,
/// for a single-band grid under a range bound.
fn largest_admissible_zones(grid: &Grid<u8>, upper: u8, omega: u8) -> LabelImage {
    let nbh = Connectivity::Four.neighbourhood();
    let mut labels = vec![UNLABELLED; grid.len()];
    let mut next = 0;
    for seed in 0..grid.len() {
        if labels[seed] != UNLABELLED {
            continue;
        }
        let zone = (0..=upper)
            .rev()
            .map(|t| {
                let mut zone = vec![seed];
                let mut head = 0;
                while head < zone.len() {
                    let p = zone[head];
                    head += 1;
                    for q in nbh.neighbours(grid, p) {
                        if labels[q] == UNLABELLED
                            && !zone.contains(&q)
                            && grid.pixel(p)[0].abs_diff(grid.pixel(q)[0]) <= t
                        {
                            zone.push(q);
                        }
                    }
                }
                zone
            })
            .find(|zone| {
                let values = zone.iter().map(|&p| grid.pixel(p)[0]);
                values.clone().max().unwrap() - values.min().unwrap() <= omega
            })
            .unwrap();
        for p in zone {
            labels[p] = next;
        }
        next += 1;
    }
    LabelImage::from_raw(grid.extent(), labels).unwrap()
}

#[test]
fn adaptive_growers_settle_after_a_late_violation() {
    // Threshold 2 fails right above a success at 1 for the first seed.
    let grid = Grid::from_rows(5, 1, vec![0u8, 1, 3, 4, 4]).unwrap();
    for grower in [GrowerKind::Adaptive, GrowerKind::AdaptiveRegions] {
        let seg = run(&grid, grower, 4.0, Some(3.0));
        assert_eq!(seg.labels.as_raw(), &[0, 0, 1, 1, 1], "{}", grower.name());
    }
}

#[test]
fn adaptive_zones_use_the_largest_admissible_threshold() {
    for seed in 0..40 {
        let grid = lcg_grid(8, 7, 12, seed);
        let (upper, omega) = (5, 3);
        let expected = largest_admissible_zones(&grid, upper, omega);
        for grower in [GrowerKind::Adaptive, GrowerKind::AdaptiveRegions] {
            let seg = run(&grid, grower, f64::from(upper), Some(f64::from(omega)));
            assert!(
                seg.labels.same_partition(&expected),
                "{} on seed {seed}",
                grower.name()
            );
        }
    }
}

#[test]
fn region_merging_matches_pixel_growth_on_flat_zones() {
    for seed in [4, 13, 77] {
        let grid = lcg_grid(12, 8, 6, seed);
        for omega in [1.0, 2.0, 4.0] {
            let pixels = run(&grid, GrowerKind::Adaptive, 3.0, Some(omega));
            let regions = run(&grid, GrowerKind::AdaptiveRegions, 3.0, Some(omega));
            assert!(
                pixels.labels.same_partition(&regions.labels),
                "seed {seed} omega {omega}"
            );
        }
    }
}

#[test]
fn adaptive_global_predicate_limits_zone_size() {
    let grid = Grid::from_rows(6, 1, vec![0u8, 1, 2, 3, 4, 5]).unwrap();
    let config = SegmentConfig {
        global_predicates: vec![PredicateKind::MaxSize { pixels: 3 }],
        ..config(GrowerKind::Adaptive, 1.0, None)
    };
    let seg = segment(&grid, &config).unwrap();
    assert!(seg.labels.region_sizes().iter().all(|&s| s <= 3));
    assert_partition(&grid, &seg.labels);
}

// ---------------------------------------------------------------------------
// Reference scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_three_by_two_soille() {
    #[rustfmt::skip]
    let grid = Grid::from_rows(3, 2, vec![
        1u8, 0, 4,
        0,   2, 3,
    ]).unwrap();
    let seg = run(&grid, GrowerKind::Soille, 1.0, Some(1.0));
    let l = seg.labels.as_raw();
    // The 0/1 corner forms one region and the 4 stays isolated.
    assert_eq!(l[0], l[1]);
    assert_eq!(l[0], l[3]);
    assert_eq!(seg.labels.region_sizes()[seg.labels.region(2).unwrap()], 1);
}

#[test]
fn scenario_flat_grid_is_one_region() {
    let grid = Grid::from_rows(5, 5, vec![10u8; 25]).unwrap();
    for grower in ALL_GROWERS {
        for alpha in [0.0, 3.0] {
            let seg = run(&grid, grower, alpha, None);
            assert_eq!(seg.region_count(), 1, "{}", grower.name());
            assert_eq!(seg.labels.region_sizes(), vec![25]);
        }
    }
}

#[test]
fn scenario_checkerboard_never_merges() {
    let data = (0..25).map(|i| if (i % 5 + i / 5) % 2 == 0 { 0u8 } else { 255 }).collect();
    let grid = Grid::from_rows(5, 5, data).unwrap();
    for grower in ALL_GROWERS {
        let seg = run(&grid, grower, 0.0, None);
        assert_eq!(seg.region_count(), 25, "{}", grower.name());
    }
}

#[test]
fn scenario_unit_ramp_is_one_region() {
    let grid = Grid::from_rows(255, 1, (0..=254u8).collect()).unwrap();
    for grower in ALL_GROWERS {
        let seg = run(&grid, grower, 1.0, None);
        assert_eq!(seg.region_count(), 1, "{}", grower.name());
    }
}

#[test]
fn scenario_gap_of_alpha_plus_one_separates() {
    let alpha = 3.0;
    let data = (0..16).map(|i| if i % 4 < 2 { 10u8 } else { 14 }).collect();
    let grid = Grid::from_rows(4, 4, data).unwrap();
    for grower in ALL_GROWERS {
        let seg = run(&grid, grower, alpha, None);
        assert_eq!(seg.region_count(), 2, "{}", grower.name());
    }
}

// ---------------------------------------------------------------------------
// Neighbourhoods and distances
// ---------------------------------------------------------------------------

#[test]
fn temporal_connectivity_links_frames() {
    // Three 2x2 frames: 0, 1, 5.
    let mut data = vec![0u8; 4];
    data.extend([1u8; 4]);
    data.extend([5u8; 4]);
    let grid = Grid::new(Extent::new(2, 2, 1, 3), 1, data).unwrap();
    let planar = run(&grid, GrowerKind::UnionFind, 1.0, None);
    assert_eq!(planar.region_count(), 3);
    for connectivity in [Connectivity::SixTemporal, Connectivity::TenTemporal] {
        let config = SegmentConfig {
            connectivity,
            ..config(GrowerKind::Soille, 1.0, None)
        };
        let seg = segment(&grid, &config).unwrap();
        assert_eq!(seg.region_count(), 2);
    }
}

#[test]
fn hue_distance_wraps_around_the_circle() {
    let grid = Grid::from_rows(3, 1, vec![350.0f32, 5.0, 180.0]).unwrap();
    for grower in [GrowerKind::UnionFind, GrowerKind::Smooth, GrowerKind::Soille] {
        let config = SegmentConfig {
            distance: DistanceKind::CircularHue { period: 360.0 },
            ..config(grower, 20.0, None)
        };
        let seg = segment(&grid, &config).unwrap();
        assert_eq!(seg.labels.as_raw(), &[0, 0, 1]);
    }
}

#[test]
fn euclidean_color_groups_close_colors() {
    let data = vec![200u8, 10, 10, 203, 14, 10, 10, 200, 10];
    let grid = Grid::new(Extent::planar(3, 1), 3, data).unwrap();
    for use_lut in [false, true] {
        let config = SegmentConfig {
            distance: DistanceKind::EuclideanColor,
            use_lut,
            ..config(GrowerKind::UnionFind, 5.0, None)
        };
        let seg = segment(&grid, &config).unwrap();
        assert_eq!(seg.labels.as_raw(), &[0, 0, 1]);
    }
}

// ---------------------------------------------------------------------------
// Errors and cancellation
// ---------------------------------------------------------------------------

#[test]
fn configuration_errors_stop_every_grower() {
    let gray = Grid::from_rows(3, 1, vec![0u8, 1, 2]).unwrap();
    for grower in ALL_GROWERS {
        let color = SegmentConfig {
            distance: DistanceKind::EuclideanColor,
            ..config(grower, 1.0, None)
        };
        assert!(matches!(
            segment(&gray, &color),
            Err(SegmentError::BandMismatch { expected: 3, actual: 1, .. })
        ));
        assert!(matches!(
            segment(&gray, &config(grower, -1.0, None)),
            Err(SegmentError::InvalidParameter { .. })
        ));
        assert!(matches!(
            segment(&gray, &config(grower, 1.0, Some(f64::NAN))),
            Err(SegmentError::InvalidParameter { .. })
        ));
    }
}

#[test]
fn zero_offset_neighbourhood_is_rejected() {
    let result = Neighbourhood::new([Offset::planar(1, 0), Offset::planar(0, 0)]);
    assert_eq!(result, Err(SegmentError::ZeroOffset));
}

#[test]
fn lookup_table_domain_is_checked() {
    let grid = Grid::from_rows(2, 1, vec![0u8, 200]).unwrap();
    let lut = DistanceLut::chebyshev(100, 1).unwrap();
    let labeler = UnionFindLabeler::new(Neighbourhood::default(), 1.0).unwrap();
    assert!(matches!(
        labeler.segment(&grid, &lut, None),
        Err(SegmentError::LutOutOfRange { levels: 100, .. })
    ));
    assert!(labeler.segment(&grid, &AbsoluteDifference, None).is_ok());
}

#[test]
fn cancellation_stops_every_grower() {
    let grid = lcg_grid(6, 6, 50, 8);
    let flag = CancelFlag::new();
    flag.cancel();
    for grower in ALL_GROWERS {
        let result = segment_with_cancel(&grid, &config(grower, 2.0, None), &flag);
        assert_eq!(result, Err(SegmentError::Cancelled), "{}", grower.name());
    }
}
