//! Properties of the conservative transpose and the checks run after it.

use remap_algo::{is_conservative, is_consistent, is_monotone, transpose, Validator};
use remap_core::{
    ConservationError, GridDescriptor, MapEntry, RemapError, SparseOperator, ValidationError,
};

/// First-order overlap map between two 1D partitions of the same interval.
///
/// Row `i` holds `overlap(i, j) / len(i)`, which makes the map consistent
/// (rows sum to one) and conservative (`Σ_i w(i, j)·len(i) = len(j)`).
fn overlap_map(row_edges: &[f64], col_edges: &[f64]) -> SparseOperator {
    let lengths = |edges: &[f64]| edges.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>();
    let row_len = lengths(row_edges);
    let col_len = lengths(col_edges);

    let mut entries = Vec::new();
    for (i, row) in row_edges.windows(2).enumerate() {
        for (j, col) in col_edges.windows(2).enumerate() {
            let overlap = row[1].min(col[1]) - row[0].max(col[0]);
            if overlap > 0.0 {
                entries.push(MapEntry::new(i, j, overlap / row_len[i]));
            }
        }
    }

    SparseOperator::new(
        entries,
        GridDescriptor::from_areas(row_len),
        GridDescriptor::from_areas(col_len),
    )
    .unwrap()
}

fn two_by_two(weights: [f64; 4]) -> SparseOperator {
    SparseOperator::new(
        vec![
            MapEntry::new(0, 0, weights[0]),
            MapEntry::new(0, 1, weights[1]),
            MapEntry::new(1, 0, weights[2]),
            MapEntry::new(1, 1, weights[3]),
        ],
        GridDescriptor::unit(2),
        GridDescriptor::unit(2),
    )
    .unwrap()
}

#[test]
fn transpose_is_involution_for_unit_areas() {
    let op = SparseOperator::new(
        vec![
            MapEntry::new(0, 2, 0.25),
            MapEntry::new(1, 0, 0.5),
            MapEntry::new(2, 1, 0.125),
            MapEntry::new(0, 0, 0.75),
        ],
        GridDescriptor::unit(3),
        GridDescriptor::unit(3),
    )
    .unwrap();

    let back = transpose(&transpose(&op).unwrap()).unwrap();

    assert_eq!(back.source_count(), op.source_count());
    assert_eq!(back.target_count(), op.target_count());
    for (a, b) in op.entries().iter().zip(back.entries()) {
        assert_eq!((a.source, a.target), (b.source, b.target));
        assert!((a.weight - b.weight).abs() < 1e-15);
    }
}

#[test]
fn conservative_map_transposes_to_conservative_map() {
    let op = overlap_map(&[0.0, 0.3, 1.0, 1.6, 2.0], &[0.0, 0.5, 1.2, 2.0]);
    assert!(is_consistent(&op, 1e-8).is_ok());
    assert!(is_conservative(&op, 1e-8).is_ok());

    let t = transpose(&op).unwrap();
    assert_eq!(t.source_count(), 3);
    assert_eq!(t.target_count(), 4);
    assert!(is_consistent(&t, 1e-8).is_ok());
    assert!(is_conservative(&t, 1e-8).is_ok());
    assert!(is_monotone(&t, 1e-12).is_ok());
}

#[test]
fn transpose_of_refinement_is_averaging() {
    // One coarse cell split into four fine cells of unequal size.
    let op = overlap_map(&[0.0, 4.0], &[0.0, 1.0, 2.0, 3.5, 4.0]);
    let t = transpose(&op).unwrap();

    let row_weights: Vec<(usize, f64)> = t.coefficients_for_source_row(2).collect();
    assert_eq!(row_weights.len(), 1);
    assert_eq!(row_weights[0].0, 0);
    assert!((row_weights[0].1 - 1.0).abs() < 1e-12);

    let column: f64 = t
        .coefficients_for_target_column(0)
        .map(|(i, w)| w * t.source().area(i))
        .sum();
    assert!((column - 4.0).abs() < 1e-12);
}

#[test]
fn row_sum_identity_on_two_by_two() {
    let base = [0.6, 0.4, 0.3, 0.7];
    assert!(is_consistent(&two_by_two(base), 1e-8).is_ok());

    for k in 0..4 {
        let mut perturbed = base;
        perturbed[k] += 0.01;
        let err = is_consistent(&two_by_two(perturbed), 1e-8).unwrap_err();
        match err {
            ValidationError::InconsistentRow { row, observed, .. } => {
                assert_eq!(row, k / 2);
                assert!((observed - 1.01).abs() < 1e-12);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

#[test]
fn degenerate_target_area_rejected() {
    let op = SparseOperator::new(
        vec![MapEntry::new(0, 0, 0.5), MapEntry::new(0, 1, 0.5)],
        GridDescriptor::unit(1),
        GridDescriptor::from_areas(vec![1.0, 0.0]),
    )
    .unwrap();

    assert!(matches!(
        transpose(&op),
        Err(RemapError::DegenerateArea { cell: 1, references: 1 })
    ));
}

#[test]
fn monotonicity_boundary() {
    let at = |w: f64| {
        SparseOperator::new(
            vec![MapEntry::new(0, 0, w)],
            GridDescriptor::unit(1),
            GridDescriptor::unit(1),
        )
        .unwrap()
    };

    assert!(is_monotone(&at(1.0 + 1e-13), 1e-12).is_ok());
    assert!(is_monotone(&at(-1e-13), 1e-12).is_ok());

    let err = is_monotone(&at(1.0 + 1e-11), 1e-12).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::Monotonicity {
            source_index: 0,
            target_index: 0,
            violations: 1,
            ..
        }
    ));
    assert!(is_monotone(&at(-1e-11), 1e-12).is_err());
}

#[test]
fn inconsistent_input_breaks_conservation_after_transpose() {
    // Row 0 only sums to 0.9, so the transpose loses mass in column 0.
    let op = SparseOperator::new(
        vec![MapEntry::new(0, 0, 0.9), MapEntry::new(1, 0, 1.0)],
        GridDescriptor::unit(2),
        GridDescriptor::from_areas(vec![1.9]),
    )
    .unwrap();
    assert!(is_conservative(&op, 1e-8).is_ok());

    let t = transpose(&op).unwrap();
    assert!(is_consistent(&t, 1e-8).is_ok());
    let err = is_conservative(&t, 1e-8).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::Conservation(ConservationError::Global { .. })
    ));
}

#[test]
fn validator_report_after_transpose() {
    let op = overlap_map(&[0.0, 0.25, 0.5, 1.0], &[0.0, 0.6, 1.0]);
    let t = transpose(&op).unwrap();

    let report = Validator::default().with_monotonicity(true).run(&t);
    assert!(report.passed());
    let summaries = report.into_result().unwrap();
    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[0].checked, 2);
    assert_eq!(summaries[1].checked, 3);
}
