//! Conservative transpose of a remapping operator.
//!
//! Given an operator `W` from grid A to grid B with cell areas `a` and `b`,
//! the transpose maps B back to A:
//!
//! ```text
//! W'[j, i] = W[i, j] · a[i] / b[j]
//! ```
//!
//! The area ratio turns the conservation property of `W`
//! (`Σ_i W[i, j] · a[i] = b[j]`) into the consistency property of `W'`
//! (`Σ_i W'[j, i] = 1`) and vice versa, so a consistent, conservative map
//! transposes into a consistent, conservative map.
//!
//! The work happens in two steps that are public so each can be tested on
//! its own: [`swap_roles`] exchanges the sides without touching weights, and
//! [`rescale_by_area_ratio`] applies the ratio to an already swapped
//! operator. [`transpose`] runs both.

use remap_core::{MapEntry, RemapError, RemapResult, SparseOperator};
use tracing::debug;

/// Transpose `op` and rescale its weights so the result conserves area.
///
/// Fails with [`RemapError::DegenerateArea`] when a target cell with zero
/// area is referenced by an entry. Zero-area target cells without entries
/// are fine. Output entries follow the input entry order.
pub fn transpose(op: &SparseOperator) -> RemapResult<SparseOperator> {
    debug!(
        source_count = op.source_count(),
        target_count = op.target_count(),
        nnz = op.nnz(),
        "transposing operator"
    );
    let swapped = swap_roles(op)?;
    rescale_by_area_ratio(swapped)
}

/// Structural transpose: every `(i, j, w)` becomes `(j, i, w)` and the
/// source and target grids trade places (areas, shape, mask, centers).
pub fn swap_roles(op: &SparseOperator) -> RemapResult<SparseOperator> {
    let entries = op
        .entries()
        .iter()
        .map(|e| MapEntry::new(e.target, e.source, e.weight))
        .collect();

    let swapped = SparseOperator::new(entries, op.target().clone(), op.source().clone())?;
    Ok(swapped.with_fill_value(op.fill_value()))
}

/// Rescale an operator produced by [`swap_roles`].
///
/// Rows of `swapped` are the cells that were targets before the swap, so
/// each weight is multiplied by the area of its column and divided by the
/// area of its row.
pub fn rescale_by_area_ratio(swapped: SparseOperator) -> RemapResult<SparseOperator> {
    let rows = swapped.source();
    let columns = swapped.target();

    if let Some(entry) = swapped.entries().iter().find(|e| rows.area(e.source) == 0.0) {
        return Err(RemapError::DegenerateArea {
            cell: entry.source,
            references: swapped.row_nnz(entry.source),
        });
    }

    let entries: Vec<MapEntry> = swapped
        .entries()
        .iter()
        .map(|e| {
            MapEntry::new(
                e.source,
                e.target,
                e.weight * columns.area(e.target) / rows.area(e.source),
            )
        })
        .collect();

    let (_, source, target, fill_value) = swapped.into_parts();
    let rescaled = SparseOperator::new(entries, source, target)?;
    Ok(rescaled.with_fill_value(fill_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use remap_core::{CellCenters, Dimension, GridDescriptor};

    fn weights(op: &SparseOperator) -> Vec<(usize, usize, f64)> {
        op.entries()
            .iter()
            .map(|e| (e.source, e.target, e.weight))
            .collect()
    }

    #[test]
    fn test_swap_roles_keeps_weights() {
        let op = SparseOperator::new(
            vec![MapEntry::new(0, 1, 0.25), MapEntry::new(1, 0, 0.75)],
            GridDescriptor::from_areas(vec![1.0, 2.0]),
            GridDescriptor::from_areas(vec![4.0, 8.0]),
        )
        .unwrap();

        let swapped = swap_roles(&op).unwrap();
        assert_eq!(weights(&swapped), vec![(1, 0, 0.25), (0, 1, 0.75)]);
        assert_eq!(swapped.source().areas(), &[4.0, 8.0]);
        assert_eq!(swapped.target().areas(), &[1.0, 2.0]);
    }

    #[test]
    fn test_swap_roles_moves_metadata() {
        let source = GridDescriptor::unit(2)
            .with_dims(vec![Dimension::new("ncol", 2)])
            .with_mask(vec![true, false])
            .with_centers(CellCenters {
                lon: vec![0.0, 90.0],
                lat: vec![0.0, 0.0],
            });
        let target = GridDescriptor::unit(1).with_dims(vec![Dimension::new("cell", 1)]);
        let op = SparseOperator::new(vec![MapEntry::new(0, 0, 1.0)], source.clone(), target.clone())
            .unwrap()
            .with_fill_value(Some(1e20));

        let swapped = swap_roles(&op).unwrap();
        assert_eq!(swapped.source(), &target);
        assert_eq!(swapped.target(), &source);
        assert_eq!(swapped.fill_value(), Some(1e20));
    }

    #[test]
    fn test_rescale_applies_area_ratio() {
        // (0, 1, 0.5) with source area 2 and target area 4 -> (1, 0, 0.5 * 2 / 4)
        let op = SparseOperator::new(
            vec![MapEntry::new(0, 1, 0.5)],
            GridDescriptor::from_areas(vec![2.0]),
            GridDescriptor::from_areas(vec![1.0, 4.0]),
        )
        .unwrap();

        let out = rescale_by_area_ratio(swap_roles(&op).unwrap()).unwrap();
        assert_eq!(weights(&out), vec![(1, 0, 0.25)]);
    }

    #[test]
    fn test_transpose_counts() {
        let op = SparseOperator::new(
            vec![MapEntry::new(2, 0, 1.0)],
            GridDescriptor::unit(3),
            GridDescriptor::unit(1),
        )
        .unwrap();

        let t = transpose(&op).unwrap();
        assert_eq!(t.source_count(), 1);
        assert_eq!(t.target_count(), 3);
        assert_eq!(weights(&t), vec![(0, 2, 1.0)]);
    }

    #[test]
    fn test_zero_area_column_with_entries_is_fatal() {
        let op = SparseOperator::new(
            vec![MapEntry::new(0, 0, 0.5), MapEntry::new(1, 1, 1.0), MapEntry::new(0, 1, 0.5)],
            GridDescriptor::unit(2),
            GridDescriptor::from_areas(vec![1.0, 0.0]),
        )
        .unwrap();

        let err = transpose(&op).unwrap_err();
        assert_eq!(
            err,
            RemapError::DegenerateArea {
                cell: 1,
                references: 2
            }
        );
    }

    #[test]
    fn test_zero_area_column_without_entries_is_skipped() {
        let op = SparseOperator::new(
            vec![MapEntry::new(0, 0, 1.0)],
            GridDescriptor::unit(1),
            GridDescriptor::from_areas(vec![1.0, 0.0]),
        )
        .unwrap();

        let t = transpose(&op).unwrap();
        assert_eq!(t.row_nnz(1), 0);
        assert_eq!(t.source().area(1), 0.0);
    }

    #[test]
    fn test_output_order_follows_input() {
        let entries = vec![
            MapEntry::new(1, 1, 0.2),
            MapEntry::new(0, 0, 0.3),
            MapEntry::new(1, 0, 0.8),
            MapEntry::new(0, 1, 0.7),
        ];
        let op = SparseOperator::new(entries, GridDescriptor::unit(2), GridDescriptor::unit(2))
            .unwrap();

        let t = transpose(&op).unwrap();
        assert_eq!(
            weights(&t),
            vec![(1, 1, 0.2), (0, 0, 0.3), (0, 1, 0.8), (1, 0, 0.7)]
        );
    }
}
