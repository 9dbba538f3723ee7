//! Sparse remapping operator.
//!
//! An operator maps a field defined on `source_count` source cells onto
//! `target_count` target cells through a list of weighted entries
//! `(source, target, weight)`. Rows are source cells, columns are target
//! cells:
//!
//! ```text
//!            target 0   target 1   target 2
//! source 0 [   0.6        0.4         .    ]
//! source 1 [    .         0.3        0.7   ]
//! ```
//!
//! The entry list is kept in the order it was given. On top of it the
//! operator builds two compressed indices once at construction: CSR for
//! [`SparseOperator::coefficients_for_source_row`] and CSC for
//! [`SparseOperator::coefficients_for_target_column`]. Both answer in
//! O(entries in that row/column) without allocating.

use serde::{Deserialize, Serialize};
use sprs::CsMat;

use crate::error::{MalformedOperatorError, RemapResult, Side};
use crate::grid::GridDescriptor;

/// One weighted coupling between a source cell and a target cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

impl MapEntry {
    pub fn new(source: usize, target: usize, weight: f64) -> Self {
        Self {
            source,
            target,
            weight,
        }
    }
}

/// Immutable sparse remapping operator with per-cell areas on both sides.
#[derive(Debug, Clone)]
pub struct SparseOperator {
    entries: Vec<MapEntry>,
    source: GridDescriptor,
    target: GridDescriptor,
    fill_value: Option<f64>,
    /// Rows = source cells
    by_source: CsMat<f64>,
    /// Columns = target cells
    by_target: CsMat<f64>,
}

impl SparseOperator {
    /// Build an operator, checking indices, weights, areas and metadata.
    ///
    /// Duplicate `(source, target)` pairs are rejected rather than summed.
    pub fn new(
        entries: Vec<MapEntry>,
        source: GridDescriptor,
        target: GridDescriptor,
    ) -> RemapResult<Self> {
        source.validate(Side::Source)?;
        target.validate(Side::Target)?;

        let n_source = source.len();
        let n_target = target.len();

        for (position, entry) in entries.iter().enumerate() {
            if entry.source >= n_source {
                return Err(MalformedOperatorError::IndexOutOfRange {
                    side: Side::Source,
                    entry: position,
                    index: entry.source,
                    count: n_source,
                }
                .into());
            }
            if entry.target >= n_target {
                return Err(MalformedOperatorError::IndexOutOfRange {
                    side: Side::Target,
                    entry: position,
                    index: entry.target,
                    count: n_target,
                }
                .into());
            }
            if !entry.weight.is_finite() {
                return Err(MalformedOperatorError::NonFiniteWeight {
                    source_index: entry.source,
                    target_index: entry.target,
                    weight: entry.weight,
                }
                .into());
            }
        }

        let (indptr, indices, data) = compress(
            n_source,
            entries.iter().map(|e| (e.source, e.target, e.weight)),
            entries.len(),
        );
        if let Some((row, col)) = first_duplicate(&indptr, &indices) {
            return Err(MalformedOperatorError::DuplicateEntry {
                source_index: row,
                target_index: col,
            }
            .into());
        }
        let by_source = CsMat::new((n_source, n_target), indptr, indices, data);

        let (indptr, indices, data) = compress(
            n_target,
            entries.iter().map(|e| (e.target, e.source, e.weight)),
            entries.len(),
        );
        let by_target = CsMat::new_csc((n_source, n_target), indptr, indices, data);

        Ok(Self {
            entries,
            source,
            target,
            fill_value: None,
            by_source,
            by_target,
        })
    }

    /// Attach the fill value used to mark missing data.
    pub fn with_fill_value(mut self, fill_value: Option<f64>) -> Self {
        self.fill_value = fill_value;
        self
    }

    /// Entries in construction order.
    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    pub fn source(&self) -> &GridDescriptor {
        &self.source
    }

    pub fn target(&self) -> &GridDescriptor {
        &self.target
    }

    pub fn source_count(&self) -> usize {
        self.source.len()
    }

    pub fn target_count(&self) -> usize {
        self.target.len()
    }

    pub fn fill_value(&self) -> Option<f64> {
        self.fill_value
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Fraction of the dense `source_count × target_count` matrix that is stored.
    pub fn density(&self) -> f64 {
        let cells = self.source_count() * self.target_count();
        if cells == 0 {
            return 0.0;
        }
        self.nnz() as f64 / cells as f64
    }

    /// Iterate `(target, weight)` over the entries of a source row, in
    /// increasing target order.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.source_count()`.
    pub fn coefficients_for_source_row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let indptr = self.by_source.indptr();
        let start = indptr.index(row);
        let end = indptr.index(row + 1);
        let indices = &self.by_source.indices()[start..end];
        let data = &self.by_source.data()[start..end];
        indices.iter().zip(data.iter()).map(|(&j, &w)| (j, w))
    }

    /// Iterate `(source, weight)` over the entries of a target column, in
    /// increasing source order.
    ///
    /// # Panics
    ///
    /// Panics if `column >= self.target_count()`.
    pub fn coefficients_for_target_column(
        &self,
        column: usize,
    ) -> impl Iterator<Item = (usize, f64)> + '_ {
        let indptr = self.by_target.indptr();
        let start = indptr.index(column);
        let end = indptr.index(column + 1);
        let indices = &self.by_target.indices()[start..end];
        let data = &self.by_target.data()[start..end];
        indices.iter().zip(data.iter()).map(|(&i, &w)| (i, w))
    }

    /// Entries in a source row. Panics if `row >= self.source_count()`.
    pub fn row_nnz(&self, row: usize) -> usize {
        let indptr = self.by_source.indptr();
        indptr.index(row + 1) - indptr.index(row)
    }

    /// Entries in a target column. Panics if `column >= self.target_count()`.
    pub fn column_nnz(&self, column: usize) -> usize {
        let indptr = self.by_target.indptr();
        indptr.index(column + 1) - indptr.index(column)
    }

    /// Whether a row without entries counts as masked rather than broken.
    ///
    /// Empty rows are exempt when the operator carries a fill value or the
    /// source mask marks the cell inactive.
    pub fn is_row_exempt(&self, row: usize) -> bool {
        self.row_nnz(row) == 0 && (self.fill_value.is_some() || !self.source.is_active(row))
    }

    /// Column counterpart of [`SparseOperator::is_row_exempt`].
    pub fn is_column_exempt(&self, column: usize) -> bool {
        self.column_nnz(column) == 0
            && (self.fill_value.is_some() || !self.target.is_active(column))
    }

    /// All parts of the operator, for callers that rebuild a derived one.
    pub fn into_parts(self) -> (Vec<MapEntry>, GridDescriptor, GridDescriptor, Option<f64>) {
        (self.entries, self.source, self.target, self.fill_value)
    }

    /// Dense copy, rows = source cells. Only meant for small operators.
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let mut dense = vec![vec![0.0; self.target_count()]; self.source_count()];
        for entry in &self.entries {
            dense[entry.source][entry.target] = entry.weight;
        }
        dense
    }
}

impl PartialEq for SparseOperator {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
            && self.source == other.source
            && self.target == other.target
            && self.fill_value.map(f64::to_bits) == other.fill_value.map(f64::to_bits)
    }
}

/// Counting sort of `(outer, inner, value)` triples into compressed storage.
///
/// Entries keep their relative order within an outer slot before the slot is
/// sorted by inner index, so equal keys stay in input order.
fn compress(
    outer_count: usize,
    triples: impl Iterator<Item = (usize, usize, f64)> + Clone,
    nnz: usize,
) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    let mut indptr = vec![0usize; outer_count + 1];
    for (outer, _, _) in triples.clone() {
        indptr[outer + 1] += 1;
    }
    for k in 0..outer_count {
        indptr[k + 1] += indptr[k];
    }

    let mut cursor = indptr.clone();
    let mut slots = vec![(0usize, 0.0f64); nnz];
    for (outer, inner, value) in triples {
        slots[cursor[outer]] = (inner, value);
        cursor[outer] += 1;
    }

    for k in 0..outer_count {
        slots[indptr[k]..indptr[k + 1]].sort_by_key(|&(inner, _)| inner);
    }

    let (indices, data) = slots.into_iter().unzip();
    (indptr, indices, data)
}

fn first_duplicate(indptr: &[usize], indices: &[usize]) -> Option<(usize, usize)> {
    indptr.windows(2).enumerate().find_map(|(outer, bounds)| {
        indices[bounds[0]..bounds[1]]
            .windows(2)
            .find(|pair| pair[0] == pair[1])
            .map(|pair| (outer, pair[0]))
    })
}

/// Headline numbers about an operator, as printed by `inspect`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorSummary {
    pub source_count: usize,
    pub target_count: usize,
    pub nnz: usize,
    pub density: f64,
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub source_area: f64,
    pub target_area: f64,
    pub empty_rows: usize,
    pub empty_columns: usize,
    pub fill_value: Option<f64>,
}

impl OperatorSummary {
    pub fn of(op: &SparseOperator) -> Self {
        let weights = op.entries().iter().map(|e| e.weight);
        let min_weight = weights.clone().reduce(f64::min);
        let max_weight = weights.reduce(f64::max);

        Self {
            source_count: op.source_count(),
            target_count: op.target_count(),
            nnz: op.nnz(),
            density: op.density(),
            min_weight,
            max_weight,
            source_area: op.source().total_area(),
            target_area: op.target().total_area(),
            empty_rows: (0..op.source_count()).filter(|&i| op.row_nnz(i) == 0).count(),
            empty_columns: (0..op.target_count())
                .filter(|&j| op.column_nnz(j) == 0)
                .count(),
            fill_value: op.fill_value(),
        }
    }
}
