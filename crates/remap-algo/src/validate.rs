//! Numerical checks for remapping operators.
//!
//! Three independent, read-only checks:
//!
//! | Check | Property | Default tolerance |
//! |-------|----------|-------------------|
//! | [`is_consistent`] | every source row sums to one | `1e-8` |
//! | [`is_conservative`] | area-weighted columns reproduce target areas | `1e-8` (relative) |
//! | [`is_monotone`] | every weight lies in `[0, 1]` | `1e-12` |
//!
//! Each check scans the whole operator and reports the *first* failure in
//! index order together with the number of failures, so a report is the same
//! no matter how many threads did the scan. [`Validator`] runs a selection of
//! checks concurrently and collects their outcomes in a [`ValidationReport`].

use remap_core::{ConservationError, Side, SparseOperator, ValidationError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Tolerances used by the three checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Absolute tolerance on row sums
    pub consistency: f64,
    /// Tolerance relative to the area being balanced
    pub conservation: f64,
    /// Allowed excursion outside `[0, 1]`
    pub monotonicity: f64,
}

impl Tolerances {
    /// Reject NaN, infinite or negative tolerances.
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_tolerance(Check::Consistency, self.consistency)?;
        ensure_tolerance(Check::Conservation, self.conservation)?;
        ensure_tolerance(Check::Monotonicity, self.monotonicity)
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            consistency: 1.0e-8,
            conservation: 1.0e-8,
            monotonicity: 1.0e-12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    Consistency,
    Conservation,
    Monotonicity,
}

impl Check {
    pub fn name(self) -> &'static str {
        match self {
            Check::Consistency => "consistency",
            Check::Conservation => "conservation",
            Check::Monotonicity => "monotonicity",
        }
    }
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A tolerance is a finite, non-negative bound. NaN would make every
/// comparison pass.
fn ensure_tolerance(check: Check, tolerance: f64) -> Result<(), ValidationError> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidTolerance {
            check: check.name(),
            tolerance,
        })
    }
}

/// What a passing check looked at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckSummary {
    pub check: Check,
    /// Rows, columns or entries that were tested
    pub checked: usize,
    /// Empty rows or columns skipped because they are masked
    pub exempt: usize,
    /// Largest absolute deviation seen
    pub max_deviation: f64,
    pub tolerance: f64,
}

/// Row sums must be one: `|Σ_j w(i, j) − 1| <= tolerance` for every row.
///
/// Empty rows fail with a sum of zero unless they are masked (the operator
/// has a fill value or the source mask marks the cell inactive).
pub fn is_consistent(op: &SparseOperator, tolerance: f64) -> Result<CheckSummary, ValidationError> {
    check_consistency(op, tolerance, PARALLEL)
}

/// Area-weighted column sums must reproduce the target areas.
///
/// Rejects operators whose source or target areas sum to zero, then checks
/// the global balance `|Σ w(i, j)·a[i] − Σ b[j]| <= tolerance · Σ b[j]` and
/// finally every column `|Σ_i w(i, j)·a[i] − b[j]| <= tolerance · b[j]`.
/// Masked empty columns are left out of both.
pub fn is_conservative(
    op: &SparseOperator,
    tolerance: f64,
) -> Result<CheckSummary, ValidationError> {
    check_conservation(op, tolerance, PARALLEL)
}

/// Every weight must lie within `[-tolerance, 1 + tolerance]`.
///
/// Entries are scanned by increasing source, then target index.
pub fn is_monotone(op: &SparseOperator, tolerance: f64) -> Result<CheckSummary, ValidationError> {
    check_monotonicity(op, tolerance, PARALLEL)
}

const PARALLEL: bool = cfg!(feature = "rayon");

fn check_consistency(
    op: &SparseOperator,
    tolerance: f64,
    parallel: bool,
) -> Result<CheckSummary, ValidationError> {
    ensure_tolerance(Check::Consistency, tolerance)?;
    let scan = scan_indices(op.source_count(), parallel, |row| {
        if op.is_row_exempt(row) {
            return Scan::exempt();
        }
        let sum: f64 = op.coefficients_for_source_row(row).map(|(_, w)| w).sum();
        let deviation = (sum - 1.0).abs();
        if deviation > tolerance {
            Scan::fail(row, sum, deviation)
        } else {
            Scan::pass(deviation)
        }
    });

    if scan.exempt > 0 {
        debug!(rows = scan.exempt, "masked empty rows exempt from consistency");
    }

    match scan.first {
        Some((row, observed)) => Err(ValidationError::InconsistentRow {
            row,
            observed,
            tolerance,
            violations: scan.violations,
        }),
        None => Ok(scan.summary(Check::Consistency, tolerance)),
    }
}

fn check_conservation(
    op: &SparseOperator,
    tolerance: f64,
    parallel: bool,
) -> Result<CheckSummary, ValidationError> {
    ensure_tolerance(Check::Conservation, tolerance)?;
    for (side, grid) in [(Side::Source, op.source()), (Side::Target, op.target())] {
        let total = grid.total_area();
        if total <= 0.0 {
            return Err(ValidationError::DegenerateAreas { side, total });
        }
    }

    let masses = column_masses(op, parallel);
    let areas = op.target().areas();

    // Summed in column order so the global balance does not depend on threads.
    let (total_mass, total_area) = masses
        .iter()
        .zip(areas)
        .filter_map(|(mass, area)| mass.map(|m| (m, *area)))
        .fold((0.0, 0.0), |(tm, ta), (m, a)| (tm + m, ta + a));

    let imbalance = total_mass - total_area;
    if imbalance.abs() > tolerance * total_area {
        return Err(ConservationError::Global {
            imbalance,
            total_area,
            tolerance,
        }
        .into());
    }

    let scan = masses
        .iter()
        .zip(areas)
        .enumerate()
        .fold(Scan::empty(), |scan, (column, (mass, &area))| {
            let observed = match mass {
                None => Scan::exempt(),
                Some(mass) => {
                    let deviation = (mass - area).abs();
                    if deviation > tolerance * area {
                        Scan::fail(column, (*mass, area), deviation)
                    } else {
                        Scan::pass(deviation)
                    }
                }
            };
            scan.merge(observed)
        });

    if scan.exempt > 0 {
        debug!(columns = scan.exempt, "masked empty columns exempt from conservation");
    }

    match scan.first {
        Some((column, (mass, area))) => Err(ConservationError::Column {
            column,
            mass,
            area,
            tolerance,
            violations: scan.violations,
        }
        .into()),
        None => Ok(scan.summary(Check::Conservation, tolerance)),
    }
}

/// `Σ_i w(i, j)·a[i]` per target column, `None` for masked empty columns.
fn column_masses(op: &SparseOperator, parallel: bool) -> Vec<Option<f64>> {
    let source_areas = op.source().areas();
    let mass_of = |column: usize| {
        if op.is_column_exempt(column) {
            return None;
        }
        Some(
            op.coefficients_for_target_column(column)
                .map(|(row, w)| w * source_areas[row])
                .sum::<f64>(),
        )
    };

    #[cfg(feature = "rayon")]
    {
        if parallel {
            return (0..op.target_count()).into_par_iter().map(mass_of).collect();
        }
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    (0..op.target_count()).map(mass_of).collect()
}

fn check_monotonicity(
    op: &SparseOperator,
    tolerance: f64,
    parallel: bool,
) -> Result<CheckSummary, ValidationError> {
    ensure_tolerance(Check::Monotonicity, tolerance)?;
    let scan = scan_indices(op.source_count(), parallel, |row| {
        op.coefficients_for_source_row(row)
            .fold(Scan::empty(), |scan, (column, w)| {
                let deviation = (-w).max(w - 1.0).max(0.0);
                let observed = if w < -tolerance || w > 1.0 + tolerance {
                    Scan::fail((row, column), w, deviation)
                } else {
                    Scan::pass(deviation)
                };
                scan.merge(observed)
            })
    });

    match scan.first {
        Some(((source_index, target_index), weight)) => Err(ValidationError::Monotonicity {
            source_index,
            target_index,
            weight,
            tolerance,
            violations: scan.violations,
        }),
        None => Ok(scan.summary(Check::Monotonicity, tolerance)),
    }
}

/// Partial result of a scan. Merging keeps the failure with the smallest key,
/// which makes the reduction independent of how the index range was split.
#[derive(Debug, Clone, Copy)]
struct Scan<K, V> {
    checked: usize,
    exempt: usize,
    violations: usize,
    max_deviation: f64,
    first: Option<(K, V)>,
}

impl<K: Ord + Copy, V: Copy> Scan<K, V> {
    fn empty() -> Self {
        Self {
            checked: 0,
            exempt: 0,
            violations: 0,
            max_deviation: 0.0,
            first: None,
        }
    }

    fn exempt() -> Self {
        Self {
            exempt: 1,
            ..Self::empty()
        }
    }

    fn pass(deviation: f64) -> Self {
        Self {
            checked: 1,
            max_deviation: deviation,
            ..Self::empty()
        }
    }

    fn fail(key: K, value: V, deviation: f64) -> Self {
        Self {
            checked: 1,
            violations: 1,
            max_deviation: deviation,
            first: Some((key, value)),
            ..Self::empty()
        }
    }

    fn merge(self, other: Self) -> Self {
        let first = match (self.first, other.first) {
            (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
            (a, b) => a.or(b),
        };
        Self {
            checked: self.checked + other.checked,
            exempt: self.exempt + other.exempt,
            violations: self.violations + other.violations,
            max_deviation: self.max_deviation.max(other.max_deviation),
            first,
        }
    }

    fn summary(&self, check: Check, tolerance: f64) -> CheckSummary {
        CheckSummary {
            check,
            checked: self.checked,
            exempt: self.exempt,
            max_deviation: self.max_deviation,
            tolerance,
        }
    }
}

fn scan_indices<K, V, F>(count: usize, parallel: bool, observe: F) -> Scan<K, V>
where
    K: Ord + Copy + Send,
    V: Copy + Send,
    F: Fn(usize) -> Scan<K, V> + Sync + Send,
{
    #[cfg(feature = "rayon")]
    {
        if parallel {
            return (0..count)
                .into_par_iter()
                .map(observe)
                .reduce(Scan::empty, Scan::merge);
        }
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    (0..count).map(observe).fold(Scan::empty(), Scan::merge)
}

/// Runs a selection of checks against an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub tolerances: Tolerances,
    /// Also run the monotonicity check
    pub check_monotone: bool,
    /// Run checks (and the scans inside them) on the rayon pool
    pub parallel: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            tolerances: Tolerances::default(),
            check_monotone: false,
            parallel: PARALLEL,
        }
    }
}

impl Validator {
    pub fn new(tolerances: Tolerances) -> Self {
        Self {
            tolerances,
            ..Self::default()
        }
    }

    pub fn with_monotonicity(mut self, enabled: bool) -> Self {
        self.check_monotone = enabled;
        self
    }

    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled && PARALLEL;
        self
    }

    /// Run consistency, conservation and (if enabled) monotonicity.
    pub fn run(&self, op: &SparseOperator) -> ValidationReport {
        let tol = self.tolerances;
        let parallel = self.parallel;

        let consistency = || check_consistency(op, tol.consistency, parallel);
        let conservation = || check_conservation(op, tol.conservation, parallel);
        let monotonicity = || {
            self.check_monotone
                .then(|| check_monotonicity(op, tol.monotonicity, parallel))
        };

        let (consistency, (conservation, monotonicity)) = if parallel {
            join(consistency, || join(conservation, monotonicity))
        } else {
            (consistency(), (conservation(), monotonicity()))
        };

        let mut outcomes = vec![
            CheckOutcome {
                check: Check::Consistency,
                result: consistency,
            },
            CheckOutcome {
                check: Check::Conservation,
                result: conservation,
            },
        ];
        if let Some(result) = monotonicity {
            outcomes.push(CheckOutcome {
                check: Check::Monotonicity,
                result,
            });
        }

        for outcome in &outcomes {
            match &outcome.result {
                Ok(summary) => debug!(
                    check = %outcome.check,
                    checked = summary.checked,
                    max_deviation = summary.max_deviation,
                    "check passed"
                ),
                Err(err) => warn!(check = %outcome.check, "{err}"),
            }
        }

        ValidationReport { outcomes }
    }
}

#[cfg(feature = "rayon")]
fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    rayon::join(a, b)
}

#[cfg(not(feature = "rayon"))]
fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA,
    B: FnOnce() -> RB,
{
    (a(), b())
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub check: Check,
    pub result: Result<CheckSummary, ValidationError>,
}

/// Outcomes of every check a [`Validator`] ran, in fixed order
/// consistency, conservation, monotonicity.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    outcomes: Vec<CheckOutcome>,
}

impl ValidationReport {
    pub fn outcomes(&self) -> &[CheckOutcome] {
        &self.outcomes
    }

    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    /// Summaries of all checks, or the first failure in check order.
    pub fn into_result(self) -> Result<Vec<CheckSummary>, ValidationError> {
        self.outcomes.into_iter().map(|o| o.result).collect()
    }
}
