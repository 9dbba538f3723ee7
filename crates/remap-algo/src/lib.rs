//! # remap-algo: Transpose and Verification of Remapping Operators
//!
//! Algorithms that act on a [`remap_core::SparseOperator`]:
//!
//! - [`transpose`]: conservative transpose (structural swap followed by an
//!   area-ratio rescale)
//! - [`validate`]: consistency, conservation and monotonicity checks, and a
//!   [`Validator`] that runs them concurrently
//!
//! ## Example
//!
//! ```rust
//! use remap_algo::{transpose, Validator};
//! use remap_core::{GridDescriptor, MapEntry, SparseOperator};
//!
//! // Two unit cells merged into one cell of area 2.
//! let op = SparseOperator::new(
//!     vec![MapEntry::new(0, 0, 1.0), MapEntry::new(1, 0, 1.0)],
//!     GridDescriptor::from_areas(vec![1.0, 1.0]),
//!     GridDescriptor::from_areas(vec![2.0]),
//! )?;
//!
//! let t = transpose(&op)?;
//! assert!(Validator::default().run(&t).passed());
//! # Ok::<(), remap_core::RemapError>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `desktop` (default): parallel scans on the rayon pool

pub mod transpose;
pub mod validate;

pub use transpose::{rescale_by_area_ratio, swap_roles, transpose};
pub use validate::{
    is_conservative, is_consistent, is_monotone, Check, CheckOutcome, CheckSummary, Tolerances,
    ValidationReport, Validator,
};
