//! Per-side cell metadata of a remapping operator.
//!
//! A [`GridDescriptor`] owns everything an operator knows about one of its two
//! discretizations: the cell areas (required), and optionally the structured
//! shape, an activity mask and cell centers. The core never interprets the
//! shape or the centers; they are preserved so a transposed operator can be
//! written back with the same metadata the input had.

use serde::{Deserialize, Serialize};

use crate::error::{MalformedOperatorError, Side};

/// One named dimension of a structured grid (e.g. `lat` of size 180).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub size: usize,
}

impl Dimension {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Cell center coordinates in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellCenters {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
}

/// Cell-level description of one side of an operator.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDescriptor {
    areas: Vec<f64>,
    dims: Vec<Dimension>,
    mask: Option<Vec<bool>>,
    centers: Option<CellCenters>,
}

impl GridDescriptor {
    /// Grid with the given cell areas and no further metadata.
    pub fn from_areas(areas: Vec<f64>) -> Self {
        Self {
            areas,
            dims: Vec::new(),
            mask: None,
            centers: None,
        }
    }

    /// Grid of `count` cells with unit area.
    pub fn unit(count: usize) -> Self {
        Self::from_areas(vec![1.0; count])
    }

    pub fn with_dims(mut self, dims: Vec<Dimension>) -> Self {
        self.dims = dims;
        self
    }

    /// Activity mask; `false` marks a cell as masked out.
    pub fn with_mask(mut self, mask: Vec<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_centers(mut self, centers: CellCenters) -> Self {
        self.centers = Some(centers);
        self
    }

    /// Number of cells (degrees of freedom).
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn areas(&self) -> &[f64] {
        &self.areas
    }

    pub fn area(&self, index: usize) -> f64 {
        self.areas[index]
    }

    pub fn total_area(&self) -> f64 {
        self.areas.iter().sum()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    pub fn centers(&self) -> Option<&CellCenters> {
        self.centers.as_ref()
    }

    /// Whether a cell takes part in remapping. Cells are active unless a
    /// mask says otherwise.
    pub fn is_active(&self, index: usize) -> bool {
        self.mask.as_ref().map_or(true, |mask| mask[index])
    }

    /// Check areas, mask, centers and shape against the cell count.
    pub(crate) fn validate(&self, side: Side) -> Result<(), MalformedOperatorError> {
        let count = self.areas.len();

        if let Some(index) = self
            .areas
            .iter()
            .position(|area| !area.is_finite() || *area < 0.0)
        {
            return Err(MalformedOperatorError::InvalidArea {
                side,
                index,
                area: self.areas[index],
            });
        }

        if let Some(mask) = &self.mask {
            check_len(side, "mask", count, mask.len())?;
        }

        if let Some(centers) = &self.centers {
            check_len(side, "center_lon", count, centers.lon.len())?;
            check_len(side, "center_lat", count, centers.lat.len())?;
        }

        if !self.dims.is_empty() {
            let product: usize = self.dims.iter().map(|d| d.size).product();
            if product != count {
                return Err(MalformedOperatorError::ShapeMismatch {
                    side,
                    dims: self.dims.iter().map(|d| d.size).collect(),
                    product,
                    count,
                });
            }
        }

        Ok(())
    }
}

fn check_len(
    side: Side,
    field: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), MalformedOperatorError> {
    if expected != found {
        return Err(MalformedOperatorError::LengthMismatch {
            side,
            field,
            expected,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_grid() {
        let grid = GridDescriptor::unit(4);
        assert_eq!(grid.len(), 4);
        assert_eq!(grid.total_area(), 4.0);
        assert!(grid.is_active(3));
        assert!(grid.validate(Side::Source).is_ok());
    }

    #[test]
    fn test_negative_area_rejected() {
        let grid = GridDescriptor::from_areas(vec![1.0, -0.5]);
        let err = grid.validate(Side::Target).unwrap_err();
        assert!(matches!(
            err,
            MalformedOperatorError::InvalidArea { index: 1, .. }
        ));
    }

    #[test]
    fn test_nan_area_rejected() {
        let grid = GridDescriptor::from_areas(vec![f64::NAN]);
        assert!(grid.validate(Side::Source).is_err());
    }

    #[test]
    fn test_shape_must_cover_cells() {
        let grid = GridDescriptor::unit(6)
            .with_dims(vec![Dimension::new("lat", 2), Dimension::new("lon", 4)]);
        let err = grid.validate(Side::Source).unwrap_err();
        assert!(matches!(
            err,
            MalformedOperatorError::ShapeMismatch { product: 8, count: 6, .. }
        ));

        let grid = GridDescriptor::unit(8)
            .with_dims(vec![Dimension::new("lat", 2), Dimension::new("lon", 4)]);
        assert!(grid.validate(Side::Source).is_ok());
    }

    #[test]
    fn test_mask_length_checked() {
        let grid = GridDescriptor::unit(3).with_mask(vec![true, false]);
        let err = grid.validate(Side::Target).unwrap_err();
        assert!(matches!(
            err,
            MalformedOperatorError::LengthMismatch { field: "mask", .. }
        ));
    }

    #[test]
    fn test_masked_cell_inactive() {
        let grid = GridDescriptor::unit(2).with_mask(vec![true, false]);
        assert!(grid.is_active(0));
        assert!(!grid.is_active(1));
    }
}
