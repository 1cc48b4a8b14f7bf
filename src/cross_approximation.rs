//! Parametrization of a planar patch from its four boundary curves by a low-rank cross
//! approximation.
//!
//! Per coordinate the interior coefficients are `C U^-1 R^T`, where the columns of `C` are the
//! coefficients of the south and north curves, the columns of `R` those of the west and east
//! curves, and `U` is the 2x2 matrix of the end coefficients of the south and north curves.
use crate::basis::{BSplineBasis, TensorBSplineBasis};
use crate::error::Error;
use crate::geometry::{MultiPatch, Patch};
use log::warn;
use nalgebra::{DMatrix, DVector, Matrix2};

/// Default threshold on `|det U|` below which the pseudo-inverse is used.
pub const DEFAULT_CORNER_TOLERANCE: f64 = 1e-11;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossApproximation {
    tolerance: f64,
}

impl Default for CrossApproximation {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_CORNER_TOLERANCE,
        }
    }
}

impl CrossApproximation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(self, tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Computes the patch bounded by four curves, given in the order south, north, west, east.
    ///
    /// South and north run along `u`, west and east along `v`. The result lives on the tensor
    /// product of the south and west bases. Rank-deficient corner data is handled with a
    /// pseudo-inverse and a warning.
    pub fn compute(&self, boundary: &MultiPatch) -> Result<Patch, Error> {
        let curves = BoundaryCurves::new(boundary)?;
        let [south, north, west, east] = curves.coefs;
        let sz = [south.nrows(), west.nrows()];
        let dim = south.ncols();
        let basis = TensorBSplineBasis::new(curves.bases[0].clone(), curves.bases[1].clone());

        let mut coefs = DMatrix::zeros(sz[0] * sz[1], dim);
        if sz.iter().all(|&n| n < 3) {
            warn!("no interior control points to fill in");
            for a in 0..sz[0] {
                coefs.set_row(basis.index(a, 0), &south.row(a));
                coefs.set_row(basis.index(a, sz[1] - 1), &north.row(a));
            }
            for b in 0..sz[1] {
                coefs.set_row(basis.index(0, b), &west.row(b));
                coefs.set_row(basis.index(sz[0] - 1, b), &east.row(b));
            }
            return Patch::new(basis, coefs);
        }

        for c in 0..dim {
            let mut columns = DMatrix::zeros(sz[0], 2);
            columns.set_column(0, &south.column(c));
            columns.set_column(1, &north.column(c));
            let mut rows = DMatrix::zeros(sz[1], 2);
            rows.set_column(0, &west.column(c));
            rows.set_column(1, &east.column(c));

            let cross = Matrix2::new(
                columns[(0, 0)],
                columns[(0, 1)],
                columns[(sz[0] - 1, 0)],
                columns[(sz[0] - 1, 1)],
            );
            let inverse = if cross.determinant().abs() < self.tolerance {
                warn!("corner data is rank-deficient in coordinate {c}");
                cross
                    .pseudo_inverse(self.tolerance)
                    .map_err(|err| Error::singularity(format!("pseudo-inverse of corner data failed: {err}")))?
            } else {
                cross
                    .try_inverse()
                    .ok_or_else(|| Error::singularity("corner data is not invertible"))?
            };

            let inverse = DMatrix::from_column_slice(2, 2, inverse.as_slice());
            let product = &columns * inverse * rows.transpose();
            // Column-major flattening matches the tensor index a + sz0 * b
            coefs.set_column(c, &DVector::from_column_slice(product.as_slice()));
        }
        Patch::new(basis, coefs)
    }
}

/// Bases and coefficients of south, north, west and east curves.
struct BoundaryCurves<'a> {
    bases: [&'a BSplineBasis; 2],
    coefs: [&'a DMatrix<f64>; 4],
}

impl<'a> BoundaryCurves<'a> {
    fn new(boundary: &'a MultiPatch) -> Result<Self, Error> {
        if boundary.len() != 4 {
            return Err(Error::invalid_parameter(format!(
                "cross approximation needs 4 boundary curves, got {}",
                boundary.len()
            )));
        }
        let patches = boundary.patches();
        let mut bases = Vec::with_capacity(4);
        for (i, patch) in patches.iter().enumerate() {
            let basis = patch.basis().as_univariate().ok_or_else(|| {
                Error::dimension_mismatch(format!("boundary patch {i} is not a curve"))
            })?;
            bases.push(basis);
        }
        let dim = patches[0].geometric_dim();
        if patches.iter().any(|p| p.geometric_dim() != dim) {
            return Err(Error::dimension_mismatch("boundary curves have different dimensions"));
        }
        for (i, j) in [(0, 1), (2, 3)] {
            if bases[i].size() != bases[j].size() {
                return Err(Error::dimension_mismatch(format!(
                    "opposite boundary curves {i} and {j} have {} and {} coefficients",
                    bases[i].size(),
                    bases[j].size()
                )));
            }
        }
        Ok(Self {
            bases: [bases[0], bases[2]],
            coefs: [
                patches[0].coefs(),
                patches[1].coefs(),
                patches[2].coefs(),
                patches[3].coefs(),
            ],
        })
    }
}
