//! Spline patches and multi-patch collections.
use crate::basis::{BSplineBasis, Basis, TensorBSplineBasis};
use crate::error::Error;
use nalgebra::{DMatrix, DVector};

/// A spline map from a parametric domain into physical space.
///
/// Row `i` of the coefficient matrix is the control point of basis function `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    basis: Basis,
    coefs: DMatrix<f64>,
}

impl Patch {
    pub fn new(basis: impl Into<Basis>, coefs: DMatrix<f64>) -> Result<Self, Error> {
        let basis = basis.into();
        if coefs.nrows() != basis.size() {
            return Err(Error::dimension_mismatch(format!(
                "{} coefficients given for a basis of size {}",
                coefs.nrows(),
                basis.size()
            )));
        }
        Ok(Self { basis, coefs })
    }

    /// The identity map on the parametric domain of a tensor basis.
    pub fn identity(basis: TensorBSplineBasis) -> Self {
        let basis = Basis::from(basis);
        let coefs = basis.greville_points();
        Self { basis, coefs }
    }

    /// A univariate curve.
    pub fn curve(basis: BSplineBasis, coefs: DMatrix<f64>) -> Result<Self, Error> {
        Self::new(basis, coefs)
    }

    pub fn basis(&self) -> &Basis {
        &self.basis
    }

    pub fn coefs(&self) -> &DMatrix<f64> {
        &self.coefs
    }

    pub fn parametric_dim(&self) -> usize {
        self.basis.dim()
    }

    pub fn geometric_dim(&self) -> usize {
        self.coefs.ncols()
    }

    pub fn eval(&self, point: &[f64]) -> Result<DVector<f64>, Error> {
        let d = self.basis.derivatives(point)?;
        let mut x = DVector::zeros(self.geometric_dim());
        for (j, &i) in d.actives.iter().enumerate() {
            x += d.values[j] * self.coefs.row(i).transpose();
        }
        Ok(x)
    }

    /// The Jacobian `J(r, c) = dx_r / du_c`, of size `geometric_dim x parametric_dim`.
    pub fn jacobian(&self, point: &[f64]) -> Result<DMatrix<f64>, Error> {
        let d = self.basis.derivatives(point)?;
        let mut jacobian = DMatrix::zeros(self.geometric_dim(), self.parametric_dim());
        for (j, &i) in d.actives.iter().enumerate() {
            jacobian += self.coefs.row(i).transpose() * d.gradients.column(j).transpose();
        }
        Ok(jacobian)
    }

    /// Parametric Hessians, one `parametric_dim x parametric_dim` matrix per coordinate.
    pub fn hessians(&self, point: &[f64]) -> Result<Vec<DMatrix<f64>>, Error> {
        let d = self.basis.derivatives(point)?;
        let pdim = self.parametric_dim();
        let hessians = (0..self.geometric_dim())
            .map(|c| {
                let mut flat = DVector::zeros(pdim * pdim);
                for (j, &i) in d.actives.iter().enumerate() {
                    flat += self.coefs[(i, c)] * d.hessians.column(j);
                }
                DMatrix::from_column_slice(pdim, pdim, flat.as_slice())
            })
            .collect();
        Ok(hessians)
    }

    /// The integration measure: `|det J|` for square Jacobians, `sqrt(det(J^T J))` otherwise.
    pub fn measure(&self, point: &[f64]) -> Result<f64, Error> {
        let jacobian = self.jacobian(point)?;
        if jacobian.is_square() {
            Ok(jacobian.determinant().abs())
        } else if jacobian.nrows() > jacobian.ncols() {
            Ok((jacobian.transpose() * &jacobian).determinant().max(0.0).sqrt())
        } else {
            Err(Error::dimension_mismatch(
                "geometric dimension is smaller than parametric dimension",
            ))
        }
    }
}

/// A collection of patches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiPatch {
    patches: Vec<Patch>,
}

impl MultiPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_patches(patches: Vec<Patch>) -> Self {
        Self { patches }
    }

    pub fn add_patch(&mut self, patch: Patch) -> usize {
        self.patches.push(patch);
        self.patches.len() - 1
    }

    pub fn patch(&self, index: usize) -> Option<&Patch> {
        self.patches.get(index)
    }

    pub fn basis(&self, index: usize) -> Option<&Basis> {
        self.patch(index).map(Patch::basis)
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}
