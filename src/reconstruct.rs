//! Reconstruction of spline patches from solution coefficients.
use crate::basis::Basis;
use crate::dof::{Dof, DofMapper};
use crate::error::Error;
use crate::geometry::Patch;
use nalgebra::DMatrix;

/// Builds a patch on `basis` from the solution of a system numbered by `mapper`.
///
/// Row `i` of the coefficients is taken from `solution` if function `i` of `patch` is free, and
/// from `eliminated` otherwise. The geometric dimension is the number of columns of `solution`,
/// or of `eliminated` if `solution` has no columns, which allows building patches from
/// eliminated values alone.
pub fn construct_patch(
    mapper: &DofMapper,
    basis: &Basis,
    patch: usize,
    solution: &DMatrix<f64>,
    eliminated: &DMatrix<f64>,
) -> Result<Patch, Error> {
    if patch >= mapper.num_patches() {
        return Err(Error::invalid_parameter(format!(
            "patch {patch} out of bounds for {} patches",
            mapper.num_patches()
        )));
    }
    let size = mapper.patch_size(patch);
    if basis.size() != size {
        return Err(Error::dimension_mismatch(format!(
            "basis of size {} for patch {patch} with {size} functions",
            basis.size()
        )));
    }
    let dim = if solution.ncols() != 0 {
        solution.ncols()
    } else {
        eliminated.ncols()
    };
    if solution.ncols() != 0 && solution.nrows() != mapper.num_free() {
        return Err(Error::dimension_mismatch(format!(
            "solution has {} rows, expected {}",
            solution.nrows(),
            mapper.num_free()
        )));
    }
    if eliminated.nrows() != mapper.boundary_size() || (mapper.boundary_size() > 0 && eliminated.ncols() < dim) {
        return Err(Error::dimension_mismatch(format!(
            "eliminated values of shape {:?}, expected {} rows and at least {dim} columns",
            eliminated.shape(),
            mapper.boundary_size()
        )));
    }

    let mut coefs = DMatrix::zeros(size, dim);
    for i in 0..size {
        match mapper.dof(i, patch) {
            Dof::Free(index) => {
                if solution.ncols() == 0 {
                    return Err(Error::dimension_mismatch(format!(
                        "function {i} is free, but the solution has no columns"
                    )));
                }
                coefs.set_row(i, &solution.row(index));
            }
            Dof::Eliminated(index) => {
                coefs.set_row(i, &eliminated.row(index).columns(0, dim));
            }
        }
    }
    Patch::new(basis.clone(), coefs)
}
