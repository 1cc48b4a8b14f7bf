use crate::dof::{Dof, DofMapper};
use crate::error::Error;
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::sync::Arc;

/// A sparse linear system over the free degrees of freedom of a [`DofMapper`].
///
/// Matrix contributions are collected as triplets and only summed when the system is
/// compressed, so the result does not depend on the order in which elements are pushed
/// (up to floating-point summation order).
#[derive(Debug, Clone)]
pub struct SparseSystem {
    mapper: Arc<DofMapper>,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    rhs: DMatrix<f64>,
    matrix: Option<CsrMatrix<f64>>,
}

impl SparseSystem {
    pub fn new(mapper: Arc<DofMapper>, num_rhs: usize) -> Self {
        let n = mapper.num_free();
        Self {
            mapper,
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
            rhs: DMatrix::zeros(n, num_rhs),
            matrix: None,
        }
    }

    pub fn mapper(&self) -> &DofMapper {
        &self.mapper
    }

    pub fn num_free(&self) -> usize {
        self.mapper.num_free()
    }

    /// Reserves room for `nonzeros_per_col` entries in every column and resizes the right-hand
    /// side to `num_rhs` zero columns.
    pub fn reserve(&mut self, nonzeros_per_col: usize, num_rhs: usize) {
        let additional = nonzeros_per_col * self.num_free();
        self.rows.reserve(additional);
        self.cols.reserve(additional);
        self.values.reserve(additional);
        self.rhs = DMatrix::zeros(self.num_free(), num_rhs);
    }

    /// The degrees of freedom of the given functions of `patch`.
    pub fn map_col_indices(&self, actives: &[usize], patch: usize) -> Vec<Dof> {
        actives.iter().map(|&i| self.mapper.dof(i, patch)).collect()
    }

    /// Adds a local block to the system.
    ///
    /// Rows of eliminated functions are skipped. For an eliminated column `j`, the known value
    /// `eliminated[b(j)]` is moved to the right-hand side. `eliminated` needs at least as many
    /// columns as the right-hand side; surplus columns are ignored.
    pub fn push(
        &mut self,
        local_matrix: &DMatrix<f64>,
        local_rhs: &DMatrix<f64>,
        dofs: &[Dof],
        eliminated: &DMatrix<f64>,
    ) -> Result<(), Error> {
        let n = dofs.len();
        let k = self.rhs.ncols();
        if local_matrix.shape() != (n, n) || local_rhs.shape() != (n, k) {
            return Err(Error::dimension_mismatch(format!(
                "local block of shape {:?} with right-hand side {:?} does not fit {n} dofs and {k} \
                 right-hand sides",
                local_matrix.shape(),
                local_rhs.shape()
            )));
        }
        if eliminated.nrows() != self.mapper.boundary_size() || eliminated.ncols() < k {
            return Err(Error::dimension_mismatch(format!(
                "eliminated values of shape {:?}, expected {} rows and at least {k} columns",
                eliminated.shape(),
                self.mapper.boundary_size()
            )));
        }

        for (i, row_dof) in dofs.iter().enumerate() {
            let Dof::Free(global_row) = *row_dof else {
                continue;
            };
            for (j, col_dof) in dofs.iter().enumerate() {
                let value = local_matrix[(i, j)];
                match *col_dof {
                    Dof::Free(global_col) => {
                        self.rows.push(global_row);
                        self.cols.push(global_col);
                        self.values.push(value);
                    }
                    Dof::Eliminated(b) => {
                        for c in 0..k {
                            self.rhs[(global_row, c)] -= value * eliminated[(b, c)];
                        }
                    }
                }
            }
            for c in 0..k {
                self.rhs[(global_row, c)] += local_rhs[(i, c)];
            }
        }
        self.matrix = None;
        Ok(())
    }

    /// Sums the collected triplets into a CSR matrix. Calling it again without new
    /// contributions returns the same matrix.
    pub fn compress(&mut self) -> Result<&CsrMatrix<f64>, Error> {
        if self.matrix.is_none() {
            let n = self.num_free();
            let coo = CooMatrix::try_from_triplets(n, n, self.rows.clone(), self.cols.clone(), self.values.clone())
                .map_err(|err| Error::dimension_mismatch(format!("invalid triplets: {err}")))?;
            self.matrix = Some(CsrMatrix::from(&coo));
        }
        self.matrix
            .as_ref()
            .ok_or_else(|| Error::precondition("sparse system was not compressed"))
    }

    /// The compressed matrix, or `None` if contributions were pushed after the last
    /// [`compress`](Self::compress).
    pub fn matrix(&self) -> Option<&CsrMatrix<f64>> {
        self.matrix.as_ref()
    }

    pub fn rhs(&self) -> &DMatrix<f64> {
        &self.rhs
    }
}
