use crate::basis::BSplineBasis;
use crate::error::Error;
use nalgebra::DMatrix;

/// Combinations `c_0, ..., c_{m-1}` of the first `m` functions of a univariate basis that are
/// dual to point evaluation of derivatives at the start of the domain:
///
/// ```text
/// d^i c_j / dx^i (a) = delta_ij,    0 <= i, j < m.
/// ```
///
/// On an open knot vector, function `k` vanishes to order `k` at the start, so the derivative
/// table is lower triangular and the combinations only involve the functions `0..=j`.
#[derive(Debug, Clone, PartialEq)]
pub struct HermiteCombination {
    /// Row `j` holds the coefficients of `c_j`.
    coefficients: DMatrix<f64>,
}

impl HermiteCombination {
    pub fn new(basis: &BSplineBasis, order: usize) -> Result<Self, Error> {
        if order == 0 || order > basis.size() || order > basis.degree() + 1 {
            return Err(Error::invalid_parameter(format!(
                "cannot build {order} Hermite combinations from a basis of degree {} and size {}",
                basis.degree(),
                basis.size()
            )));
        }
        let a = basis.domain()[0];
        // derivatives(i, k) = B_k^(i)(a)
        let mut derivatives = DMatrix::zeros(order, order);
        for k in 0..order {
            derivatives.set_column(k, &basis.derivs_single(k, a, order - 1));
        }
        if let Some(i) = (0..order).find(|&i| derivatives[(i, i)].abs() <= f64::EPSILON) {
            return Err(Error::singularity(format!(
                "derivative {i} of basis function {i} vanishes at the domain start"
            )));
        }

        // C D^T = I with D^T upper triangular
        let inverse = derivatives
            .transpose()
            .solve_upper_triangular(&DMatrix::identity(order, order))
            .ok_or_else(|| Error::singularity("singular Hermite derivative table"))?;
        Ok(Self { coefficients: inverse })
    }

    pub fn order(&self) -> usize {
        self.coefficients.nrows()
    }

    pub fn coefficients(&self) -> &DMatrix<f64> {
        &self.coefficients
    }

    /// The `derivative`-th derivatives of all combinations at the given points, one row per
    /// combination and one column per point.
    pub fn eval(&self, basis: &BSplineBasis, points: &[f64], derivative: usize) -> DMatrix<f64> {
        let m = self.order();
        let mut functions = DMatrix::zeros(m, points.len());
        for (q, &x) in points.iter().enumerate() {
            for k in 0..m {
                functions[(k, q)] = basis.derivs_single(k, x, derivative)[derivative];
            }
        }
        &self.coefficients * functions
    }
}
