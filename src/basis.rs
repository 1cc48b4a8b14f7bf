//! B-spline bases and the elements they induce on their parametric domain.
use crate::error::Error;
use crate::knots::KnotVector;
use nalgebra::{DMatrix, DVector};
use std::ops::RangeInclusive;

mod tensor;

pub use tensor::*;

/// An axis-aligned cell `[lower, upper]` of a parametric mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Element {
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> Self {
        assert_eq!(lower.len(), upper.len(), "corners must have the same dimension");
        Self { lower, upper }
    }

    pub fn interval(a: f64, b: f64) -> Self {
        Self::new(DVector::from_element(1, a), DVector::from_element(1, b))
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    /// The volume (length, area) of the cell.
    pub fn volume(&self) -> f64 {
        (&self.upper - &self.lower).product()
    }
}

/// A univariate B-spline basis over an open knot vector.
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineBasis {
    knots: KnotVector,
}

impl BSplineBasis {
    pub fn new(knots: KnotVector) -> Self {
        Self { knots }
    }

    pub fn knots(&self) -> &KnotVector {
        &self.knots
    }

    pub fn degree(&self) -> usize {
        self.knots.degree()
    }

    /// The number of basis functions.
    pub fn size(&self) -> usize {
        self.knots.len() - self.degree() - 1
    }

    pub fn domain(&self) -> [f64; 2] {
        self.knots.domain()
    }

    /// The support `[t_i, t_{i+p+1}]` of basis function `i`.
    pub fn support(&self, i: usize) -> [f64; 2] {
        assert!(i < self.size(), "basis function index out of bounds");
        [self.knots.knot(i), self.knots.knot(i + self.degree() + 1)]
    }

    /// The first breakpoint to the right of the domain start.
    pub fn first_interior_break(&self) -> f64 {
        let first = self.knots.first();
        self.knots
            .knots()
            .iter()
            .copied()
            .find(|&t| t > first)
            .unwrap_or_else(|| self.knots.last())
    }

    /// Refines the basis by inserting `t` with the given multiplicity.
    pub fn insert_knot(&mut self, t: f64, multiplicity: usize) -> Result<(), Error> {
        self.knots.insert(t, multiplicity)
    }

    /// Indices of the basis functions that may be non-zero at `x`.
    pub fn active(&self, x: f64) -> RangeInclusive<usize> {
        let span = self.knots.find_span(x);
        (span - self.degree())..=span
    }

    /// The non-empty knot spans of the basis, in increasing order.
    pub fn elements(&self) -> Vec<[f64; 2]> {
        self.knots
            .breaks()
            .windows(2)
            .map(|w| [w[0], w[1]])
            .collect()
    }

    /// The Greville abscissae of the basis, i.e. the coefficients reproducing `f(x) = x`.
    pub fn greville(&self) -> DVector<f64> {
        let p = self.degree();
        let t = self.knots.knots();
        if p == 0 {
            return DVector::from_fn(self.size(), |i, _| 0.5 * (t[i] + t[i + 1]));
        }
        DVector::from_fn(self.size(), |i, _| {
            t[i + 1..=i + p].iter().sum::<f64>() / p as f64
        })
    }

    /// Values and derivatives up to order `n` of all functions active at `x`.
    ///
    /// Returns the index of the knot span together with a `(n + 1) x (p + 1)` matrix whose entry
    /// `(k, j)` is the `k`-th derivative of basis function `span - p + j`. Derivatives of order
    /// higher than the degree are zero. For `x` outside the domain, the polynomial piece of the
    /// nearest span is evaluated.
    pub fn eval_derivatives(&self, x: f64, n: usize) -> (usize, DMatrix<f64>) {
        let p = self.degree();
        let t = self.knots.knots();
        let span = self.knots.find_span(x);

        // Triangular table of basis values (lower part holds knot differences)
        let mut ndu = DMatrix::zeros(p + 1, p + 1);
        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];
        ndu[(0, 0)] = 1.0;
        for j in 1..=p {
            left[j] = x - t[span + 1 - j];
            right[j] = t[span + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                ndu[(j, r)] = right[r + 1] + left[j - r];
                let temp = ndu[(r, j - 1)] / ndu[(j, r)];
                ndu[(r, j)] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            ndu[(j, j)] = saved;
        }

        let mut ders = DMatrix::zeros(n + 1, p + 1);
        for j in 0..=p {
            ders[(0, j)] = ndu[(j, p)];
        }

        let max_order = n.min(p);
        let mut a = DMatrix::zeros(2, p + 1);
        for r in 0..=p {
            let (mut s1, mut s2) = (0, 1);
            a[(0, 0)] = 1.0;
            for k in 1..=max_order {
                let mut d = 0.0;
                let rk = r as isize - k as isize;
                let pk = p - k;
                if r >= k {
                    let rk = rk as usize;
                    a[(s2, 0)] = a[(s1, 0)] / ndu[(pk + 1, rk)];
                    d = a[(s2, 0)] * ndu[(rk, pk)];
                }
                let j1 = if rk >= -1 { 1 } else { (-rk) as usize };
                let j2 = if r <= pk + 1 { k - 1 } else { p - r };
                for j in j1..=j2 {
                    let col = (rk + j as isize) as usize;
                    a[(s2, j)] = (a[(s1, j)] - a[(s1, j - 1)]) / ndu[(pk + 1, col)];
                    d += a[(s2, j)] * ndu[(col, pk)];
                }
                if r <= pk {
                    a[(s2, k)] = -a[(s1, k - 1)] / ndu[(pk + 1, r)];
                    d += a[(s2, k)] * ndu[(r, pk)];
                }
                ders[(k, r)] = d;
                std::mem::swap(&mut s1, &mut s2);
            }
        }

        let mut factor = p as f64;
        for k in 1..=max_order {
            for j in 0..=p {
                ders[(k, j)] *= factor;
            }
            factor *= (p - k) as f64;
        }

        (span, ders)
    }

    /// The `order`-th derivatives of basis function `i` at `x`, for orders `0..=order`.
    ///
    /// Returns zeros outside the support of the function and outside the domain.
    pub fn derivs_single(&self, i: usize, x: f64, order: usize) -> DVector<f64> {
        let [a, b] = self.domain();
        if x < a || x > b {
            return DVector::zeros(order + 1);
        }
        let (span, ders) = self.eval_derivatives(x, order);
        let p = self.degree();
        if i + p < span || i > span {
            return DVector::zeros(order + 1);
        }
        ders.column(i + p - span).into_owned()
    }

    pub fn eval_single(&self, i: usize, x: f64) -> f64 {
        self.derivs_single(i, x, 0)[0]
    }

    pub fn deriv_single(&self, i: usize, x: f64) -> f64 {
        self.derivs_single(i, x, 1)[1]
    }

    pub fn deriv2_single(&self, i: usize, x: f64) -> f64 {
        self.derivs_single(i, x, 2)[2]
    }
}

/// Values and parametric derivatives of the active functions of a basis at a single point.
#[derive(Debug, Clone)]
pub struct BasisDerivatives {
    /// Global indices of the active basis functions.
    pub actives: Vec<usize>,
    /// One value per active function.
    pub values: DVector<f64>,
    /// Column `j` holds the gradient of active function `j`.
    pub gradients: DMatrix<f64>,
    /// Column `j` holds the column-major flattened Hessian of active function `j`.
    pub hessians: DMatrix<f64>,
}

/// A basis of one of the supported kinds.
///
/// Routines that need a particular kind query it with [`Basis::as_univariate`] or
/// [`Basis::as_tensor`], which return `None` instead of failing when the kind does not match.
#[derive(Debug, Clone, PartialEq)]
pub enum Basis {
    Univariate(BSplineBasis),
    Tensor(TensorBSplineBasis),
}

impl From<BSplineBasis> for Basis {
    fn from(basis: BSplineBasis) -> Self {
        Self::Univariate(basis)
    }
}

impl From<TensorBSplineBasis> for Basis {
    fn from(basis: TensorBSplineBasis) -> Self {
        Self::Tensor(basis)
    }
}

impl Basis {
    pub fn as_univariate(&self) -> Option<&BSplineBasis> {
        match self {
            Self::Univariate(basis) => Some(basis),
            Self::Tensor(_) => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorBSplineBasis> {
        match self {
            Self::Tensor(basis) => Some(basis),
            Self::Univariate(_) => None,
        }
    }

    /// The univariate basis in parametric direction `d`.
    pub fn component(&self, d: usize) -> Option<&BSplineBasis> {
        match self {
            Self::Univariate(basis) if d == 0 => Some(basis),
            Self::Univariate(_) => None,
            Self::Tensor(basis) => basis.components().get(d),
        }
    }

    /// The parametric dimension.
    pub fn dim(&self) -> usize {
        match self {
            Self::Univariate(_) => 1,
            Self::Tensor(_) => 2,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Univariate(basis) => basis.size(),
            Self::Tensor(basis) => basis.size(),
        }
    }

    /// The degree in direction `d`.
    ///
    /// # Panics
    ///
    /// Panics if `d` is not smaller than the parametric dimension.
    pub fn degree(&self, d: usize) -> usize {
        self.component(d)
            .expect("direction must be smaller than the parametric dimension")
            .degree()
    }

    /// The support of basis function `i`, one interval per direction.
    pub fn support(&self, i: usize) -> Vec<[f64; 2]> {
        match self {
            Self::Univariate(basis) => vec![basis.support(i)],
            Self::Tensor(basis) => basis.support(i).to_vec(),
        }
    }

    /// The parametric domain, one interval per direction.
    pub fn domain(&self) -> Vec<[f64; 2]> {
        (0..self.dim())
            .map(|d| self.component(d).map(BSplineBasis::domain).unwrap_or([0.0, 0.0]))
            .collect()
    }

    /// The elements of the basis, with the first direction running fastest.
    pub fn elements(&self) -> Vec<Element> {
        match self {
            Self::Univariate(basis) => basis
                .elements()
                .into_iter()
                .map(|[a, b]| Element::interval(a, b))
                .collect(),
            Self::Tensor(basis) => basis.elements(),
        }
    }

    /// Indices of the functions active at `point`, in increasing order.
    pub fn active(&self, point: &[f64]) -> Result<Vec<usize>, Error> {
        self.check_point(point)?;
        Ok(match self {
            Self::Univariate(basis) => basis.active(point[0]).collect(),
            Self::Tensor(basis) => basis.active([point[0], point[1]]),
        })
    }

    /// Evaluates every function active at any of the given points, at all of the points.
    ///
    /// `points` holds one point per column. The returned matrix has one row per function in the
    /// union of the active sets, in increasing order, and one column per point.
    pub fn eval_active(&self, points: &DMatrix<f64>) -> Result<(Vec<usize>, DMatrix<f64>), Error> {
        if points.nrows() != self.dim() {
            return Err(Error::dimension_mismatch(format!(
                "evaluation points have {} rows, but the basis has dimension {}",
                points.nrows(),
                self.dim()
            )));
        }
        let columns: Vec<Vec<f64>> = points
            .column_iter()
            .map(|column| column.iter().copied().collect())
            .collect();
        let mut actives = Vec::new();
        for x in &columns {
            actives.extend(self.active(x)?);
        }
        actives.sort_unstable();
        actives.dedup();
        let values = DMatrix::from_fn(actives.len(), columns.len(), |a, q| {
            self.eval_single(actives[a], &columns[q])
        });
        Ok((actives, values))
    }

    /// The value of basis function `i` at `point`.
    pub fn eval_single(&self, i: usize, point: &[f64]) -> f64 {
        match self {
            Self::Univariate(basis) => basis.eval_single(i, point[0]),
            Self::Tensor(basis) => basis.eval_single(i, [point[0], point[1]]),
        }
    }

    /// Values, gradients and Hessians of the functions active at `point`.
    pub fn derivatives(&self, point: &[f64]) -> Result<BasisDerivatives, Error> {
        self.check_point(point)?;
        match self {
            Self::Univariate(basis) => {
                let x = point[0];
                let actives: Vec<usize> = basis.active(x).collect();
                let n = actives.len();
                let mut values = DVector::zeros(n);
                let mut gradients = DMatrix::zeros(1, n);
                let mut hessians = DMatrix::zeros(1, n);
                for (j, &i) in actives.iter().enumerate() {
                    let d = basis.derivs_single(i, x, 2);
                    values[j] = d[0];
                    gradients[(0, j)] = d[1];
                    hessians[(0, j)] = d[2];
                }
                Ok(BasisDerivatives {
                    actives,
                    values,
                    gradients,
                    hessians,
                })
            }
            Self::Tensor(basis) => Ok(basis.derivatives([point[0], point[1]])),
        }
    }

    /// Coefficients of the identity map, one row per basis function.
    pub fn greville_points(&self) -> DMatrix<f64> {
        match self {
            Self::Univariate(basis) => DMatrix::from_column_slice(basis.size(), 1, basis.greville().as_slice()),
            Self::Tensor(basis) => basis.greville_points(),
        }
    }

    fn check_point(&self, point: &[f64]) -> Result<(), Error> {
        if point.len() != self.dim() {
            return Err(Error::dimension_mismatch(format!(
                "point of dimension {} given to a basis of dimension {}",
                point.len(),
                self.dim()
            )));
        }
        Ok(())
    }
}
