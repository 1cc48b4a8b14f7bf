//! Gauss quadrature on reference cells and its mapping onto elements.
use crate::basis::Element;
use crate::error::Error;
use fenris_quadrature::univariate::gauss;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};

/// Points and weights of the `n`-point Gauss-Legendre rule on `[-1, 1]`, with points in
/// increasing order.
///
/// # Panics
///
/// Panics if `n` is zero.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let (weights, points) = gauss(n);
    points
        .into_iter()
        .map(|[x]| x)
        .zip(weights)
        .sorted_by(|(a, _), (b, _)| a.total_cmp(b))
        .unzip()
}

/// A tensor-product Gauss rule on the reference cell `[-1, 1]^d`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussRule {
    /// One reference node per column.
    nodes: DMatrix<f64>,
    weights: DVector<f64>,
}

impl GaussRule {
    /// A tensor rule with `num_points[d]` points in direction `d`; the first direction runs
    /// fastest.
    pub fn new(num_points: &[usize]) -> Self {
        let rules: Vec<_> = num_points.iter().map(|&n| gauss_legendre(n)).collect();
        let dim = rules.len();
        let total: usize = num_points.iter().product();

        let mut nodes = DMatrix::zeros(dim, total);
        let mut weights = DVector::from_element(total, 1.0);
        for q in 0..total {
            let mut remainder = q;
            for (d, (points, w)) in rules.iter().enumerate() {
                let k = remainder % points.len();
                remainder /= points.len();
                nodes[(d, q)] = points[k];
                weights[q] *= w[k];
            }
        }
        Self { nodes, weights }
    }

    /// A rule with `degree + 1` points per direction, as is customary for spline bases.
    pub fn for_degrees(degrees: &[usize]) -> Self {
        let num_points: Vec<usize> = degrees.iter().map(|p| p + 1).collect();
        Self::new(&num_points)
    }

    pub fn dim(&self) -> usize {
        self.nodes.nrows()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.ncols()
    }

    pub fn reference_nodes(&self) -> &DMatrix<f64> {
        &self.nodes
    }

    pub fn reference_weights(&self) -> &DVector<f64> {
        &self.weights
    }

    /// Maps the rule onto the box `[lower, upper]`, returning nodes and scaled weights.
    pub fn map_to(&self, lower: &DVector<f64>, upper: &DVector<f64>) -> Result<(DMatrix<f64>, DVector<f64>), Error> {
        if lower.len() != self.dim() || upper.len() != self.dim() {
            return Err(Error::dimension_mismatch(format!(
                "cannot map a {}-dimensional rule onto a {}-dimensional box",
                self.dim(),
                lower.len()
            )));
        }
        let half = (upper - lower) * 0.5;
        let center = (upper + lower) * 0.5;
        let mut nodes = self.nodes.clone();
        for (d, mut row) in nodes.row_iter_mut().enumerate() {
            row.apply(|x| *x = center[d] + half[d] * *x);
        }
        let weights = &self.weights * half.product();
        Ok((nodes, weights))
    }

    pub fn map_to_element(&self, element: &Element) -> Result<(DMatrix<f64>, DVector<f64>), Error> {
        self.map_to(element.lower(), element.upper())
    }
}
