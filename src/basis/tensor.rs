use crate::basis::{BSplineBasis, BasisDerivatives, Element};
use itertools::iproduct;
use nalgebra::{DMatrix, DVector};

/// A two-dimensional tensor-product B-spline basis.
///
/// Function `(i0, i1)` has the global index `i0 + n0 * i1`, i.e. the first direction runs
/// fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBSplineBasis {
    components: [BSplineBasis; 2],
}

impl TensorBSplineBasis {
    pub fn new(u: BSplineBasis, v: BSplineBasis) -> Self {
        Self { components: [u, v] }
    }

    pub fn components(&self) -> &[BSplineBasis; 2] {
        &self.components
    }

    pub fn component(&self, d: usize) -> &BSplineBasis {
        &self.components[d]
    }

    pub fn size(&self) -> usize {
        self.components[0].size() * self.components[1].size()
    }

    /// The number of functions per direction.
    pub fn size_cwise(&self) -> [usize; 2] {
        [self.components[0].size(), self.components[1].size()]
    }

    pub fn index(&self, i0: usize, i1: usize) -> usize {
        i0 + self.components[0].size() * i1
    }

    pub fn index_pair(&self, i: usize) -> [usize; 2] {
        let n0 = self.components[0].size();
        [i % n0, i / n0]
    }

    pub fn support(&self, i: usize) -> [[f64; 2]; 2] {
        let [i0, i1] = self.index_pair(i);
        [self.components[0].support(i0), self.components[1].support(i1)]
    }

    pub fn active(&self, point: [f64; 2]) -> Vec<usize> {
        let [u, v] = &self.components;
        iproduct!(v.active(point[1]), u.active(point[0]))
            .map(|(i1, i0)| self.index(i0, i1))
            .collect()
    }

    pub fn eval_single(&self, i: usize, point: [f64; 2]) -> f64 {
        let [i0, i1] = self.index_pair(i);
        self.components[0].eval_single(i0, point[0]) * self.components[1].eval_single(i1, point[1])
    }

    pub fn elements(&self) -> Vec<Element> {
        let [u, v] = &self.components;
        iproduct!(v.elements(), u.elements())
            .map(|([v0, v1], [u0, u1])| {
                Element::new(DVector::from_column_slice(&[u0, v0]), DVector::from_column_slice(&[u1, v1]))
            })
            .collect()
    }

    pub(crate) fn derivatives(&self, point: [f64; 2]) -> BasisDerivatives {
        let [u, v] = &self.components;
        let (span_u, du) = u.eval_derivatives(point[0], 2);
        let (span_v, dv) = v.eval_derivatives(point[1], 2);
        let (pu, pv) = (u.degree(), v.degree());
        let n = (pu + 1) * (pv + 1);

        let mut actives = Vec::with_capacity(n);
        let mut values = DVector::zeros(n);
        let mut gradients = DMatrix::zeros(2, n);
        let mut hessians = DMatrix::zeros(4, n);
        for (col, (b, a)) in iproduct!(0..=pv, 0..=pu).enumerate() {
            actives.push(self.index(span_u - pu + a, span_v - pv + b));
            values[col] = du[(0, a)] * dv[(0, b)];
            gradients[(0, col)] = du[(1, a)] * dv[(0, b)];
            gradients[(1, col)] = du[(0, a)] * dv[(1, b)];
            let uv = du[(1, a)] * dv[(1, b)];
            hessians[(0, col)] = du[(2, a)] * dv[(0, b)];
            hessians[(1, col)] = uv;
            hessians[(2, col)] = uv;
            hessians[(3, col)] = du[(0, a)] * dv[(2, b)];
        }
        BasisDerivatives {
            actives,
            values,
            gradients,
            hessians,
        }
    }

    pub(crate) fn greville_points(&self) -> DMatrix<f64> {
        let gu = self.components[0].greville();
        let gv = self.components[1].greville();
        let mut points = DMatrix::zeros(self.size(), 2);
        for i in 0..self.size() {
            let [i0, i1] = self.index_pair(i);
            points[(i, 0)] = gu[i0];
            points[(i, 1)] = gv[i1];
        }
        points
    }
}
