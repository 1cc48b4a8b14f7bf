//! Gluing data: the coupling functions alpha and beta along the two edges meeting at a vertex.
//!
//! For direction `d` the edge is the one on which parameter `d` varies while the other
//! parameter sits at the lower end of its domain. With `t = dF/du_d` and `s = dF/du_(1-d)`,
//!
//! ```text
//! alpha = det [dF/du, dF/dv],    beta = -(t . s) / (t . t).
//! ```
//!
//! The exact provider evaluates these in closed form. The global and local providers replace
//! them by their L2 projections onto a spline space over the edge breakpoints.
use crate::basis::BSplineBasis;
use crate::error::Error;
use crate::geometry::Patch;
use crate::knots::KnotVector;
use crate::options::{AssemblerOptions, GluingDataMode};
use crate::quadrature::GaussRule;
use log::debug;
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use std::fmt::Debug;
use std::sync::Arc;

/// Evaluation contract for alpha and beta along one edge.
pub trait GluingData: Send + Sync + Debug {
    fn mode(&self) -> GluingDataMode;

    /// The parametric direction along which the edge runs.
    fn direction(&self) -> usize;

    fn eval_alpha(&self, points: &[f64]) -> Result<DVector<f64>, Error>;

    fn eval_beta(&self, points: &[f64]) -> Result<DVector<f64>, Error>;

    fn deriv_alpha(&self, t: f64) -> Result<f64, Error>;

    fn deriv_beta(&self, t: f64) -> Result<f64, Error>;
}

/// Values and first derivatives of alpha and beta at a single edge parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EdgeValues {
    alpha: f64,
    beta: f64,
    alpha_deriv: f64,
    beta_deriv: f64,
}

/// Closed-form gluing data computed from the geometry.
#[derive(Debug, Clone)]
pub struct ExactGluingData {
    patch: Arc<Patch>,
    direction: usize,
}

impl ExactGluingData {
    pub fn new(patch: Arc<Patch>, direction: usize) -> Result<Self, Error> {
        if direction > 1 {
            return Err(Error::invalid_parameter(format!(
                "gluing data direction must be 0 or 1, got {direction}"
            )));
        }
        if patch.parametric_dim() != 2 || patch.geometric_dim() != 2 {
            return Err(Error::dimension_mismatch(format!(
                "gluing data needs a planar two-dimensional patch, got parametric dimension {} and \
                 geometric dimension {}",
                patch.parametric_dim(),
                patch.geometric_dim()
            )));
        }
        Ok(Self { patch, direction })
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    fn edge_point(&self, x: f64) -> [f64; 2] {
        let d = self.direction;
        let other = self.patch.basis().domain()[1 - d][0];
        let mut point = [0.0; 2];
        point[d] = x;
        point[1 - d] = other;
        point
    }

    fn values(&self, x: f64) -> Result<EdgeValues, Error> {
        let point = self.edge_point(x);
        let j = self.patch.jacobian(&point)?;
        let h = self.patch.hessians(&point)?;
        let d = self.direction;
        let o = 1 - d;

        let jacobian = Matrix2::new(j[(0, 0)], j[(0, 1)], j[(1, 0)], j[(1, 1)]);
        // Derivative of the Jacobian along the edge: dJ(r, c) / du_d = H_r(c, d)
        let djacobian = Matrix2::from_fn(|r, c| h[r][(c, d)]);

        let t: Vector2<f64> = jacobian.column(d).into_owned();
        let s: Vector2<f64> = jacobian.column(o).into_owned();
        let dt: Vector2<f64> = djacobian.column(d).into_owned();
        let ds: Vector2<f64> = djacobian.column(o).into_owned();

        let tt = t.dot(&t);
        if !(tt > 0.0) || !tt.is_finite() {
            return Err(Error::singularity(format!(
                "degenerate edge tangent at parameter {x} in direction {d}"
            )));
        }
        let ts = t.dot(&s);

        let alpha = jacobian.determinant();
        let alpha_deriv = djacobian[(0, 0)] * jacobian[(1, 1)] + jacobian[(0, 0)] * djacobian[(1, 1)]
            - djacobian[(0, 1)] * jacobian[(1, 0)]
            - jacobian[(0, 1)] * djacobian[(1, 0)];
        let beta = -ts / tt;
        let dts = dt.dot(&s) + t.dot(&ds);
        let dtt = 2.0 * t.dot(&dt);
        let beta_deriv = -(dts * tt - ts * dtt) / (tt * tt);

        Ok(EdgeValues {
            alpha,
            beta,
            alpha_deriv,
            beta_deriv,
        })
    }
}

impl GluingData for ExactGluingData {
    fn mode(&self) -> GluingDataMode {
        GluingDataMode::Exact
    }

    fn direction(&self) -> usize {
        self.direction
    }

    fn eval_alpha(&self, points: &[f64]) -> Result<DVector<f64>, Error> {
        let values = points
            .iter()
            .map(|&x| self.values(x).map(|v| v.alpha))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DVector::from_vec(values))
    }

    fn eval_beta(&self, points: &[f64]) -> Result<DVector<f64>, Error> {
        let values = points
            .iter()
            .map(|&x| self.values(x).map(|v| v.beta))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DVector::from_vec(values))
    }

    fn deriv_alpha(&self, t: f64) -> Result<f64, Error> {
        Ok(self.values(t)?.alpha_deriv)
    }

    fn deriv_beta(&self, t: f64) -> Result<f64, Error> {
        Ok(self.values(t)?.beta_deriv)
    }
}

/// Gluing data given as splines, obtained by L2 projection of the exact gluing data.
///
/// The splines live on the domain of their basis and evaluate to zero outside of it.
#[derive(Debug, Clone)]
pub struct SplineGluingData {
    mode: GluingDataMode,
    direction: usize,
    basis: BSplineBasis,
    alpha: DVector<f64>,
    beta: DVector<f64>,
}

impl SplineGluingData {
    /// Projects `exact` onto the spline space of degree `p_tilde` and regularity `r_tilde`
    /// over `interval`, cut at every breakpoint of `breaks` strictly inside the interval.
    pub fn project(
        exact: &ExactGluingData,
        mode: GluingDataMode,
        breaks: &[f64],
        interval: [f64; 2],
        p_tilde: usize,
        r_tilde: usize,
    ) -> Result<Self, Error> {
        if mode == GluingDataMode::Exact {
            return Err(Error::invalid_parameter("exact gluing data cannot be projected"));
        }
        if r_tilde >= p_tilde {
            return Err(Error::invalid_parameter(format!(
                "projection regularity {r_tilde} must be smaller than projection degree {p_tilde}"
            )));
        }
        let [a, b] = interval;
        let mut knots = KnotVector::uniform(a, b, 0, p_tilde + 1, 0)?;
        for &t in breaks {
            if t > a && t < b {
                knots.insert(t, p_tilde - r_tilde)?;
            }
        }
        let basis = BSplineBasis::new(knots);
        let n = basis.size();

        // The integrands are rational, so integrate with a few extra points
        let rule = GaussRule::new(&[p_tilde + 4]);
        let mut mass = DMatrix::zeros(n, n);
        let mut rhs = DMatrix::zeros(n, 2);
        for [lo, hi] in basis.elements() {
            let (nodes, weights) = rule.map_to(&DVector::from_element(1, lo), &DVector::from_element(1, hi))?;
            for q in 0..rule.num_nodes() {
                let x = nodes[(0, q)];
                let f = exact.values(x)?;
                let actives: Vec<usize> = basis.active(x).collect();
                for &i in &actives {
                    let bi = basis.eval_single(i, x);
                    rhs[(i, 0)] += weights[q] * bi * f.alpha;
                    rhs[(i, 1)] += weights[q] * bi * f.beta;
                    for &j in &actives {
                        mass[(i, j)] += weights[q] * bi * basis.eval_single(j, x);
                    }
                }
            }
        }

        let cholesky = mass
            .cholesky()
            .ok_or_else(|| Error::singularity("gluing data mass matrix is not positive definite"))?;
        let coefs = cholesky.solve(&rhs);
        debug!(
            "projected {mode:?} gluing data in direction {} onto {n} functions on [{a}, {b}]",
            exact.direction
        );
        Ok(Self {
            mode,
            direction: exact.direction,
            basis,
            alpha: coefs.column(0).into_owned(),
            beta: coefs.column(1).into_owned(),
        })
    }

    pub fn basis(&self) -> &BSplineBasis {
        &self.basis
    }

    fn eval(&self, coefs: &DVector<f64>, x: f64, order: usize) -> f64 {
        (0..self.basis.size())
            .map(|i| coefs[i] * self.basis.derivs_single(i, x, order)[order])
            .sum()
    }
}

impl GluingData for SplineGluingData {
    fn mode(&self) -> GluingDataMode {
        self.mode
    }

    fn direction(&self) -> usize {
        self.direction
    }

    fn eval_alpha(&self, points: &[f64]) -> Result<DVector<f64>, Error> {
        Ok(DVector::from_iterator(
            points.len(),
            points.iter().map(|&x| self.eval(&self.alpha, x, 0)),
        ))
    }

    fn eval_beta(&self, points: &[f64]) -> Result<DVector<f64>, Error> {
        Ok(DVector::from_iterator(
            points.len(),
            points.iter().map(|&x| self.eval(&self.beta, x, 0)),
        ))
    }

    fn deriv_alpha(&self, t: f64) -> Result<f64, Error> {
        Ok(self.eval(&self.alpha, t, 1))
    }

    fn deriv_beta(&self, t: f64) -> Result<f64, Error> {
        Ok(self.eval(&self.beta, t, 1))
    }
}

/// The gluing data of both edges at the vertex, sharing a single mode.
#[derive(Debug)]
pub struct GluingDataSet {
    mode: GluingDataMode,
    providers: [Box<dyn GluingData>; 2],
}

impl GluingDataSet {
    /// Combines the providers of the `u` and `v` edges.
    ///
    /// Both providers must report the expected mode and their own direction.
    pub fn new(u: Box<dyn GluingData>, v: Box<dyn GluingData>, expected: GluingDataMode) -> Result<Self, Error> {
        for (d, provider) in [&u, &v].into_iter().enumerate() {
            if provider.mode() != expected {
                return Err(Error::invalid_parameter(format!(
                    "gluing data in direction {d} has mode {:?}, expected {expected:?}",
                    provider.mode()
                )));
            }
            if provider.direction() != d {
                return Err(Error::invalid_parameter(format!(
                    "gluing data for direction {} given in slot {d}",
                    provider.direction()
                )));
            }
        }
        Ok(Self {
            mode: expected,
            providers: [u, v],
        })
    }

    /// Builds the gluing data for `patch` in the mode selected by `options`.
    ///
    /// The local mode projects onto `[0, b]`, where `b` is the right end of the union of the
    /// supports of the first three functions of `plus`.
    pub fn build(patch: Arc<Patch>, plus: &BSplineBasis, options: &AssemblerOptions) -> Result<Self, Error> {
        let mode = options.gluing_data;
        let mut providers = Vec::with_capacity(2);
        for d in 0..2 {
            let exact = ExactGluingData::new(Arc::clone(&patch), d)?;
            let provider: Box<dyn GluingData> = match mode {
                GluingDataMode::Exact => Box::new(exact),
                GluingDataMode::Global | GluingDataMode::Local => {
                    let component = patch.basis().component(d).ok_or_else(|| {
                        Error::dimension_mismatch(format!("patch basis has no component in direction {d}"))
                    })?;
                    let [lo, hi] = component.domain();
                    let interval = match mode {
                        GluingDataMode::Local => {
                            let b = (0..plus.size().min(3))
                                .map(|i| plus.support(i)[1])
                                .fold(lo, f64::max);
                            [lo, b]
                        }
                        _ => [lo, hi],
                    };
                    Box::new(SplineGluingData::project(
                        &exact,
                        mode,
                        &component.knots().breaks(),
                        interval,
                        options.p_tilde,
                        options.r_tilde,
                    )?)
                }
            };
            providers.push(provider);
        }
        let v = providers.pop();
        let u = providers.pop();
        match (u, v) {
            (Some(u), Some(v)) => Self::new(u, v, mode),
            _ => Err(Error::precondition("gluing data construction produced too few providers")),
        }
    }

    pub fn mode(&self) -> GluingDataMode {
        self.mode
    }

    pub fn direction(&self, d: usize) -> &dyn GluingData {
        self.providers[d].as_ref()
    }
}
