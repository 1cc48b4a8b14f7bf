//! Right-hand sides of the G1 vertex basis functions.
//!
//! The six functions attached to a vertex interpolate prescribed value, gradient and Hessian
//! data at the corner of the patch. For each of them the visitor computes the density
//!
//! ```text
//! f = f_minus + f_plus - f_vertex
//! ```
//!
//! where `f_minus` and `f_plus` are the edge contributions along `u` and `v` built from the
//! gluing data, and `f_vertex` is the tensor Hermite interpolant of the corner data. Projecting
//! the densities onto the target basis yields one right-hand side per channel.
use crate::assembly::local::{weighted_mass, ElementVisitor, HermiteCombination};
use crate::assembly::system::SparseSystem;
use crate::basis::{BSplineBasis, Basis, Element};
use crate::error::Error;
use crate::geometry::Patch;
use crate::gluing::GluingDataSet;
use crate::quadrature::GaussRule;
use eyre::eyre;
use log::debug;
use nalgebra::{DMatrix, DVector, SVector, Vector2};
use std::sync::Arc;

/// The number of basis functions, and thus sparse systems, per vertex.
pub const NUM_COUPLING_CHANNELS: usize = 6;

/// Hermite data vector with one entry per channel.
pub type Vector6 = SVector<f64, NUM_COUPLING_CHANNELS>;

/// Corner values of `|alpha|` at or below this threshold are treated as zero.
pub const ALPHA_TOLERANCE: f64 = 1e-14;

/// Inputs of the vertex coupling that stay fixed over the whole assembly.
#[derive(Debug, Clone)]
pub struct VertexCouplingData {
    geometry: Arc<Patch>,
    plus: BSplineBasis,
    minus: BSplineBasis,
    gluing: Arc<GluingDataSet>,
    sigma: Option<f64>,
}

impl VertexCouplingData {
    pub fn new(
        geometry: Arc<Patch>,
        plus: BSplineBasis,
        minus: BSplineBasis,
        gluing: Arc<GluingDataSet>,
        sigma: Option<f64>,
    ) -> Result<Self, Error> {
        if geometry.basis().as_tensor().is_none() || geometry.geometric_dim() != 2 {
            return Err(Error::dimension_mismatch(
                "vertex coupling needs a planar tensor-product geometry",
            ));
        }
        if plus.size() < 3 || minus.size() < 2 {
            return Err(Error::invalid_parameter(format!(
                "plus and minus bases need at least 3 and 2 functions, got {} and {}",
                plus.size(),
                minus.size()
            )));
        }
        if let Some(sigma) = sigma {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(Error::invalid_parameter(format!("sigma must be positive, got {sigma}")));
            }
        }
        Ok(Self {
            geometry,
            plus,
            minus,
            gluing,
            sigma,
        })
    }

    pub fn geometry(&self) -> &Patch {
        &self.geometry
    }

    pub fn plus(&self) -> &BSplineBasis {
        &self.plus
    }

    pub fn minus(&self) -> &BSplineBasis {
        &self.minus
    }

    pub fn gluing(&self) -> &GluingDataSet {
        &self.gluing
    }

    fn geometry_component(&self, d: usize) -> Result<&BSplineBasis, Error> {
        self.geometry
            .basis()
            .component(d)
            .ok_or_else(|| Error::dimension_mismatch(format!("geometry has no component in direction {d}")))
    }

    /// `p / (h max |J|)` at the corner, with `h` the first element size of the geometry.
    fn default_sigma(&self, jacobian: &DMatrix<f64>) -> Result<f64, Error> {
        let component = self.geometry_component(0)?;
        let p = component.degree() as f64;
        let h = component.first_interior_break() - component.domain()[0];
        let max = jacobian.amax();
        if !(max > 0.0) {
            return Err(Error::singularity("vanishing Jacobian at the vertex"));
        }
        Ok(p / (h * max))
    }
}

/// Corner quantities shared by all elements.
#[derive(Debug, Clone, PartialEq)]
pub struct CornerData {
    pub sigma: f64,
    /// Hermite data of the vertex interpolant: value, `d/du`, `d/dv`, `d2/dudv`.
    pub d_ik: [Vector6; 4],
    /// Hermite data of the edge contribution along `u`.
    pub d_minus: [Vector6; 5],
    /// Hermite data of the edge contribution along `v`.
    pub d_plus: [Vector6; 5],
}

fn phi(sigma: f64) -> Vector6 {
    let s2 = sigma * sigma;
    Vector6::new(1.0, sigma, sigma, s2, s2, s2)
}

/// `Phi_1 w_x + Phi_2 w_y`
fn linear(phi: &Vector6, w: &Vector2<f64>) -> Vector6 {
    let mut v = Vector6::zeros();
    v[1] = phi[1] * w.x;
    v[2] = phi[2] * w.y;
    v
}

/// `(a_x Phi_3 + a_y Phi_4) b_x + (a_x Phi_4 + a_y Phi_5) b_y`
fn quadratic(phi: &Vector6, a: &Vector2<f64>, b: &Vector2<f64>) -> Vector6 {
    let mut v = Vector6::zeros();
    v[3] = phi[3] * a.x * b.x;
    v[4] = phi[4] * (a.y * b.x + a.x * b.y);
    v[5] = phi[5] * a.y * b.y;
    v
}

impl CornerData {
    pub fn compute(data: &VertexCouplingData) -> Result<Self, Error> {
        let geometry = &data.geometry;
        let corner: Vec<f64> = geometry.basis().domain().iter().map(|[a, _]| *a).collect();
        let j = geometry.jacobian(&corner)?;
        let h = geometry.hessians(&corner)?;
        let sigma = match data.sigma {
            Some(sigma) => sigma,
            None => data.default_sigma(&j)?,
        };

        let mut alpha = [0.0; 2];
        let mut beta = [0.0; 2];
        let mut alpha_deriv = [0.0; 2];
        let mut beta_deriv = [0.0; 2];
        for d in 0..2 {
            let provider = data.gluing.direction(d);
            let t = corner[d];
            alpha[d] = provider.eval_alpha(&[t])?[0];
            beta[d] = provider.eval_beta(&[t])?[0];
            alpha_deriv[d] = provider.deriv_alpha(t)?;
            beta_deriv[d] = provider.deriv_beta(t)?;
            if !alpha[d].is_finite() || alpha[d].abs() <= ALPHA_TOLERANCE {
                return Err(Error::singularity(format!(
                    "gluing data alpha in direction {d} is {} at the vertex",
                    alpha[d]
                )));
            }
        }

        let j0 = Vector2::new(j[(0, 0)], j[(1, 0)]);
        let j1 = Vector2::new(j[(0, 1)], j[(1, 1)]);
        let f_uu = Vector2::new(h[0][(0, 0)], h[1][(0, 0)]);
        let f_vv = Vector2::new(h[0][(1, 1)], h[1][(1, 1)]);
        let f_uv = Vector2::new(h[0][(0, 1)], h[1][(0, 1)]);

        // Transversal derivatives across the two edges and their derivatives along the edges
        let dd_minus = -(j1 + beta[0] * j0) / alpha[0];
        let dd_plus = (j0 + beta[1] * j1) / alpha[1];
        let dd_minus_deriv = -((f_uv + beta_deriv[0] * j0 + beta[0] * f_uu) * alpha[0]
            - (j1 + beta[0] * j0) * alpha_deriv[0])
            / (alpha[0] * alpha[0]);
        let dd_plus_deriv = ((f_uv + beta_deriv[1] * j1 + beta[1] * f_vv) * alpha[1]
            - (j0 + beta[1] * j1) * alpha_deriv[1])
            / (alpha[1] * alpha[1]);

        let phi = phi(sigma);
        let value = Vector6::new(phi[0], 0.0, 0.0, 0.0, 0.0, 0.0);
        let d_ik = [
            value,
            linear(&phi, &j0),
            linear(&phi, &j1),
            quadratic(&phi, &j0, &j1) + linear(&phi, &f_uv),
        ];
        let d_minus = [
            value,
            linear(&phi, &j0),
            quadratic(&phi, &j0, &j0) + linear(&phi, &f_uu),
            linear(&phi, &dd_minus),
            quadratic(&phi, &j0, &dd_minus) + linear(&phi, &dd_minus_deriv),
        ];
        let d_plus = [
            value,
            linear(&phi, &j1),
            quadratic(&phi, &j1, &j1) + linear(&phi, &f_vv),
            linear(&phi, &dd_plus),
            quadratic(&phi, &j1, &dd_plus) + linear(&phi, &dd_plus_deriv),
        ];
        Ok(Self {
            sigma,
            d_ik,
            d_minus,
            d_plus,
        })
    }
}

/// Hermite combinations of the three univariate bases in one direction.
#[derive(Debug, Clone)]
struct DirectionCombinations {
    geometry: HermiteCombination,
    plus: HermiteCombination,
    minus: HermiteCombination,
}

/// Values of the Hermite combinations at the quadrature nodes in one direction.
#[derive(Debug, Clone)]
struct DirectionValues {
    /// `c_0, c_1` of the geometry basis.
    c: DMatrix<f64>,
    /// `c_0, c_1, c_2` of the plus basis.
    c_plus: DMatrix<f64>,
    c_plus_deriv: DMatrix<f64>,
    /// `c_0, c_1` of the minus basis.
    c_minus: DMatrix<f64>,
    alpha: DVector<f64>,
    beta: DVector<f64>,
}

/// Element visitor computing the mass matrix of the target basis and the right-hand sides
/// of the six vertex basis functions.
#[derive(Debug, Clone)]
pub struct VertexCouplingVisitor {
    data: Arc<VertexCouplingData>,
    corner: Option<Arc<CornerData>>,
    combinations: Option<Arc<[DirectionCombinations; 2]>>,
    actives: Vec<usize>,
    basis_values: DMatrix<f64>,
    measures: DVector<f64>,
    /// One row per channel, one column per quadrature node.
    rhs_values: DMatrix<f64>,
    local_matrix: DMatrix<f64>,
    /// One column per channel.
    local_rhs: DMatrix<f64>,
}

impl VertexCouplingVisitor {
    pub fn new(data: Arc<VertexCouplingData>) -> Self {
        Self {
            data,
            corner: None,
            combinations: None,
            actives: Vec::new(),
            basis_values: DMatrix::zeros(0, 0),
            measures: DVector::zeros(0),
            rhs_values: DMatrix::zeros(NUM_COUPLING_CHANNELS, 0),
            local_matrix: DMatrix::zeros(0, 0),
            local_rhs: DMatrix::zeros(0, NUM_COUPLING_CHANNELS),
        }
    }

    pub fn data(&self) -> &VertexCouplingData {
        &self.data
    }

    /// The corner data, available after initialization.
    pub fn corner(&self) -> Option<&CornerData> {
        self.corner.as_deref()
    }

    pub fn actives(&self) -> &[usize] {
        &self.actives
    }

    /// The density of each channel at the quadrature nodes of the last evaluated element.
    pub fn rhs_values(&self) -> &DMatrix<f64> {
        &self.rhs_values
    }

    pub fn local_matrix(&self) -> &DMatrix<f64> {
        &self.local_matrix
    }

    pub fn local_rhs(&self) -> &DMatrix<f64> {
        &self.local_rhs
    }

    fn direction_values(&self, combinations: &DirectionCombinations, d: usize, points: &[f64]) -> eyre::Result<DirectionValues> {
        let data = &self.data;
        let geometry = data.geometry_component(d)?;
        let provider = data.gluing.direction(d);
        Ok(DirectionValues {
            c: combinations.geometry.eval(geometry, points, 0),
            c_plus: combinations.plus.eval(&data.plus, points, 0),
            c_plus_deriv: combinations.plus.eval(&data.plus, points, 1),
            c_minus: combinations.minus.eval(&data.minus, points, 0),
            alpha: provider.eval_alpha(points)?,
            beta: provider.eval_beta(points)?,
        })
    }
}

impl ElementVisitor for VertexCouplingVisitor {
    fn num_channels(&self) -> usize {
        NUM_COUPLING_CHANNELS
    }

    fn initialize(&mut self, target: &Basis) -> eyre::Result<GaussRule> {
        if target.dim() != 2 {
            return Err(Error::dimension_mismatch(format!(
                "vertex coupling needs a two-dimensional target basis, got dimension {}",
                target.dim()
            ))
            .into());
        }
        let corner = CornerData::compute(&self.data)?;
        debug!("vertex coupling initialized with sigma = {}", corner.sigma);

        let mut combinations = Vec::with_capacity(2);
        for d in 0..2 {
            combinations.push(DirectionCombinations {
                geometry: HermiteCombination::new(self.data.geometry_component(d)?, 2)?,
                plus: HermiteCombination::new(&self.data.plus, 3)?,
                minus: HermiteCombination::new(&self.data.minus, 2)?,
            });
        }
        let combinations: [DirectionCombinations; 2] = combinations
            .try_into()
            .map_err(|_| eyre!("expected Hermite combinations for two directions"))?;

        self.corner = Some(Arc::new(corner));
        self.combinations = Some(Arc::new(combinations));
        let degrees: Vec<usize> = (0..2).map(|d| target.degree(d)).collect();
        Ok(GaussRule::for_degrees(&degrees))
    }

    fn evaluate(&mut self, target: &Basis, _element: &Element, nodes: &DMatrix<f64>) -> eyre::Result<()> {
        let (corner, combinations) = match (&self.corner, &self.combinations) {
            (Some(corner), Some(combinations)) => (Arc::clone(corner), Arc::clone(combinations)),
            _ => {
                return Err(Error::precondition("vertex coupling visitor used before initialize()").into());
            }
        };

        let (actives, basis_values) = target.eval_active(nodes)?;
        self.actives = actives;
        self.basis_values = basis_values;

        let num_nodes = nodes.ncols();
        let mut measures = DVector::zeros(num_nodes);
        for q in 0..num_nodes {
            let point: Vec<f64> = nodes.column(q).iter().copied().collect();
            measures[q] = self.data.geometry.measure(&point)?;
        }
        self.measures = measures;

        let u_points: Vec<f64> = nodes.row(0).iter().copied().collect();
        let v_points: Vec<f64> = nodes.row(1).iter().copied().collect();
        let u = self.direction_values(&combinations[0], 0, &u_points)?;
        let v = self.direction_values(&combinations[1], 1, &v_points)?;

        let (dm, dp, dik) = (&corner.d_minus, &corner.d_plus, &corner.d_ik);
        let mut rhs_values = DMatrix::zeros(NUM_COUPLING_CHANNELS, num_nodes);
        for q in 0..num_nodes {
            // Edge along u, transversal direction v
            let minus_terms = [
                u.c_plus[(0, q)] * v.c[(0, q)] - u.beta[q] * u.c_plus_deriv[(0, q)] * v.c[(1, q)],
                u.c_plus[(1, q)] * v.c[(0, q)] - u.beta[q] * u.c_plus_deriv[(1, q)] * v.c[(1, q)],
                u.c_plus[(2, q)] * v.c[(0, q)] - u.beta[q] * u.c_plus_deriv[(2, q)] * v.c[(1, q)],
                -u.alpha[q] * u.c_minus[(0, q)] * v.c[(1, q)],
                -u.alpha[q] * u.c_minus[(1, q)] * v.c[(1, q)],
            ];
            // Edge along v, transversal direction u
            let plus_terms = [
                v.c_plus[(0, q)] * u.c[(0, q)] - v.beta[q] * v.c_plus_deriv[(0, q)] * u.c[(1, q)],
                v.c_plus[(1, q)] * u.c[(0, q)] - v.beta[q] * v.c_plus_deriv[(1, q)] * u.c[(1, q)],
                v.c_plus[(2, q)] * u.c[(0, q)] - v.beta[q] * v.c_plus_deriv[(2, q)] * u.c[(1, q)],
                v.alpha[q] * v.c_minus[(0, q)] * u.c[(1, q)],
                v.alpha[q] * v.c_minus[(1, q)] * u.c[(1, q)],
            ];
            let vertex_terms = [
                u.c[(0, q)] * v.c[(0, q)],
                u.c[(1, q)] * v.c[(0, q)],
                u.c[(0, q)] * v.c[(1, q)],
                u.c[(1, q)] * v.c[(1, q)],
            ];

            let mut density = Vector6::zeros();
            for (d, t) in dm.iter().zip(&minus_terms) {
                density += d * *t;
            }
            for (d, t) in dp.iter().zip(&plus_terms) {
                density += d * *t;
            }
            for (d, t) in dik.iter().zip(&vertex_terms) {
                density -= d * *t;
            }
            rhs_values.set_column(q, &density);
        }
        self.rhs_values = rhs_values;
        Ok(())
    }

    fn assemble(&mut self, _element: &Element, weights: &DVector<f64>) -> eyre::Result<()> {
        if weights.len() != self.measures.len() {
            return Err(Error::dimension_mismatch(format!(
                "{} quadrature weights for {} evaluated nodes",
                weights.len(),
                self.measures.len()
            ))
            .into());
        }
        let scaled = weights.component_mul(&self.measures);
        self.local_matrix = weighted_mass(&self.basis_values, &scaled);

        let mut weighted_rhs = self.rhs_values.transpose();
        for (q, mut row) in weighted_rhs.row_iter_mut().enumerate() {
            row *= scaled[q];
        }
        self.local_rhs = &self.basis_values * weighted_rhs;
        Ok(())
    }

    fn local_to_global(
        &self,
        patch: usize,
        eliminated: &DMatrix<f64>,
        systems: &mut [SparseSystem],
    ) -> eyre::Result<()> {
        if systems.len() != NUM_COUPLING_CHANNELS {
            return Err(Error::dimension_mismatch(format!(
                "{} systems given for {NUM_COUPLING_CHANNELS} channels",
                systems.len()
            ))
            .into());
        }
        for (k, system) in systems.iter_mut().enumerate() {
            let dofs = system.map_col_indices(&self.actives, patch);
            let rhs = self.local_rhs.columns(k, 1).into_owned();
            system.push(&self.local_matrix, &rhs, &dofs, eliminated)?;
        }
        Ok(())
    }
}
