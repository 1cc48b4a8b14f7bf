use crate::assembly::local::{weighted_mass, ElementVisitor};
use crate::assembly::system::SparseSystem;
use crate::basis::{Basis, Element};
use crate::error::Error;
use crate::geometry::Patch;
use crate::quadrature::GaussRule;
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::sync::Arc;

/// A vector-valued function of the parametric coordinates.
pub type ParametricFunction = Arc<dyn Fn(&[f64]) -> DVector<f64> + Send + Sync>;

/// Element visitor for the L2 projection of a function onto the target basis.
///
/// Integrals are taken over the parametric domain, weighted by the measure of `geometry`
/// when one is given.
#[derive(Clone)]
pub struct ProjectionVisitor {
    function: ParametricFunction,
    num_components: usize,
    geometry: Option<Arc<Patch>>,
    actives: Vec<usize>,
    basis_values: DMatrix<f64>,
    /// One row per quadrature node, one column per component.
    function_values: DMatrix<f64>,
    measures: DVector<f64>,
    local_matrix: DMatrix<f64>,
    local_rhs: DMatrix<f64>,
}

impl fmt::Debug for ProjectionVisitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionVisitor")
            .field("num_components", &self.num_components)
            .field("geometry", &self.geometry)
            .field("actives", &self.actives)
            .finish_non_exhaustive()
    }
}

impl ProjectionVisitor {
    pub fn new(function: ParametricFunction, num_components: usize) -> Self {
        Self {
            function,
            num_components,
            geometry: None,
            actives: Vec::new(),
            basis_values: DMatrix::zeros(0, 0),
            function_values: DMatrix::zeros(0, num_components),
            measures: DVector::zeros(0),
            local_matrix: DMatrix::zeros(0, 0),
            local_rhs: DMatrix::zeros(0, num_components),
        }
    }

    pub fn with_geometry(self, geometry: Arc<Patch>) -> Self {
        Self {
            geometry: Some(geometry),
            ..self
        }
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }
}

impl ElementVisitor for ProjectionVisitor {
    fn num_channels(&self) -> usize {
        1
    }

    fn num_rhs(&self) -> usize {
        self.num_components
    }

    fn initialize(&mut self, target: &Basis) -> eyre::Result<GaussRule> {
        if let Some(geometry) = &self.geometry {
            if geometry.parametric_dim() != target.dim() {
                return Err(Error::dimension_mismatch(format!(
                    "geometry of parametric dimension {} for a basis of dimension {}",
                    geometry.parametric_dim(),
                    target.dim()
                ))
                .into());
            }
        }
        let degrees: Vec<usize> = (0..target.dim()).map(|d| target.degree(d)).collect();
        Ok(GaussRule::for_degrees(&degrees))
    }

    fn evaluate(&mut self, target: &Basis, _element: &Element, nodes: &DMatrix<f64>) -> eyre::Result<()> {
        let (actives, basis_values) = target.eval_active(nodes)?;
        self.actives = actives;
        self.basis_values = basis_values;

        let num_nodes = nodes.ncols();
        self.function_values = DMatrix::zeros(num_nodes, self.num_components);
        self.measures = DVector::from_element(num_nodes, 1.0);
        for q in 0..num_nodes {
            let point: Vec<f64> = nodes.column(q).iter().copied().collect();
            let value = (self.function)(&point);
            if value.len() != self.num_components {
                return Err(Error::dimension_mismatch(format!(
                    "function returned {} components, expected {}",
                    value.len(),
                    self.num_components
                ))
                .into());
            }
            self.function_values.set_row(q, &value.transpose());
            if let Some(geometry) = &self.geometry {
                self.measures[q] = geometry.measure(&point)?;
            }
        }
        Ok(())
    }

    fn assemble(&mut self, _element: &Element, weights: &DVector<f64>) -> eyre::Result<()> {
        let scaled = weights.component_mul(&self.measures);
        self.local_matrix = weighted_mass(&self.basis_values, &scaled);
        let mut weighted = self.function_values.clone();
        for (q, mut row) in weighted.row_iter_mut().enumerate() {
            row *= scaled[q];
        }
        self.local_rhs = &self.basis_values * weighted;
        Ok(())
    }

    fn local_to_global(
        &self,
        patch: usize,
        eliminated: &DMatrix<f64>,
        systems: &mut [SparseSystem],
    ) -> eyre::Result<()> {
        for system in systems {
            let dofs = system.map_col_indices(&self.actives, patch);
            system.push(&self.local_matrix, &self.local_rhs, &dofs, eliminated)?;
        }
        Ok(())
    }
}
