use crate::assembly::system::SparseSystem;
use crate::basis::{Basis, Element};
use crate::quadrature::GaussRule;
use nalgebra::{DMatrix, DVector};

mod hermite;
mod projection;
mod vertex;

pub use hermite::*;
pub use projection::*;
pub use vertex::*;

/// Per-element computation driven by the global element loop.
///
/// For every element the loop calls [`evaluate`](Self::evaluate),
/// [`assemble`](Self::assemble) and [`local_to_global`](Self::local_to_global) in this order.
/// Nothing computed for one element is read when processing the next, so independent clones
/// of an initialized visitor may process disjoint sets of elements concurrently.
pub trait ElementVisitor: Clone + Send {
    /// The number of sparse systems the visitor writes to.
    fn num_channels(&self) -> usize;

    /// The number of right-hand-side columns per system.
    fn num_rhs(&self) -> usize {
        1
    }

    /// Prepares the visitor for assembly over `target` and returns the reference quadrature rule.
    fn initialize(&mut self, target: &Basis) -> eyre::Result<GaussRule>;

    /// Evaluates everything needed on `element` at the mapped quadrature nodes.
    fn evaluate(&mut self, target: &Basis, element: &Element, nodes: &DMatrix<f64>) -> eyre::Result<()>;

    /// Integrates the local blocks with the mapped quadrature weights.
    fn assemble(&mut self, element: &Element, weights: &DVector<f64>) -> eyre::Result<()>;

    /// Scatters the local blocks into one system per channel.
    fn local_to_global(&self, patch: usize, eliminated: &DMatrix<f64>, systems: &mut [SparseSystem])
        -> eyre::Result<()>;
}

/// The weighted mass block `B diag(w) B^T` of the active functions.
pub(crate) fn weighted_mass(basis_values: &DMatrix<f64>, weights: &DVector<f64>) -> DMatrix<f64> {
    let mut scaled = basis_values.clone();
    for (mut column, &w) in scaled.column_iter_mut().zip(weights.iter()) {
        column *= w;
    }
    scaled * basis_values.transpose()
}
