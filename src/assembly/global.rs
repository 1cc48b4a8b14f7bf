use crate::assembly::local::{
    ElementVisitor, ParametricFunction, ProjectionVisitor, VertexCouplingData, VertexCouplingVisitor,
    NUM_COUPLING_CHANNELS,
};
use crate::assembly::system::SparseSystem;
use crate::basis::{BSplineBasis, Basis, Element};
use crate::construction::{local_integration_tensor, plus_minus_bases};
use crate::dof::{DofMapper, DofMapperBuilder};
use crate::error::Error;
use crate::geometry::{MultiPatch, Patch};
use crate::gluing::GluingDataSet;
use crate::options::AssemblerOptions;
use crate::reconstruct::construct_patch;
use log::{debug, trace};
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::Arc;

/// Extra fraction of non-zeros reserved on top of the support overlap.
const NONZERO_OVERHEAD: f64 = 0.333333;

/// Estimated number of non-zeros per column for a basis: `prod_d (2 p_d + 1)` plus a third,
/// rounded down.
pub fn column_nonzeros(basis: &Basis) -> usize {
    let overlap: usize = (0..basis.dim()).map(|d| 2 * basis.degree(d) + 1).product();
    (overlap as f64 * (1.0 + NONZERO_OVERHEAD)) as usize
}

/// One sparse system per visitor channel, all sharing the same degree-of-freedom map.
#[derive(Debug, Clone)]
pub struct GlobalSystem {
    mapper: Arc<DofMapper>,
    systems: Vec<SparseSystem>,
}

impl GlobalSystem {
    pub fn new(mapper: Arc<DofMapper>, num_channels: usize, num_rhs: usize) -> Self {
        let systems = (0..num_channels)
            .map(|_| SparseSystem::new(Arc::clone(&mapper), num_rhs))
            .collect();
        Self { mapper, systems }
    }

    pub fn mapper(&self) -> &Arc<DofMapper> {
        &self.mapper
    }

    pub fn systems(&self) -> &[SparseSystem] {
        &self.systems
    }

    pub fn system(&self, channel: usize) -> Option<&SparseSystem> {
        self.systems.get(channel)
    }

    pub fn reserve(&mut self, nonzeros_per_col: usize, num_rhs: usize) {
        for system in &mut self.systems {
            system.reserve(nonzeros_per_col, num_rhs);
        }
    }

    fn check_channels<V: ElementVisitor>(&self, visitor: &V) -> Result<(), Error> {
        if visitor.num_channels() != self.systems.len() {
            return Err(Error::dimension_mismatch(format!(
                "visitor writes {} channels, but the system has {}",
                visitor.num_channels(),
                self.systems.len()
            )));
        }
        Ok(())
    }

    /// Runs the element loop sequentially, visiting `elements` in order.
    pub fn apply<V: ElementVisitor>(
        &mut self,
        visitor: &mut V,
        target: &Basis,
        elements: &[Element],
        patch: usize,
        eliminated: &DMatrix<f64>,
    ) -> eyre::Result<()> {
        self.check_channels(visitor)?;
        let rule = visitor.initialize(target)?;
        debug!(
            "assembling {} elements with {} quadrature nodes each",
            elements.len(),
            rule.num_nodes()
        );
        for element in elements {
            let (nodes, weights) = rule.map_to_element(element)?;
            visitor.evaluate(target, element, &nodes)?;
            visitor.assemble(element, &weights)?;
            visitor.local_to_global(patch, eliminated, &mut self.systems)?;
        }
        Ok(())
    }

    /// Runs the element loop in parallel.
    ///
    /// Every worker evaluates and integrates elements with its own clone of the initialized
    /// visitor, and scatters into the systems while holding a single lock.
    pub fn par_apply<V: ElementVisitor + Sync>(
        &mut self,
        visitor: &mut V,
        target: &Basis,
        elements: &[Element],
        patch: usize,
        eliminated: &DMatrix<f64>,
    ) -> eyre::Result<()> {
        self.check_channels(visitor)?;
        let rule = visitor.initialize(target)?;
        debug!(
            "assembling {} elements in parallel with {} quadrature nodes each",
            elements.len(),
            rule.num_nodes()
        );
        let initialized = &*visitor;
        let systems = Mutex::new(&mut self.systems);
        elements.par_iter().try_for_each_init(
            || initialized.clone(),
            |visitor, element| -> eyre::Result<()> {
                let (nodes, weights) = rule.map_to_element(element)?;
                visitor.evaluate(target, element, &nodes)?;
                visitor.assemble(element, &weights)?;
                let mut systems = systems.lock();
                visitor.local_to_global(patch, eliminated, systems.as_mut_slice())
            },
        )
    }

    /// Compresses every channel.
    pub fn compress(&mut self) -> Result<(), Error> {
        for system in &mut self.systems {
            system.compress()?;
        }
        Ok(())
    }
}

/// Assembles the L2 projection of `function` onto a single-patch `target` basis.
///
/// Every function of the target is free. The returned system has one channel with one
/// right-hand-side column per component.
pub fn assemble_projection(
    target: &Basis,
    geometry: Option<Arc<Patch>>,
    function: ParametricFunction,
    num_components: usize,
    parallel: bool,
) -> eyre::Result<GlobalSystem> {
    let mapper = Arc::new(DofMapperBuilder::from_basis(target).finalize());
    let mut visitor = ProjectionVisitor::new(function, num_components);
    if let Some(geometry) = geometry {
        visitor = visitor.with_geometry(geometry);
    }
    let mut system = GlobalSystem::new(Arc::clone(&mapper), visitor.num_channels(), visitor.num_rhs());
    system.reserve(column_nonzeros(target), visitor.num_rhs());
    let eliminated = DMatrix::zeros(mapper.boundary_size(), num_components);
    let elements = target.elements();
    if parallel {
        system.par_apply(&mut visitor, target, &elements, 0, &eliminated)?;
    } else {
        system.apply(&mut visitor, target, &elements, 0, &eliminated)?;
    }
    system.compress()?;
    Ok(system)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblyState {
    Setup,
    Refreshed,
    Assembled,
}

/// Assembler of the mass matrix and the six right-hand sides defining the G1 basis
/// functions at the vertex in the parametric origin of the first patch.
///
/// The edge basis is the `v` component of the first patch. With `localApprox`, integration is
/// restricted to the support of plus-basis function `basisID`, and target functions whose
/// support is not contained in it are eliminated.
#[derive(Debug, Clone)]
pub struct VertexBasisAssembler {
    target: Basis,
    integration: Basis,
    options: AssemblerOptions,
    coupling: Arc<VertexCouplingData>,
    region: Vec<[f64; 2]>,
    system: Option<GlobalSystem>,
    eliminated: DMatrix<f64>,
    rhs: DMatrix<f64>,
    state: AssemblyState,
}

impl VertexBasisAssembler {
    /// Builds plus/minus bases, gluing data and the integration basis without assembling.
    pub fn setup(
        target: impl Into<Basis>,
        geometry: &MultiPatch,
        options: AssemblerOptions,
    ) -> Result<Self, Error> {
        let target = target.into();
        let target_tensor = target
            .as_tensor()
            .ok_or_else(|| Error::invalid_parameter("the target basis must be a tensor-product basis"))?;
        let patch = geometry
            .patch(0)
            .ok_or_else(|| Error::invalid_parameter("the multi-patch geometry is empty"))?;
        let edge: BSplineBasis = patch
            .basis()
            .as_tensor()
            .map(|basis| basis.component(1).clone())
            .ok_or_else(|| Error::invalid_parameter("the first patch must have a tensor-product basis"))?;

        let (plus, minus) = plus_minus_bases(&edge, options.regularity)?;
        if options.basis_id >= plus.size() {
            return Err(Error::invalid_parameter(format!(
                "basisID {} out of bounds for a plus basis of size {}",
                options.basis_id,
                plus.size()
            )));
        }
        let support = plus.support(options.basis_id);
        let (integration, region) = if options.local_approx {
            let local = local_integration_tensor(&edge, target_tensor, support)?;
            (Basis::from(local), vec![support; target.dim()])
        } else {
            (target.clone(), target.domain())
        };

        let patch = Arc::new(patch.clone());
        let gluing = Arc::new(GluingDataSet::build(Arc::clone(&patch), &plus, &options)?);
        let coupling = Arc::new(VertexCouplingData::new(patch, plus, minus, gluing, options.sigma)?);
        debug!(
            "vertex assembler set up: target size {}, {} integration elements, mode {:?}",
            target.size(),
            integration.elements().len(),
            options.gluing_data
        );

        Ok(Self {
            target,
            integration,
            options,
            coupling,
            region,
            system: None,
            eliminated: DMatrix::zeros(0, 1),
            rhs: DMatrix::zeros(0, NUM_COUPLING_CHANNELS),
            state: AssemblyState::Setup,
        })
    }

    /// Sets up, refreshes and assembles.
    pub fn new(target: impl Into<Basis>, geometry: &MultiPatch, options: AssemblerOptions) -> eyre::Result<Self> {
        let mut assembler = Self::setup(target, geometry, options)?;
        assembler.refresh()?;
        assembler.assemble()?;
        Ok(assembler)
    }

    /// Rebuilds the degree-of-freedom map and allocates empty systems.
    ///
    /// The eliminated values are reset to zero.
    pub fn refresh(&mut self) -> Result<(), Error> {
        let mut builder = DofMapperBuilder::from_basis(&self.target);
        if self.options.local_approx {
            trace!("restricting degrees of freedom to {:?}", self.region);
            let count = builder.mark_outside(0, &self.target, &self.region)?;
            debug!("{count} functions outside the local region eliminated");
        }
        let mapper = Arc::new(builder.finalize());
        debug!(
            "{} free and {} eliminated degrees of freedom",
            mapper.num_free(),
            mapper.boundary_size()
        );
        self.eliminated = DMatrix::zeros(mapper.boundary_size(), 1);
        self.system = Some(GlobalSystem::new(mapper, NUM_COUPLING_CHANNELS, 1));
        self.rhs = DMatrix::zeros(0, NUM_COUPLING_CHANNELS);
        self.state = AssemblyState::Refreshed;
        Ok(())
    }

    /// Zeroes the eliminated values, runs the element loop and compresses the systems.
    ///
    /// Must be preceded by [`refresh`](Self::refresh), and may run only once per refresh.
    pub fn assemble(&mut self) -> eyre::Result<()> {
        match self.state {
            AssemblyState::Setup => {
                return Err(Error::precondition("assemble() called before refresh()").into());
            }
            AssemblyState::Assembled => {
                return Err(Error::precondition(
                    "assemble() called twice; call refresh() before assembling again",
                )
                .into());
            }
            AssemblyState::Refreshed => {}
        }
        let system = self
            .system
            .as_mut()
            .ok_or_else(|| Error::precondition("no sparse system allocated; call refresh()"))?;

        let nonzeros = column_nonzeros(&self.target);
        debug!("reserving {nonzeros} non-zeros per column");
        system.reserve(nonzeros, 1);
        self.eliminated = DMatrix::zeros(system.mapper().boundary_size(), 1);

        let mut visitor = VertexCouplingVisitor::new(Arc::clone(&self.coupling));
        let elements = self.integration.elements();
        if self.options.parallel {
            system.par_apply(&mut visitor, &self.target, &elements, 0, &self.eliminated)?;
        } else {
            system.apply(&mut visitor, &self.target, &elements, 0, &self.eliminated)?;
        }
        system.compress()?;

        let n = system.mapper().num_free();
        let mut rhs = DMatrix::zeros(n, NUM_COUPLING_CHANNELS);
        for (k, channel) in system.systems().iter().enumerate() {
            rhs.set_column(k, &channel.rhs().column(0));
        }
        self.rhs = rhs;
        self.state = AssemblyState::Assembled;
        Ok(())
    }

    fn assembled_system(&self) -> Result<&GlobalSystem, Error> {
        match (&self.system, self.state) {
            (Some(system), AssemblyState::Assembled) => Ok(system),
            _ => Err(Error::precondition("the system has not been assembled")),
        }
    }

    /// The mass matrix over the free degrees of freedom; identical for all channels.
    pub fn matrix(&self) -> Result<&CsrMatrix<f64>, Error> {
        self.assembled_system()?.systems()[0]
            .matrix()
            .ok_or_else(|| Error::precondition("the system has not been compressed"))
    }

    /// The right-hand sides, one column per channel.
    pub fn rhs(&self) -> Result<&DMatrix<f64>, Error> {
        self.assembled_system()?;
        Ok(&self.rhs)
    }

    pub fn system(&self, channel: usize) -> Result<&SparseSystem, Error> {
        self.assembled_system()?
            .system(channel)
            .ok_or_else(|| Error::invalid_parameter(format!("channel {channel} out of bounds")))
    }

    pub fn systems(&self) -> Result<&[SparseSystem], Error> {
        Ok(self.assembled_system()?.systems())
    }

    pub fn mapper(&self) -> Result<&DofMapper, Error> {
        self.system
            .as_ref()
            .map(|system| system.mapper().as_ref())
            .ok_or_else(|| Error::precondition("no degree-of-freedom map; call refresh()"))
    }

    pub fn target(&self) -> &Basis {
        &self.target
    }

    pub fn integration_basis(&self) -> &Basis {
        &self.integration
    }

    pub fn options(&self) -> &AssemblerOptions {
        &self.options
    }

    pub fn coupling(&self) -> &VertexCouplingData {
        &self.coupling
    }

    pub fn eliminated_dofs(&self) -> &DMatrix<f64> {
        &self.eliminated
    }

    /// Replaces the values of the eliminated functions, one row per eliminated function.
    ///
    /// [`assemble`](Self::assemble) resets them to zero, so values are set after assembly and
    /// used by [`construct_solution`](Self::construct_solution), one column per solution column.
    pub fn set_eliminated_dofs(&mut self, values: DMatrix<f64>) -> Result<(), Error> {
        let expected = self.mapper()?.boundary_size();
        if values.nrows() != expected || values.ncols() == 0 {
            return Err(Error::dimension_mismatch(format!(
                "eliminated values of shape {:?}, expected {expected} rows and at least one column",
                values.shape()
            )));
        }
        self.eliminated = values;
        Ok(())
    }

    /// Turns solution coefficients of the free functions into a patch on the target basis and
    /// appends it to `output`, returning its index.
    pub fn construct_solution(&self, solution: &DMatrix<f64>, output: &mut MultiPatch) -> Result<usize, Error> {
        let patch = construct_patch(self.mapper()?, &self.target, 0, solution, &self.eliminated)?;
        Ok(output.add_patch(patch))
    }
}
