//! Classification and numbering of degrees of freedom.
//!
//! A [`DofMapperBuilder`] collects eliminated functions per patch. [`DofMapperBuilder::finalize`]
//! consumes it and returns an immutable [`DofMapper`] in which free functions are numbered
//! contiguously from zero, and eliminated functions likewise in a separate index space.
use crate::basis::Basis;
use crate::error::Error;
use log::trace;

/// Absolute tolerance of the support test in [`lies_outside`].
pub const RESTRICTION_TOLERANCE: f64 = 1e-10;

/// Whether a support is not contained in `region` up to [`RESTRICTION_TOLERANCE`].
///
/// The test is closed: a support reaching exactly `RESTRICTION_TOLERANCE` beyond the region in
/// any direction counts as outside.
pub fn lies_outside(support: &[[f64; 2]], region: &[[f64; 2]]) -> bool {
    support
        .iter()
        .zip(region)
        .any(|(&[lo, hi], &[a, b])| lo <= a - RESTRICTION_TOLERANCE || hi >= b + RESTRICTION_TOLERANCE)
}

/// The classification of a single basis function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dof {
    /// A free unknown with its column index.
    Free(usize),
    /// An eliminated function with its index into the eliminated values.
    Eliminated(usize),
}

#[derive(Debug, Clone)]
pub struct DofMapperBuilder {
    eliminated: Vec<Vec<bool>>,
}

impl DofMapperBuilder {
    /// A builder for patches with the given numbers of basis functions.
    pub fn new(patch_sizes: &[usize]) -> Self {
        Self {
            eliminated: patch_sizes.iter().map(|&n| vec![false; n]).collect(),
        }
    }

    /// A builder for a single patch carrying `basis`.
    pub fn from_basis(basis: &Basis) -> Self {
        Self::new(&[basis.size()])
    }

    fn patch_mut(&mut self, patch: usize) -> Result<&mut Vec<bool>, Error> {
        let num_patches = self.eliminated.len();
        self.eliminated.get_mut(patch).ok_or_else(|| {
            Error::invalid_parameter(format!("patch {patch} out of bounds for {num_patches} patches"))
        })
    }

    /// Marks the given functions of `patch` as eliminated.
    pub fn mark_boundary(&mut self, patch: usize, functions: &[usize]) -> Result<&mut Self, Error> {
        let flags = self.patch_mut(patch)?;
        let size = flags.len();
        if let Some(&i) = functions.iter().find(|&&i| i >= size) {
            return Err(Error::invalid_parameter(format!(
                "function {i} out of bounds for patch {patch} of size {size}"
            )));
        }
        for &i in functions {
            flags[i] = true;
        }
        Ok(self)
    }

    /// Eliminates every function of `basis` whose support is not contained in `region`.
    ///
    /// Returns the number of functions marked by this call.
    pub fn mark_outside(&mut self, patch: usize, basis: &Basis, region: &[[f64; 2]]) -> Result<usize, Error> {
        if region.len() != basis.dim() {
            return Err(Error::dimension_mismatch(format!(
                "restriction region has dimension {}, but the basis has dimension {}",
                region.len(),
                basis.dim()
            )));
        }
        let flags = self.patch_mut(patch)?;
        if flags.len() != basis.size() {
            return Err(Error::dimension_mismatch(format!(
                "basis of size {} does not match patch {patch} of size {}",
                basis.size(),
                flags.len()
            )));
        }
        let mut count = 0;
        for (i, flag) in flags.iter_mut().enumerate() {
            let support = basis.support(i);
            if lies_outside(&support, region) {
                trace!("function {i} with support {support:?} eliminated");
                *flag = true;
                count += 1;
            } else {
                trace!("function {i} with support {support:?} kept");
            }
        }
        Ok(count)
    }

    /// Numbers free and eliminated functions and freezes the classification.
    pub fn finalize(self) -> DofMapper {
        let mut dofs = Vec::with_capacity(self.eliminated.iter().map(Vec::len).sum());
        let mut patch_offsets = Vec::with_capacity(self.eliminated.len() + 1);
        let mut num_free = 0;
        let mut num_eliminated = 0;
        patch_offsets.push(0);
        for flags in &self.eliminated {
            for &eliminated in flags {
                if eliminated {
                    dofs.push(Dof::Eliminated(num_eliminated));
                    num_eliminated += 1;
                } else {
                    dofs.push(Dof::Free(num_free));
                    num_free += 1;
                }
            }
            patch_offsets.push(dofs.len());
        }
        DofMapper {
            patch_offsets,
            dofs,
            num_free,
            num_eliminated,
        }
    }
}

/// A finalized, immutable map from `(function, patch)` to degrees of freedom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofMapper {
    patch_offsets: Vec<usize>,
    dofs: Vec<Dof>,
    num_free: usize,
    num_eliminated: usize,
}

impl DofMapper {
    /// The classification of function `i` on `patch`.
    ///
    /// # Panics
    ///
    /// Panics if `patch` or `i` are out of bounds.
    pub fn dof(&self, i: usize, patch: usize) -> Dof {
        assert!(i < self.patch_size(patch), "function index out of bounds");
        self.dofs[self.patch_offsets[patch] + i]
    }

    pub fn is_free(&self, i: usize, patch: usize) -> bool {
        matches!(self.dof(i, patch), Dof::Free(_))
    }

    /// The column index of a free function.
    pub fn index(&self, i: usize, patch: usize) -> Option<usize> {
        match self.dof(i, patch) {
            Dof::Free(index) => Some(index),
            Dof::Eliminated(_) => None,
        }
    }

    /// The index of an eliminated function into the eliminated values.
    pub fn boundary_index(&self, i: usize, patch: usize) -> Option<usize> {
        match self.dof(i, patch) {
            Dof::Eliminated(index) => Some(index),
            Dof::Free(_) => None,
        }
    }

    pub fn num_free(&self) -> usize {
        self.num_free
    }

    pub fn boundary_size(&self) -> usize {
        self.num_eliminated
    }

    /// The total number of functions over all patches.
    pub fn size(&self) -> usize {
        self.dofs.len()
    }

    pub fn num_patches(&self) -> usize {
        self.patch_offsets.len() - 1
    }

    pub fn patch_size(&self, patch: usize) -> usize {
        self.patch_offsets[patch + 1] - self.patch_offsets[patch]
    }
}
