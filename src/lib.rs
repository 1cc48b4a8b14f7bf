pub mod assembly;
pub mod basis;
pub mod construction;
pub mod cross_approximation;
pub mod dof;
pub mod error;
pub mod geometry;
pub mod gluing;
pub mod knots;
pub mod options;
pub mod quadrature;
pub mod reconstruct;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
