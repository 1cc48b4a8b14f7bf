//! Library-wide error type.
//!
//! Leaf routines (knot vectors, bases, the DoF mapper) return [`Error`] directly. Assembly
//! routines return [`eyre::Result`], and the underlying [`Error`] can be recovered with
//! `report.downcast_ref::<Error>()`.
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors produced while setting up or running an assembly.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Inconsistent construction parameters, such as a regularity that is not smaller than the
    /// degree, or gluing data built in different modes.
    InvalidParameter(String),
    /// An operation was invoked in a state where it is not permitted, e.g. assembling before
    /// the system has been refreshed.
    PreconditionViolation(String),
    /// Dimensions of bases, geometries, points or vectors do not agree.
    DimensionMismatch(String),
    /// A computation would divide by (nearly) zero.
    NumericalSingularity(String),
}

impl Error {
    pub(crate) fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionViolation(msg.into())
    }

    pub(crate) fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    pub(crate) fn singularity(msg: impl Into<String>) -> Self {
        Self::NumericalSingularity(msg.into())
    }

    /// The context message carried by the error.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidParameter(msg)
            | Self::PreconditionViolation(msg)
            | Self::DimensionMismatch(msg)
            | Self::NumericalSingularity(msg) => msg,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::PreconditionViolation(msg) => write!(f, "precondition violated: {msg}"),
            Self::DimensionMismatch(msg) => write!(f, "dimension mismatch: {msg}"),
            Self::NumericalSingularity(msg) => write!(f, "numerical singularity: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
