//! Options recognized by the vertex basis assembler.
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// How the gluing functions alpha and beta are constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GluingDataMode {
    /// Spline projection over the whole edge.
    Global,
    /// Spline projection restricted to the neighbourhood of the vertex.
    Local,
    /// Closed-form evaluation from the geometry.
    Exact,
}

impl TryFrom<i64> for GluingDataMode {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Global),
            1 => Ok(Self::Local),
            2 => Ok(Self::Exact),
            other => Err(Error::invalid_parameter(format!("unknown gluing data mode {other}"))),
        }
    }
}

/// Assembler configuration.
///
/// Deserializes from camelCase keys (`regularity`, `gluingData`, `basisID`, `localApprox`,
/// `pTilde`, `rTilde`, `sigma`, `parallel`). Only `regularity` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblerOptions {
    /// Regularity `r` of the edge space.
    pub regularity: usize,
    #[serde(default = "default_gluing_data")]
    pub gluing_data: GluingDataMode,
    /// Plus-basis function whose support defines the local integration domain.
    #[serde(default, rename = "basisID")]
    pub basis_id: usize,
    /// Restrict degrees of freedom to the local integration domain.
    #[serde(default)]
    pub local_approx: bool,
    /// Degree of the spline space for projected gluing data.
    #[serde(default = "default_p_tilde")]
    pub p_tilde: usize,
    /// Regularity of the spline space for projected gluing data.
    #[serde(default)]
    pub r_tilde: usize,
    /// Scaling of the Hermite data; computed from the corner Jacobian when absent.
    #[serde(default)]
    pub sigma: Option<f64>,
    /// Run element evaluation in parallel.
    #[serde(default)]
    pub parallel: bool,
}

fn default_gluing_data() -> GluingDataMode {
    GluingDataMode::Global
}

fn default_p_tilde() -> usize {
    1
}

impl AssemblerOptions {
    pub fn new(regularity: usize) -> Self {
        Self {
            regularity,
            gluing_data: default_gluing_data(),
            basis_id: 0,
            local_approx: false,
            p_tilde: default_p_tilde(),
            r_tilde: 0,
            sigma: None,
            parallel: false,
        }
    }

    pub fn with_gluing_data(self, gluing_data: GluingDataMode) -> Self {
        Self { gluing_data, ..self }
    }

    pub fn with_basis_id(self, basis_id: usize) -> Self {
        Self { basis_id, ..self }
    }

    pub fn with_local_approx(self, local_approx: bool) -> Self {
        Self { local_approx, ..self }
    }

    pub fn with_projection_space(self, p_tilde: usize, r_tilde: usize) -> Self {
        Self {
            p_tilde,
            r_tilde,
            ..self
        }
    }

    pub fn with_sigma(self, sigma: f64) -> Self {
        Self {
            sigma: Some(sigma),
            ..self
        }
    }

    pub fn with_parallel(self, parallel: bool) -> Self {
        Self { parallel, ..self }
    }
}
