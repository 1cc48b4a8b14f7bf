//! Auxiliary bases derived from an edge basis.
use crate::basis::{BSplineBasis, TensorBSplineBasis};
use crate::error::Error;
use crate::knots::KnotVector;
use itertools::Itertools;
use log::trace;

/// The plus and minus bases of an edge basis of degree `p` for regularity `r`.
///
/// The plus basis has degree `p`, the minus basis degree `p - 1`. Both live on `[0, 1]` and
/// receive every `(p - r)`-th interior knot of the edge basis with multiplicity `p - 1 - r`, so
/// that the plus basis always has exactly one function more than the minus basis.
///
/// Fails with [`Error::InvalidParameter`] unless `p > r`.
pub fn plus_minus_bases(edge: &BSplineBasis, regularity: usize) -> Result<(BSplineBasis, BSplineBasis), Error> {
    let p = edge.degree();
    let r = regularity;
    if r >= p {
        return Err(Error::invalid_parameter(format!(
            "regularity {r} must be smaller than the edge degree {p}"
        )));
    }
    let multiplicity = p - 1 - r;

    let mut plus = BSplineBasis::new(KnotVector::uniform(0.0, 1.0, 0, p + 1, multiplicity)?);
    let mut minus = BSplineBasis::new(KnotVector::uniform(0.0, 1.0, 0, p, multiplicity)?);

    let knots = edge.knots();
    let end = knots.len() - (p + 1);
    for i in ((p + 1)..end).step_by(p - r) {
        let t = knots.knot(i);
        plus.insert_knot(t, multiplicity)?;
        minus.insert_knot(t, multiplicity)?;
    }
    trace!(
        "plus basis of size {}, minus basis of size {} for p = {p}, r = {r}",
        plus.size(),
        minus.size()
    );
    Ok((plus, minus))
}

/// Breakpoints closer than this are merged when cutting the local integration basis.
const BREAK_TOLERANCE: f64 = 1e-12;

/// A piecewise constant basis on `[a, b]` whose elements are cut at every distinct breakpoint
/// of the given bases strictly inside the interval.
///
/// Passing both the geometry edge and the target component keeps every element inside a single
/// knot span of each, so that quadrature on an element sees polynomial integrands.
pub fn local_integration_basis(bases: &[&BSplineBasis], [a, b]: [f64; 2]) -> Result<BSplineBasis, Error> {
    let mut knots = KnotVector::uniform(a, b, 0, 1, 0)?;
    let cuts = bases
        .iter()
        .flat_map(|basis| basis.knots().breaks())
        .filter(|&t| t > a + BREAK_TOLERANCE && t < b - BREAK_TOLERANCE)
        .sorted_by(f64::total_cmp)
        .dedup_by(|s, t| (t - s).abs() <= BREAK_TOLERANCE);
    for t in cuts {
        knots.insert(t, 1)?;
    }
    Ok(BSplineBasis::new(knots))
}

/// The integration basis of a two-dimensional target when the local approximation is active.
///
/// Direction `d` is [`local_integration_basis`] cut at the breakpoints of the geometry edge and
/// of the target component `d`.
pub fn local_integration_tensor(
    edge: &BSplineBasis,
    target: &TensorBSplineBasis,
    interval: [f64; 2],
) -> Result<TensorBSplineBasis, Error> {
    let [u, v] = [0, 1].map(|d| local_integration_basis(&[edge, target.component(d)], interval));
    Ok(TensorBSplineBasis::new(u?, v?))
}
