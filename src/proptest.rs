//! Strategies for property-based tests.
use crate::basis::BSplineBasis;
use crate::knots::KnotVector;
use ::proptest::prelude::*;

/// Triplets `(p, r, num_interior)` with `1 <= p <= max_degree` and `r < p`.
pub fn degree_regularity_strategy(
    max_degree: usize,
    max_interior: usize,
) -> impl Strategy<Value = (usize, usize, usize)> {
    (1..=max_degree.max(1))
        .prop_flat_map(move |p| (Just(p), 0..p, 0..=max_interior))
}

/// A uniform edge basis of degree `p` whose interior knots have multiplicity `p - r`, together
/// with its regularity `r`.
pub fn edge_basis_strategy(max_degree: usize, max_interior: usize) -> impl Strategy<Value = (BSplineBasis, usize)> {
    degree_regularity_strategy(max_degree, max_interior).prop_map(|(p, r, n)| {
        let knots = KnotVector::uniform(0.0, 1.0, n, p + 1, p - r).expect("uniform knot vectors are valid");
        (BSplineBasis::new(knots), r)
    })
}

/// Open knot vectors on `[0, 1]` with random interior knots of multiplicity at most `degree + 1`.
pub fn knot_vector_strategy(max_degree: usize, max_interior: usize) -> impl Strategy<Value = KnotVector> {
    (0..=max_degree)
        .prop_flat_map(move |p| {
            let knot = (1..100u32).prop_map(|k| k as f64 / 100.0);
            let mult = 1..=p.max(1);
            (Just(p), prop::collection::vec((knot, mult), 0..=max_interior))
        })
        .prop_map(|(p, interior)| {
            let mut knots = KnotVector::uniform(0.0, 1.0, 0, p + 1, 0).expect("uniform knot vectors are valid");
            for (t, m) in interior {
                let m = m.min(p + 1 - knots.multiplicity(t));
                knots.insert(t, m).expect("insertion respects the multiplicity bound");
            }
            knots
        })
}

impl Arbitrary for KnotVector {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        knot_vector_strategy(4, 8).boxed()
    }
}

/// Per-patch elimination flags for up to `max_patches` patches of at most `max_size` functions.
pub fn elimination_strategy(max_patches: usize, max_size: usize) -> impl Strategy<Value = Vec<Vec<bool>>> {
    prop::collection::vec(prop::collection::vec(any::<bool>(), 0..=max_size), 1..=max_patches.max(1))
}
