//! Fixtures shared by the test suites and benches.
use fenris_iga::basis::{BSplineBasis, TensorBSplineBasis};
use fenris_iga::geometry::{MultiPatch, Patch};
use fenris_iga::knots::KnotVector;
use nalgebra::DMatrix;

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// A basis of degree `p` on `[0, 1]` with `num_interior` uniform interior knots of
/// multiplicity `p - r`.
pub fn uniform_basis(p: usize, r: usize, num_interior: usize) -> BSplineBasis {
    assert!(r < p, "regularity must be smaller than the degree");
    BSplineBasis::new(KnotVector::uniform(0.0, 1.0, num_interior, p + 1, p - r).unwrap())
}

pub fn uniform_tensor_basis(p: usize, r: usize, num_interior: usize) -> TensorBSplineBasis {
    TensorBSplineBasis::new(
        uniform_basis(p, r, num_interior),
        uniform_basis(p, r, num_interior),
    )
}

/// The identity map of the unit square.
pub fn identity_square(p: usize, r: usize, num_interior: usize) -> Patch {
    Patch::identity(uniform_tensor_basis(p, r, num_interior))
}

/// The bilinear map `x = u + 0.5 v + 0.2 u v`, `y = v` represented on a uniform basis.
///
/// Bilinear functions are reproduced exactly by their values at the Greville points.
pub fn skewed_square(p: usize, r: usize, num_interior: usize) -> Patch {
    let identity = identity_square(p, r, num_interior);
    let greville = identity.coefs();
    let coefs = DMatrix::from_fn(greville.nrows(), 2, |i, c| {
        let (u, v) = (greville[(i, 0)], greville[(i, 1)]);
        match c {
            0 => u + 0.5 * v + 0.2 * u * v,
            _ => v,
        }
    });
    Patch::new(identity.basis().clone(), coefs).unwrap()
}

/// The identity square with the control point next to the origin along `u` moved onto the one
/// along `v`, so that the Jacobian is singular at the origin.
pub fn singular_square(p: usize, r: usize, num_interior: usize) -> Patch {
    let basis = uniform_tensor_basis(p, r, num_interior);
    let identity = Patch::identity(basis.clone());
    let mut coefs = identity.coefs().clone();
    let along_v = coefs.row(basis.index(0, 1)).into_owned();
    coefs.set_row(basis.index(1, 0), &along_v);
    Patch::new(basis, coefs).unwrap()
}

pub fn single_patch(patch: Patch) -> MultiPatch {
    MultiPatch::from_patches(vec![patch])
}

/// The four boundary curves of a patch in the order south, north, west, east.
pub fn boundary_curves(patch: &Patch) -> MultiPatch {
    let basis = patch.basis().as_tensor().expect("boundary curves need a tensor patch");
    let [nu, nv] = basis.size_cwise();
    let curve = |component: usize, indices: Vec<usize>| {
        let coefs = DMatrix::from_fn(indices.len(), patch.geometric_dim(), |i, c| {
            patch.coefs()[(indices[i], c)]
        });
        Patch::curve(basis.component(component).clone(), coefs).unwrap()
    };
    MultiPatch::from_patches(vec![
        curve(0, (0..nu).map(|a| basis.index(a, 0)).collect()),
        curve(0, (0..nu).map(|a| basis.index(a, nv - 1)).collect()),
        curve(1, (0..nv).map(|b| basis.index(0, b)).collect()),
        curve(1, (0..nv).map(|b| basis.index(nu - 1, b)).collect()),
    ])
}
