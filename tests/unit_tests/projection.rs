use fenris_iga::assembly::global::assemble_projection;
use fenris_iga::assembly::local::ParametricFunction;
use fenris_iga::basis::Basis;
use fenris_iga::dof::DofMapperBuilder;
use fenris_iga::geometry::Patch;
use fenris_iga::nalgebra::{DMatrix, DVector};
use fenris_iga::reconstruct::construct_patch;
use matrixcompare::assert_matrix_eq;
use std::sync::Arc;
use util::{skewed_square, uniform_tensor_basis};

/// Solves the projection system densely.
fn solve(matrix: &fenris_iga::nalgebra_sparse::CsrMatrix<f64>, rhs: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from(matrix)
        .cholesky()
        .expect("mass matrices are positive definite")
        .solve(rhs)
}

#[test]
fn projection_reproduces_splines_of_the_target_space() {
    let basis = Basis::from(uniform_tensor_basis(2, 1, 2));
    let coefs = DMatrix::from_fn(basis.size(), 2, |i, c| (i as f64 + 1.0).sqrt() * (c as f64 + 1.0));
    let spline = Arc::new(Patch::new(basis.clone(), coefs.clone()).unwrap());

    let function: ParametricFunction = {
        let spline = Arc::clone(&spline);
        Arc::new(move |x: &[f64]| spline.eval(x).unwrap())
    };
    for parallel in [false, true] {
        let system = assemble_projection(&basis, None, function.clone(), 2, parallel).unwrap();
        let channel = system.system(0).unwrap();
        let solution = solve(channel.matrix().unwrap(), channel.rhs());

        let mapper = DofMapperBuilder::from_basis(&basis).finalize();
        let patch = construct_patch(&mapper, &basis, 0, &solution, &DMatrix::zeros(0, 2)).unwrap();
        assert_matrix_eq!(patch.coefs().clone(), coefs.clone(), comp = abs, tol = 1e-10);
    }
}

#[test]
fn projection_with_geometry_weights_by_measure() {
    // Constants are reproduced on any geometry, and the right-hand side sums to the area
    let basis = Basis::from(uniform_tensor_basis(2, 1, 1));
    let geometry = Arc::new(skewed_square(2, 1, 1));
    let function: ParametricFunction = Arc::new(|_: &[f64]| DVector::from_element(1, 3.0));

    let system = assemble_projection(&basis, Some(geometry), function, 1, false).unwrap();
    let channel = system.system(0).unwrap();
    // The skewed square has area 1.1
    assert!((channel.rhs().sum() - 3.0 * 1.1).abs() < 1e-12);

    let solution = solve(channel.matrix().unwrap(), channel.rhs());
    assert_matrix_eq!(solution, DMatrix::from_element(basis.size(), 1, 3.0), comp = abs, tol = 1e-10);
}
