use fenris_iga::assembly::global::{column_nonzeros, VertexBasisAssembler};
use fenris_iga::assembly::local::{CornerData, ElementVisitor, Vector6, VertexCouplingVisitor, NUM_COUPLING_CHANNELS};
use fenris_iga::basis::{BSplineBasis, Basis, Element};
use fenris_iga::error::Error;
use fenris_iga::geometry::MultiPatch;
use fenris_iga::gluing::{ExactGluingData, GluingDataSet, SplineGluingData};
use fenris_iga::nalgebra::{DMatrix, DVector};
use fenris_iga::options::{AssemblerOptions, GluingDataMode};
use fenris_iga::quadrature::GaussRule;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use std::sync::Arc;
use util::{identity_square, single_patch, singular_square, skewed_square, uniform_tensor_basis};

/// Cubic C1 bases with elements of size 1/4, matching regularity 1.
fn cubic_setup() -> (Basis, MultiPatch) {
    let target = Basis::from(uniform_tensor_basis(3, 1, 3));
    (target, single_patch(identity_square(3, 1, 3)))
}

fn report_error(report: &eyre::Report) -> &Error {
    report
        .downcast_ref::<Error>()
        .expect("assembly failures carry a library error")
}

/// `sum_{k < m} B_k(x)`, the value-interpolating Hermite combination at the domain start.
fn value_combination(basis: &BSplineBasis, m: usize, x: f64) -> f64 {
    (0..m).map(|k| basis.eval_single(k, x)).sum()
}

#[test]
fn flat_exact_mode_channel_zero_matches_direct_quadrature() {
    let (target, geometry) = cubic_setup();
    let options = AssemblerOptions::new(1).with_gluing_data(GluingDataMode::Exact);
    let assembler = VertexBasisAssembler::new(target.clone(), &geometry, options).unwrap();

    let plus = assembler.coupling().plus().clone();
    let edge = target.component(0).unwrap().clone();
    // On the identity, beta vanishes and every channel-0 coefficient is one
    let density = |u: f64, v: f64| {
        let (g_u, g_v) = (value_combination(&edge, 2, u), value_combination(&edge, 2, v));
        let (p_u, p_v) = (value_combination(&plus, 3, u), value_combination(&plus, 3, v));
        p_u * g_v + p_v * g_u - g_u * g_v
    };

    let rule = GaussRule::for_degrees(&[3, 3]);
    let mut expected = DVector::zeros(target.size());
    for element in target.elements() {
        let (nodes, weights) = rule.map_to_element(&element).unwrap();
        for q in 0..rule.num_nodes() {
            let point = [nodes[(0, q)], nodes[(1, q)]];
            let f = density(point[0], point[1]);
            for i in 0..target.size() {
                expected[i] += weights[q] * f * target.eval_single(i, &point);
            }
        }
    }

    let rhs = assembler.rhs().unwrap();
    assert_eq!(rhs.shape(), (target.size(), NUM_COUPLING_CHANNELS));
    assert_matrix_eq!(rhs.column(0).into_owned(), expected, comp = abs, tol = 1e-12);

    // The mass matrix integrates the partition of unity over the unit square
    let matrix = assembler.matrix().unwrap();
    assert_eq!(matrix.nrows(), target.size());
    assert_scalar_eq!(matrix.values().iter().sum::<f64>(), 1.0, comp = abs, tol = 1e-12);
    let dense = DMatrix::from(matrix);
    assert_matrix_eq!(dense.transpose(), dense.clone(), comp = abs, tol = 1e-14);
}

#[test]
fn all_channels_share_the_mass_matrix() {
    let (target, geometry) = cubic_setup();
    let assembler = VertexBasisAssembler::new(target, &geometry, AssemblerOptions::new(1)).unwrap();
    let systems = assembler.systems().unwrap();
    assert_eq!(systems.len(), NUM_COUPLING_CHANNELS);
    let reference = assembler.matrix().unwrap();
    for (k, system) in systems.iter().enumerate() {
        assert_eq!(system.matrix().unwrap(), reference);
        assert_eq!(system.rhs().column(0), assembler.rhs().unwrap().column(k));
    }
    assert!(matches!(assembler.system(6), Err(Error::InvalidParameter(_))));
}

#[test]
fn default_sigma_scales_with_first_element_and_jacobian() {
    let (target, geometry) = cubic_setup();
    let assembler = VertexBasisAssembler::setup(target.clone(), &geometry, AssemblerOptions::new(1)).unwrap();
    let corner = CornerData::compute(assembler.coupling()).unwrap();
    // p / (h max|J|) = 3 / (0.25 * 1)
    assert_scalar_eq!(corner.sigma, 12.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(corner.d_ik[1][1], 12.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(corner.d_ik[2][2], 12.0, comp = abs, tol = 1e-12);
    // The mixed derivative of the identity carries sigma^2
    assert_scalar_eq!(corner.d_ik[3][4], 144.0, comp = abs, tol = 1e-10);

    let options = AssemblerOptions::new(1).with_sigma(2.0);
    let assembler = VertexBasisAssembler::setup(target, &geometry, options).unwrap();
    let corner = CornerData::compute(assembler.coupling()).unwrap();
    assert_eq!(corner.sigma, 2.0);
}

#[test]
fn assemble_before_refresh_is_a_precondition_violation() {
    let (target, geometry) = cubic_setup();
    let mut assembler = VertexBasisAssembler::setup(target, &geometry, AssemblerOptions::new(1)).unwrap();
    let report = assembler.assemble().unwrap_err();
    assert!(matches!(report_error(&report), Error::PreconditionViolation(_)));
    assert!(matches!(assembler.matrix(), Err(Error::PreconditionViolation(_))));
    assert!(matches!(assembler.rhs(), Err(Error::PreconditionViolation(_))));
    assert!(matches!(assembler.mapper(), Err(Error::PreconditionViolation(_))));
}

#[test]
fn second_assemble_requires_refresh_and_reproduces_the_system() {
    let (target, geometry) = cubic_setup();
    let mut assembler = VertexBasisAssembler::new(target, &geometry, AssemblerOptions::new(1)).unwrap();
    let matrix = assembler.matrix().unwrap().clone();
    let rhs = assembler.rhs().unwrap().clone();

    let report = assembler.assemble().unwrap_err();
    assert!(matches!(report_error(&report), Error::PreconditionViolation(_)));

    assembler.refresh().unwrap();
    assert!(assembler.matrix().is_err());
    assembler.assemble().unwrap();
    assert_eq!(assembler.matrix().unwrap(), &matrix);
    assert_eq!(assembler.rhs().unwrap(), &rhs);
}

#[test]
fn assemble_zeroes_eliminated_values() {
    let (target, geometry) = cubic_setup();
    let options = AssemblerOptions::new(1).with_local_approx(true).with_basis_id(2);
    let reference = VertexBasisAssembler::new(target.clone(), &geometry, options.clone()).unwrap();

    let mut assembler = VertexBasisAssembler::setup(target, &geometry, options).unwrap();
    assembler.refresh().unwrap();
    let boundary = assembler.mapper().unwrap().boundary_size();
    assembler
        .set_eliminated_dofs(DMatrix::from_element(boundary, 2, 1.0))
        .unwrap();
    assembler.assemble().unwrap();

    assert_eq!(assembler.eliminated_dofs(), &DMatrix::zeros(boundary, 1));
    assert_eq!(assembler.rhs().unwrap(), reference.rhs().unwrap());
}

#[test]
fn singular_corner_is_reported() {
    let target = Basis::from(uniform_tensor_basis(3, 1, 3));
    let geometry = single_patch(singular_square(3, 1, 3));
    let options = AssemblerOptions::new(1).with_gluing_data(GluingDataMode::Exact);
    let report = VertexBasisAssembler::new(target, &geometry, options).unwrap_err();
    assert!(matches!(report_error(&report), Error::NumericalSingularity(_)));
}

#[test]
fn invalid_setup_parameters_are_rejected() {
    let (target, geometry) = cubic_setup();
    let result = VertexBasisAssembler::setup(target.clone(), &geometry, AssemblerOptions::new(3));
    assert!(matches!(result, Err(Error::InvalidParameter(_))));

    let options = AssemblerOptions::new(1).with_basis_id(100);
    let result = VertexBasisAssembler::setup(target.clone(), &geometry, options);
    assert!(matches!(result, Err(Error::InvalidParameter(_))));

    let options = AssemblerOptions::new(1).with_projection_space(1, 1);
    let result = VertexBasisAssembler::setup(target.clone(), &geometry, options);
    assert!(matches!(result, Err(Error::InvalidParameter(_))));

    let result = VertexBasisAssembler::setup(target, &MultiPatch::new(), AssemblerOptions::new(1));
    assert!(matches!(result, Err(Error::InvalidParameter(_))));
}

#[test]
fn gluing_data_modes_cannot_be_mixed() {
    let patch = Arc::new(skewed_square(2, 1, 3));
    let exact = ExactGluingData::new(Arc::clone(&patch), 0).unwrap();
    let breaks = patch.basis().component(1).unwrap().knots().breaks();
    let v = ExactGluingData::new(Arc::clone(&patch), 1).unwrap();
    let projected = SplineGluingData::project(&v, GluingDataMode::Global, &breaks, [0.0, 1.0], 1, 0).unwrap();

    let result = GluingDataSet::new(Box::new(exact.clone()), Box::new(projected), GluingDataMode::Exact);
    assert!(matches!(result, Err(Error::InvalidParameter(_))));

    // Providers must sit in the slot of their direction
    let result = GluingDataSet::new(Box::new(v), Box::new(exact), GluingDataMode::Exact);
    assert!(matches!(result, Err(Error::InvalidParameter(_))));
}

#[test]
fn projected_gluing_data_is_exact_for_affine_geometry() {
    let (target, geometry) = cubic_setup();
    let exact = AssemblerOptions::new(1).with_gluing_data(GluingDataMode::Exact);
    let reference = VertexBasisAssembler::new(target.clone(), &geometry, exact).unwrap();
    for mode in [GluingDataMode::Global, GluingDataMode::Local] {
        let options = AssemblerOptions::new(1).with_gluing_data(mode);
        let assembler = VertexBasisAssembler::new(target.clone(), &geometry, options).unwrap();
        assert_eq!(assembler.coupling().gluing().mode(), mode);
        assert_matrix_eq!(
            assembler.rhs().unwrap().clone(),
            reference.rhs().unwrap().clone(),
            comp = abs,
            tol = 1e-10
        );
    }
}

/// Skewed square `x = u + 0.5 v + 0.2 u v, y = v` with unit scaling of the Hermite data.
fn skewed_setup(mode: GluingDataMode) -> VertexBasisAssembler {
    let target = Basis::from(uniform_tensor_basis(3, 1, 3));
    let geometry = single_patch(skewed_square(3, 1, 3));
    let options = AssemblerOptions::new(1).with_gluing_data(mode).with_sigma(1.0);
    VertexBasisAssembler::new(target, &geometry, options).unwrap()
}

#[test]
fn skewed_corner_data_matches_hand_derived_values() {
    // At the corner J = [1 0.5; 0 1] and only x_uv = 0.2 is non-zero. Along v = 0,
    // alpha = 1 and beta = -(0.5 + 0.2 u); along u = 0, alpha = 1 + 0.2 v and
    // beta = -0.4 (1 + 0.2 v). Both transversal vectors are constant along their edges.
    let assembler = skewed_setup(GluingDataMode::Exact);
    let corner = CornerData::compute(assembler.coupling()).unwrap();
    assert_eq!(corner.sigma, 1.0);

    let e0 = Vector6::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    let expected_vertex = [
        e0,
        Vector6::new(0.0, 1.0, 0.0, 0.0, 0.0, 0.0),
        Vector6::new(0.0, 0.5, 1.0, 0.0, 0.0, 0.0),
        Vector6::new(0.0, 0.2, 0.0, 0.5, 1.0, 0.0),
    ];
    // The transversal vector along v = 0 is (0, -1)
    let expected_minus = [
        e0,
        Vector6::new(0.0, 1.0, 0.0, 0.0, 0.0, 0.0),
        Vector6::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0),
        Vector6::new(0.0, 0.0, -1.0, 0.0, 0.0, 0.0),
        Vector6::new(0.0, 0.0, 0.0, 0.0, -1.0, 0.0),
    ];
    // The transversal vector along u = 0 is (0.8, -0.4)
    let expected_plus = [
        e0,
        Vector6::new(0.0, 0.5, 1.0, 0.0, 0.0, 0.0),
        Vector6::new(0.0, 0.0, 0.0, 0.25, 1.0, 1.0),
        Vector6::new(0.0, 0.8, -0.4, 0.0, 0.0, 0.0),
        Vector6::new(0.0, 0.0, 0.0, 0.4, 0.6, -0.4),
    ];
    for (computed, expected) in corner.d_ik.iter().zip(&expected_vertex) {
        assert_matrix_eq!(*computed, *expected, comp = abs, tol = 1e-12);
    }
    for (computed, expected) in corner.d_minus.iter().zip(&expected_minus) {
        assert_matrix_eq!(*computed, *expected, comp = abs, tol = 1e-12);
    }
    for (computed, expected) in corner.d_plus.iter().zip(&expected_plus) {
        assert_matrix_eq!(*computed, *expected, comp = abs, tol = 1e-12);
    }

    let default = AssemblerOptions::new(1).with_gluing_data(GluingDataMode::Exact);
    let geometry = single_patch(skewed_square(3, 1, 3));
    let assembler = VertexBasisAssembler::setup(uniform_tensor_basis(3, 1, 3), &geometry, default).unwrap();
    // max |J| = 1 at the corner
    assert_scalar_eq!(CornerData::compute(assembler.coupling()).unwrap().sigma, 12.0, comp = abs, tol = 1e-12);
}

#[test]
fn skewed_densities_interpolate_corner_jets() {
    // Channel k carries g_k = 1, x, y, x^2 / 2, x y, y^2 / 2. Its density agrees with g_k(F)
    // to second order at the corner. Rows hold [f, f_u, f_v, f_uu, f_uv, f_vv] of g_k(F).
    let expected = [
        [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.5, 0.0, 0.2, 0.0],
        [0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.5, 0.25],
        [0.0, 0.0, 0.0, 0.0, 1.0, 1.0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
    ];

    let assembler = skewed_setup(GluingDataMode::Exact);
    let target = assembler.target().clone();
    let mut visitor = VertexCouplingVisitor::new(Arc::new(assembler.coupling().clone()));
    visitor.initialize(&target).unwrap();

    // The densities are bicubic on the first element, where one-sided four-point stencils
    // differentiate exactly
    let h = 0.05;
    let nodes = DMatrix::from_fn(2, 16, |d, q| if d == 0 { (q % 4) as f64 * h } else { (q / 4) as f64 * h });
    let element = Element::new(DVector::from_element(2, 0.0), DVector::from_element(2, 0.25));
    visitor.evaluate(&target, &element, &nodes).unwrap();
    let values = visitor.rhs_values();

    let first = [-11.0, 18.0, -9.0, 2.0].map(|w| w / (6.0 * h));
    let second = [2.0, -5.0, 4.0, -1.0].map(|w| w / (h * h));
    for (k, jet) in expected.iter().enumerate() {
        let f = |i: usize, j: usize| values[(k, i + 4 * j)];
        let computed = [
            f(0, 0),
            (0..4).map(|i| first[i] * f(i, 0)).sum::<f64>(),
            (0..4).map(|j| first[j] * f(0, j)).sum::<f64>(),
            (0..4).map(|i| second[i] * f(i, 0)).sum::<f64>(),
            (0..16).map(|q| first[q % 4] * first[q / 4] * f(q % 4, q / 4)).sum::<f64>(),
            (0..4).map(|j| second[j] * f(0, j)).sum::<f64>(),
        ];
        for (c, e) in computed.iter().zip(jet) {
            assert_scalar_eq!(*c, *e, comp = abs, tol = 1e-8);
        }
    }
}

#[test]
fn projected_gluing_data_is_exact_on_the_skewed_square() {
    // alpha and beta are linear along both edges, so the default projection reproduces them
    let reference = skewed_setup(GluingDataMode::Exact);
    let reference_corner = CornerData::compute(reference.coupling()).unwrap();
    for mode in [GluingDataMode::Global, GluingDataMode::Local] {
        let assembler = skewed_setup(mode);
        let corner = CornerData::compute(assembler.coupling()).unwrap();
        for (a, b) in corner.d_plus.iter().zip(&reference_corner.d_plus) {
            assert_matrix_eq!(*a, *b, comp = abs, tol = 1e-10);
        }
        for (a, b) in corner.d_minus.iter().zip(&reference_corner.d_minus) {
            assert_matrix_eq!(*a, *b, comp = abs, tol = 1e-10);
        }
        assert_matrix_eq!(
            assembler.rhs().unwrap().clone(),
            reference.rhs().unwrap().clone(),
            comp = abs,
            tol = 1e-10
        );
    }
}

#[test]
fn parallel_assembly_agrees_with_sequential() {
    let target = Basis::from(uniform_tensor_basis(3, 1, 3));
    let geometry = single_patch(skewed_square(3, 1, 3));
    let sequential = VertexBasisAssembler::new(target.clone(), &geometry, AssemblerOptions::new(1)).unwrap();
    let options = AssemblerOptions::new(1).with_parallel(true);
    let parallel = VertexBasisAssembler::new(target, &geometry, options).unwrap();

    let a = DMatrix::from(sequential.matrix().unwrap());
    let b = DMatrix::from(parallel.matrix().unwrap());
    assert_matrix_eq!(a, b, comp = abs, tol = 1e-12);
    assert_matrix_eq!(
        sequential.rhs().unwrap().clone(),
        parallel.rhs().unwrap().clone(),
        comp = abs,
        tol = 1e-10
    );
}

#[test]
fn local_approximation_restricts_unknowns_to_the_corner() {
    let (target, geometry) = cubic_setup();
    // Plus function 2 is supported on [0, 0.5]
    let options = AssemblerOptions::new(1).with_local_approx(true).with_basis_id(2);
    let mut assembler = VertexBasisAssembler::new(target.clone(), &geometry, options).unwrap();

    assert_eq!(assembler.integration_basis().elements().len(), 4);
    let mapper = assembler.mapper().unwrap();
    assert_eq!(mapper.num_free(), 16);
    assert_eq!(mapper.boundary_size(), target.size() - 16);
    assert!(mapper.is_free(target.as_tensor().unwrap().index(3, 3), 0));
    assert!(!mapper.is_free(target.as_tensor().unwrap().index(4, 0), 0));
    assert_eq!(assembler.eliminated_dofs().shape(), (target.size() - 16, 1));

    let matrix = DMatrix::from(assembler.matrix().unwrap());
    let rhs = assembler.rhs().unwrap().clone();
    assert_eq!(rhs.shape(), (16, NUM_COUPLING_CHANNELS));
    let solution = matrix.cholesky().unwrap().solve(&rhs);

    let boundary = assembler.mapper().unwrap().boundary_size();
    assert!(matches!(
        assembler.set_eliminated_dofs(DMatrix::zeros(boundary + 1, 1)),
        Err(Error::DimensionMismatch(_))
    ));
    assembler
        .set_eliminated_dofs(DMatrix::zeros(boundary, NUM_COUPLING_CHANNELS))
        .unwrap();

    let mut output = MultiPatch::new();
    let index = assembler.construct_solution(&solution, &mut output).unwrap();
    let patch = output.patch(index).unwrap();
    assert_eq!(patch.geometric_dim(), NUM_COUPLING_CHANNELS);
    let mapper = assembler.mapper().unwrap();
    for i in 0..target.size() {
        match mapper.index(i, 0) {
            Some(free) => assert_eq!(patch.coefs().row(i), solution.row(free)),
            None => assert!(patch.coefs().row(i).iter().all(|&c| c == 0.0)),
        }
    }
}

#[test]
fn local_approximation_on_a_refined_target_matches_the_full_system() {
    // Target elements of size 1/8 on a geometry with elements of size 1/4
    let target = Basis::from(uniform_tensor_basis(3, 1, 7));
    let geometry = single_patch(identity_square(3, 1, 3));
    let exact = AssemblerOptions::new(1).with_gluing_data(GluingDataMode::Exact);
    let full = VertexBasisAssembler::new(target.clone(), &geometry, exact.clone()).unwrap();
    let options = exact.with_local_approx(true).with_basis_id(2);
    let local = VertexBasisAssembler::new(target.clone(), &geometry, options).unwrap();

    // Cut at the target breaks inside [0, 0.5]
    assert_eq!(local.integration_basis().elements().len(), 16);

    let local_mapper = local.mapper().unwrap();
    let free: Vec<usize> = (0..target.size()).filter(|&i| local_mapper.is_free(i, 0)).collect();
    assert!(!free.is_empty());
    let full_mapper = full.mapper().unwrap();
    let full_matrix = DMatrix::from(full.matrix().unwrap());
    let local_matrix = DMatrix::from(local.matrix().unwrap());

    // Free functions are supported inside the region, so their entries coincide
    let restricted_matrix = DMatrix::from_fn(free.len(), free.len(), |a, b| {
        full_matrix[(full_mapper.index(free[a], 0).unwrap(), full_mapper.index(free[b], 0).unwrap())]
    });
    let restricted_rhs = DMatrix::from_fn(free.len(), NUM_COUPLING_CHANNELS, |a, k| {
        full.rhs().unwrap()[(full_mapper.index(free[a], 0).unwrap(), k)]
    });
    assert_matrix_eq!(local_matrix, restricted_matrix, comp = abs, tol = 1e-13);
    assert_matrix_eq!(local.rhs().unwrap().clone(), restricted_rhs, comp = abs, tol = 1e-12);
}

#[test]
fn options_deserialize_from_camel_case_json() {
    let json = r#"{
        "regularity": 1,
        "gluingData": "local",
        "basisID": 2,
        "localApprox": true,
        "pTilde": 3,
        "rTilde": 1,
        "parallel": true
    }"#;
    let options: AssemblerOptions = serde_json::from_str(json).unwrap();
    let expected = AssemblerOptions::new(1)
        .with_gluing_data(GluingDataMode::Local)
        .with_basis_id(2)
        .with_local_approx(true)
        .with_projection_space(3, 1)
        .with_parallel(true);
    assert_eq!(options, expected);

    let minimal: AssemblerOptions = serde_json::from_str(r#"{ "regularity": 2 }"#).unwrap();
    assert_eq!(minimal, AssemblerOptions::new(2));
    assert_eq!(minimal.gluing_data, GluingDataMode::Global);
    assert_eq!(minimal.p_tilde, 1);

    assert_eq!(GluingDataMode::try_from(2i64).unwrap(), GluingDataMode::Exact);
    assert!(matches!(GluingDataMode::try_from(3i64), Err(Error::InvalidParameter(_))));
}

#[test]
fn column_nonzeros_follow_the_degree() {
    // 7 * 7 plus a third, rounded down
    assert_eq!(column_nonzeros(&Basis::from(uniform_tensor_basis(3, 1, 3))), 65);
    assert_eq!(column_nonzeros(&Basis::from(uniform_tensor_basis(1, 0, 3))), 11);
}
