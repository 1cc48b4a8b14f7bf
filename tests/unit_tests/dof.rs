use fenris_iga::basis::{Basis, TensorBSplineBasis};
use fenris_iga::dof::{lies_outside, Dof, DofMapperBuilder, RESTRICTION_TOLERANCE};
use fenris_iga::error::Error;
use fenris_iga::proptest::elimination_strategy;
use proptest::prelude::*;
use util::{assert_panics, uniform_basis};

#[test]
fn restriction_tolerance_is_closed() {
    let region = [[0.25, 0.75]];
    // Reaching exactly one tolerance beyond the region eliminates
    assert!(lies_outside(&[[0.25 - RESTRICTION_TOLERANCE, 0.5]], &region));
    assert!(lies_outside(&[[0.5, 0.75 + RESTRICTION_TOLERANCE]], &region));
    // Anything strictly inside the tolerance band is kept
    assert!(!lies_outside(&[[0.25 + RESTRICTION_TOLERANCE, 0.5]], &region));
    assert!(!lies_outside(&[[0.25 - 0.5 * RESTRICTION_TOLERANCE, 0.5]], &region));
    assert!(!lies_outside(&[[0.25, 0.75]], &region));
}

#[test]
fn mark_outside_eliminates_functions_leaving_the_corner_region() {
    // Quadratic C1 basis with elements of size 1/4; supports of the first three functions end
    // at 0.25, 0.5 and 0.75
    let basis = Basis::from(TensorBSplineBasis::new(uniform_basis(2, 1, 3), uniform_basis(2, 1, 3)));
    let mut builder = DofMapperBuilder::from_basis(&basis);
    let count = builder
        .mark_outside(0, &basis, &[[0.0, 0.5], [0.0, 0.5]])
        .unwrap();
    let mapper = builder.finalize();

    assert_eq!(count, basis.size() - 4);
    assert_eq!(mapper.num_free(), 4);
    assert_eq!(mapper.boundary_size(), basis.size() - 4);
    let free: Vec<usize> = (0..basis.size()).filter(|&i| mapper.is_free(i, 0)).collect();
    // Functions (0, 0), (1, 0), (0, 1), (1, 1) with 6 functions per direction
    assert_eq!(free, vec![0, 1, 6, 7]);
}

#[test]
fn mark_outside_rejects_mismatched_input() {
    let basis = Basis::from(uniform_basis(2, 1, 1));
    let mut builder = DofMapperBuilder::new(&[basis.size() + 1]);
    assert!(matches!(
        builder.mark_outside(0, &basis, &[[0.0, 1.0]]),
        Err(Error::DimensionMismatch(_))
    ));
    assert!(matches!(
        builder.mark_outside(0, &basis, &[[0.0, 1.0], [0.0, 1.0]]),
        Err(Error::DimensionMismatch(_))
    ));
    assert!(matches!(
        builder.mark_outside(1, &basis, &[[0.0, 1.0]]),
        Err(Error::InvalidParameter(_))
    ));
}

#[test]
fn dof_lookup_panics_out_of_bounds() {
    let mapper = DofMapperBuilder::new(&[3]).finalize();
    assert_panics!(mapper.dof(3, 0));
    assert_panics!(mapper.dof(0, 1));
}

proptest! {
    #[test]
    fn numbering_is_contiguous_and_ordered(flags in elimination_strategy(4, 12)) {
        let sizes: Vec<usize> = flags.iter().map(Vec::len).collect();
        let mut builder = DofMapperBuilder::new(&sizes);
        for (patch, patch_flags) in flags.iter().enumerate() {
            let marked: Vec<usize> = (0..patch_flags.len()).filter(|&i| patch_flags[i]).collect();
            builder.mark_boundary(patch, &marked).unwrap();
        }
        let mapper = builder.finalize();

        let num_eliminated = flags.iter().flatten().filter(|&&e| e).count();
        prop_assert_eq!(mapper.boundary_size(), num_eliminated);
        prop_assert_eq!(mapper.num_free() + mapper.boundary_size(), mapper.size());
        prop_assert_eq!(mapper.num_patches(), flags.len());

        let mut next_free = 0;
        let mut next_eliminated = 0;
        for (patch, patch_flags) in flags.iter().enumerate() {
            prop_assert_eq!(mapper.patch_size(patch), patch_flags.len());
            for (i, &eliminated) in patch_flags.iter().enumerate() {
                if eliminated {
                    prop_assert_eq!(mapper.dof(i, patch), Dof::Eliminated(next_eliminated));
                    prop_assert_eq!(mapper.boundary_index(i, patch), Some(next_eliminated));
                    prop_assert_eq!(mapper.index(i, patch), None);
                    next_eliminated += 1;
                } else {
                    prop_assert_eq!(mapper.dof(i, patch), Dof::Free(next_free));
                    prop_assert_eq!(mapper.index(i, patch), Some(next_free));
                    next_free += 1;
                }
            }
        }
    }

    #[test]
    fn repeated_marks_are_idempotent(flags in elimination_strategy(1, 12)) {
        let marked: Vec<usize> = (0..flags[0].len()).filter(|&i| flags[0][i]).collect();
        let mut once = DofMapperBuilder::new(&[flags[0].len()]);
        once.mark_boundary(0, &marked).unwrap();
        let mut twice = once.clone();
        twice.mark_boundary(0, &marked).unwrap();
        prop_assert_eq!(once.finalize(), twice.finalize());
    }
}
