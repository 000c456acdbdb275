#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use nalgebra::{DMatrix, DVector};
use pwact_model::{
    AffineDynamics, ApproximationKind, Ellipsoid, Polytope, PwaSystem, Region, RegionClassifier,
    RegionDynamics,
};

#[derive(Debug, Arbitrary)]
struct ClassifyInput {
    state_dim: u8,
    ellipsoidal: bool,
    regions: Vec<RegionInput>,
    point: Vec<f64>,
}

#[derive(Debug, Arbitrary)]
struct RegionInput {
    faces: u8,
    e_values: Vec<f64>,
    el_values: Vec<f64>,
}

fn matrix(rows: usize, cols: usize, values: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |r, c| {
        values.get(r * cols + c).copied().unwrap_or(0.0)
    })
}

fuzz_target!(|input: ClassifyInput| {
    let n = usize::from(input.state_dim % 4) + 1;
    let regions: Vec<Region> = input
        .regions
        .iter()
        .take(8)
        .map(|record| {
            let p = usize::from(record.faces % 4) + 1;
            let e_mat = matrix(p, n, &record.e_values);
            let e_vec = DVector::from_fn(p, |r, _| {
                record.e_values.get(p * n + r).copied().unwrap_or(0.0)
            });
            let mut region = Region::new(
                Polytope::new(e_mat, e_vec),
                RegionDynamics::Affine(AffineDynamics::linear(-DMatrix::identity(n, n), 0)),
            );
            if !record.el_values.is_empty() {
                let el_mat = matrix(1, n, &record.el_values);
                let el_vec = DVector::from_fn(1, |r, _| {
                    record.el_values.get(n + r).copied().unwrap_or(0.0)
                });
                region = region.with_ellipsoid(Ellipsoid::new(el_mat, el_vec));
            }
            region
        })
        .collect();
    if regions.is_empty() {
        return;
    }
    let system = PwaSystem::new(regions, n, 0);
    let rule = if input.ellipsoidal {
        ApproximationKind::Ellipsoidal
    } else {
        ApproximationKind::Polytopic
    };
    let classifier = RegionClassifier::new(&system, rule);
    let x = DVector::from_fn(n, |r, _| input.point.get(r).copied().unwrap_or(0.0));

    // classify/select must never panic, select must agree with classify
    let set = classifier.classify(&x);
    let selected = classifier.select(&x);
    assert_eq!(selected, set.first().copied());
});
