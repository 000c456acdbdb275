#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use nalgebra::{DMatrix, DVector};
use pwact_model::{AffineDynamics, Polytope, PwaSystem, Region, RegionDynamics};

#[derive(Debug, Arbitrary)]
struct ValidateInput {
    state_dim: u8,
    input_dim: u8,
    regions: Vec<DynamicsInput>,
    equilibrium: Option<Vec<f64>>,
}

#[derive(Debug, Arbitrary)]
struct DynamicsInput {
    a_values: Vec<f64>,
    f_values: Vec<f64>,
    b_values: Vec<f64>,
    e_values: Vec<f64>,
    envelope: bool,
    skew_rows: bool,
}

fuzz_target!(|input: ValidateInput| {
    let n = usize::from(input.state_dim % 3) + 1;
    let m = usize::from(input.input_dim % 3);
    let regions: Vec<Region> = input
        .regions
        .iter()
        .take(6)
        .map(|record| {
            // deliberately malformed shapes are part of the corpus
            let rows = if record.skew_rows { n + 1 } else { n };
            let a = DMatrix::from_fn(rows, n, |r, c| {
                record.a_values.get(r * n + c).copied().unwrap_or(0.0)
            });
            let f = DVector::from_fn(n, |r, _| record.f_values.get(r).copied().unwrap_or(0.0));
            let b = DMatrix::from_fn(n, m, |r, c| {
                record.b_values.get(r * m + c).copied().unwrap_or(0.0)
            });
            let dynamics = AffineDynamics::new(a, f, b);
            let polytope = Polytope::new(
                DMatrix::from_fn(1, n, |_, c| record.e_values.get(c).copied().unwrap_or(0.0)),
                DVector::from_fn(1, |r, _| {
                    record.e_values.get(n + r).copied().unwrap_or(0.0)
                }),
            );
            let region_dynamics = if record.envelope {
                RegionDynamics::Envelope([dynamics.clone(), dynamics])
            } else {
                RegionDynamics::Affine(dynamics)
            };
            Region::new(polytope, region_dynamics)
        })
        .collect();
    let mut system = PwaSystem::new(regions, n, m);
    if let Some(values) = &input.equilibrium {
        let xcl = DVector::from_fn(values.len().min(4), |r, _| values[r]);
        system = system.with_equilibrium(xcl);
    }

    // validation must classify, never panic
    let _ = system.validate();
});
