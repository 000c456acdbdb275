#![forbid(unsafe_code)]

//! The solver-adapter seam.
//!
//! The core never assumes a particular feasibility algorithm; it only
//! requires that `Infeasible` (a valid, expected outcome) be
//! distinguishable from `SolverError` (a numerical failure) and from
//! `Feasible`. What the core does own is the dispatch rule: linear
//! systems go to a convex adapter, bilinear systems to a nonconvex one.

use thiserror::Error;

use crate::certificate::Certificate;
use crate::inequality::InequalitySystem;

/// Outcome of a feasibility solve. `Infeasible` is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Feasible(Box<Certificate>),
    Infeasible,
}

/// Numerical failure of the external solver. Recorded like `Infeasible`
/// for sweep-continuation purposes but kept distinguishable in
/// diagnostics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("numerical failure in the feasibility solver: {0}")]
    Numerical(String),
    #[error("solver wall-clock budget exhausted")]
    Timeout,
    #[error("inequality system not supported by this adapter: {0}")]
    Unsupported(&'static str),
}

/// External feasibility solver interface.
pub trait SolverAdapter {
    fn solve(&mut self, system: &InequalitySystem) -> Result<SolveOutcome, SolverError>;
}

/// Routes linear systems to the convex adapter and bilinear systems to
/// the nonconvex one. The pair itself implements [`SolverAdapter`], so a
/// sweep can hold a single solver handle.
#[derive(Debug, Clone)]
pub struct SolverDispatch<L, B> {
    pub linear: L,
    pub bilinear: B,
}

impl<L, B> SolverDispatch<L, B> {
    #[must_use]
    pub fn new(linear: L, bilinear: B) -> Self {
        Self { linear, bilinear }
    }
}

impl<L: SolverAdapter, B: SolverAdapter> SolverAdapter for SolverDispatch<L, B> {
    fn solve(&mut self, system: &InequalitySystem) -> Result<SolveOutcome, SolverError> {
        if system.is_bilinear() {
            self.bilinear.solve(system)
        } else {
            self.linear.solve(system)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inequality::{
        BuildRequest, GainSource, InequalityKind, LyapunovStructure, MethodCombination,
        build_inequality_system,
    };
    use nalgebra::{DMatrix, DVector};
    use pwact_model::{
        AffineDynamics, ApproximationKind, Polytope, PwaSystem, Region, RegionDynamics,
    };

    struct Tagging<'a> {
        label: &'static str,
        calls: &'a std::cell::RefCell<Vec<&'static str>>,
    }

    impl SolverAdapter for Tagging<'_> {
        fn solve(&mut self, _system: &InequalitySystem) -> Result<SolveOutcome, SolverError> {
            self.calls.borrow_mut().push(self.label);
            Ok(SolveOutcome::Infeasible)
        }
    }

    fn scalar_system(kind: InequalityKind, source: GainSource) -> InequalitySystem {
        let region = Region::new(
            Polytope::new(DMatrix::from_row_slice(1, 1, &[1.0]), DVector::zeros(1)),
            RegionDynamics::Affine(AffineDynamics::linear(
                DMatrix::from_row_slice(1, 1, &[-1.0]),
                1,
            )),
        );
        let system = PwaSystem::new(vec![region], 1, 1);
        let xcl = DVector::zeros(1);
        build_inequality_system(&BuildRequest {
            system: &system,
            xcl: &xcl,
            alpha: 0.1,
            method: MethodCombination {
                approximation: ApproximationKind::Polytopic,
                inequality: kind,
                lyapunov: LyapunovStructure::Global,
            },
            gain_source: source,
            continuity: false,
            normal_direction_only: false,
        })
        .expect("scalar system builds")
    }

    // 1. Linear systems hit the convex adapter
    #[test]
    fn test_solver_dispatch_linear_path() {
        let calls = std::cell::RefCell::new(Vec::new());
        let mut dispatch = SolverDispatch::new(
            Tagging { label: "linear", calls: &calls },
            Tagging { label: "bilinear", calls: &calls },
        );
        let system = scalar_system(InequalityKind::Linear, GainSource::FixedZero);
        dispatch.solve(&system).expect("mock never errors");
        assert_eq!(calls.into_inner(), vec!["linear"]);
    }

    // 2. Bilinear systems hit the nonconvex adapter
    #[test]
    fn test_solver_dispatch_bilinear_path() {
        let calls = std::cell::RefCell::new(Vec::new());
        let mut dispatch = SolverDispatch::new(
            Tagging { label: "linear", calls: &calls },
            Tagging { label: "bilinear", calls: &calls },
        );
        let system = scalar_system(InequalityKind::Bilinear, GainSource::Unknown);
        dispatch.solve(&system).expect("mock never errors");
        assert_eq!(calls.into_inner(), vec!["bilinear"]);
    }
}
