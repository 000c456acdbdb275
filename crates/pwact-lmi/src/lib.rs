#![forbid(unsafe_code)]

//! PWACT inequality layer: Lyapunov-based matrix-inequality systems,
//! feasibility certificates, and the solver-adapter seam.
//!
//! ## Module layout
//!
//! | Module        | Contents                                                    |
//! |---------------|-------------------------------------------------------------|
//! | `lyap`        | Lyapunov-equation solve, definiteness and Hurwitz tests     |
//! | `inequality`  | [`InequalitySystem`] builder and method/unknown taxonomy    |
//! | `certificate` | [`Certificate`], [`ControllerGain`], region multipliers     |
//! | `solver`      | [`SolverAdapter`] trait, outcomes, linear/bilinear dispatch |
//! | `lqr`         | Newton-Kleinman LQR gain used for synthesis seeding         |
//! | `reference`   | Reference convex and bilinear adapters                      |

pub mod certificate;
pub mod inequality;
pub mod lqr;
pub mod lyap;
pub mod reference;
pub mod solver;

pub use certificate::{Certificate, ControllerGain, LyapunovCertificate, RegionMultiplier};
pub use inequality::{
    BuildRequest, ContinuityConstraint, GainSource, InequalityKind, InequalitySystem,
    LyapunovStructure, MethodCombination, RegionConstraint, SlackForm, UnknownKind,
    build_inequality_system,
};
pub use lqr::lqr_gain;
pub use lyap::{is_hurwitz, is_positive_definite, max_symmetric_eigenvalue, solve_lyapunov};
pub use reference::{
    LyapunovCandidateSolver, SeededAlternationSolver, seed_gain_table, seed_gains_for,
};
pub use solver::{SolveOutcome, SolverAdapter, SolverDispatch, SolverError};
