#![forbid(unsafe_code)]

//! The synthesis control loop.
//!
//! [`SynthesisController`] sweeps the configured method cross product,
//! collecting every combination that converges into a
//! [`ControllerTable`]. Build failures are configuration errors and
//! abort the whole run; infeasibility and solver failures are recorded
//! and the sweep continues. An empty sweep re-draws the LQR seed
//! weights and runs again, up to the configured iteration budget.
//!
//! The per-combination solves are independent and share only read-only
//! model data, so the sweep could fan out across combinations; this
//! implementation keeps the documented sequential order and serialized
//! aggregation.

use nalgebra::DVector;
use thiserror::Error;

use pwact_lmi::{
    BuildRequest, Certificate, ControllerGain, GainSource, InequalityKind, LyapunovStructure,
    MethodCombination, SolveOutcome, SolverAdapter, build_inequality_system, is_positive_definite,
    seed_gain_table,
};
use pwact_model::{ApproximationKind, ModelError, PwaSystem, RegionClassifier};

use crate::config::{ConfigError, SynthesisOptions};
use crate::evidence::{SweepLogEntry, SweepOutcome, SynthesisLedger};
use crate::weights::{SpecWeights, WeightSource};

/// Observable state of the synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisPhase {
    Idle,
    BuildingCombination,
    Solving,
    Aggregating,
    Retrying,
    Done,
    Failed,
}

/// One converged combination: gains in runtime coordinates
/// (`u = K*x + k`), the method that produced them, and its certificate.
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub gains: Vec<ControllerGain>,
    pub combination: MethodCombination,
    pub certificate: Certificate,
}

/// The synthesis result: one entry per converged combination, immutable
/// once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerTable {
    entries: Vec<TableEntry>,
}

impl ControllerTable {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TableEntry> {
        self.entries.get(index)
    }

    #[must_use]
    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableEntry> {
        self.entries.iter()
    }
}

/// Fatal synthesis failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SynthesisError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no method combination converged after {attempts} sweeps")]
    NoConvergence { attempts: usize },
}

const LEDGER_CAPACITY: usize = 256;

/// Sweep driver over one model, one option set, and one solver handle.
#[derive(Debug)]
pub struct SynthesisController<'a, S, W> {
    system: &'a PwaSystem,
    options: &'a SynthesisOptions,
    solver: S,
    weights: W,
    phase: SynthesisPhase,
    attempts: usize,
    ledger: SynthesisLedger,
}

impl<'a, S: SolverAdapter> SynthesisController<'a, S, SpecWeights> {
    /// Controller with the weight source described by the options.
    #[must_use]
    pub fn new(system: &'a PwaSystem, options: &'a SynthesisOptions, solver: S) -> Self {
        let weights = SpecWeights::from(&options.weights);
        Self::with_weight_source(system, options, solver, weights)
    }
}

impl<'a, S: SolverAdapter, W: WeightSource> SynthesisController<'a, S, W> {
    #[must_use]
    pub fn with_weight_source(
        system: &'a PwaSystem,
        options: &'a SynthesisOptions,
        solver: S,
        weights: W,
    ) -> Self {
        Self {
            system,
            options,
            solver,
            weights,
            phase: SynthesisPhase::Idle,
            attempts: 0,
            ledger: SynthesisLedger::new(LEDGER_CAPACITY),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> SynthesisPhase {
        self.phase
    }

    /// Number of full sweeps attempted so far.
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.attempts
    }

    #[must_use]
    pub const fn ledger(&self) -> &SynthesisLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn solver(&self) -> &S {
        &self.solver
    }

    /// Run the sweep-and-retry loop to completion.
    pub fn run(&mut self) -> Result<ControllerTable, SynthesisError> {
        match self.run_inner() {
            Ok(table) => {
                self.phase = SynthesisPhase::Done;
                Ok(table)
            }
            Err(error) => {
                self.phase = SynthesisPhase::Failed;
                Err(error)
            }
        }
    }

    fn run_inner(&mut self) -> Result<ControllerTable, SynthesisError> {
        self.options.validate()?;
        self.system.validate()?;
        let xcl = self.options.resolve_equilibrium(self.system)?;

        let (combinations, skipped) = effective_combinations(
            self.system,
            &xcl,
            &self.options.approximations,
            &self.options.synthesis_methods,
            &self.options.lyapunov,
        );
        if combinations.is_empty() {
            return Err(ConfigError::NoApplicableCombination.into());
        }

        let n = self.system.state_dim;
        let m = self.system.input_dim;
        for attempt in 1..=self.options.iteration_number {
            self.attempts = attempt;
            for combination in &skipped {
                self.ledger.record(SweepLogEntry {
                    attempt,
                    combination: *combination,
                    outcome: SweepOutcome::Skipped,
                    detail: "model carries no ellipsoidal region data".into(),
                });
            }

            let (q_weight, r_weight) = self.weights.draw(n, m);
            if q_weight.shape() != (n, n)
                || r_weight.shape() != (m, m)
                || (n > 0 && !is_positive_definite(&q_weight))
                || (m > 0 && !is_positive_definite(&r_weight))
            {
                return Err(ConfigError::InvalidWeights.into());
            }
            let seeds_shifted = seed_gain_table(self.system, &xcl, &q_weight, &r_weight);
            let seeds_raw = to_raw_gains(&seeds_shifted, &xcl);

            let mut entries = Vec::new();
            for combination in &combinations {
                self.phase = SynthesisPhase::BuildingCombination;
                let gain_source = match combination.inequality {
                    InequalityKind::Linear => GainSource::FixedExternal(seeds_raw.clone()),
                    InequalityKind::Bilinear => GainSource::Unknown,
                };
                let mut built = build_inequality_system(&BuildRequest {
                    system: self.system,
                    xcl: &xcl,
                    alpha: self.options.alpha,
                    method: *combination,
                    gain_source,
                    continuity: self.options.continuity,
                    normal_direction_only: self.options.normal_direction_only,
                })?;
                if built.is_bilinear() {
                    built.seed_gains = Some(seeds_shifted.clone());
                }

                self.phase = SynthesisPhase::Solving;
                let outcome = self.solver.solve(&built);

                self.phase = SynthesisPhase::Aggregating;
                match outcome {
                    Ok(SolveOutcome::Feasible(certificate)) => {
                        let mut certificate = *certificate;
                        let shifted = certificate
                            .gains
                            .take()
                            .unwrap_or_else(|| seeds_shifted.clone());
                        let gains = to_raw_gains(&shifted, &xcl);
                        certificate.gains = Some(gains.clone());
                        entries.push(TableEntry {
                            gains,
                            combination: *combination,
                            certificate,
                        });
                        self.ledger.record(SweepLogEntry {
                            attempt,
                            combination: *combination,
                            outcome: SweepOutcome::Feasible,
                            detail: String::new(),
                        });
                    }
                    Ok(SolveOutcome::Infeasible) => {
                        self.ledger.record(SweepLogEntry {
                            attempt,
                            combination: *combination,
                            outcome: SweepOutcome::Infeasible,
                            detail: String::new(),
                        });
                    }
                    Err(error) => {
                        self.ledger.record(SweepLogEntry {
                            attempt,
                            combination: *combination,
                            outcome: SweepOutcome::SolverError,
                            detail: error.to_string(),
                        });
                    }
                }
            }

            if !entries.is_empty() {
                return Ok(ControllerTable { entries });
            }
            if attempt < self.options.iteration_number {
                self.phase = SynthesisPhase::Retrying;
            }
        }
        Err(SynthesisError::NoConvergence {
            attempts: self.attempts,
        })
    }
}

/// Cross product of the configured method axes, with ellipsoidal
/// combinations split off when some region away from the equilibrium
/// lacks ellipsoid data (they could never build).
pub(crate) fn effective_combinations(
    system: &PwaSystem,
    xcl: &DVector<f64>,
    approximations: &[ApproximationKind],
    inequalities: &[InequalityKind],
    lyapunov: &[LyapunovStructure],
) -> (Vec<MethodCombination>, Vec<MethodCombination>) {
    let classifier = RegionClassifier::new(system, ApproximationKind::Polytopic);
    let containing = classifier.classify(xcl);
    let ellipsoids_available = system.regions.iter().enumerate().all(|(i, region)| {
        containing.binary_search(&i).is_ok() || region.ellipsoid.is_some()
    });

    let mut kept = Vec::new();
    let mut skipped = Vec::new();
    for &approximation in approximations {
        for &inequality in inequalities {
            for &structure in lyapunov {
                let combination = MethodCombination {
                    approximation,
                    inequality,
                    lyapunov: structure,
                };
                if approximation == ApproximationKind::Ellipsoidal && !ellipsoids_available {
                    skipped.push(combination);
                } else {
                    kept.push(combination);
                }
            }
        }
    }
    (kept, skipped)
}

/// Convert gains from equilibrium coordinates back to the runtime law
/// `u = K*x + k`: the feedback is unchanged, the offset loses `K*xcl`.
pub(crate) fn to_raw_gains(gains: &[ControllerGain], xcl: &DVector<f64>) -> Vec<ControllerGain> {
    gains
        .iter()
        .map(|gain| {
            ControllerGain::new(gain.feedback.clone(), &gain.offset - &gain.feedback * xcl)
        })
        .collect()
}
