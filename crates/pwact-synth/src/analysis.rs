#![forbid(unsafe_code)]

//! Stability analysis front end.
//!
//! Analysis is a single deterministic sweep: gains are fixed (zero, or
//! an externally supplied closed-loop table), the inequality form is
//! always linear, and there is nothing stochastic to resample, so it
//! never retries. The verdict honors the sufficient-condition gap:
//! infeasibility means "unstable" only for a single region, where the
//! Lyapunov condition is necessary and sufficient.

use pwact_lmi::{
    BuildRequest, Certificate, GainSource, InequalityKind, MethodCombination, SolveOutcome,
    SolverAdapter, build_inequality_system,
};
use pwact_model::PwaSystem;

use crate::config::{AnalysisOptions, ConfigError};
use crate::controller::{SynthesisError, effective_combinations};
use crate::evidence::{SweepLogEntry, SweepOutcome};

/// Outcome classification of a stability analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityVerdict {
    Stable,
    /// Meaningful only for a single region, where infeasibility is
    /// conclusive.
    Unstable,
    CouldNotVerify,
}

impl StabilityVerdict {
    /// `true` when a decay certificate was found.
    #[must_use]
    pub const fn is_stable(self) -> bool {
        matches!(self, Self::Stable)
    }
}

/// Result of [`analyze_stability`].
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityReport {
    pub verdict: StabilityVerdict,
    /// Human-readable classification: "stable", "unstable", or
    /// "could not verify".
    pub message: String,
    pub certificate: Option<Certificate>,
    pub combination: Option<MethodCombination>,
    /// One record per attempted combination.
    pub diagnostics: Vec<SweepLogEntry>,
}

/// Check stability of the model at its equilibrium point under the
/// configured method combinations.
pub fn analyze_stability<S: SolverAdapter>(
    system: &PwaSystem,
    options: &AnalysisOptions,
    solver: &mut S,
) -> Result<StabilityReport, SynthesisError> {
    options.validate()?;
    system.validate().map_err(SynthesisError::Model)?;
    let xcl = options.resolve_equilibrium(system)?;

    let (combinations, skipped) = effective_combinations(
        system,
        &xcl,
        &options.approximations,
        &[InequalityKind::Linear],
        &options.lyapunov,
    );
    if combinations.is_empty() {
        return Err(ConfigError::NoApplicableCombination.into());
    }

    let gain_source = match &options.gains {
        Some(table) => GainSource::FixedExternal(table.clone()),
        None => GainSource::FixedZero,
    };

    let mut diagnostics: Vec<SweepLogEntry> = skipped
        .iter()
        .map(|combination| SweepLogEntry {
            attempt: 1,
            combination: *combination,
            outcome: SweepOutcome::Skipped,
            detail: "model carries no ellipsoidal region data".into(),
        })
        .collect();

    let mut saw_infeasible = false;
    let mut saw_error = false;
    for combination in &combinations {
        let built = build_inequality_system(&BuildRequest {
            system,
            xcl: &xcl,
            alpha: options.alpha,
            method: *combination,
            gain_source: gain_source.clone(),
            continuity: options.continuity,
            normal_direction_only: options.normal_direction_only,
        })
        .map_err(SynthesisError::Model)?;

        match solver.solve(&built) {
            Ok(SolveOutcome::Feasible(certificate)) => {
                diagnostics.push(SweepLogEntry {
                    attempt: 1,
                    combination: *combination,
                    outcome: SweepOutcome::Feasible,
                    detail: String::new(),
                });
                return Ok(StabilityReport {
                    verdict: StabilityVerdict::Stable,
                    message: "stable".into(),
                    certificate: Some(*certificate),
                    combination: Some(*combination),
                    diagnostics,
                });
            }
            Ok(SolveOutcome::Infeasible) => {
                saw_infeasible = true;
                diagnostics.push(SweepLogEntry {
                    attempt: 1,
                    combination: *combination,
                    outcome: SweepOutcome::Infeasible,
                    detail: String::new(),
                });
            }
            Err(error) => {
                saw_error = true;
                diagnostics.push(SweepLogEntry {
                    attempt: 1,
                    combination: *combination,
                    outcome: SweepOutcome::SolverError,
                    detail: error.to_string(),
                });
            }
        }
    }

    // Single-region infeasibility is conclusive (linear system);
    // anything else only exhausts the sufficient condition.
    let conclusive = system.len() == 1 && saw_infeasible && !saw_error;
    let (verdict, message) = if conclusive {
        (StabilityVerdict::Unstable, "unstable")
    } else {
        (StabilityVerdict::CouldNotVerify, "could not verify")
    };
    Ok(StabilityReport {
        verdict,
        message: message.into(),
        certificate: None,
        combination: None,
        diagnostics,
    })
}
