#![forbid(unsafe_code)]

//! Analysis and synthesis configuration.
//!
//! Configuration is an explicit immutable value passed into each
//! operation, never process-wide state. Defaults attempt every method
//! combination, matching the documented option semantics: restricting
//! the sweep is an opt-in.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pwact_lmi::{ControllerGain, InequalityKind, LyapunovStructure};
use pwact_model::{ApproximationKind, PwaSystem};

/// Configuration errors: all fatal, all raised before any solving.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("decay rate alpha must be positive, got {0}")]
    NonPositiveAlpha(f64),
    #[error("`{0}` must not be empty")]
    EmptyMethodList(&'static str),
    #[error("iteration budget must be at least 1")]
    ZeroIterationBudget,
    #[error("no equilibrium point supplied and none inherited from the model")]
    MissingEquilibrium,
    #[error("no method combination applies to this model")]
    NoApplicableCombination,
    #[error("seed weight matrices must be positive definite with shapes n x n and m x m")]
    InvalidWeights,
}

/// LQR seed weights: fixed matrices, or positive-definite diagonal draws
/// from a seeded generator. Random weights are what the retry loop
/// re-draws when a sweep converges nowhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeightSpec {
    Fixed { q: DMatrix<f64>, r: DMatrix<f64> },
    Random { seed: u64 },
}

/// Options for the synthesis sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    /// Approximation kinds to attempt (`ApxMeth`).
    pub approximations: Vec<ApproximationKind>,
    /// Inequality forms to attempt (`SynthMeth`: lmi / bmi).
    pub synthesis_methods: Vec<InequalityKind>,
    /// Lyapunov structures to attempt.
    pub lyapunov: Vec<LyapunovStructure>,
    /// Decay rate; fixed, not solved for.
    pub alpha: f64,
    /// Equilibrium override; falls back to the model's own point.
    pub xcl: Option<DVector<f64>>,
    pub weights: WeightSpec,
    /// Emit continuity-of-control constraints for every boundary link.
    pub continuity: bool,
    /// Constrain only the boundary-normal component of gain mismatches.
    pub normal_direction_only: bool,
    /// Total sweep budget (`IterationNumber`).
    pub iteration_number: usize,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            approximations: vec![ApproximationKind::Polytopic, ApproximationKind::Ellipsoidal],
            synthesis_methods: vec![InequalityKind::Linear, InequalityKind::Bilinear],
            lyapunov: vec![
                LyapunovStructure::Global,
                LyapunovStructure::PiecewiseQuadratic,
            ],
            alpha: 0.1,
            xcl: None,
            weights: WeightSpec::Random { seed: 0 },
            continuity: false,
            normal_direction_only: false,
            iteration_number: 5,
        }
    }
}

impl SynthesisOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alpha <= 0.0 || !self.alpha.is_finite() {
            return Err(ConfigError::NonPositiveAlpha(self.alpha));
        }
        if self.approximations.is_empty() {
            return Err(ConfigError::EmptyMethodList("approximations"));
        }
        if self.synthesis_methods.is_empty() {
            return Err(ConfigError::EmptyMethodList("synthesis_methods"));
        }
        if self.lyapunov.is_empty() {
            return Err(ConfigError::EmptyMethodList("lyapunov"));
        }
        if self.iteration_number == 0 {
            return Err(ConfigError::ZeroIterationBudget);
        }
        Ok(())
    }

    /// The equilibrium point for this run: the override, or the one the
    /// model carries.
    pub fn resolve_equilibrium(&self, system: &PwaSystem) -> Result<DVector<f64>, ConfigError> {
        self.xcl
            .clone()
            .or_else(|| system.equilibrium.clone())
            .ok_or(ConfigError::MissingEquilibrium)
    }
}

/// Options for stability analysis: always the linear inequality form,
/// gains fixed at zero or taken from an externally supplied table.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    pub approximations: Vec<ApproximationKind>,
    pub lyapunov: Vec<LyapunovStructure>,
    pub alpha: f64,
    pub xcl: Option<DVector<f64>>,
    /// Externally supplied closed-loop gain table, one entry per region,
    /// in runtime coordinates (`u = K*x + k`).
    pub gains: Option<Vec<ControllerGain>>,
    pub continuity: bool,
    pub normal_direction_only: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            approximations: vec![ApproximationKind::Polytopic, ApproximationKind::Ellipsoidal],
            lyapunov: vec![
                LyapunovStructure::Global,
                LyapunovStructure::PiecewiseQuadratic,
            ],
            alpha: 0.1,
            xcl: None,
            gains: None,
            continuity: false,
            normal_direction_only: false,
        }
    }
}

impl AnalysisOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alpha <= 0.0 || !self.alpha.is_finite() {
            return Err(ConfigError::NonPositiveAlpha(self.alpha));
        }
        if self.approximations.is_empty() {
            return Err(ConfigError::EmptyMethodList("approximations"));
        }
        if self.lyapunov.is_empty() {
            return Err(ConfigError::EmptyMethodList("lyapunov"));
        }
        Ok(())
    }

    pub fn resolve_equilibrium(&self, system: &PwaSystem) -> Result<DVector<f64>, ConfigError> {
        self.xcl
            .clone()
            .or_else(|| system.equilibrium.clone())
            .ok_or(ConfigError::MissingEquilibrium)
    }
}
