#![forbid(unsafe_code)]

//! Per-tick feedback block.
//!
//! Each control tick the host hands over the current state and receives
//! a control vector. In `Pwa` mode the live state is classified every
//! tick; in `Linear` mode the equilibrium region is resolved once at
//! construction and its gain applied regardless of the current
//! deviation. A classification miss in `Pwa` mode is fatal for the run:
//! the block emits a zeroed output together with the `Stopped` state and
//! refuses further ticks, because the physical state has left the
//! validated modeling domain.
//!
//! Instances borrow their model and gain data read-only, so several
//! simulations may share one controller-table entry concurrently, each
//! with its own feedback block.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pwact_lmi::ControllerGain;
use pwact_model::{ApproximationKind, PwaSystem, RegionClassifier};

/// Operating mode of the feedback block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackMode {
    /// Apply the equilibrium region's gain to every state.
    Linear,
    /// Classify the live state each tick.
    Pwa,
}

/// Lifecycle state, mirrored into every tick outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackState {
    Running,
    Stopped,
}

/// Fatal feedback errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedbackError {
    #[error("equilibrium point lies outside every modeled region")]
    EquilibriumOutsideModel,
    #[error("gain table has {actual} entries for {expected} regions")]
    GainTableSize { expected: usize, actual: usize },
    #[error("state vector has length {actual}, expected {expected}")]
    StateDimension { expected: usize, actual: usize },
    #[error("feedback block already stopped: the state left the modeled domain")]
    Stopped,
}

/// One tick's result: the control output, the block state after the
/// tick, and the region that produced the output (`None` on a miss).
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub u: DVector<f64>,
    pub state: FeedbackState,
    pub region: Option<usize>,
}

/// Host-facing simulation configuration. `stop_time` is consumed by the
/// stepping engine, not by the feedback block itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOptions {
    pub stop_time: f64,
    pub mode: FeedbackMode,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            stop_time: 10.0,
            mode: FeedbackMode::Pwa,
        }
    }
}

/// The runtime feedback block.
#[derive(Debug, Clone)]
pub struct SimulationFeedback<'a> {
    system: &'a PwaSystem,
    gains: Option<&'a [ControllerGain]>,
    mode: FeedbackMode,
    rule: ApproximationKind,
    state: FeedbackState,
    fixed_region: Option<usize>,
}

impl<'a> SimulationFeedback<'a> {
    /// Closed-loop block over one controller-table entry's gains.
    ///
    /// In `Linear` mode the equilibrium region is selected here, once;
    /// an equilibrium outside the model fails construction.
    pub fn new(
        system: &'a PwaSystem,
        gains: &'a [ControllerGain],
        mode: FeedbackMode,
        rule: ApproximationKind,
        xcl: &DVector<f64>,
    ) -> Result<Self, FeedbackError> {
        if gains.len() != system.len() {
            return Err(FeedbackError::GainTableSize {
                expected: system.len(),
                actual: gains.len(),
            });
        }
        Self::build(system, Some(gains), mode, rule, xcl)
    }

    /// Open-loop block: zero output every tick, classification and the
    /// stop path still active.
    pub fn open_loop(
        system: &'a PwaSystem,
        mode: FeedbackMode,
        rule: ApproximationKind,
        xcl: &DVector<f64>,
    ) -> Result<Self, FeedbackError> {
        Self::build(system, None, mode, rule, xcl)
    }

    fn build(
        system: &'a PwaSystem,
        gains: Option<&'a [ControllerGain]>,
        mode: FeedbackMode,
        rule: ApproximationKind,
        xcl: &DVector<f64>,
    ) -> Result<Self, FeedbackError> {
        let fixed_region = match mode {
            FeedbackMode::Linear => Some(
                RegionClassifier::new(system, rule)
                    .select(xcl)
                    .ok_or(FeedbackError::EquilibriumOutsideModel)?,
            ),
            FeedbackMode::Pwa => None,
        };
        Ok(Self {
            system,
            gains,
            mode,
            rule,
            state: FeedbackState::Running,
            fixed_region,
        })
    }

    #[must_use]
    pub const fn mode(&self) -> FeedbackMode {
        self.mode
    }

    #[must_use]
    pub const fn state(&self) -> FeedbackState {
        self.state
    }

    /// One control tick. Errors once stopped; a `Pwa`-mode miss returns
    /// the zeroed output with `Stopped` and latches the stop.
    pub fn tick(&mut self, x: &DVector<f64>) -> Result<TickOutcome, FeedbackError> {
        if self.state == FeedbackState::Stopped {
            return Err(FeedbackError::Stopped);
        }
        if x.len() != self.system.state_dim {
            return Err(FeedbackError::StateDimension {
                expected: self.system.state_dim,
                actual: x.len(),
            });
        }
        let region = match self.mode {
            FeedbackMode::Linear => self.fixed_region,
            FeedbackMode::Pwa => RegionClassifier::new(self.system, self.rule).select(x),
        };
        match region {
            Some(index) => {
                let u = match self.gains {
                    Some(gains) => gains[index].control(x),
                    None => DVector::zeros(self.system.input_dim),
                };
                Ok(TickOutcome {
                    u,
                    state: FeedbackState::Running,
                    region: Some(index),
                })
            }
            None => {
                self.state = FeedbackState::Stopped;
                Ok(TickOutcome {
                    u: DVector::zeros(self.system.input_dim),
                    state: FeedbackState::Stopped,
                    region: None,
                })
            }
        }
    }

    /// Re-arm the block for a fresh simulation run.
    pub fn reset(&mut self) {
        self.state = FeedbackState::Running;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use pwact_model::{AffineDynamics, Polytope, Region, RegionDynamics};

    fn bounded_region(lower: f64, upper: f64) -> Region {
        Region::new(
            Polytope::new(
                DMatrix::from_row_slice(2, 1, &[1.0, -1.0]),
                DVector::from_row_slice(&[-lower, upper]),
            ),
            RegionDynamics::Affine(AffineDynamics::linear(
                DMatrix::from_row_slice(1, 1, &[-1.0]),
                1,
            )),
        )
    }

    fn two_region_system() -> PwaSystem {
        PwaSystem::new(vec![bounded_region(-1.0, 0.0), bounded_region(0.0, 1.0)], 1, 1)
    }

    fn gain(k: f64, offset: f64) -> ControllerGain {
        ControllerGain::new(
            DMatrix::from_row_slice(1, 1, &[k]),
            DVector::from_element(1, offset),
        )
    }

    // 1. Pwa mode applies the active region's affine law
    #[test]
    fn test_feedback_pwa_mode_selects_gain() {
        let system = two_region_system();
        let gains = [gain(2.0, 0.0), gain(-3.0, 1.0)];
        let xcl = DVector::zeros(1);
        let mut feedback = SimulationFeedback::new(
            &system,
            &gains,
            FeedbackMode::Pwa,
            ApproximationKind::Polytopic,
            &xcl,
        )
        .expect("constructs");

        let left = feedback.tick(&DVector::from_element(1, -0.5)).expect("runs");
        assert_eq!(left.region, Some(0));
        assert!((left.u[0] - (2.0 * -0.5)).abs() < 1e-12);

        let right = feedback.tick(&DVector::from_element(1, 0.5)).expect("runs");
        assert_eq!(right.region, Some(1));
        assert!((right.u[0] - (-3.0 * 0.5 + 1.0)).abs() < 1e-12);
    }

    // 2. Shared boundary resolves to the smaller region index
    #[test]
    fn test_feedback_pwa_boundary_tie_break() {
        let system = two_region_system();
        let gains = [gain(1.0, 0.0), gain(9.0, 9.0)];
        let xcl = DVector::zeros(1);
        let mut feedback = SimulationFeedback::new(
            &system,
            &gains,
            FeedbackMode::Pwa,
            ApproximationKind::Polytopic,
            &xcl,
        )
        .expect("constructs");
        let outcome = feedback.tick(&DVector::zeros(1)).expect("runs");
        assert_eq!(outcome.region, Some(0));
    }

    // 3. Classification miss: zero output, Stopped, then hard error
    #[test]
    fn test_feedback_pwa_miss_stops() {
        let system = two_region_system();
        let gains = [gain(2.0, 1.0), gain(2.0, 1.0)];
        let xcl = DVector::zeros(1);
        let mut feedback = SimulationFeedback::new(
            &system,
            &gains,
            FeedbackMode::Pwa,
            ApproximationKind::Polytopic,
            &xcl,
        )
        .expect("constructs");

        let outcome = feedback.tick(&DVector::from_element(1, 5.0)).expect("first miss reports");
        assert_eq!(outcome.u, DVector::zeros(1));
        assert_eq!(outcome.state, FeedbackState::Stopped);
        assert_eq!(outcome.region, None);

        assert_eq!(
            feedback.tick(&DVector::zeros(1)),
            Err(FeedbackError::Stopped)
        );

        feedback.reset();
        assert!(feedback.tick(&DVector::zeros(1)).is_ok());
    }

    // 4. Linear mode pins the equilibrium region for every state
    #[test]
    fn test_feedback_linear_mode_fixed_region() {
        let system = two_region_system();
        let gains = [gain(2.0, 0.5), gain(-9.0, 0.0)];
        let xcl = DVector::zeros(1);
        let mut feedback = SimulationFeedback::new(
            &system,
            &gains,
            FeedbackMode::Linear,
            ApproximationKind::Polytopic,
            &xcl,
        )
        .expect("constructs");

        // state far inside region 1 still uses region 0's gain
        let outcome = feedback.tick(&DVector::from_element(1, 0.9)).expect("runs");
        assert_eq!(outcome.region, Some(0));
        assert!((outcome.u[0] - (2.0 * 0.9 + 0.5)).abs() < 1e-12);
    }

    // 5. Linear mode fails construction when xcl is outside the model
    #[test]
    fn test_feedback_linear_mode_requires_modeled_equilibrium() {
        let system = two_region_system();
        let gains = [gain(0.0, 0.0), gain(0.0, 0.0)];
        let xcl = DVector::from_element(1, 7.0);
        let err = SimulationFeedback::new(
            &system,
            &gains,
            FeedbackMode::Linear,
            ApproximationKind::Polytopic,
            &xcl,
        )
        .expect_err("xcl outside the model");
        assert_eq!(err, FeedbackError::EquilibriumOutsideModel);
    }

    // 6. Open-loop block outputs zero but still stops on a miss
    #[test]
    fn test_feedback_open_loop_zero_output() {
        let system = two_region_system();
        let xcl = DVector::zeros(1);
        let mut feedback = SimulationFeedback::open_loop(
            &system,
            FeedbackMode::Pwa,
            ApproximationKind::Polytopic,
            &xcl,
        )
        .expect("constructs");
        let inside = feedback.tick(&DVector::from_element(1, 0.5)).expect("runs");
        assert_eq!(inside.u, DVector::zeros(1));
        assert_eq!(inside.state, FeedbackState::Running);
        let outside = feedback.tick(&DVector::from_element(1, 5.0)).expect("miss reports");
        assert_eq!(outside.state, FeedbackState::Stopped);
    }

    // 7. Gain table size and state dimension are checked
    #[test]
    fn test_feedback_dimension_checks() {
        let system = two_region_system();
        let short = [gain(0.0, 0.0)];
        let xcl = DVector::zeros(1);
        assert_eq!(
            SimulationFeedback::new(
                &system,
                &short,
                FeedbackMode::Pwa,
                ApproximationKind::Polytopic,
                &xcl,
            )
            .expect_err("one gain for two regions"),
            FeedbackError::GainTableSize {
                expected: 2,
                actual: 1
            }
        );

        let gains = [gain(0.0, 0.0), gain(0.0, 0.0)];
        let mut feedback = SimulationFeedback::new(
            &system,
            &gains,
            FeedbackMode::Pwa,
            ApproximationKind::Polytopic,
            &xcl,
        )
        .expect("constructs");
        assert_eq!(
            feedback.tick(&DVector::zeros(2)),
            Err(FeedbackError::StateDimension {
                expected: 1,
                actual: 2
            })
        );
    }

    // 8. Default simulation options carry the documented horizon
    #[test]
    fn test_feedback_default_simulation_options() {
        let options = SimulationOptions::default();
        assert!((options.stop_time - 10.0).abs() < f64::EPSILON);
        assert_eq!(options.mode, FeedbackMode::Pwa);
    }
}
