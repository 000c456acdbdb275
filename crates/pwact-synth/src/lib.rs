#![forbid(unsafe_code)]

//! PWACT synthesis layer: the method-combination sweep with its bounded
//! randomized retry loop, and the stability-analysis front end.
//!
//! ## Module layout
//!
//! | Module       | Contents                                                   |
//! |--------------|------------------------------------------------------------|
//! | `config`     | [`SynthesisOptions`], [`AnalysisOptions`], [`ConfigError`] |
//! | `weights`    | [`WeightSource`] seam, random/fixed LQR seed weights       |
//! | `evidence`   | [`SynthesisLedger`] bounded FIFO of per-solve records      |
//! | `controller` | [`SynthesisController`] state machine, [`ControllerTable`] |
//! | `analysis`   | [`analyze_stability`], [`StabilityVerdict`]                |

pub mod analysis;
pub mod config;
pub mod controller;
pub mod evidence;
pub mod weights;

pub use analysis::{StabilityReport, StabilityVerdict, analyze_stability};
pub use config::{AnalysisOptions, ConfigError, SynthesisOptions, WeightSpec};
pub use controller::{ControllerTable, SynthesisController, SynthesisError, SynthesisPhase, TableEntry};
pub use evidence::{SweepLogEntry, SweepOutcome, SynthesisLedger};
pub use weights::{FixedWeights, RandomWeights, SpecWeights, WeightSource};
