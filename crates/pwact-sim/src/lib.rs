#![forbid(unsafe_code)]

//! PWACT runtime layer: the feedback block a host simulation loop calls
//! every control tick.

pub mod feedback;

pub use feedback::{
    FeedbackError, FeedbackMode, FeedbackState, SimulationFeedback, SimulationOptions, TickOutcome,
};
