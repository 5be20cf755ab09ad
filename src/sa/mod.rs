//! Simulated Annealing (SA).
//!
//! A single-solution trajectory metaheuristic inspired by the physical
//! annealing process. Accepts worsening moves with a probability that
//! decreases as the temperature cools, allowing the search to escape
//! local optima.
//!
//! [`Annealer`] cools exponentially from a maximum to a minimum temperature
//! over a fixed number of steps and keeps the best state seen.
//! [`Annealer::compute_run_schedule`] picks those bounds and the step count
//! for a wall-clock budget by probing the caller's moves.
//!
//! # References
//!
//! - Kirkpatrick, Gelatt & Vecchi (1983), "Optimization by Simulated Annealing"
//! - Metropolis et al. (1953), "Equation of State Calculations by Fast Computing Machines"

mod calibration;
mod config;
mod progress;
mod runner;
mod types;

pub use config::{
    AnnealConfig, CalibrationConfig, RunSchedule, DEFAULT_CALIBRATION_STEPS,
    DEFAULT_MAX_TEMPERATURE, DEFAULT_MIN_TEMPERATURE, DEFAULT_STEPS, DEFAULT_UPDATES,
};
pub use runner::{Annealer, RunStats};
pub use types::{FnMover, StateMover};
