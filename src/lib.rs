//! Generic simulated annealing engine.
//!
//! The caller supplies a state type, an initial state with its energy, and
//! a [`StateMover`](sa::StateMover) that perturbs a state and reports the new
//! energy. The engine handles the rest:
//!
//! - **Exponential cooling** from a maximum to a minimum temperature over a
//!   fixed number of steps.
//! - **Metropolis acceptance**: improving moves are always taken, worsening
//!   moves with probability `exp(-dE / T)`.
//! - **Best-state tracking**, replaced only when a run completes.
//! - **Schedule calibration** that finds temperature bounds and a step count
//!   for a target wall-clock duration.
//! - **Progress reporting** to any [`std::io::Write`] sink, plus `tracing`
//!   events.
//!
//! # Example
//!
//! ```
//! use rand::Rng;
//! use u_anneal::sa::{Annealer, FnMover};
//!
//! let mover = FnMover::new(|x: &mut f64, rng: &mut dyn rand::RngCore| {
//!     *x += rng.random_range(-1.0..1.0);
//!     (*x - 3.0).powi(2)
//! });
//!
//! let mut annealer = Annealer::new(mover, 10.0, 49.0).with_seed(7);
//! annealer.run_annealing(10.0, 0.01, 5_000, 0).unwrap();
//! assert!(annealer.best_energy() < 1.0);
//! ```
//!
//! # Architecture
//!
//! This crate sits at Layer 2 (Algorithms) in the U-Engine ecosystem. It
//! contains no domain-specific concepts; states and moves are defined by
//! consumers at higher layers.

pub mod error;
pub mod sa;

pub use error::{AnnealError, Result};
